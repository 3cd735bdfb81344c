// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel revision meaning "the most recent revision".
pub const LATEST_REVISION: i32 = -1;

/// The cache key of a loaded resource: its identifier plus a revision.
///
/// Two identifiers are equal when both fields are equal. Any revision that is
/// zero or negative is stored as [`LATEST_REVISION`], so `(id, 0)` and
/// `(id, -7)` name the same entry as `(id, LATEST_REVISION)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    id: ResourceId,
    revision: i32,
}

impl ResourceIdentifier {
    /// Creates an identifier for a specific revision of `id`.
    pub fn new(id: ResourceId, revision: i32) -> Self {
        let revision = if revision > 0 { revision } else { LATEST_REVISION };
        Self { id, revision }
    }

    /// Creates an identifier for the latest revision of `id`.
    pub fn latest(id: ResourceId) -> Self {
        Self {
            id,
            revision: LATEST_REVISION,
        }
    }

    /// Creates the identifier that should actually be loaded for a request.
    ///
    /// A requested revision is kept only when it names an older revision that
    /// is known to exist, i.e. `0 < requested < latest_known`. Everything else,
    /// including requests for the current latest revision itself, collapses to
    /// [`LATEST_REVISION`] so the latest content is cached under one key.
    ///
    /// ## Arguments
    /// * `id` - The resource to load.
    /// * `requested` - The revision asked for by the caller.
    /// * `latest_known` - The latest revision the index knows of, if any.
    pub fn normalized(id: ResourceId, requested: i32, latest_known: Option<i32>) -> Self {
        match latest_known {
            Some(latest) if requested > 0 && requested < latest => Self::new(id, requested),
            _ => Self::latest(id),
        }
    }

    /// The identified resource.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The revision, [`LATEST_REVISION`] for the latest one.
    pub fn revision(&self) -> i32 {
        self.revision
    }

    /// Whether this identifier tracks the latest revision.
    pub fn is_latest(&self) -> bool {
        self.revision == LATEST_REVISION
    }
}

impl From<ResourceId> for ResourceIdentifier {
    fn from(id: ResourceId) -> Self {
        Self::latest(id)
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_latest() {
            write!(f, "{}@latest", self.id)
        } else {
            write!(f, "{}@r{}", self.id, self.revision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_revisions_collapse_to_latest() {
        let id = ResourceId::new();
        assert_eq!(ResourceIdentifier::new(id, 0), ResourceIdentifier::latest(id));
        assert_eq!(ResourceIdentifier::new(id, -7), ResourceIdentifier::latest(id));
        assert_ne!(ResourceIdentifier::new(id, 2), ResourceIdentifier::latest(id));
    }

    #[test]
    fn normalization_keeps_only_older_known_revisions() {
        let id = ResourceId::new();
        assert_eq!(ResourceIdentifier::normalized(id, 2, Some(5)).revision(), 2);
        assert!(ResourceIdentifier::normalized(id, 5, Some(5)).is_latest());
        assert!(ResourceIdentifier::normalized(id, 9, Some(5)).is_latest());
        assert!(ResourceIdentifier::normalized(id, 0, Some(5)).is_latest());
        assert!(ResourceIdentifier::normalized(id, 3, None).is_latest());
    }

    #[test]
    fn display_names_the_revision() {
        let id = ResourceId::new_v5("a");
        assert_eq!(ResourceIdentifier::latest(id).to_string(), format!("{id}@latest"));
        assert_eq!(ResourceIdentifier::new(id, 4).to_string(), format!("{id}@r4"));
    }
}
