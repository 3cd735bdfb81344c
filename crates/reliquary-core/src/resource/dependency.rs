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

use super::{LoadParams, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// A resource bundled with the application, addressed by path and kind
/// instead of by identifier. Static assets have no revisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticAsset {
    path: String,
    kind: ResourceKind,
    params: LoadParams,
}

impl StaticAsset {
    /// Creates a static asset reference with no load parameters.
    pub fn new(path: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
            params: LoadParams::default(),
        }
    }

    /// Attaches backend-specific load parameters.
    pub fn with_params(mut self, params: LoadParams) -> Self {
        self.params = params;
        self
    }

    /// The bundled file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The resource kind.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// The load parameters.
    pub fn params(&self) -> &LoadParams {
        &self.params
    }
}

impl fmt::Display for StaticAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.kind)
    }
}

/// The resources a definition references.
///
/// External dependencies are counted: a definition that places the same
/// texture on several actors adds it several times and the dependency only
/// disappears once every use has been removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySet {
    external: HashMap<ResourceId, u32>,
    internal: Vec<StaticAsset>,
}

impl DependencySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more use of `id`, returning the new use count.
    pub fn add_external(&mut self, id: ResourceId) -> u32 {
        let count = self.external.entry(id).or_insert(0);
        *count += 1;
        *count
    }

    /// Removes one use of `id`.
    ///
    /// ## Returns
    /// `true` when that was the last use and `id` is no longer a dependency.
    pub fn remove_external(&mut self, id: ResourceId) -> bool {
        match self.external.get_mut(&id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.external.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Adds a static asset dependency. Adding the same asset twice is a no-op.
    pub fn add_internal(&mut self, asset: StaticAsset) {
        if !self.internal.contains(&asset) {
            self.internal.push(asset);
        }
    }

    /// Removes a static asset dependency, returning whether it was present.
    pub fn remove_internal(&mut self, asset: &StaticAsset) -> bool {
        let before = self.internal.len();
        self.internal.retain(|existing| existing != asset);
        before != self.internal.len()
    }

    /// External dependencies with their use counts.
    pub fn external(&self) -> &HashMap<ResourceId, u32> {
        &self.external
    }

    /// The identifiers of all external dependencies.
    pub fn external_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.external.keys().copied()
    }

    /// Static asset dependencies.
    pub fn internal(&self) -> &[StaticAsset] {
        &self.internal
    }

    /// Whether the set references nothing.
    pub fn is_empty(&self) -> bool {
        self.external.is_empty() && self.internal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_dependencies_are_counted() {
        let mut deps = DependencySet::new();
        let texture = ResourceId::new();

        assert_eq!(deps.add_external(texture), 1);
        assert_eq!(deps.add_external(texture), 2);
        assert!(!deps.remove_external(texture));
        assert!(deps.remove_external(texture));
        assert!(deps.is_empty());
        assert!(!deps.remove_external(texture));
    }

    #[test]
    fn internal_dependencies_are_deduplicated() {
        let mut deps = DependencySet::new();
        let theme = StaticAsset::new("themes/space.atlas", ResourceKind::from_static("texture"));

        deps.add_internal(theme.clone());
        deps.add_internal(theme.clone());
        assert_eq!(deps.internal().len(), 1);
        assert!(deps.remove_internal(&theme));
        assert!(deps.is_empty());
    }
}
