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

//! Errors raised by the loading engine.

use crate::{
    backend::BackendError,
    resource::{ResourceId, ResourceIdentifier},
};
use thiserror::Error;

/// The result type of loader and cache operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// An error raised by a loader, the dependency resolver or the cache.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource or the requested revision does not exist.
    #[error("resource {id} (revision {revision}) was not found")]
    NotFound {
        /// The missing resource.
        id: ResourceId,
        /// The revision that was requested.
        revision: i32,
    },
    /// The resource exists but its content could not be decoded.
    #[error("resource {id} (revision {revision}) is corrupt")]
    Corrupt {
        /// The corrupt resource.
        id: ResourceId,
        /// The revision that was loaded.
        revision: i32,
    },
    /// The operation is not valid in the current state, such as unloading a
    /// resource that is neither loaded nor loading.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// An unclassified failure of the asset backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ResourceError {
    /// The resource a typed error is about.
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        match self {
            Self::NotFound { id, revision } | Self::Corrupt { id, revision } => {
                Some(ResourceIdentifier::new(*id, *revision))
            }
            _ => None,
        }
    }

    /// Whether the caller can recover by fetching the resource again.
    ///
    /// Only missing and corrupt resources are recoverable. Anything else
    /// aborts the batch it happened in.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Corrupt { .. })
    }
}
