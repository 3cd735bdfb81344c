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

use reliquary_core::resource::{ResourceHandle, ResourceKind};
use std::{collections::HashMap, fmt};

/// Decides whether a loaded resource may be released right now.
pub type UnloadReadyFn = dyn Fn(&ResourceHandle) -> bool + Send + Sync;

/// Unload-readiness predicates by resource kind.
///
/// Kinds without a predicate are always ready. A music track that is still
/// playing is the typical resource that is not.
#[derive(Default)]
pub struct UnloadReadyRegistry {
    predicates: HashMap<ResourceKind, Box<UnloadReadyFn>>,
}

impl UnloadReadyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate of `kind`, replacing any previous one.
    pub fn register(
        &mut self,
        kind: ResourceKind,
        predicate: impl Fn(&ResourceHandle) -> bool + Send + Sync + 'static,
    ) {
        self.predicates.insert(kind, Box::new(predicate));
    }

    /// Removes the predicate of `kind`, returning whether there was one.
    pub fn unregister(&mut self, kind: &ResourceKind) -> bool {
        self.predicates.remove(kind).is_some()
    }

    /// Whether `handle`, of type `kind`, may be released.
    pub fn is_ready(&self, kind: &ResourceKind, handle: &ResourceHandle) -> bool {
        self.predicates
            .get(kind)
            .map_or(true, |predicate| predicate(handle))
    }
}

impl fmt::Debug for UnloadReadyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.predicates.keys()).finish()
    }
}
