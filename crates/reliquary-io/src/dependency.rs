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

//! Transitive loading of definitions and their dependencies.
//!
//! The [`DependencyResolver`] requests a resource, remembers it as a pending
//! definition, and once it has arrived requests everything it references:
//! other resources by identifier and static assets by path. Those are in turn
//! inspected once they arrive, until the whole graph is loaded.
//!
//! The resolver remembers which resources it has inspected for which scene.
//! A resource another path loaded without its dependencies is still inspected
//! the first time a definition references it, and a cycle stops at the first
//! resource seen twice.

use crate::loader::{ExternalLoader, ResourceLoader};
use reliquary_core::{
    backend::{AssetBackend, BackendError},
    index::ResourceIndex,
    resource::{ResourceHandle, ResourceId, ResourceIdentifier, StaticAsset, LATEST_REVISION},
    scene::SceneId,
    ResourceError, ResourceResult,
};
use std::{collections::HashSet, sync::Arc};

/// A requested resource whose dependencies have not been requested yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingDefinition {
    /// The key the resource is loading under.
    pub key: ResourceIdentifier,
    /// The scene its dependencies are loaded for.
    pub scene: SceneId,
}

/// Loads resources together with everything they depend on.
pub struct DependencyResolver {
    external: ExternalLoader,
    internal: ResourceLoader<StaticAsset>,
    pending: Vec<PendingDefinition>,
    inspected: HashSet<PendingDefinition>,
}

impl DependencyResolver {
    /// Creates a resolver whose loaders resolve through `index`.
    pub fn new(index: Arc<dyn ResourceIndex>) -> Self {
        Self {
            external: ExternalLoader::new(index.clone()),
            internal: ResourceLoader::new(index),
            pending: Vec::new(),
            inspected: HashSet::new(),
        }
    }

    /// Requests a revision of `id` and, once it arrives, its dependencies.
    ///
    /// # Errors
    /// Fails when the resource itself cannot be requested.
    pub fn load(
        &mut self,
        backend: &mut dyn AssetBackend,
        scene: SceneId,
        id: ResourceId,
        revision: i32,
    ) -> ResourceResult<()> {
        self.external.load(backend, scene, id, revision)?;
        let key = self.external.identify(id, revision);
        self.enqueue(PendingDefinition { key, scene });
        Ok(())
    }

    fn enqueue(&mut self, definition: PendingDefinition) {
        let done = self.inspected.contains(&definition)
            && self.external.keyed().is_loaded(&definition.key);
        if !done && !self.pending.contains(&definition) {
            self.pending.push(definition);
        }
    }

    /// Advances both loaders and requests the dependencies of every pending
    /// definition that has arrived.
    ///
    /// ## Returns
    /// `Ok(true)` once the resolver is settled.
    ///
    /// # Errors
    /// A missing or corrupt resource is returned after its pending definition
    /// has been dropped, leaving the rest of the batch intact. Any other
    /// failure, whether the backend rejects a request or fails it later,
    /// aborts the batch: every pending definition is dropped before the error
    /// is returned.
    pub fn update(&mut self, backend: &mut dyn AssetBackend) -> ResourceResult<bool> {
        if let Err(err) = backend.update() {
            return Err(self.fail(err));
        }
        self.internal.settle(backend);
        self.external.keyed_mut().settle(backend);
        let loader = self.external.keyed();
        self.inspected.retain(|definition| loader.is_loaded(&definition.key));
        self.inspect_arrived(backend)?;
        Ok(self.is_settled(backend))
    }

    fn fail(&mut self, err: BackendError) -> ResourceError {
        let err = match self.external.keyed_mut().claim_failure(err) {
            Ok(failure) => return self.abandon(failure),
            Err(unclaimed) => unclaimed,
        };
        match self.internal.claim_failure(err) {
            Ok(failure) => self.abandon(failure),
            Err(err) => {
                log::error!("Backend failed on '{}' which nothing waits for", err.path);
                ResourceError::Backend(err)
            }
        }
    }

    /// Drops the pending work a claimed failure invalidates: the failed
    /// definition for a missing or corrupt resource, the whole batch otherwise.
    fn abandon(&mut self, failure: ResourceError) -> ResourceError {
        match failure.identifier() {
            Some(failed) => self.pending.retain(|definition| definition.key != failed),
            None => {
                log::error!("Aborting dependency loading: {failure}");
                self.pending.clear();
            }
        }
        failure
    }

    fn inspect_arrived(&mut self, backend: &mut dyn AssetBackend) -> ResourceResult<()> {
        let mut index = 0;
        while index < self.pending.len() {
            let definition = self.pending[index];
            let loader = self.external.keyed();
            if let Some(handle) = loader.get(&definition.key) {
                self.pending.remove(index);
                self.inspected.insert(definition);
                if let Err(err) = self.request_dependencies(backend, definition, &handle) {
                    self.inspected.remove(&definition);
                    if !err.is_recoverable() {
                        log::error!("Aborting dependency loading: {err}");
                        self.pending.clear();
                    }
                    return Err(err);
                }
            } else if !loader.is_loading(&definition.key) {
                log::debug!("{} was released before arriving", definition.key);
                self.pending.remove(index);
            } else {
                index += 1;
            }
        }
        Ok(())
    }

    fn request_dependencies(
        &mut self,
        backend: &mut dyn AssetBackend,
        definition: PendingDefinition,
        handle: &ResourceHandle,
    ) -> ResourceResult<()> {
        let content = handle.content();
        let Some(dependencies) = content.dependencies() else {
            log::debug!("{} declares no dependencies", definition.key);
            return Ok(());
        };
        log::debug!(
            "Requesting {} external and {} static dependencies of {}",
            dependencies.external().len(),
            dependencies.internal().len(),
            definition.key
        );

        let mut missing = None;
        for id in dependencies.external_ids() {
            match self.external.load(backend, definition.scene, id, LATEST_REVISION) {
                Ok(_) => self.enqueue(PendingDefinition {
                    key: self.external.identify(id, LATEST_REVISION),
                    scene: definition.scene,
                }),
                Err(err) if err.is_recoverable() => {
                    log::warn!("Dependency of {} is unavailable: {err}", definition.key);
                    if missing.is_none() {
                        missing = Some(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        for asset in dependencies.internal() {
            self.internal.load(backend, definition.scene, asset.clone())?;
        }

        missing.map_or(Ok(()), Err)
    }

    /// Whether no definition is pending and both loaders are idle.
    pub fn is_settled(&self, backend: &dyn AssetBackend) -> bool {
        self.pending.is_empty()
            && self.external.keyed().is_idle(backend)
            && self.internal.is_idle(backend)
    }

    /// The definitions whose dependencies are still to be requested.
    pub fn pending(&self) -> &[PendingDefinition] {
        &self.pending
    }

    /// Drops the pending definitions of `scene`.
    pub fn forget_scene(&mut self, scene: SceneId) {
        self.pending.retain(|definition| definition.scene != scene);
        self.inspected.retain(|definition| definition.scene != scene);
    }

    /// The loader of identified resources.
    pub fn external(&self) -> &ExternalLoader {
        &self.external
    }

    /// The loader of identified resources, mutably.
    pub fn external_mut(&mut self) -> &mut ExternalLoader {
        &mut self.external
    }

    /// The loader of static assets.
    pub fn internal(&self) -> &ResourceLoader<StaticAsset> {
        &self.internal
    }

    /// The loader of static assets, mutably.
    pub fn internal_mut(&mut self) -> &mut ResourceLoader<StaticAsset> {
        &mut self.internal
    }

    /// Forgets all pending work and releases everything both loaders hold.
    pub fn dispose(&mut self, backend: &mut dyn AssetBackend) {
        self.pending.clear();
        self.inspected.clear();
        self.external.keyed_mut().dispose(backend);
        self.internal.dispose(backend);
    }
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("pending", &self.pending)
            .field("external_loaded", &self.external.keyed().loaded_count())
            .field("internal_loaded", &self.internal.loaded_count())
            .finish()
    }
}
