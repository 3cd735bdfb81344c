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

use super::{LoadOutcome, ReloadRequest, ResourceLoader};
use reliquary_core::{
    backend::AssetBackend,
    index::ResourceIndex,
    resource::{ResourceHandle, ResourceId, ResourceIdentifier, ResourceKind},
    scene::SceneId,
    ResourceError, ResourceResult,
};
use std::sync::Arc;

/// Loads revisioned resources by identifier.
///
/// Every request is normalized first: a revision is kept only when it names
/// an older revision the index knows, everything else loads the latest one.
pub struct ExternalLoader {
    loader: ResourceLoader<ResourceIdentifier>,
}

impl ExternalLoader {
    /// Creates a loader resolving identifiers through `index`.
    pub fn new(index: Arc<dyn ResourceIndex>) -> Self {
        Self {
            loader: ResourceLoader::new(index),
        }
    }

    /// The key a request for `revision` of `id` is cached under.
    pub fn identify(&self, id: ResourceId, revision: i32) -> ResourceIdentifier {
        ResourceIdentifier::normalized(id, revision, self.loader.index.latest_revision(id))
    }

    /// Requests a revision of `id` on behalf of `scene`.
    pub fn load(
        &mut self,
        backend: &mut dyn AssetBackend,
        scene: SceneId,
        id: ResourceId,
        revision: i32,
    ) -> ResourceResult<LoadOutcome> {
        let key = self.identify(id, revision);
        self.loader.load(backend, scene, key)
    }

    /// The handle of a loaded revision.
    pub fn get(&self, id: ResourceId, revision: i32) -> Option<ResourceHandle> {
        self.loader.get(&self.identify(id, revision))
    }

    /// Whether a revision is loaded.
    pub fn is_loaded(&self, id: ResourceId, revision: i32) -> bool {
        self.loader.is_loaded(&self.identify(id, revision))
    }

    /// Whether a revision is loading.
    pub fn is_loading(&self, id: ResourceId, revision: i32) -> bool {
        self.loader.is_loading(&self.identify(id, revision))
    }

    /// Releases a revision regardless of its owners.
    pub fn unload(&mut self, id: ResourceId, revision: i32) -> ResourceResult<()> {
        let key = self.identify(id, revision);
        self.loader.unload(&key)
    }

    /// Loads the latest revision of `id` again, keeping its handle.
    pub fn reload(&mut self, backend: &mut dyn AssetBackend, id: ResourceId) -> ResourceResult<()> {
        self.loader.reload(backend, &ResourceIdentifier::latest(id))
    }

    /// Points `handle`, loaded at `old_revision`, at the latest revision.
    ///
    /// Used after a newer revision has been published. The entry cached under
    /// `old_revision` is dropped, the latest file is loaded again, and once it
    /// arrives its content is pushed into both the latest handle and `handle`.
    ///
    /// # Errors
    /// [`ResourceError::IllegalState`] when `handle` is not managed by this
    /// loader or the latest revision of its resource is not loaded.
    pub fn set_latest_resource(
        &mut self,
        backend: &mut dyn AssetBackend,
        handle: &ResourceHandle,
        old_revision: i32,
    ) -> ResourceResult<()> {
        let Some(id) = self.loader.find_by_handle(handle).map(|entry| entry.key().id()) else {
            let message = "cannot update a handle this loader does not manage".to_owned();
            log::warn!("{message}");
            return Err(ResourceError::IllegalState(message));
        };
        let latest_key = ResourceIdentifier::latest(id);
        let Some(latest) = self.loader.loaded.get(&latest_key) else {
            let message = format!("cannot update {id}, its latest revision is not loaded");
            log::warn!("{message}");
            return Err(ResourceError::IllegalState(message));
        };
        let filepath = latest.filepath.clone();
        let (kind, params) = (latest.kind.clone(), latest.params.clone());
        let latest_handle = latest.handle.clone();

        let old_key = ResourceIdentifier::new(id, old_revision);
        if old_key != latest_key {
            if let Some(old) = self.loader.loaded.remove(&old_key) {
                self.loader.reload_queue.retain(|request| request.key != old_key);
                backend.unload(&old.filepath);
            }
        }

        self.loader.reload_queue.retain(|request| request.key != latest_key);
        backend.unload(&filepath);
        backend.load(&filepath, &kind, &params)?;

        let mut holders = vec![latest_handle.clone()];
        if !handle.ptr_eq(&latest_handle) {
            holders.push(handle.clone());
        }
        log::info!("Moving {old_key} to the latest revision of {id}");
        self.loader.reload_queue.push(ReloadRequest {
            key: latest_key,
            filepath,
            holders,
        });
        Ok(())
    }

    /// Handles of every loaded resource of `kind`.
    pub fn handles_of(&self, kind: &ResourceKind) -> Vec<ResourceHandle> {
        self.loader.handles_of(kind)
    }

    /// The underlying keyed loader.
    pub fn keyed(&self) -> &ResourceLoader<ResourceIdentifier> {
        &self.loader
    }

    /// The underlying keyed loader, mutably.
    pub fn keyed_mut(&mut self) -> &mut ResourceLoader<ResourceIdentifier> {
        &mut self.loader
    }
}
