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

//! The resource cache, the entry point of the loading engine.
//!
//! [`ResourceCache`] owns the backend and the dependency resolver and adds
//! what a game needs on top of them: scene-scoped release, ordered loading of
//! instances after their definitions, deferred unloading of resources that are
//! still in use, and a command channel for other threads.
//!
//! Nothing blocks except [`ResourceCache::finish_loading`]. Requests are
//! recorded and the caller drives progress by calling
//! [`ResourceCache::update`] once per frame.

mod command;
mod unload_ready;

pub use command::{CacheCommand, CommandSender};
pub use unload_ready::{UnloadReadyFn, UnloadReadyRegistry};

use crate::{config::CacheConfig, dependency::DependencyResolver};
use command::CommandQueue;
use reliquary_core::{
    backend::AssetBackend,
    index::ResourceIndex,
    resource::{
        ResourceHandle, ResourceId, ResourceIdentifier, ResourceKind, StaticAsset,
        LATEST_REVISION,
    },
    scene::SceneId,
    ResourceError, ResourceResult,
};
use std::{collections::VecDeque, fmt, sync::Arc};

/// A resource whose loading waits until every definition has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceLoadRequest {
    /// The instance resource.
    pub resource_id: ResourceId,
    /// The definition it is built from.
    pub definition_id: ResourceId,
    /// Requested revision of the instance.
    pub revision: i32,
    /// Owning scene.
    pub scene: SceneId,
}

/// Something one of the two loaders caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedKey {
    /// A resource loaded by identifier.
    Resource(ResourceIdentifier),
    /// A bundled static asset.
    Static(StaticAsset),
}

impl fmt::Display for CachedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(key) => key.fmt(f),
            Self::Static(asset) => asset.fmt(f),
        }
    }
}

/// An unload waiting for its resource to become releasable.
///
/// The entry has no owners while it waits. Any request that makes it owned
/// again, directly or as a dependency, cancels the unload.
#[derive(Debug)]
struct DeferredUnload {
    key: CachedKey,
    kind: ResourceKind,
    handle: ResourceHandle,
}

/// Loads, caches and releases resources on behalf of scenes.
pub struct ResourceCache {
    config: CacheConfig,
    backend: Box<dyn AssetBackend>,
    index: Arc<dyn ResourceIndex>,
    resolver: DependencyResolver,
    instances: VecDeque<InstanceLoadRequest>,
    deferred: Vec<DeferredUnload>,
    unload_ready: UnloadReadyRegistry,
    commands: CommandQueue,
}

impl ResourceCache {
    /// Creates a cache with the default configuration.
    pub fn new(backend: impl AssetBackend + 'static, index: Arc<dyn ResourceIndex>) -> Self {
        Self::with_config(backend, index, CacheConfig::default())
    }

    /// Creates a cache.
    ///
    /// ## Arguments
    /// * `backend` - Loads files. The cache owns it from now on.
    /// * `index` - Resolves identifiers and revisions to files.
    /// * `config` - Cache settings.
    pub fn with_config(
        backend: impl AssetBackend + 'static,
        index: Arc<dyn ResourceIndex>,
        config: CacheConfig,
    ) -> Self {
        Self {
            config,
            backend: Box::new(backend),
            resolver: DependencyResolver::new(index.clone()),
            index,
            instances: VecDeque::new(),
            deferred: Vec::new(),
            unload_ready: UnloadReadyRegistry::new(),
            commands: CommandQueue::new(),
        }
    }

    /// Requests a revision of `id` for `scene`.
    ///
    /// With `load_dependencies`, everything the resource references is loaded
    /// for `scene` too once it arrives.
    ///
    /// # Errors
    /// Fails when the resource is unknown to the index or the backend rejects
    /// the request.
    pub fn load(
        &mut self,
        scene: SceneId,
        id: ResourceId,
        revision: i32,
        load_dependencies: bool,
    ) -> ResourceResult<()> {
        let key = self.resolver.external().identify(id, revision);
        self.cancel_deferred(&CachedKey::Resource(key));
        if load_dependencies {
            self.resolver.load(self.backend.as_mut(), scene, id, revision)
        } else {
            self.resolver
                .external_mut()
                .load(self.backend.as_mut(), scene, id, revision)
                .map(|_| ())
        }
    }

    /// Requests every resource of `kind` known to the index.
    ///
    /// # Errors
    /// Stops at the first request that fails.
    pub fn load_all_of(
        &mut self,
        scene: SceneId,
        kind: &ResourceKind,
        load_dependencies: bool,
    ) -> ResourceResult<()> {
        for id in self.index.resources_of(kind) {
            self.load(scene, id, LATEST_REVISION, load_dependencies)?;
        }
        Ok(())
    }

    /// Requests an instance that may only start loading once its definition,
    /// and everything else requested so far, has settled.
    ///
    /// The definition is requested with its dependencies right away.
    pub fn load_instance(
        &mut self,
        scene: SceneId,
        resource_id: ResourceId,
        definition_id: ResourceId,
        revision: i32,
    ) -> ResourceResult<()> {
        self.load(scene, definition_id, LATEST_REVISION, true)?;
        self.instances.push_back(InstanceLoadRequest {
            resource_id,
            definition_id,
            revision,
            scene,
        });
        Ok(())
    }

    /// Requests a bundled static asset for `scene`.
    pub fn load_static(&mut self, scene: SceneId, asset: &StaticAsset) -> ResourceResult<()> {
        self.cancel_deferred(&CachedKey::Static(asset.clone()));
        self.resolver
            .internal_mut()
            .load(self.backend.as_mut(), scene, asset.clone())
            .map(|_| ())
    }

    /// The handle of a loaded revision.
    pub fn get(&self, id: ResourceId, revision: i32) -> Option<ResourceHandle> {
        self.resolver.external().get(id, revision)
    }

    /// Handles of every loaded resource and static asset of `kind`.
    pub fn get_all(&self, kind: &ResourceKind) -> Vec<ResourceHandle> {
        let mut handles = self.resolver.external().handles_of(kind);
        handles.extend(self.resolver.internal().handles_of(kind));
        handles
    }

    /// The handle of a loaded static asset.
    pub fn get_static(&self, asset: &StaticAsset) -> Option<ResourceHandle> {
        self.resolver.internal().get(asset)
    }

    /// Whether a revision is loaded.
    pub fn is_loaded(&self, id: ResourceId, revision: i32) -> bool {
        self.resolver.external().is_loaded(id, revision)
    }

    /// Whether a revision is loaded and owned by `scene`.
    pub fn is_loaded_in(&self, scene: SceneId, id: ResourceId, revision: i32) -> bool {
        let key = self.resolver.external().identify(id, revision);
        self.resolver
            .external()
            .keyed()
            .entry(&key)
            .is_some_and(|entry| entry.owners().contains(&scene))
    }

    /// Whether a static asset is loaded.
    pub fn is_static_loaded(&self, asset: &StaticAsset) -> bool {
        self.resolver.internal().is_loaded(asset)
    }

    /// Whether anything requested has yet to settle.
    pub fn is_loading(&self) -> bool {
        !self.instances.is_empty() || !self.resolver.is_settled(self.backend.as_ref())
    }

    /// Releases a revision regardless of which scenes own it.
    ///
    /// The release is deferred while the unload-ready predicate of its kind
    /// says no.
    ///
    /// # Errors
    /// [`ResourceError::IllegalState`] when the revision is neither loaded
    /// nor loading.
    pub fn unload(&mut self, id: ResourceId, revision: i32) -> ResourceResult<()> {
        let key = self.resolver.external().identify(id, revision);
        self.release(CachedKey::Resource(key))
    }

    /// Releases a static asset regardless of which scenes own it.
    pub fn unload_static(&mut self, asset: &StaticAsset) -> ResourceResult<()> {
        self.release(CachedKey::Static(asset.clone()))
    }

    /// Releases everything `scene` owns.
    ///
    /// Entries other scenes still own stay loaded. Instance requests and
    /// pending definitions of `scene` are dropped.
    pub fn unload_scene(&mut self, scene: SceneId) {
        self.instances.retain(|request| request.scene != scene);
        self.resolver.forget_scene(scene);

        let resources = self.resolver.external_mut().keyed_mut().release_scene(scene);
        let statics = self.resolver.internal_mut().release_scene(scene);
        let orphaned = resources
            .into_iter()
            .map(CachedKey::Resource)
            .chain(statics.into_iter().map(CachedKey::Static));
        for key in orphaned {
            if let Err(err) = self.release(key) {
                log::warn!("Releasing {scene}: {err}");
            }
        }
        log::debug!("Released {scene}");
    }

    /// Loads the latest revision of `id` again. Existing handles see the new
    /// content once it arrives.
    pub fn reload(&mut self, id: ResourceId) -> ResourceResult<()> {
        self.resolver.external_mut().reload(self.backend.as_mut(), id)
    }

    /// Points `handle`, loaded at `old_revision`, at the latest revision.
    pub fn set_latest_resource(
        &mut self,
        handle: &ResourceHandle,
        old_revision: i32,
    ) -> ResourceResult<()> {
        self.resolver
            .external_mut()
            .set_latest_resource(self.backend.as_mut(), handle, old_revision)
    }

    /// Sets the unload-ready predicate of `kind`.
    pub fn register_unload_ready(
        &mut self,
        kind: ResourceKind,
        predicate: impl Fn(&ResourceHandle) -> bool + Send + Sync + 'static,
    ) {
        self.unload_ready.register(kind, predicate);
    }

    /// Removes the unload-ready predicate of `kind`. Unloads of that kind
    /// deferred so far go ahead on the next update.
    ///
    /// ## Returns
    /// Whether `kind` had a predicate.
    pub fn unregister_unload_ready(&mut self, kind: &ResourceKind) -> bool {
        self.unload_ready.unregister(kind)
    }

    /// A sender other threads can post commands with.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Makes one step of progress without blocking.
    ///
    /// In order: posted commands are applied, deferred unloads are retried,
    /// the resolver advances, and once it has settled one waiting instance is
    /// requested. An instance whose definition did not load is dropped with a
    /// warning; it has to be requested again once the definition is available.
    ///
    /// ## Returns
    /// `Ok(true)` when everything requested has loaded. Deferred unloads that
    /// are still waiting do not count.
    ///
    /// # Errors
    /// Missing and corrupt resources are reported as
    /// [`ResourceError::NotFound`] and [`ResourceError::Corrupt`] with the
    /// failing identifier. The rest of the work carries on with the next
    /// update.
    pub fn update(&mut self) -> ResourceResult<bool> {
        self.apply_commands()?;
        self.retry_deferred();

        if !self.resolver.update(self.backend.as_mut())? {
            return Ok(false);
        }
        let Some(request) = self.instances.pop_front() else {
            return Ok(true);
        };
        if !self.is_loaded(request.definition_id, LATEST_REVISION) {
            log::warn!(
                "Dropping instance {}, its definition {} is not loaded",
                request.resource_id,
                request.definition_id
            );
            return Ok(false);
        }
        log::debug!(
            "Definition {} has settled, requesting instance {}",
            request.definition_id,
            request.resource_id
        );
        self.resolver.external_mut().load(
            self.backend.as_mut(),
            request.scene,
            request.resource_id,
            request.revision,
        )?;
        Ok(false)
    }

    /// Calls [`ResourceCache::update`] until everything requested has loaded,
    /// waiting on the backend in between.
    ///
    /// # Errors
    /// Returns the first error [`ResourceCache::update`] reports.
    pub fn finish_loading(&mut self) -> ResourceResult<()> {
        while !self.update()? {
            if self.backend.queued_count() > 0 {
                self.backend.wait_for_completion(self.config.wait_timeout());
            }
        }
        Ok(())
    }

    /// Backend loading progress in percent.
    pub fn get_progress(&self) -> f32 {
        self.backend.progress()
    }

    /// The number of loaded resources and static assets.
    pub fn get_loaded_count(&self) -> usize {
        self.resolver.external().keyed().loaded_count() + self.resolver.internal().loaded_count()
    }

    /// The cache settings.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Releases everything, ignoring owners and unload-ready predicates.
    pub fn dispose(&mut self) {
        self.instances.clear();
        self.deferred.clear();
        self.resolver.dispose(self.backend.as_mut());

        let remaining = self.backend.loaded_count();
        if remaining > 0 {
            log::error!("{remaining} assets are still loaded after disposing the resource cache");
        }
        if self.config.assert_empty_on_dispose {
            debug_assert_eq!(remaining, 0, "the backend still holds assets after dispose");
        }
    }

    fn apply_commands(&mut self) -> ResourceResult<()> {
        while let Some(command) = self.commands.next() {
            log::trace!("Applying {command:?}");
            match self.apply(command) {
                // Already logged; a stale command must not stop the tick.
                Err(ResourceError::IllegalState(_)) => {}
                result => result?,
            }
        }
        Ok(())
    }

    fn apply(&mut self, command: CacheCommand) -> ResourceResult<()> {
        match command {
            CacheCommand::Load {
                scene,
                id,
                revision,
                load_dependencies,
            } => self.load(scene, id, revision, load_dependencies),
            CacheCommand::LoadInstance {
                scene,
                resource_id,
                definition_id,
                revision,
            } => self.load_instance(scene, resource_id, definition_id, revision),
            CacheCommand::LoadStatic { scene, asset } => self.load_static(scene, &asset),
            CacheCommand::Unload { id, revision } => self.unload(id, revision),
            CacheCommand::UnloadStatic(asset) => self.unload_static(&asset),
            CacheCommand::UnloadScene(scene) => {
                self.unload_scene(scene);
                Ok(())
            }
            CacheCommand::Reload(id) => self.reload(id),
            CacheCommand::SetLatestResource {
                handle,
                old_revision,
            } => self.set_latest_resource(&handle, old_revision),
        }
    }

    fn release(&mut self, key: CachedKey) -> ResourceResult<()> {
        let Some((kind, handle)) = self.loaded_entry(&key) else {
            return self.unload_now(&key);
        };
        if self.unload_ready.is_ready(&kind, &handle) {
            return self.unload_now(&key);
        }
        self.disown(&key);
        if !self.deferred.iter().any(|deferred| deferred.key == key) {
            log::debug!("Deferring unload of {key} until it is ready");
            self.deferred.push(DeferredUnload { key, kind, handle });
        }
        Ok(())
    }

    fn retry_deferred(&mut self) {
        for deferred in std::mem::take(&mut self.deferred) {
            if !self.unload_ready.is_ready(&deferred.kind, &deferred.handle) {
                self.deferred.push(deferred);
                continue;
            }
            if self.is_owned(&deferred.key) {
                log::debug!("{} was claimed by another scene, keeping it", deferred.key);
                continue;
            }
            if let Err(err) = self.unload_now(&deferred.key) {
                log::debug!("Deferred unload of {} skipped: {err}", deferred.key);
            }
        }
    }

    fn cancel_deferred(&mut self, key: &CachedKey) {
        self.deferred.retain(|deferred| &deferred.key != key);
    }

    fn loaded_entry(&self, key: &CachedKey) -> Option<(ResourceKind, ResourceHandle)> {
        match key {
            CachedKey::Resource(key) => self
                .resolver
                .external()
                .keyed()
                .entry(key)
                .map(|entry| (entry.kind().clone(), entry.handle().clone())),
            CachedKey::Static(asset) => self
                .resolver
                .internal()
                .entry(asset)
                .map(|entry| (entry.kind().clone(), entry.handle().clone())),
        }
    }

    fn disown(&mut self, key: &CachedKey) {
        match key {
            CachedKey::Resource(key) => self.resolver.external_mut().keyed_mut().disown(key),
            CachedKey::Static(asset) => self.resolver.internal_mut().disown(asset),
        };
    }

    fn is_owned(&self, key: &CachedKey) -> bool {
        match key {
            CachedKey::Resource(key) => self.resolver.external().keyed().is_owned(key),
            CachedKey::Static(asset) => self.resolver.internal().is_owned(asset),
        }
    }

    fn unload_now(&mut self, key: &CachedKey) -> ResourceResult<()> {
        match key {
            CachedKey::Resource(key) => self.resolver.external_mut().keyed_mut().unload(key),
            CachedKey::Static(asset) => self.resolver.internal_mut().unload(asset),
        }
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("instances", &self.instances)
            .field("deferred", &self.deferred.len())
            .field("unload_ready", &self.unload_ready)
            .finish()
    }
}
