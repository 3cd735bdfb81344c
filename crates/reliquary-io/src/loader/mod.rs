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

//! Keyed loaders over an asynchronous asset backend.
//!
//! A [`ResourceLoader`] maps keys to backend paths and tracks, per key, which
//! scenes own it and whether it is loading or loaded. It never blocks: every
//! request is only recorded, and [`ResourceLoader::update`] moves finished
//! work from the backend into the loaded map.
//!
//! Two key types exist. [`ResourceIdentifier`] keys resolve through the
//! [`ResourceIndex`] and are managed by the [`ExternalLoader`].
//! [`StaticAsset`] keys carry their own path and are used for bundled assets.

mod external;

pub use external::ExternalLoader;

use reliquary_core::{
    backend::{AssetBackend, BackendError, FaultKind},
    index::{ResourceIndex, ResourceLocation},
    resource::{LoadParams, ResourceHandle, ResourceIdentifier, ResourceKind, StaticAsset},
    scene::SceneId,
    ResourceError, ResourceResult,
};
use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
    sync::Arc,
};

/// A key a [`ResourceLoader`] can cache resources under.
pub trait LoadKey: Clone + Eq + Hash + Debug + Display {
    /// Finds where the keyed resource is stored.
    fn locate(&self, index: &dyn ResourceIndex) -> ResourceResult<ResourceLocation>;

    /// Turns a classified backend fault into a typed error for this key.
    ///
    /// Keys that cannot be fetched again return `None`, which leaves the
    /// failure untyped.
    fn classify(&self, fault: FaultKind) -> Option<ResourceError>;
}

impl LoadKey for ResourceIdentifier {
    fn locate(&self, index: &dyn ResourceIndex) -> ResourceResult<ResourceLocation> {
        index
            .resolve(self.id(), self.revision())
            .ok_or(ResourceError::NotFound {
                id: self.id(),
                revision: self.revision(),
            })
    }

    fn classify(&self, fault: FaultKind) -> Option<ResourceError> {
        let (id, revision) = (self.id(), self.revision());
        Some(match fault {
            FaultKind::NotFound => ResourceError::NotFound { id, revision },
            FaultKind::Corrupt => ResourceError::Corrupt { id, revision },
        })
    }
}

impl LoadKey for StaticAsset {
    fn locate(&self, _index: &dyn ResourceIndex) -> ResourceResult<ResourceLocation> {
        Ok(ResourceLocation {
            path: self.path().to_owned(),
            kind: self.kind().clone(),
            params: self.params().clone(),
        })
    }

    fn classify(&self, _fault: FaultKind) -> Option<ResourceError> {
        None
    }
}

/// What a call to [`ResourceLoader::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A new backend request was issued.
    Requested,
    /// The key was already loading or loaded and the scene became an owner.
    Joined,
    /// The scene already owned the key. Nothing changed.
    AlreadyOwned,
}

/// A resource that finished loading.
#[derive(Debug)]
pub struct LoadedEntry<K> {
    key: K,
    filepath: String,
    kind: ResourceKind,
    params: LoadParams,
    owners: Vec<SceneId>,
    handle: ResourceHandle,
}

impl<K> LoadedEntry<K> {
    /// The key the entry is cached under.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The backend path the content came from.
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    /// The resource type.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// The scenes owning the entry.
    pub fn owners(&self) -> &[SceneId] {
        &self.owners
    }

    /// The shared handle.
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }
}

#[derive(Debug)]
struct PendingLoad {
    filepath: String,
    kind: ResourceKind,
    params: LoadParams,
    owners: Vec<SceneId>,
    unload_on_arrival: bool,
}

/// Content to push into existing handles once `filepath` is loaded again.
#[derive(Debug)]
struct ReloadRequest<K> {
    key: K,
    filepath: String,
    holders: Vec<ResourceHandle>,
}

/// Tracks loading and loaded resources by key.
///
/// A key is in at most one of the loading and loaded maps. Every entry has at
/// least one owning scene, unless it is a loading entry marked to be released
/// on arrival.
pub struct ResourceLoader<K: LoadKey> {
    index: Arc<dyn ResourceIndex>,
    loaded: HashMap<K, LoadedEntry<K>>,
    loading: HashMap<K, PendingLoad>,
    unload_queue: Vec<String>,
    reload_queue: Vec<ReloadRequest<K>>,
}

impl<K: LoadKey> ResourceLoader<K> {
    /// Creates an empty loader resolving keys through `index`.
    pub fn new(index: Arc<dyn ResourceIndex>) -> Self {
        Self {
            index,
            loaded: HashMap::new(),
            loading: HashMap::new(),
            unload_queue: Vec::new(),
            reload_queue: Vec::new(),
        }
    }

    /// Requests `key` on behalf of `scene`.
    ///
    /// A key that is already loading or loaded only gains `scene` as an owner.
    /// A loading key that was marked to be released on arrival is kept instead.
    ///
    /// # Errors
    /// Fails when the key cannot be located or the backend rejects the request.
    pub fn load(
        &mut self,
        backend: &mut dyn AssetBackend,
        scene: SceneId,
        key: K,
    ) -> ResourceResult<LoadOutcome> {
        if let Some(entry) = self.loaded.get_mut(&key) {
            return Ok(add_owner(&mut entry.owners, scene));
        }
        if let Some(pending) = self.loading.get_mut(&key) {
            if pending.unload_on_arrival {
                log::debug!("Keeping {key}, it was requested again before arriving");
                pending.unload_on_arrival = false;
            }
            return Ok(add_owner(&mut pending.owners, scene));
        }

        let location = key.locate(&*self.index)?;
        backend.load(&location.path, &location.kind, &location.params)?;
        // The previous owner's release has not reached the backend yet.
        self.unload_queue.retain(|path| path != &location.path);

        log::debug!("Requested {key} from '{}'", location.path);
        self.loading.insert(
            key,
            PendingLoad {
                filepath: location.path,
                kind: location.kind,
                params: location.params,
                owners: vec![scene],
                unload_on_arrival: false,
            },
        );
        Ok(LoadOutcome::Requested)
    }

    /// Advances the backend and settles finished work.
    ///
    /// ## Returns
    /// `Ok(true)` when the loader and the backend are idle.
    ///
    /// # Errors
    /// Returns the backend failure of this tick, typed when the failing key
    /// can classify it. The failing key is no longer loading afterwards.
    pub fn update(&mut self, backend: &mut dyn AssetBackend) -> ResourceResult<bool> {
        if let Err(err) = backend.update() {
            return Err(self.claim_failure(err).unwrap_or_else(|err| {
                log::error!("Backend failed on '{}' which nothing waits for", err.path);
                ResourceError::Backend(err)
            }));
        }
        self.settle(backend);
        Ok(self.is_idle(backend))
    }

    /// Settles work the backend has finished, without advancing it.
    ///
    /// Queued unloads are sent first, then finished reloads are pushed into
    /// their handles, then arrived loads become loaded entries.
    pub fn settle(&mut self, backend: &mut dyn AssetBackend) {
        for path in self.unload_queue.drain(..) {
            log::debug!("Unloading '{path}'");
            backend.unload(&path);
        }
        self.complete_reloads(backend);
        self.complete_loads(backend);
    }

    /// Takes over a backend failure when one of this loader's keys waits for
    /// the failed path.
    ///
    /// The key stops loading or reloading and the failure is turned into the
    /// error reported for it.
    ///
    /// # Errors
    /// Gives the failure back when no key of this loader waits for the path.
    pub fn claim_failure(&mut self, err: BackendError) -> Result<ResourceError, BackendError> {
        let failed = self
            .loading
            .iter()
            .find(|(_, pending)| pending.filepath == err.path)
            .map(|(key, _)| key.clone());
        let failed = match failed {
            Some(key) => {
                self.loading.remove(&key);
                Some(key)
            }
            None => self
                .reload_queue
                .iter()
                .find(|request| request.filepath == err.path)
                .map(|request| request.key.clone()),
        };
        let Some(key) = failed else {
            return Err(err);
        };
        self.reload_queue.retain(|request| request.filepath != err.path);

        Ok(match err.fault().and_then(|fault| key.classify(fault)) {
            Some(typed) => {
                log::warn!("Failed to load {key}: {typed}");
                typed
            }
            None => {
                log::error!("Failed to load {key}: {:#}", err.source);
                ResourceError::Backend(err)
            }
        })
    }

    fn complete_reloads(&mut self, backend: &mut dyn AssetBackend) {
        self.reload_queue.retain(|request| {
            let Some(content) = backend.get(&request.filepath) else {
                return true;
            };
            for holder in &request.holders {
                holder.set(content.clone());
            }
            log::info!("Reloaded {} from '{}'", request.key, request.filepath);
            false
        });
    }

    fn complete_loads(&mut self, backend: &mut dyn AssetBackend) {
        let arrived: Vec<K> = self
            .loading
            .iter()
            .filter(|(_, pending)| backend.is_loaded(&pending.filepath))
            .map(|(key, _)| key.clone())
            .collect();

        for key in arrived {
            let Some(pending) = self.loading.remove(&key) else {
                continue;
            };
            if pending.unload_on_arrival {
                log::debug!("Releasing {key} on arrival");
                backend.unload(&pending.filepath);
                continue;
            }
            let Some(content) = backend.get(&pending.filepath) else {
                log::error!("Backend reports '{}' as loaded but has no content", pending.filepath);
                continue;
            };
            log::debug!("Loaded {key}");
            self.loaded.insert(
                key.clone(),
                LoadedEntry {
                    key,
                    filepath: pending.filepath,
                    kind: pending.kind,
                    params: pending.params,
                    owners: pending.owners,
                    handle: ResourceHandle::new(content),
                },
            );
        }
    }

    /// Whether nothing is loading, reloading or waiting to be unloaded, here
    /// or in the backend.
    pub fn is_idle(&self, backend: &dyn AssetBackend) -> bool {
        !self.is_busy() && self.unload_queue.is_empty() && backend.queued_count() == 0
    }

    /// Whether any key is loading or reloading.
    pub fn is_busy(&self) -> bool {
        !self.loading.is_empty() || !self.reload_queue.is_empty()
    }

    /// The handle of a loaded key.
    pub fn get(&self, key: &K) -> Option<ResourceHandle> {
        self.loaded.get(key).map(|entry| entry.handle.clone())
    }

    /// The loaded entry of a key.
    pub fn entry(&self, key: &K) -> Option<&LoadedEntry<K>> {
        self.loaded.get(key)
    }

    /// Every loaded entry, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &LoadedEntry<K>> {
        self.loaded.values()
    }

    /// The loaded entry sharing the cell of `handle`.
    pub fn find_by_handle(&self, handle: &ResourceHandle) -> Option<&LoadedEntry<K>> {
        self.loaded.values().find(|entry| entry.handle.ptr_eq(handle))
    }

    /// Handles of every loaded entry of `kind`.
    pub fn handles_of(&self, kind: &ResourceKind) -> Vec<ResourceHandle> {
        self.loaded
            .values()
            .filter(|entry| &entry.kind == kind)
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Whether `key` is loaded.
    pub fn is_loaded(&self, key: &K) -> bool {
        self.loaded.contains_key(key)
    }

    /// Whether `key` is loading.
    pub fn is_loading(&self, key: &K) -> bool {
        self.loading.contains_key(key)
    }

    /// Removes every owner of a loaded key, leaving it loaded until someone
    /// requests it again or unloads it.
    ///
    /// ## Returns
    /// `false` when the key is not loaded.
    pub fn disown(&mut self, key: &K) -> bool {
        match self.loaded.get_mut(key) {
            Some(entry) => {
                entry.owners.clear();
                true
            }
            None => false,
        }
    }

    /// Whether `key` is loaded or loading and owned by at least one scene.
    pub fn is_owned(&self, key: &K) -> bool {
        match (self.loaded.get(key), self.loading.get(key)) {
            (Some(entry), _) => !entry.owners.is_empty(),
            (None, Some(pending)) => !pending.unload_on_arrival && !pending.owners.is_empty(),
            (None, None) => false,
        }
    }

    /// The number of loaded entries.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Releases `key` regardless of its owners.
    ///
    /// A loaded key leaves the loaded map now and its path is unloaded on the
    /// next update. A loading key is marked and released once it arrives.
    ///
    /// # Errors
    /// [`ResourceError::IllegalState`] when the key is neither loaded nor loading.
    pub fn unload(&mut self, key: &K) -> ResourceResult<()> {
        if let Some(pending) = self.loading.get_mut(key) {
            log::debug!("Marking {key} to be released on arrival");
            pending.unload_on_arrival = true;
            return Ok(());
        }
        let Some(entry) = self.loaded.remove(key) else {
            let message = format!("cannot unload {key}, it is neither loaded nor loading");
            log::warn!("{message}");
            return Err(ResourceError::IllegalState(message));
        };
        self.reload_queue.retain(|request| &request.key != key);
        self.unload_queue.push(entry.filepath);
        Ok(())
    }

    /// Loads the content of a loaded key again and swaps it into the existing
    /// handle once it arrives.
    ///
    /// # Errors
    /// [`ResourceError::IllegalState`] when the key is not loaded, or the
    /// backend failure if the new request is rejected.
    pub fn reload(&mut self, backend: &mut dyn AssetBackend, key: &K) -> ResourceResult<()> {
        let Some(entry) = self.loaded.get(key) else {
            let message = format!("cannot reload {key}, it is not loaded");
            log::warn!("{message}");
            return Err(ResourceError::IllegalState(message));
        };
        if self.reload_queue.iter().any(|request| &request.key == key) {
            return Ok(());
        }

        backend.unload(&entry.filepath);
        backend.load(&entry.filepath, &entry.kind, &entry.params)?;
        log::debug!("Reloading {key} from '{}'", entry.filepath);
        self.reload_queue.push(ReloadRequest {
            key: key.clone(),
            filepath: entry.filepath.clone(),
            holders: vec![entry.handle.clone()],
        });
        Ok(())
    }

    /// Removes `scene` from every owner set.
    ///
    /// Loading keys left without owners are released on arrival.
    ///
    /// ## Returns
    /// The loaded keys left without owners. They stay loaded until the caller
    /// unloads them.
    pub fn release_scene(&mut self, scene: SceneId) -> Vec<K> {
        for (key, pending) in self.loading.iter_mut() {
            if remove_owner(&mut pending.owners, scene) && pending.owners.is_empty() {
                log::debug!("{key} lost its last owner while loading");
                pending.unload_on_arrival = true;
            }
        }
        let mut orphaned = Vec::new();
        for (key, entry) in self.loaded.iter_mut() {
            if remove_owner(&mut entry.owners, scene) && entry.owners.is_empty() {
                orphaned.push(key.clone());
            }
        }
        orphaned
    }

    /// Releases every path this loader ever requested and forgets all state.
    pub fn dispose(&mut self, backend: &mut dyn AssetBackend) {
        for (_, pending) in self.loading.drain() {
            backend.unload(&pending.filepath);
        }
        for (_, entry) in self.loaded.drain() {
            backend.unload(&entry.filepath);
        }
        for request in self.reload_queue.drain(..) {
            backend.unload(&request.filepath);
        }
        for path in self.unload_queue.drain(..) {
            backend.unload(&path);
        }
    }
}

fn add_owner(owners: &mut Vec<SceneId>, scene: SceneId) -> LoadOutcome {
    if owners.contains(&scene) {
        LoadOutcome::AlreadyOwned
    } else {
        owners.push(scene);
        LoadOutcome::Joined
    }
}

fn remove_owner(owners: &mut Vec<SceneId>, scene: SceneId) -> bool {
    let before = owners.len();
    owners.retain(|owner| *owner != scene);
    before != owners.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryFault};
    use reliquary_core::{
        index::{ResourceDatabase, ResourceRecord},
        resource::{Resource, ResourceId},
    };
    use std::any::Any;

    const TEXTURE: ResourceKind = ResourceKind::from_static("texture");

    #[derive(Debug)]
    struct Pixel;

    impl Resource for Pixel {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn setup(names: &[&str]) -> (MemoryBackend, ResourceLoader<ResourceIdentifier>, Vec<ResourceIdentifier>) {
        let backend = MemoryBackend::new();
        let index = Arc::new(ResourceDatabase::new());
        let keys = names
            .iter()
            .map(|name| {
                let id = ResourceId::new_v5(name);
                index.insert(ResourceRecord::new(id, TEXTURE, *name));
                backend.insert(*name, Pixel);
                ResourceIdentifier::latest(id)
            })
            .collect();
        (backend, ResourceLoader::new(index), keys)
    }

    #[test]
    fn unloading_a_loading_key_releases_it_on_arrival() {
        let (mut backend, mut loader, keys) = setup(&["a"]);
        let scene = SceneId::new();

        assert_eq!(loader.load(&mut backend, scene, keys[0]).unwrap(), LoadOutcome::Requested);
        loader.unload(&keys[0]).unwrap();
        assert!(loader.update(&mut backend).unwrap());

        assert!(!loader.is_loaded(&keys[0]));
        assert!(!backend.is_loaded("a"));
    }

    #[test]
    fn requesting_again_keeps_a_key_marked_for_release() {
        let (mut backend, mut loader, keys) = setup(&["a"]);
        let (first, second) = (SceneId::new(), SceneId::new());

        loader.load(&mut backend, first, keys[0]).unwrap();
        loader.unload(&keys[0]).unwrap();
        assert_eq!(loader.load(&mut backend, second, keys[0]).unwrap(), LoadOutcome::Joined);
        loader.update(&mut backend).unwrap();

        let entry = loader.entry(&keys[0]).expect("still wanted");
        assert_eq!(entry.owners(), &[first, second]);
    }

    #[test]
    fn loading_cancels_a_queued_unload_of_the_same_file() {
        let (mut backend, mut loader, keys) = setup(&["a"]);
        let scene = SceneId::new();
        loader.load(&mut backend, scene, keys[0]).unwrap();
        loader.update(&mut backend).unwrap();
        let before = loader.get(&keys[0]).unwrap();

        loader.unload(&keys[0]).unwrap();
        loader.load(&mut backend, scene, keys[0]).unwrap();
        assert!(loader.update(&mut backend).unwrap());

        assert!(backend.is_loaded("a"));
        let after = loader.get(&keys[0]).unwrap();
        assert!(!after.ptr_eq(&before));
        assert_eq!(backend.load_calls("a"), 2);
    }

    #[test]
    fn failed_loads_leave_nothing_pending() {
        let (mut backend, mut loader, keys) = setup(&["a", "b"]);
        backend.fail("a", MemoryFault::Corrupt);
        backend.fail("b", MemoryFault::Failed("disk on fire".into()));
        let scene = SceneId::new();
        loader.load(&mut backend, scene, keys[0]).unwrap();
        loader.load(&mut backend, scene, keys[1]).unwrap();

        let first = loader.update(&mut backend).unwrap_err();
        assert_eq!(first.identifier(), Some(keys[0]));
        let second = loader.update(&mut backend).unwrap_err();
        assert!(matches!(second, ResourceError::Backend(ref err) if err.path == "b"));

        assert!(!loader.is_busy());
        assert!(loader.update(&mut backend).unwrap());
    }

    #[test]
    fn releasing_a_scene_reports_orphans_only() {
        let (mut backend, mut loader, keys) = setup(&["a", "b"]);
        let (first, second) = (SceneId::new(), SceneId::new());
        loader.load(&mut backend, first, keys[0]).unwrap();
        loader.load(&mut backend, first, keys[1]).unwrap();
        loader.load(&mut backend, second, keys[1]).unwrap();
        loader.update(&mut backend).unwrap();

        assert_eq!(loader.release_scene(first), vec![keys[0]]);
        assert!(loader.is_owned(&keys[1]));
        assert!(!loader.is_owned(&keys[0]));
    }

    #[test]
    fn disowned_keys_stay_loaded_until_requested_again() {
        let (mut backend, mut loader, keys) = setup(&["a"]);
        let (first, second) = (SceneId::new(), SceneId::new());
        loader.load(&mut backend, first, keys[0]).unwrap();
        loader.update(&mut backend).unwrap();

        assert!(loader.disown(&keys[0]));
        assert!(loader.is_loaded(&keys[0]));
        assert!(!loader.is_owned(&keys[0]));

        assert_eq!(loader.load(&mut backend, second, keys[0]).unwrap(), LoadOutcome::Joined);
        assert_eq!(loader.entry(&keys[0]).unwrap().owners(), &[second]);
        assert!(!loader.disown(&ResourceIdentifier::latest(ResourceId::new_v5("unknown"))));
    }

    #[test]
    fn static_assets_need_no_index_entry() {
        let backend_files = MemoryBackend::new();
        backend_files.insert("ui/font.png", Pixel);
        let mut backend = backend_files.clone();
        let mut loader = ResourceLoader::new(Arc::new(ResourceDatabase::new()));
        let font = StaticAsset::new("ui/font.png", TEXTURE);

        loader.load(&mut backend, SceneId::new(), font.clone()).unwrap();
        assert!(loader.update(&mut backend).unwrap());
        assert!(loader.is_loaded(&font));

        backend_files.fail("ui/font.png", MemoryFault::NotFound);
        loader.reload(&mut backend, &font).unwrap();
        let err = loader.update(&mut backend).unwrap_err();
        assert!(matches!(err, ResourceError::Backend(_)));
        assert!(loader.is_loaded(&font));
    }
}
