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

use crossbeam_channel::{Receiver, Sender};
use reliquary_core::{
    resource::{ResourceHandle, ResourceId, StaticAsset},
    scene::SceneId,
};

/// A cache operation posted from another thread.
///
/// Each variant mirrors the [`ResourceCache`](super::ResourceCache) method of
/// the same name and is applied at the start of the next `update`.
#[derive(Debug, Clone)]
pub enum CacheCommand {
    /// See [`ResourceCache::load`](super::ResourceCache::load).
    Load {
        /// Owning scene.
        scene: SceneId,
        /// Resource to load.
        id: ResourceId,
        /// Requested revision.
        revision: i32,
        /// Whether to load what the resource references too.
        load_dependencies: bool,
    },
    /// See [`ResourceCache::load_instance`](super::ResourceCache::load_instance).
    LoadInstance {
        /// Owning scene.
        scene: SceneId,
        /// The instance resource.
        resource_id: ResourceId,
        /// The definition the instance is built from.
        definition_id: ResourceId,
        /// Requested revision of the instance.
        revision: i32,
    },
    /// See [`ResourceCache::load_static`](super::ResourceCache::load_static).
    LoadStatic {
        /// Owning scene.
        scene: SceneId,
        /// The bundled asset.
        asset: StaticAsset,
    },
    /// See [`ResourceCache::unload`](super::ResourceCache::unload).
    Unload {
        /// Resource to release.
        id: ResourceId,
        /// Revision to release.
        revision: i32,
    },
    /// See [`ResourceCache::unload_static`](super::ResourceCache::unload_static).
    UnloadStatic(StaticAsset),
    /// See [`ResourceCache::unload_scene`](super::ResourceCache::unload_scene).
    UnloadScene(SceneId),
    /// See [`ResourceCache::reload`](super::ResourceCache::reload).
    Reload(ResourceId),
    /// See [`ResourceCache::set_latest_resource`](super::ResourceCache::set_latest_resource).
    SetLatestResource {
        /// A handle loaded at `old_revision`.
        handle: ResourceHandle,
        /// The revision the handle was loaded at.
        old_revision: i32,
    },
}

/// Posts [`CacheCommand`]s to a cache from any thread.
#[derive(Debug, Clone)]
pub struct CommandSender(Sender<CacheCommand>);

impl CommandSender {
    /// Posts `command`.
    ///
    /// ## Returns
    /// `false` when the cache has been dropped.
    pub fn send(&self, command: CacheCommand) -> bool {
        match self.0.send(command) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Dropping {:?}, the resource cache is gone", err.into_inner());
                false
            }
        }
    }

    /// Posts a reload of the latest revision of `id`.
    pub fn reload(&self, id: ResourceId) -> bool {
        self.send(CacheCommand::Reload(id))
    }

    /// Posts the move of `handle` to the latest revision.
    pub fn set_latest_resource(&self, handle: ResourceHandle, old_revision: i32) -> bool {
        self.send(CacheCommand::SetLatestResource {
            handle,
            old_revision,
        })
    }
}

#[derive(Debug)]
pub(crate) struct CommandQueue {
    sender: Sender<CacheCommand>,
    receiver: Receiver<CacheCommand>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn sender(&self) -> CommandSender {
        CommandSender(self.sender.clone())
    }

    pub(crate) fn next(&self) -> Option<CacheCommand> {
        self.receiver.try_recv().ok()
    }
}
