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

use anyhow::anyhow;
use reliquary_core::{
    backend::{AssetBackend, AssetFault, BackendError},
    resource::{LoadParams, Resource, ResourceKind},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// A failure the [`MemoryBackend`] reports for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryFault {
    /// The load completes with [`AssetFault::NotFound`].
    NotFound,
    /// The load completes with [`AssetFault::Corrupt`].
    Corrupt,
    /// The load completes with an unclassified error.
    Failed(String),
    /// The load request itself is rejected.
    Rejected(String),
}

#[derive(Debug, Clone)]
enum Slot {
    Queued { remaining: u32 },
    Loaded(Arc<dyn Resource>),
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, Arc<dyn Resource>>,
    faults: HashMap<String, MemoryFault>,
    slots: HashMap<String, Slot>,
    load_calls: HashMap<String, usize>,
    latency: u32,
}

/// An asset backend serving resources registered in memory.
///
/// A load completes after [`MemoryBackend::set_latency`] extra ticks; with no
/// latency it completes on the next update. Paths that were never registered
/// complete with [`AssetFault::NotFound`].
///
/// Clones share their state, so a caller can keep a clone to register files,
/// swap content or inspect load counts after handing the backend to a cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates an empty backend with no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend whose loads take `ticks` extra updates.
    pub fn with_latency(ticks: u32) -> Self {
        let backend = Self::new();
        backend.set_latency(ticks);
        backend
    }

    /// Changes the latency of loads requested from now on.
    pub fn set_latency(&self, ticks: u32) {
        self.state().latency = ticks;
    }

    /// Registers, or replaces, the content served for `path`.
    pub fn insert(&self, path: impl Into<String>, content: impl Resource) {
        self.insert_shared(path, Arc::new(content));
    }

    /// Registers, or replaces, already shared content for `path`.
    pub fn insert_shared(&self, path: impl Into<String>, content: Arc<dyn Resource>) {
        self.state().files.insert(path.into(), content);
    }

    /// Forgets the content of `path`. Later loads complete as not found.
    pub fn remove(&self, path: &str) {
        self.state().files.remove(path);
    }

    /// Makes loads of `path` fail.
    pub fn fail(&self, path: impl Into<String>, fault: MemoryFault) {
        self.state().faults.insert(path.into(), fault);
    }

    /// Makes loads of `path` succeed again.
    pub fn heal(&self, path: &str) {
        self.state().faults.remove(path);
    }

    /// How many load requests reached the backend for `path`.
    pub fn load_calls(&self, path: &str) -> usize {
        self.state().load_calls.get(path).copied().unwrap_or(0)
    }

    /// Whether `path` is still queued.
    pub fn is_queued(&self, path: &str) -> bool {
        matches!(self.state().slots.get(path), Some(Slot::Queued { .. }))
    }

    /// The loaded paths, sorted.
    pub fn loaded_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Loaded(_)))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn complete(&mut self, path: &str) -> Result<(), BackendError> {
        let content = match (self.faults.get(path), self.files.get(path)) {
            (Some(MemoryFault::NotFound), _) | (None, None) => {
                Err(anyhow::Error::new(AssetFault::NotFound {
                    path: path.to_owned(),
                }))
            }
            (Some(MemoryFault::Corrupt), _) => Err(anyhow::Error::new(AssetFault::Corrupt {
                path: path.to_owned(),
                reason: "content rejected by the decoder".to_owned(),
            })),
            (Some(MemoryFault::Failed(message) | MemoryFault::Rejected(message)), None)
            | (Some(MemoryFault::Failed(message)), Some(_)) => Err(anyhow!("{message}")),
            (Some(MemoryFault::Rejected(_)) | None, Some(content)) => Ok(content.clone()),
        };
        match content {
            Ok(content) => {
                self.slots.insert(path.to_owned(), Slot::Loaded(content));
                Ok(())
            }
            Err(source) => {
                self.slots.remove(path);
                Err(BackendError::new(path, source))
            }
        }
    }
}

impl AssetBackend for MemoryBackend {
    fn load(
        &mut self,
        path: &str,
        _kind: &ResourceKind,
        _params: &LoadParams,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        *state.load_calls.entry(path.to_owned()).or_insert(0) += 1;
        if let Some(MemoryFault::Rejected(message)) = state.faults.get(path) {
            return Err(BackendError::new(path, anyhow!("{message}")));
        }
        if !state.slots.contains_key(path) {
            let remaining = state.latency;
            state.slots.insert(path.to_owned(), Slot::Queued { remaining });
        }
        Ok(())
    }

    fn unload(&mut self, path: &str) {
        self.state().slots.remove(path);
    }

    fn get(&self, path: &str) -> Option<Arc<dyn Resource>> {
        match self.state().slots.get(path) {
            Some(Slot::Loaded(content)) => Some(content.clone()),
            _ => None,
        }
    }

    fn is_loaded(&self, path: &str) -> bool {
        matches!(self.state().slots.get(path), Some(Slot::Loaded(_)))
    }

    fn update(&mut self) -> Result<bool, BackendError> {
        let mut state = self.state();
        let mut ready = Vec::new();
        for (path, slot) in state.slots.iter_mut() {
            if let Slot::Queued { remaining } = slot {
                if *remaining == 0 {
                    ready.push(path.clone());
                } else {
                    *remaining -= 1;
                }
            }
        }
        ready.sort();
        // At most one failure per tick; the rest stays ready for the next one.
        for path in ready {
            state.complete(&path)?;
        }
        Ok(!state.slots.values().any(|slot| matches!(slot, Slot::Queued { .. })))
    }

    fn queued_count(&self) -> usize {
        self.state()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Queued { .. }))
            .count()
    }

    fn loaded_count(&self) -> usize {
        self.state()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Loaded(_)))
            .count()
    }
}
