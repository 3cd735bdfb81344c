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

//! Scene identity.
//!
//! Every load is attributed to a scene. Releasing a scene releases every
//! resource that no other scene still owns.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SCENE: AtomicU64 = AtomicU64::new(1);

/// An opaque token identifying the scene a load belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(u64);

impl SceneId {
    /// Allocates a fresh scene id, unique for the lifetime of the process.
    pub fn new() -> Self {
        Self(NEXT_SCENE.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuilds a scene id from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value of the id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SceneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}
