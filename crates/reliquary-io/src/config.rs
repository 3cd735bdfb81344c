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

//! Configuration of the cache and of the bundled backends.
//!
//! Both structs can be built in code or read from a RON document. Missing
//! fields keep their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of a [`ResourceCache`](crate::ResourceCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long `finish_loading` waits on the backend between ticks.
    pub wait_timeout_ms: u64,
    /// Whether `dispose` asserts, in debug builds, that nothing stayed loaded.
    pub assert_empty_on_dispose: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 10,
            assert_empty_on_dispose: true,
        }
    }
}

impl CacheConfig {
    /// Parses a configuration from RON.
    ///
    /// # Errors
    /// Fails when the document is not valid RON for this struct.
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse cache configuration")
    }

    /// [`CacheConfig::wait_timeout_ms`] as a [`Duration`].
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Settings of the [`ThreadedBackend`](crate::backend::ThreadedBackend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Number of worker threads reading and decoding files.
    pub workers: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|count| count.get().clamp(1, 4))
            .unwrap_or(1);
        Self { workers }
    }
}

impl BackendConfig {
    /// Parses a configuration from RON.
    ///
    /// # Errors
    /// Fails when the document is not valid RON for this struct.
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse backend configuration")
    }
}
