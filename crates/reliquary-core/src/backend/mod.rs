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

//! The contract of the asynchronous asset backend.
//!
//! A backend loads files by path, reports completion one tick at a time, and
//! knows nothing about identifiers, revisions or scenes. The loaders above it
//! map those concepts onto paths.

use crate::resource::{LoadParams, Resource, ResourceKind};
use std::{io, sync::Arc, time::Duration};
use thiserror::Error;

/// A backend that loads files asynchronously.
///
/// The contract:
/// - [`AssetBackend::load`] of a path that is already queued or loaded is a no-op.
/// - [`AssetBackend::update`] advances the queue and reports at most one
///   failure per call. A path that failed is forgotten by the backend.
/// - [`AssetBackend::unload`] of an unknown path is a no-op. Unloading a path
///   that is still queued cancels it.
pub trait AssetBackend: Send {
    /// Queues `path` for loading.
    ///
    /// # Errors
    /// Returns a [`BackendError`] when the request itself is rejected, for
    /// example because no decoder exists for `kind`.
    fn load(&mut self, path: &str, kind: &ResourceKind, params: &LoadParams)
        -> Result<(), BackendError>;

    /// Releases `path`.
    fn unload(&mut self, path: &str);

    /// Returns the content of a loaded path.
    fn get(&self, path: &str) -> Option<Arc<dyn Resource>>;

    /// Whether `path` has finished loading.
    fn is_loaded(&self, path: &str) -> bool;

    /// Advances loading by one step.
    ///
    /// ## Returns
    /// `Ok(true)` when nothing is queued anymore.
    fn update(&mut self) -> Result<bool, BackendError>;

    /// The number of paths still being loaded.
    fn queued_count(&self) -> usize;

    /// The number of loaded paths.
    fn loaded_count(&self) -> usize;

    /// Loading progress in percent, `100.0` when nothing is queued.
    fn progress(&self) -> f32 {
        let loaded = self.loaded_count();
        let total = loaded + self.queued_count();
        if total == 0 {
            100.0
        } else {
            loaded as f32 * 100.0 / total as f32
        }
    }

    /// Blocks for at most `timeout` or until some queued work completes.
    fn wait_for_completion(&mut self, timeout: Duration) {
        std::thread::sleep(timeout.min(Duration::from_millis(1)));
    }
}

/// A recognised reason for a file to fail loading.
///
/// Backends and decoders raise these so the loaders can tell a missing or
/// corrupt resource, which can be downloaded again, from other failures.
#[derive(Debug, Error)]
pub enum AssetFault {
    /// The file does not exist.
    #[error("resource file '{path}' does not exist")]
    NotFound {
        /// The missing file.
        path: String,
    },
    /// The file exists but could not be decoded.
    #[error("resource file '{path}' is corrupt: {reason}")]
    Corrupt {
        /// The corrupt file.
        path: String,
        /// What the decoder reported.
        reason: String,
    },
}

impl AssetFault {
    /// The kind of this fault.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::NotFound { .. } => FaultKind::NotFound,
            Self::Corrupt { .. } => FaultKind::Corrupt,
        }
    }
}

/// The classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// The file does not exist.
    NotFound,
    /// The file could not be decoded.
    Corrupt,
}

/// A failure reported by an [`AssetBackend`] for one path.
#[derive(Debug, Error)]
#[error("asset backend failed on '{path}'")]
pub struct BackendError {
    /// The path that failed.
    pub path: String,
    /// The underlying cause, possibly wrapped several times.
    #[source]
    pub source: anyhow::Error,
}

impl BackendError {
    /// Creates an error for `path`.
    pub fn new(path: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Unwraps the cause chain down to its root and classifies the failure.
    ///
    /// The innermost [`AssetFault`] wins. A root [`io::Error`] of kind
    /// [`io::ErrorKind::NotFound`] counts as a missing file.
    pub fn fault(&self) -> Option<FaultKind> {
        let innermost = self
            .source
            .chain()
            .filter_map(|cause| cause.downcast_ref::<AssetFault>())
            .last();
        if let Some(fault) = innermost {
            return Some(fault.kind());
        }
        match self.source.root_cause().downcast_ref::<io::Error>() {
            Some(err) if err.kind() == io::ErrorKind::NotFound => Some(FaultKind::NotFound),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn nested_faults_are_found_at_the_root() {
        let wrapped: anyhow::Result<()> = Err(AssetFault::Corrupt {
            path: "a.bin".into(),
            reason: "truncated".into(),
        }
        .into());
        let wrapped = wrapped
            .context("decoding level")
            .context("worker 2 failed")
            .unwrap_err();

        assert_eq!(BackendError::new("a.bin", wrapped).fault(), Some(FaultKind::Corrupt));
    }

    #[test]
    fn io_not_found_counts_as_missing() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let wrapped = anyhow::Error::new(err).context("reading file");
        assert_eq!(BackendError::new("a.bin", wrapped).fault(), Some(FaultKind::NotFound));
    }

    #[test]
    fn other_failures_are_unclassified() {
        let err = BackendError::new("a.bin", anyhow::anyhow!("out of memory"));
        assert_eq!(err.fault(), None);
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(BackendError::new("a.bin", denied).fault(), None);
    }
}
