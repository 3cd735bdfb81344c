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

//! Byte sources the threaded backend reads files from.

use anyhow::{Context, Result};
use reliquary_core::backend::AssetFault;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Provides the raw bytes of files by path.
///
/// Sources are shared by every worker thread. A missing file must be reported
/// as [`AssetFault::NotFound`] or as an [`io::Error`] of kind
/// [`io::ErrorKind::NotFound`].
pub trait ByteSource: Send + Sync + 'static {
    /// Reads the whole file at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;
}

/// Reads files relative to a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ByteSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.root.join(path);
        match std::fs::read(&full_path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AssetFault::NotFound {
                path: path.to_owned(),
            }
            .into()),
            Err(err) => Err(err).with_context(|| format!("Failed to read {full_path:?}")),
        }
    }
}

/// The location of one file inside a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    /// Byte offset of the file in the pack.
    pub offset: u64,
    /// Size of the file in bytes.
    pub size: u64,
}

/// Reads files stored back to back in a single pack file.
pub struct PackSource {
    pack_file: Mutex<File>,
    entries: HashMap<String, PackEntry>,
}

impl PackSource {
    /// Creates a source over an open pack file and its table of contents.
    pub fn new(pack_file: File, entries: HashMap<String, PackEntry>) -> Self {
        Self {
            pack_file: Mutex::new(pack_file),
            entries,
        }
    }

    /// Opens a pack file together with the RON table of contents written
    /// next to it by [`write_table_of_contents`].
    pub fn open(pack_path: impl AsRef<Path>, toc_path: impl AsRef<Path>) -> Result<Self> {
        let pack_path = pack_path.as_ref();
        let toc_path = toc_path.as_ref();
        let pack_file = File::open(pack_path)
            .with_context(|| format!("Failed to open pack file {pack_path:?}"))?;
        let toc = std::fs::read_to_string(toc_path)
            .with_context(|| format!("Failed to read table of contents {toc_path:?}"))?;
        let entries = ron::from_str(&toc)
            .with_context(|| format!("Failed to parse table of contents {toc_path:?}"))?;
        Ok(Self::new(pack_file, entries))
    }

    /// Number of files in the pack.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pack holds no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes a pack table of contents as RON.
pub fn write_table_of_contents(
    path: impl AsRef<Path>,
    entries: &HashMap<String, PackEntry>,
) -> Result<()> {
    let path = path.as_ref();
    let sorted: std::collections::BTreeMap<_, _> = entries.iter().collect();
    let text = ron::ser::to_string_pretty(&sorted, ron::ser::PrettyConfig::default())
        .context("Failed to serialize table of contents")?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write table of contents {path:?}"))
}

impl ByteSource for PackSource {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let entry = self.entries.get(path).ok_or_else(|| AssetFault::NotFound {
            path: path.to_owned(),
        })?;
        let size = usize::try_from(entry.size).context("Pack entry does not fit in memory")?;
        let mut buffer = vec![0; size];

        let mut pack_file = self.pack_file.lock().unwrap_or_else(PoisonError::into_inner);
        pack_file
            .seek(SeekFrom::Start(entry.offset))
            .context("Failed to seek to resource location in pack file")?;
        match pack_file.read_exact(&mut buffer) {
            Ok(()) => Ok(buffer),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(AssetFault::Corrupt {
                path: path.to_owned(),
                reason: "pack file ends before the entry does".to_owned(),
            }
            .into()),
            Err(err) => Err(err).context("Failed to read resource bytes from pack file"),
        }
    }
}
