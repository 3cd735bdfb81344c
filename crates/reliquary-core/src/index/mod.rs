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

//! Resource index module for fast, in-memory resource metadata access.
//!
//! The [`ResourceIndex`] trait is what the loaders consult to turn a resource
//! identifier and revision into a file path and type. [`ResourceDatabase`] is
//! the default implementation: a thread-safe map of [`ResourceRecord`]s that
//! can be persisted as a bincode-encoded index file.

use crate::resource::{LoadParams, ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error;

/// Where and how a specific revision of a resource is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocation {
    /// The file path handed to the asset backend.
    pub path: String,
    /// The type of the stored resource.
    pub kind: ResourceKind,
    /// Backend-specific load parameters.
    pub params: LoadParams,
}

/// Read access to the catalogue of known resources.
///
/// Implementations must be shareable between the cache and whatever keeps the
/// catalogue up to date, so every method takes `&self`.
pub trait ResourceIndex: Send + Sync {
    /// Resolves a revision of a resource to its storage location.
    ///
    /// [`LATEST_REVISION`](crate::resource::LATEST_REVISION) and any
    /// non-positive revision resolve to the latest
    /// file. Returns `None` when the resource or the revision is unknown.
    fn resolve(&self, id: ResourceId, revision: i32) -> Option<ResourceLocation>;

    /// The latest published revision of a resource, if it is revisioned.
    fn latest_revision(&self, id: ResourceId) -> Option<i32>;

    /// Every known resource of the given kind.
    fn resources_of(&self, kind: &ResourceKind) -> Vec<ResourceId>;
}

/// An error raised while reading or writing a persisted index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index bytes could not be decoded.
    #[error("failed to decode resource index")]
    Decode(#[from] bincode::error::DecodeError),
    /// The index could not be encoded.
    #[error("failed to encode resource index")]
    Encode(#[from] bincode::error::EncodeError),
    /// The operation referenced a resource the index does not contain.
    #[error("resource {0} is not in the index")]
    UnknownResource(ResourceId),
}

/// Everything the index knows about one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// The resource this record describes.
    pub id: ResourceId,
    /// The resource type.
    pub kind: ResourceKind,
    /// The file holding the latest revision.
    pub path: String,
    /// The latest published revision, `None` for unrevisioned resources.
    pub revision: Option<i32>,
    /// Files holding specific revisions, by revision number.
    pub history: BTreeMap<i32, String>,
    /// Backend-specific load parameters.
    pub params: LoadParams,
}

impl ResourceRecord {
    /// Creates an unrevisioned record.
    pub fn new(id: ResourceId, kind: ResourceKind, path: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            path: path.into(),
            revision: None,
            history: BTreeMap::new(),
            params: LoadParams::default(),
        }
    }

    /// Returns the record with `revision` stored at `path`, bumping the latest
    /// revision when `revision` is newer.
    pub fn with_revision(mut self, revision: i32, path: impl Into<String>) -> Self {
        self.publish(revision, path.into());
        self
    }

    /// Returns the record with the given load parameters.
    pub fn with_params(mut self, params: LoadParams) -> Self {
        self.params = params;
        self
    }

    fn publish(&mut self, revision: i32, path: String) {
        self.history.insert(revision, path);
        if self.revision.map_or(true, |latest| revision > latest) {
            self.revision = Some(revision);
        }
    }

    fn path_of(&self, revision: i32) -> Option<&str> {
        if revision <= 0 || Some(revision) == self.revision {
            return Some(&self.path);
        }
        self.history.get(&revision).map(String::as_str)
    }
}

/// The runtime resource index.
///
/// Lookups are O(1) on average. Records can be inserted or revised while the
/// cache is running, which is how newly synced revisions become visible.
#[derive(Debug, Default)]
pub struct ResourceDatabase {
    records: RwLock<HashMap<ResourceId, ResourceRecord>>,
}

impl ResourceDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a database from a list of records.
    pub fn from_records(records: impl IntoIterator<Item = ResourceRecord>) -> Self {
        let records = records.into_iter().map(|record| (record.id, record)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Creates a database by parsing a persisted index file from its raw bytes.
    ///
    /// # Errors
    /// Returns [`IndexError::Decode`] if the bytes are not a bincode-encoded
    /// list of [`ResourceRecord`]s.
    pub fn from_bytes(index_bytes: &[u8]) -> Result<Self, IndexError> {
        let config = bincode::config::standard();
        let (records, _): (Vec<ResourceRecord>, _) =
            bincode::serde::decode_from_slice(index_bytes, config)?;
        Ok(Self::from_records(records))
    }

    /// Encodes the database as an index file. Records are written in
    /// identifier order so equal databases produce equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let mut records: Vec<ResourceRecord> = self.read().values().cloned().collect();
        records.sort_by_key(|record| record.id);
        let bytes = bincode::serde::encode_to_vec(&records, bincode::config::standard())?;
        Ok(bytes)
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn insert(&self, record: ResourceRecord) -> Option<ResourceRecord> {
        self.write().insert(record.id, record)
    }

    /// Removes a record.
    pub fn remove(&self, id: ResourceId) -> Option<ResourceRecord> {
        self.write().remove(&id)
    }

    /// Returns a copy of a record.
    pub fn record(&self, id: ResourceId) -> Option<ResourceRecord> {
        self.read().get(&id).cloned()
    }

    /// Publishes a revision of an existing resource stored at `path`.
    ///
    /// # Errors
    /// Returns [`IndexError::UnknownResource`] if `id` is not in the index.
    pub fn add_revision(
        &self,
        id: ResourceId,
        revision: i32,
        path: impl Into<String>,
    ) -> Result<(), IndexError> {
        let mut records = self.write();
        let record = records.get_mut(&id).ok_or(IndexError::UnknownResource(id))?;
        record.publish(revision, path.into());
        Ok(())
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceId, ResourceRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ResourceId, ResourceRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourceIndex for ResourceDatabase {
    fn resolve(&self, id: ResourceId, revision: i32) -> Option<ResourceLocation> {
        let records = self.read();
        let record = records.get(&id)?;
        let path = record.path_of(revision)?;
        Some(ResourceLocation {
            path: path.to_owned(),
            kind: record.kind.clone(),
            params: record.params.clone(),
        })
    }

    fn latest_revision(&self, id: ResourceId) -> Option<i32> {
        self.read().get(&id).and_then(|record| record.revision)
    }

    fn resources_of(&self, kind: &ResourceKind) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .read()
            .values()
            .filter(|record| &record.kind == kind)
            .map(|record| record.id)
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::LATEST_REVISION;

    const LEVEL: ResourceKind = ResourceKind::from_static("level_def");
    const TEXTURE: ResourceKind = ResourceKind::from_static("texture");

    #[test]
    fn resolve_picks_latest_or_historical_file() {
        let id = ResourceId::new();
        let db = ResourceDatabase::from_records([ResourceRecord::new(id, LEVEL, "levels/a.bin")
            .with_revision(1, "levels/a.r1.bin")
            .with_revision(2, "levels/a.r2.bin")]);

        assert_eq!(db.latest_revision(id), Some(2));
        assert_eq!(db.resolve(id, LATEST_REVISION).map(|l| l.path), Some("levels/a.bin".into()));
        assert_eq!(db.resolve(id, 2).map(|l| l.path), Some("levels/a.bin".into()));
        assert_eq!(db.resolve(id, 1).map(|l| l.path), Some("levels/a.r1.bin".into()));
        assert_eq!(db.resolve(id, 7), None);
        assert_eq!(db.resolve(ResourceId::new(), LATEST_REVISION), None);
    }

    #[test]
    fn add_revision_moves_latest_forward() {
        let id = ResourceId::new();
        let db = ResourceDatabase::from_records([
            ResourceRecord::new(id, LEVEL, "levels/a.bin").with_revision(1, "levels/a.r1.bin")
        ]);

        db.add_revision(id, 3, "levels/a.r3.bin").unwrap();
        assert_eq!(db.latest_revision(id), Some(3));

        let unknown = ResourceId::new();
        assert!(matches!(
            db.add_revision(unknown, 1, "x"),
            Err(IndexError::UnknownResource(missing)) if missing == unknown
        ));
    }

    #[test]
    fn resources_of_filters_by_kind() {
        let level = ResourceId::new();
        let texture = ResourceId::new();
        let db = ResourceDatabase::from_records([
            ResourceRecord::new(level, LEVEL, "levels/a.bin"),
            ResourceRecord::new(texture, TEXTURE, "textures/a.png"),
        ]);

        assert_eq!(db.resources_of(&TEXTURE), vec![texture]);
        assert_eq!(db.resources_of(&ResourceKind::new("sound")), Vec::new());
    }

    #[test]
    fn index_bytes_survive_a_save_and_load() {
        let id = ResourceId::new_v5("levels/a");
        let db = ResourceDatabase::from_records([ResourceRecord::new(id, LEVEL, "levels/a.bin")
            .with_revision(4, "levels/a.r4.bin")
            .with_params(LoadParams::new().with("compressed", "true"))]);

        let restored = ResourceDatabase::from_bytes(&db.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.record(id), db.record(id));
        assert!(ResourceDatabase::from_bytes(&[0xff, 0xff, 0xff]).is_err());
    }
}
