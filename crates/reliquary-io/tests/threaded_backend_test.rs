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

use anyhow::Result;
use reliquary_core::{
    backend::AssetBackend,
    index::{ResourceDatabase, ResourceRecord},
    resource::{
        DependencySet, LoadParams, Resource, ResourceId, ResourceKind, LATEST_REVISION,
    },
    scene::SceneId,
    ResourceError,
};
use reliquary_io::{
    backend::{DecoderRegistry, DirectorySource, ThreadedBackend},
    BackendConfig, CacheConfig, ResourceCache,
};
use std::{any::Any, fs, path::Path, sync::Arc, time::Duration};
use tempfile::tempdir;

// --- Test Setup: text resources and their decoders ---
const LEVEL_DEF: ResourceKind = ResourceKind::from_static("level_def");
const NOTE: ResourceKind = ResourceKind::from_static("note");

#[derive(Debug)]
struct Note(String);

impl Resource for Note {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One dependency name per line.
#[derive(Debug)]
struct LevelDef {
    dependencies: DependencySet,
}

impl Resource for LevelDef {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dependencies(&self) -> Option<&DependencySet> {
        Some(&self.dependencies)
    }
}

fn decode_note(bytes: &[u8], _params: &LoadParams) -> Result<Note> {
    Ok(Note(std::str::from_utf8(bytes)?.trim().to_owned()))
}

fn decode_level(bytes: &[u8], _params: &LoadParams) -> Result<LevelDef> {
    let mut dependencies = DependencySet::new();
    for name in std::str::from_utf8(bytes)?.lines().map(str::trim) {
        if !name.is_empty() {
            dependencies.add_external(ResourceId::new_v5(name));
        }
    }
    Ok(LevelDef { dependencies })
}

fn decoders() -> DecoderRegistry {
    let mut decoders = DecoderRegistry::new();
    decoders.register::<Note>(NOTE, decode_note);
    decoders.register::<LevelDef>(LEVEL_DEF, decode_level);
    decoders
}

fn write(root: &Path, path: &str, bytes: &[u8]) -> Result<()> {
    let full_path = root.join(path);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(full_path, bytes)?;
    Ok(())
}

/// Persists `records` as an index file and loads it back, as a game would at startup.
fn index_on_disk(root: &Path, records: Vec<ResourceRecord>) -> Result<Arc<ResourceDatabase>> {
    let index_path = root.join("index.bin");
    fs::write(&index_path, ResourceDatabase::from_records(records).to_bytes()?)?;
    Ok(Arc::new(ResourceDatabase::from_bytes(&fs::read(&index_path)?)?))
}

fn cache_over(root: &Path, index: Arc<ResourceDatabase>) -> Result<ResourceCache> {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = ThreadedBackend::new(
        DirectorySource::new(root),
        decoders(),
        &BackendConfig { workers: 2 },
    )?;
    let config = CacheConfig::from_ron("(wait_timeout_ms: 5)")?;
    Ok(ResourceCache::with_config(backend, index, config))
}
// ---

#[test]
fn loads_a_definition_and_its_dependencies_from_disk() -> Result<()> {
    let dir = tempdir()?;
    let level = ResourceId::new_v5("levels/intro");
    let grass = ResourceId::new_v5("notes/grass");
    let sky = ResourceId::new_v5("notes/sky");
    write(dir.path(), "levels/intro.def", b"notes/grass\nnotes/sky\n")?;
    write(dir.path(), "notes/grass.txt", b"green grass")?;
    write(dir.path(), "notes/sky.txt", b"blue sky")?;
    let index = index_on_disk(
        dir.path(),
        vec![
            ResourceRecord::new(level, LEVEL_DEF, "levels/intro.def"),
            ResourceRecord::new(grass, NOTE, "notes/grass.txt"),
            ResourceRecord::new(sky, NOTE, "notes/sky.txt"),
        ],
    )?;
    let mut cache = cache_over(dir.path(), index)?;

    cache.load(SceneId::new(), level, LATEST_REVISION, true)?;
    cache.finish_loading()?;

    let grass = cache.get(grass, LATEST_REVISION).expect("grass is loaded");
    assert_eq!(grass.with(|note: &Note| note.0.clone()), Some("green grass".to_owned()));
    assert!(cache.is_loaded(sky, LATEST_REVISION));
    assert_eq!(cache.get_loaded_count(), 3);

    cache.dispose();
    assert_eq!(cache.get_loaded_count(), 0);
    Ok(())
}

#[test]
fn missing_and_corrupt_files_are_typed() -> Result<()> {
    let dir = tempdir()?;
    let missing = ResourceId::new_v5("notes/missing");
    let corrupt = ResourceId::new_v5("notes/corrupt");
    write(dir.path(), "notes/corrupt.txt", &[0xff, 0xfe, 0xfd])?;
    let index = index_on_disk(
        dir.path(),
        vec![
            ResourceRecord::new(missing, NOTE, "notes/missing.txt"),
            ResourceRecord::new(corrupt, NOTE, "notes/corrupt.txt"),
        ],
    )?;
    let mut cache = cache_over(dir.path(), index)?;

    cache.load(SceneId::new(), missing, LATEST_REVISION, false)?;
    let err = cache.finish_loading().unwrap_err();
    assert!(matches!(err, ResourceError::NotFound { id, .. } if id == missing));

    cache.load(SceneId::new(), corrupt, LATEST_REVISION, false)?;
    let err = cache.finish_loading().unwrap_err();
    assert!(matches!(err, ResourceError::Corrupt { id, .. } if id == corrupt));
    assert!(!cache.is_loading());
    Ok(())
}

#[test]
fn kinds_without_a_decoder_are_rejected_up_front() -> Result<()> {
    let dir = tempdir()?;
    let mesh = ResourceId::new_v5("meshes/cube");
    write(dir.path(), "meshes/cube.obj", b"v 0 0 0")?;
    let index = index_on_disk(
        dir.path(),
        vec![ResourceRecord::new(mesh, ResourceKind::new("mesh"), "meshes/cube.obj")],
    )?;
    let mut cache = cache_over(dir.path(), index)?;

    let err = cache.load(SceneId::new(), mesh, LATEST_REVISION, false).unwrap_err();
    assert!(matches!(err, ResourceError::Backend(_)));
    assert!(!cache.is_loading());
    Ok(())
}

#[test]
fn results_of_unloaded_requests_are_discarded() -> Result<()> {
    let dir = tempdir()?;
    write(dir.path(), "notes/a.txt", b"a")?;
    let mut backend = ThreadedBackend::new(
        DirectorySource::new(dir.path()),
        decoders(),
        &BackendConfig { workers: 1 },
    )?;
    let params = LoadParams::new();

    backend.load("notes/a.txt", &NOTE, &params)?;
    backend.unload("notes/a.txt");
    assert_eq!(backend.queued_count(), 0);
    backend.load("notes/a.txt", &NOTE, &params)?;

    for _ in 0..200 {
        if backend.update()? {
            break;
        }
        backend.wait_for_completion(Duration::from_millis(10));
    }

    assert!(backend.is_loaded("notes/a.txt"));
    assert_eq!(backend.loaded_count(), 1);
    let note = backend.get("notes/a.txt").expect("note is loaded");
    assert_eq!(note.downcast_ref::<Note>().map(|note| note.0.as_str()), Some("a"));
    Ok(())
}
