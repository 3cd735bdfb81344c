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

use crate::commands::assets_config::AssetManifest;
use crate::helpers::*;
use anyhow::{bail, Context, Result};
use reliquary_core::index::{ResourceDatabase, ResourceRecord};
use reliquary_core::resource::{ResourceId, ResourceKind};
use reliquary_io::backend::{write_table_of_contents, PackEntry};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A resource file found in one of the source directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location on disk.
    pub full_path: PathBuf,
    /// Path relative to its source directory, with `/` separators. This is the
    /// path the index records and the key inside a pack.
    pub resource_path: String,
}

pub fn index(manifest_path: &Path) -> Result<()> {
    print_task_start("Indexing Resources", MAGNIFIER, CYAN);

    let manifest = load_manifest(manifest_path)?;
    let files = scan(&manifest)?;
    fs::create_dir_all(&manifest.output_directory)?;

    let database = build_index(&manifest, &files)?;
    write_index(&database, &manifest.output_directory.join("index.bin"))?;

    print_success("Resource index written.");
    Ok(())
}

pub fn pack(manifest_path: &Path) -> Result<()> {
    print_task_start("Packing Resources", ROCKET, MAGENTA);

    let manifest = load_manifest(manifest_path)?;
    let files = scan(&manifest)?;
    let dest_dir = &manifest.output_directory;
    fs::create_dir_all(dest_dir)?;

    let database = build_index(&manifest, &files)?;
    write_index(&database, &dest_dir.join("index.bin"))?;
    build_packfile(&files, dest_dir)?;

    print_success("Resource pipeline finished successfully.");
    Ok(())
}

fn scan(manifest: &AssetManifest) -> Result<Vec<SourceFile>> {
    let valid_source_dirs: Vec<&PathBuf> = manifest
        .source_directories
        .iter()
        .filter(|dir| dir.exists())
        .collect();

    if valid_source_dirs.is_empty() {
        bail!("No valid source directories found in the manifest");
    }

    let files = find_source_files(&valid_source_dirs)?;
    println!(
        "{}🔎 Found:{} {} resource files to process.",
        BOLD,
        RESET,
        files.len()
    );
    Ok(files)
}

/// Builds one unrevisioned record per file. Ids are derived from the resource
/// path, so re-running the tool keeps them stable.
pub fn build_index(manifest: &AssetManifest, files: &[SourceFile]) -> Result<ResourceDatabase> {
    let database = ResourceDatabase::new();
    for file in files {
        let extension = Path::new(&file.resource_path)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        let record = ResourceRecord::new(
            ResourceId::new_v5(&file.resource_path),
            ResourceKind::new(manifest.kind_for(extension)),
            file.resource_path.clone(),
        );
        if database.insert(record).is_some() {
            bail!(
                "'{}' exists in more than one source directory",
                file.resource_path
            );
        }
    }
    Ok(database)
}

fn write_index(database: &ResourceDatabase, index_path: &Path) -> Result<()> {
    println!("{}💾 Writing index file...", BOLD);
    let encoded_index = database
        .to_bytes()
        .context("Failed to serialize resource index")?;
    fs::write(index_path, &encoded_index)
        .with_context(|| format!("Failed to write index file to '{}'", index_path.display()))?;

    println!(
        "{}{} {} Wrote {} records to '{}' ({:.2} KB)",
        BOLD,
        GREEN,
        CHECK,
        database.len(),
        index_path.display(),
        encoded_index.len() as f64 / 1024.0
    );
    Ok(())
}

/// Writes `data.pack` and `data.toc.ron` from the source files.
pub fn build_packfile(files: &[SourceFile], dest_dir: &Path) -> Result<()> {
    let data_path = dest_dir.join("data.pack");
    let toc_path = dest_dir.join("data.toc.ron");

    let mut data_file = File::create(&data_path)
        .with_context(|| format!("Failed to create data pack at '{}'", data_path.display()))?;

    let mut entries = HashMap::new();
    let mut current_offset = 0;

    println!("{}📦 Packing resource data...", BOLD);

    for file in files {
        let bytes = fs::read(&file.full_path)
            .with_context(|| format!("Failed to read '{}'", file.full_path.display()))?;
        let size = bytes.len() as u64;
        data_file.write_all(&bytes)?;

        entries.insert(
            file.resource_path.clone(),
            PackEntry {
                offset: current_offset,
                size,
            },
        );
        current_offset += size;
    }

    write_table_of_contents(&toc_path, &entries)?;

    println!(
        "{}{} {} Wrote {} entries to '{}' ({:.2} MB)",
        BOLD,
        GREEN,
        CHECK,
        entries.len(),
        data_path.display(),
        current_offset as f64 / (1024.0 * 1024.0)
    );

    Ok(())
}

/// Loads the manifest. If the file does not exist, it returns the default
/// configuration.
fn load_manifest(manifest_path: &Path) -> Result<AssetManifest> {
    if !manifest_path.exists() {
        print_info(&format!(
            "No '{}' found. Using default configuration.",
            manifest_path.display()
        ));
        return Ok(AssetManifest::default());
    }

    print_info(&format!(
        "Found '{}'. Loading configuration.",
        manifest_path.display()
    ));
    let manifest_str = fs::read_to_string(manifest_path).with_context(|| {
        format!(
            "Failed to read manifest file at '{}'",
            manifest_path.display()
        )
    })?;
    toml::from_str(&manifest_str)
        .with_context(|| format!("Failed to parse TOML from '{}'", manifest_path.display()))
}

/// Recursively finds all files in the given source directories, sorted by
/// resource path.
pub fn find_source_files(source_dirs: &[&PathBuf]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for dir in source_dirs {
        for entry in WalkDir::new(dir) {
            let entry = entry.with_context(|| format!("Failed to scan '{}'", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .context("Scanned file is outside its source directory")?;
            let resource_path = relative
                .components()
                .map(|part| part.as_os_str().to_str().context("Invalid path encoding"))
                .collect::<Result<Vec<_>>>()?
                .join("/");
            files.push(SourceFile {
                full_path: entry.into_path(),
                resource_path,
            });
        }
    }
    files.sort_by(|a, b| a.resource_path.cmp(&b.resource_path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliquary_core::index::ResourceIndex;
    use reliquary_core::resource::LATEST_REVISION;
    use reliquary_io::backend::{ByteSource, PackSource};

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("levels")).unwrap();
        fs::write(dir.path().join("levels/intro.lvl"), b"intro").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        dir
    }

    #[test]
    fn index_uses_relative_paths_and_manifest_kinds() {
        let dir = source_tree();
        let root = dir.path().to_path_buf();
        let mut manifest = AssetManifest::default();
        manifest.kinds.insert("lvl".to_owned(), "level".to_owned());

        let files = find_source_files(&[&root]).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.resource_path.as_str()).collect();
        assert_eq!(paths, ["levels/intro.lvl", "readme.txt"]);

        let database = build_index(&manifest, &files).unwrap();
        let id = ResourceId::new_v5("levels/intro.lvl");
        let location = database.resolve(id, LATEST_REVISION).unwrap();
        assert_eq!(location.path, "levels/intro.lvl");
        assert_eq!(location.kind.as_str(), "level");
        assert_eq!(database.resources_of(&ResourceKind::new("txt")).len(), 1);
    }

    #[test]
    fn duplicate_paths_across_directories_are_rejected() {
        let first = source_tree();
        let second = source_tree();
        let files = find_source_files(&[
            &first.path().to_path_buf(),
            &second.path().to_path_buf(),
        ])
        .unwrap();

        assert!(build_index(&AssetManifest::default(), &files).is_err());
    }

    #[test]
    fn packed_files_are_readable_through_the_pack_source() {
        let dir = source_tree();
        let out = tempfile::tempdir().unwrap();
        let files = find_source_files(&[&dir.path().to_path_buf()]).unwrap();

        build_packfile(&files, out.path()).unwrap();

        let source = PackSource::open(
            out.path().join("data.pack"),
            out.path().join("data.toc.ron"),
        )
        .unwrap();
        assert_eq!(source.read("readme.txt").unwrap(), b"hello");
        assert_eq!(source.read("levels/intro.lvl").unwrap(), b"intro");
    }
}
