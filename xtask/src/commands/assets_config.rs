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

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Represents the structure of the `Assets.toml` manifest file.
#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct AssetManifest {
    /// A list of directories to scan for source resources.
    pub source_directories: Vec<PathBuf>,
    /// Where `index.bin` and the pack files are written.
    pub output_directory: PathBuf,
    /// Resource kind per file extension. Unlisted extensions use the
    /// extension itself as the kind.
    pub kinds: BTreeMap<String, String>,
}

impl AssetManifest {
    /// The resource kind for a file with the given extension.
    pub fn kind_for(&self, extension: &str) -> String {
        self.kinds
            .get(extension)
            .cloned()
            .unwrap_or_else(|| extension.to_owned())
    }
}

impl Default for AssetManifest {
    /// Provides a default configuration if `Assets.toml` is not found.
    ///
    /// The default configuration points to a single source directory:
    /// `resources`.
    fn default() -> Self {
        Self {
            source_directories: vec![PathBuf::from("resources")],
            output_directory: PathBuf::from(".dist/resources"),
            kinds: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_fills_missing_fields_and_maps_kinds() {
        let manifest: AssetManifest = toml::from_str(
            r#"
            source_directories = ["content"]

            [kinds]
            lvl = "level"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.source_directories, vec![PathBuf::from("content")]);
        assert_eq!(manifest.output_directory, PathBuf::from(".dist/resources"));
        assert_eq!(manifest.kind_for("lvl"), "level");
        assert_eq!(manifest.kind_for("png"), "png");
    }
}
