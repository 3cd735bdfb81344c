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

// Resource pipeline tasks for Reliquary.
// Run with: cargo xtask <command>

mod commands;
mod helpers;

use clap::{Parser, Subcommand};
use helpers::print_error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask", about = "Reliquary resource pipeline", version)]
struct Cli {
    /// Path to the resource manifest.
    #[arg(long, default_value = "Assets.toml", global = true)]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand)]
enum Task {
    /// Scan the source directories and write `index.bin`.
    Index,
    /// Write `index.bin` together with `data.pack` and its table of contents.
    Pack,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Task::Index => commands::assets::index(&cli.manifest),
        Task::Pack => commands::assets::pack(&cli.manifest),
    };

    if let Err(err) = result {
        print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}
