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

//! # Reliquary IO
//!
//! The loading engine: keyed loaders over an asynchronous [`AssetBackend`],
//! the dependency resolver that walks definitions, and the [`ResourceCache`]
//! that schedules everything under a non-blocking `update` loop.
//!
//! [`AssetBackend`]: reliquary_core::backend::AssetBackend

#![warn(missing_docs)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod dependency;
pub mod loader;

pub use cache::{CacheCommand, CommandSender, ResourceCache};
pub use config::{BackendConfig, CacheConfig};
