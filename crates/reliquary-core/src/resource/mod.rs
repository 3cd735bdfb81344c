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

//! Provides the foundational traits and primitive types for Reliquary's resources.
//!
//! This module defines the "common language" shared by every part of the
//! loading engine. It has no knowledge of how resources are read or cached.
//!
//! The key components are:
//! - The [`Resource`] trait implemented by every loadable type.
//! - Stable identifiers ([`ResourceId`]) and cache keys ([`ResourceIdentifier`]).
//! - The shared, swappable [`ResourceHandle`].
//! - The [`DependencySet`] carried by definitions that reference other resources.

mod dependency;
mod handle;
mod identifier;
mod uuid;

pub use dependency::*;
pub use handle::*;
pub use identifier::*;
pub use uuid::*;

use serde::{Deserialize, Serialize};
use std::{any::Any, borrow::Cow, collections::BTreeMap, fmt};

/// A type that can be produced by an asset backend and cached by the engine.
///
/// The supertraits allow resources to be decoded on worker threads and shared
/// between every holder of a [`ResourceHandle`].
///
/// A resource that references other resources is a *definition*: it exposes
/// its references through [`Resource::dependencies`] so the resolver can load
/// them transitively.
///
/// # Examples
///
/// ```
/// use reliquary_core::resource::Resource;
/// use std::any::Any;
///
/// #[derive(Debug)]
/// struct Texture {
///     width: u32,
/// }
///
/// impl Resource for Texture {
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait Resource: Any + Send + Sync + fmt::Debug {
    /// Returns `self` as [`Any`] so callers can downcast to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// The resources this one needs, if it is a definition.
    fn dependencies(&self) -> Option<&DependencySet> {
        None
    }
}

impl dyn Resource {
    /// Downcasts to a concrete resource type.
    pub fn downcast_ref<T: Resource>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// The type tag of a resource, used to pick a decoder and to query by type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKind(Cow<'static, str>);

impl ResourceKind {
    /// Creates a kind from a static name, usable in constants.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a kind from an owned name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The name of the kind.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, backend-specific load parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadParams(BTreeMap<String, String>);

impl LoadParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `key` bound to `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Looks up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
