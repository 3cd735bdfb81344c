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

//! A registry of decoders, enabling a backend to turn raw bytes into any
//! resource type by kind.

use anyhow::{anyhow, Result};
use reliquary_core::resource::{LoadParams, Resource, ResourceKind};
use std::{collections::HashMap, marker::PhantomData, sync::Arc};

/// Turns the raw bytes of a file into a resource of type `R`.
pub trait ResourceDecoder<R: Resource> {
    /// Decodes `bytes`.
    ///
    /// Decoders should report malformed input as
    /// [`AssetFault::Corrupt`](reliquary_core::backend::AssetFault::Corrupt).
    /// Backends treat any other decoder error as corruption too.
    fn decode(&self, bytes: &[u8], params: &LoadParams) -> Result<R>;
}

impl<R, F> ResourceDecoder<R> for F
where
    R: Resource,
    F: Fn(&[u8], &LoadParams) -> Result<R>,
{
    fn decode(&self, bytes: &[u8], params: &LoadParams) -> Result<R> {
        self(bytes, params)
    }
}

/// Internal trait for decoding any resource type.
trait AnyDecoder: Send + Sync {
    fn decode_any(&self, bytes: &[u8], params: &LoadParams) -> Result<Arc<dyn Resource>>;
}

/// Erases the resource type of a `ResourceDecoder<R>`.
struct DecoderWrapper<R, D>(D, PhantomData<fn() -> R>);

impl<R, D> AnyDecoder for DecoderWrapper<R, D>
where
    R: Resource,
    D: ResourceDecoder<R> + Send + Sync,
{
    fn decode_any(&self, bytes: &[u8], params: &LoadParams) -> Result<Arc<dyn Resource>> {
        let resource: R = self.0.decode(bytes, params)?;
        Ok(Arc::new(resource))
    }
}

/// Maps resource kinds to their decoders.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<ResourceKind, Box<dyn AnyDecoder>>,
}

impl DecoderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decoder for `kind`, replacing any previous one.
    pub fn register<R: Resource>(
        &mut self,
        kind: ResourceKind,
        decoder: impl ResourceDecoder<R> + Send + Sync + 'static,
    ) {
        let wrapped = DecoderWrapper(decoder, PhantomData);
        self.decoders.insert(kind, Box::new(wrapped));
    }

    /// Whether a decoder exists for `kind`.
    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Decodes `bytes` as a resource of `kind`.
    ///
    /// # Errors
    /// Fails when no decoder is registered for `kind` or the decoder fails.
    pub fn decode(
        &self,
        kind: &ResourceKind,
        bytes: &[u8],
        params: &LoadParams,
    ) -> Result<Arc<dyn Resource>> {
        let decoder = self
            .decoders
            .get(kind)
            .ok_or_else(|| anyhow!("No decoder registered for resource kind '{kind}'"))?;
        decoder.decode_any(bytes, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug)]
    struct Note(String);

    impl Resource for Note {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn decode_note(bytes: &[u8], _params: &LoadParams) -> Result<Note> {
        Ok(Note(String::from_utf8(bytes.to_vec())?))
    }

    #[test]
    fn decodes_by_kind() {
        let kind = ResourceKind::from_static("note");
        let mut registry = DecoderRegistry::new();
        registry.register::<Note>(kind.clone(), decode_note);

        let note = registry.decode(&kind, b"hello", &LoadParams::new()).unwrap();
        assert_eq!(note.downcast_ref::<Note>().map(|n| n.0.as_str()), Some("hello"));
        assert!(registry.decode(&ResourceKind::new("image"), b"", &LoadParams::new()).is_err());
    }
}
