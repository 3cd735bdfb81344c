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

//! Asset backends shipped with the engine.
//!
//! - [`MemoryBackend`]: serves resources registered in memory and completes
//!   them after a configurable number of ticks.
//! - [`ThreadedBackend`]: reads bytes from a [`ByteSource`] and decodes them
//!   with a [`DecoderRegistry`] on a pool of worker threads.

mod decoder;
mod memory;
mod source;
mod threaded;

pub use decoder::*;
pub use memory::*;
pub use source::*;
pub use threaded::*;
