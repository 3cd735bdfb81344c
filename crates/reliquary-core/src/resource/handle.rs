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

use super::Resource;
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

/// A thread-safe, reference-counted handle to a loaded resource.
///
/// Cloning a handle is cheap: every clone shares the same cell. The content of
/// that cell can be replaced in place with [`ResourceHandle::set`], which is how
/// reloads and revision swaps become visible to everyone already holding the
/// handle.
#[derive(Clone)]
pub struct ResourceHandle(Arc<RwLock<Arc<dyn Resource>>>);

impl ResourceHandle {
    /// Creates a new handle around freshly loaded content.
    pub fn new(content: Arc<dyn Resource>) -> Self {
        Self(Arc::new(RwLock::new(content)))
    }

    /// Returns the current content.
    pub fn content(&self) -> Arc<dyn Resource> {
        self.read().clone()
    }

    /// Runs `f` against the content if it is of type `T`.
    ///
    /// ## Returns
    /// `None` when the content is of another type.
    pub fn with<T: Resource, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let content = self.read();
        content.downcast_ref::<T>().map(f)
    }

    /// Whether the content is of type `T`.
    pub fn is<T: Resource>(&self) -> bool {
        self.read().as_any().is::<T>()
    }

    /// Replaces the content seen by every clone of this handle.
    pub fn set(&self, content: Arc<dyn Resource>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = content;
    }

    /// Whether both handles share the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<dyn Resource>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceHandle").field(&*self.read()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug, PartialEq)]
    struct Text(&'static str);

    impl Resource for Text {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Other;

    impl Resource for Other {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn set_is_visible_through_every_clone() {
        let handle = ResourceHandle::new(Arc::new(Text("old")));
        let held = handle.clone();

        handle.set(Arc::new(Text("new")));

        assert_eq!(held.with(|text: &Text| text.0), Some("new"));
        assert!(held.ptr_eq(&handle));
    }

    #[test]
    fn with_rejects_the_wrong_type() {
        let handle = ResourceHandle::new(Arc::new(Other));
        assert!(handle.is::<Other>());
        assert_eq!(handle.with(|text: &Text| text.0), None);
    }

    #[test]
    fn separate_handles_are_not_ptr_eq() {
        let content: Arc<dyn Resource> = Arc::new(Other);
        let a = ResourceHandle::new(content.clone());
        let b = ResourceHandle::new(content);
        assert!(!a.ptr_eq(&b));
    }
}
