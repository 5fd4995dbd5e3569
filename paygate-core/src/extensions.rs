//! Typed request extensions.
//!
//! Middleware attaches values (for example the authenticated principal) to a
//! request; downstream handlers read them back by type.
//!
//! ```rust
//! use paygate_core::Extensions;
//!
//! #[derive(Debug, PartialEq)]
//! struct TenantId(u64);
//!
//! let mut ext = Extensions::new();
//! ext.insert(TenantId(7));
//! assert_eq!(ext.get::<TenantId>(), Some(&TenantId(7)));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-keyed container of shared values.
#[derive(Clone, Default)]
pub struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    #[inline]
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Insert a value, replacing any previous value of the same type.
    #[inline]
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Insert an already shared value.
    #[inline]
    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.map
            .insert(TypeId::of::<T>(), value as Arc<dyn Any + Send + Sync>);
    }

    #[inline]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|arc| arc.downcast_ref::<T>())
    }

    /// Clone out the shared handle, for moving into spawned tasks.
    #[inline]
    pub fn get_arc<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|arc| arc.clone().downcast::<T>().ok())
    }

    #[inline]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Returns true if a value of this type was present.
    #[inline]
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> bool {
        self.map.remove(&TypeId::of::<T>()).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("count", &self.map.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Principal(&'static str);

    #[test]
    fn test_insert_and_get() {
        let mut ext = Extensions::new();

        ext.insert(Principal("internal-service"));
        ext.insert(42u32);

        assert_eq!(ext.get::<Principal>(), Some(&Principal("internal-service")));
        assert_eq!(ext.get::<u32>(), Some(&42));
        assert_eq!(ext.get::<String>(), None);
        assert_eq!(ext.len(), 2);
    }

    #[test]
    fn test_insert_replaces() {
        let mut ext = Extensions::new();

        ext.insert(Principal("a"));
        ext.insert(Principal("b"));

        assert_eq!(ext.get::<Principal>(), Some(&Principal("b")));
        assert_eq!(ext.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut ext = Extensions::new();
        ext.insert(1u8);

        assert!(ext.remove::<u8>());
        assert!(!ext.remove::<u8>());
        assert!(ext.is_empty());
    }

    #[test]
    fn test_arc_round_trip_and_clone() {
        let mut ext = Extensions::new();
        ext.insert_arc(Arc::new(Principal("svc")));

        let cloned = ext.clone();
        let shared = cloned.get_arc::<Principal>().unwrap();
        assert_eq!(*shared, Principal("svc"));
        assert!(ext.contains::<Principal>());
    }
}
