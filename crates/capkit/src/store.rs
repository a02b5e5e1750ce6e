//! # Instance State Store
//!
//! Each capability keeps its bookkeeping (seed history, duration log, cache
//! table) in a private state value. Rather than forcing user types to carry
//! one field per capability, all of it lives in a single [`Extensions`]
//! type-map: one slot per state type, keyed by `TypeId`, created lazily on
//! first use. Capabilities cannot collide because the namespace is the Rust
//! type itself.
//!
//! A user type opts in by embedding one `Extensions` field and implementing
//! [`HasExtensions`]:
//!
//! ```
//! use capkit::{Extensions, HasExtensions};
//!
//! #[derive(Default)]
//! struct Model {
//!     weights: Vec<f64>,
//!     ext: Extensions,
//! }
//!
//! impl HasExtensions for Model {
//!     fn extensions(&self) -> &Extensions {
//!         &self.ext
//!     }
//!     fn extensions_mut(&mut self) -> &mut Extensions {
//!         &mut self.ext
//!     }
//! }
//! ```
//!
//! The store is deliberately single-threaded: capability state is private to
//! one instance and the ordering guarantees of the capabilities (seed
//! nesting, sample append order) only hold under single-threaded access.
//! Sharing an instance across threads requires external synchronization.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Lazily populated, type-keyed store for per-instance capability state.
///
/// For [`crate::Saveable`] types this field is transient: mark it
/// `#[serde(skip)]` so it is rebuilt empty on load.
#[derive(Default)]
pub struct Extensions {
    slots: HashMap<TypeId, Box<dyn Any>>,
}

impl Extensions {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared access to the state of type `T`, if it was ever initialized.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Mutable access to the state of type `T`, if it was ever initialized.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut::<T>())
    }

    /// Mutable access to the state of type `T`, initializing it with
    /// `T::default()` on first use.
    pub fn get_or_default<T: Any + Default>(&mut self) -> &mut T {
        self.slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("slot is keyed by its own TypeId")
    }

    /// Replace the state of type `T` wholesale.
    pub fn insert<T: Any>(&mut self, value: T) {
        self.slots.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Whether state of type `T` has been initialized.
    pub fn contains<T: Any>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Number of initialized state slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no capability state has been initialized yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("slot_count", &self.slots.len())
            .finish()
    }
}

/// Access to an instance's capability state store.
///
/// This is the only obligation a type has to take on capabilities; every
/// capability trait in this crate has `HasExtensions` as its supertrait and
/// provides all of its behavior as default methods on top of these two
/// accessors.
pub trait HasExtensions {
    /// Shared access to the store.
    fn extensions(&self) -> &Extensions;

    /// Mutable access to the store.
    fn extensions_mut(&mut self) -> &mut Extensions;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Counter {
        hits: u32,
    }

    #[test]
    fn test_get_or_default_initializes_lazily() {
        let mut ext = Extensions::new();
        assert!(ext.is_empty());
        assert!(!ext.contains::<Counter>());

        ext.get_or_default::<Counter>().hits += 1;
        assert!(ext.contains::<Counter>());
        assert_eq!(ext.get::<Counter>(), Some(&Counter { hits: 1 }));
    }

    #[test]
    fn test_slots_are_namespaced_by_type() {
        #[derive(Default)]
        struct Other(u8);

        let mut ext = Extensions::new();
        ext.get_or_default::<Counter>().hits = 3;
        ext.get_or_default::<Other>().0 = 7;

        assert_eq!(ext.len(), 2);
        assert_eq!(ext.get::<Counter>().map(|c| c.hits), Some(3));
        assert_eq!(ext.get::<Other>().map(|o| o.0), Some(7));
    }

    #[test]
    fn test_get_absent_returns_none() {
        let ext = Extensions::new();
        assert!(ext.get::<Counter>().is_none());
    }
}
