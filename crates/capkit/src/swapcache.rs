//! # Swapcache Capability
//!
//! Memoization of derived attributes under multiple parallel
//! configurations. The table is a two-level map: variant key to attribute
//! name to value, with a distinguished *current* key selecting which
//! variant's values are exposed. Switching variants swaps the whole
//! attribute surface in and out without recomputation and without
//! discarding the other variants' values.
//!
//! Reading an attribute that was never set under the current variant fails
//! with [`SwapcacheError::NotComputed`]; it never answers with a stale
//! value from a different variant.
//!
//! ```
//! use capkit::{Extensions, HasExtensions, Swapcacheable};
//!
//! #[derive(Default)]
//! struct Vectorizer {
//!     ext: Extensions,
//! }
//!
//! impl HasExtensions for Vectorizer {
//!     fn extensions(&self) -> &Extensions {
//!         &self.ext
//!     }
//!     fn extensions_mut(&mut self) -> &mut Extensions {
//!         &mut self.ext
//!     }
//! }
//!
//! impl Swapcacheable for Vectorizer {
//!     type Key = String;
//! }
//!
//! let mut v = Vectorizer::default();
//! v.set_variant("bigram".to_string());
//! v.set_cached("ngram_range", (1u32, 2u32)).unwrap();
//!
//! v.set_variant("unigram".to_string());
//! assert!(v.cached::<(u32, u32)>("ngram_range").is_err());
//! v.set_cached("ngram_range", (1u32, 1u32)).unwrap();
//!
//! v.set_variant("bigram".to_string());
//! assert_eq!(v.cached::<(u32, u32)>("ngram_range").unwrap(), &(1, 2));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use tracing::debug;

use crate::compose::{typed_method, ComposableCapability, MethodTable};
use crate::error::SwapcacheError;
use crate::store::HasExtensions;

// ============================================================================
// Swapcache Table
// ============================================================================

/// Two-level cache: variant key to attribute name to type-erased value.
///
/// Exactly one key is current at a time (or none before the first
/// [`Self::set_current`]). All reads and writes go to the current key's
/// attribute map.
pub struct Swapcache<K> {
    variants: HashMap<K, HashMap<String, Box<dyn Any>>>,
    current: Option<K>,
    /// Keys in least-recently-current order; the current key is last.
    recency: Vec<K>,
    capacity: Option<usize>,
}

impl<K> Default for Swapcache<K> {
    fn default() -> Self {
        Self {
            variants: HashMap::new(),
            current: None,
            recency: Vec::new(),
            capacity: None,
        }
    }
}

impl<K: Eq + Hash + Clone> Swapcache<K> {
    /// Make `key` the current variant.
    ///
    /// A key never seen before starts with an empty attribute map; a known
    /// key re-exposes whatever was stored under it. Switching never touches
    /// the other variants' values, except that inserting a *new* key beyond
    /// a configured capacity evicts the least-recently-current variant
    /// (never the one just made current).
    pub fn set_current(&mut self, key: K) {
        if self.current.as_ref() == Some(&key) {
            return;
        }

        let is_new = !self.variants.contains_key(&key);
        if is_new {
            self.variants.insert(key.clone(), HashMap::new());
        }
        self.recency.retain(|k| k != &key);
        self.recency.push(key.clone());
        self.current = Some(key);
        debug!(
            target: "capkit::swapcache",
            variants = self.variants.len(),
            new_variant = is_new,
            "switched current variant"
        );

        if is_new {
            if let Some(capacity) = self.capacity {
                while self.variants.len() > capacity.max(1) && self.recency.len() > 1 {
                    let victim = self.recency.remove(0);
                    self.variants.remove(&victim);
                }
            }
        }
    }

    /// The current variant key, if any.
    pub fn current(&self) -> Option<&K> {
        self.current.as_ref()
    }

    /// Whether `key` has a stored variant (current or not).
    pub fn has_variant(&self, key: &K) -> bool {
        self.variants.contains_key(key)
    }

    /// Number of stored variants.
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Bound the number of stored variants. `None` (the default) keeps
    /// every variant ever made current.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    /// Read `attr` under the current variant.
    pub fn get<T: Any>(&self, attr: &str) -> Result<&T, SwapcacheError> {
        let current = self.current.as_ref().ok_or(SwapcacheError::NoVariant)?;
        let values = self
            .variants
            .get(current)
            .ok_or(SwapcacheError::NoVariant)?;
        let value = values
            .get(attr)
            .ok_or_else(|| SwapcacheError::NotComputed { attr: attr.to_owned() })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| SwapcacheError::TypeMismatch {
                attr: attr.to_owned(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Write `attr` under the current variant only.
    pub fn set<T: Any>(&mut self, attr: &str, value: T) -> Result<(), SwapcacheError> {
        let current = self.current.as_ref().ok_or(SwapcacheError::NoVariant)?;
        let values = self
            .variants
            .get_mut(current)
            .ok_or(SwapcacheError::NoVariant)?;
        values.insert(attr.to_owned(), Box::new(value));
        Ok(())
    }

    /// Whether `attr` has been set under the current variant.
    pub fn contains(&self, attr: &str) -> bool {
        self.current
            .as_ref()
            .and_then(|current| self.variants.get(current))
            .is_some_and(|values| values.contains_key(attr))
    }
}

impl<K> fmt::Debug for Swapcache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swapcache")
            .field("variant_count", &self.variants.len())
            .field("has_current", &self.current.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================================================
// Swapcacheable Trait
// ============================================================================

/// Variant-keyed attribute caching.
///
/// Attach by implementing the trait and choosing the variant key type:
///
/// ```ignore
/// impl Swapcacheable for Model {
///     type Key = String;
/// }
/// ```
pub trait Swapcacheable: HasExtensions {
    /// The variant key type. Any hashable, clonable value works.
    type Key: Eq + Hash + Clone + 'static;

    /// Make `key` the current variant. See [`Swapcache::set_current`].
    fn set_variant(&mut self, key: Self::Key) {
        self.extensions_mut()
            .get_or_default::<Swapcache<Self::Key>>()
            .set_current(key);
    }

    /// The current variant key, if `set_variant` was ever called.
    fn current_variant(&self) -> Option<&Self::Key> {
        self.extensions()
            .get::<Swapcache<Self::Key>>()
            .and_then(Swapcache::current)
    }

    /// Whether `key` has a stored variant.
    fn has_variant(&self, key: &Self::Key) -> bool {
        self.extensions()
            .get::<Swapcache<Self::Key>>()
            .is_some_and(|cache| cache.has_variant(key))
    }

    /// Read a tracked attribute under the current variant.
    fn cached<T: Any>(&self, attr: &str) -> Result<&T, SwapcacheError> {
        match self.extensions().get::<Swapcache<Self::Key>>() {
            Some(cache) => cache.get(attr),
            None => Err(SwapcacheError::NoVariant),
        }
    }

    /// Write a tracked attribute under the current variant.
    fn set_cached<T: Any>(&mut self, attr: &str, value: T) -> Result<(), SwapcacheError> {
        self.extensions_mut()
            .get_or_default::<Swapcache<Self::Key>>()
            .set(attr, value)
    }

    /// Whether `attr` has been set under the current variant.
    fn has_cached(&self, attr: &str) -> bool {
        self.extensions()
            .get::<Swapcache<Self::Key>>()
            .is_some_and(|cache| cache.contains(attr))
    }

    /// Read `attr` under the current variant, deriving and storing it with
    /// `compute` if it was never set. The memoization trade: memory for
    /// avoided recomputation across variant switches.
    fn cached_or_insert_with<T: Any>(
        &mut self,
        attr: &str,
        compute: impl FnOnce(&mut Self) -> T,
    ) -> Result<&T, SwapcacheError>
    where
        Self: Sized,
    {
        if !self.has_cached(attr) {
            self.current_variant().ok_or(SwapcacheError::NoVariant)?;
            let value = compute(self);
            self.set_cached(attr, value)?;
        }
        self.cached(attr)
    }

    /// Bound the number of stored variants. `None` (the default) keeps
    /// every variant.
    fn set_variant_capacity(&mut self, capacity: Option<usize>) {
        self.extensions_mut()
            .get_or_default::<Swapcache<Self::Key>>()
            .set_capacity(capacity);
    }
}

// ============================================================================
// Composer Integration
// ============================================================================

/// Swapcaching as a composable capability: installs a `"set_variant"`
/// method (`String -> ()`) into the composed method table. The composed
/// wrapper's variant keys are strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapcacheCapability;

impl<B: 'static> ComposableCapability<B> for SwapcacheCapability {
    fn capability_name(&self) -> &'static str {
        "swapcache"
    }

    fn install(&self, table: &mut MethodTable<B>) {
        table.provide(
            "swapcache",
            "set_variant",
            typed_method("set_variant", |_base: &mut B, cx, key: String| {
                cx.extensions()
                    .get_or_default::<Swapcache<String>>()
                    .set_current(key);
                Ok(())
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_before_any_variant_fails() {
        let cache: Swapcache<String> = Swapcache::default();
        assert!(matches!(
            cache.get::<u32>("n"),
            Err(SwapcacheError::NoVariant)
        ));
    }

    #[test]
    fn test_values_survive_switching_away_and_back() {
        let mut cache = Swapcache::default();
        cache.set_current("a");
        cache.set("n", 1u32).unwrap();
        cache.set_current("b");
        cache.set_current("a");
        assert_eq!(cache.get::<u32>("n").unwrap(), &1);
    }

    #[test]
    fn test_unset_attribute_is_not_computed() {
        let mut cache = Swapcache::default();
        cache.set_current("a");
        assert!(matches!(
            cache.get::<u32>("n"),
            Err(SwapcacheError::NotComputed { .. })
        ));
    }

    #[test]
    fn test_wrong_type_read_is_a_distinct_error() {
        let mut cache = Swapcache::default();
        cache.set_current("a");
        cache.set("n", 1u32).unwrap();
        assert!(matches!(
            cache.get::<String>("n"),
            Err(SwapcacheError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_capacity_evicts_least_recently_current_only() {
        let mut cache = Swapcache::default();
        cache.set_capacity(Some(2));
        cache.set_current("a");
        cache.set("n", 1u32).unwrap();
        cache.set_current("b");
        cache.set_current("c");

        assert!(!cache.has_variant(&"a"));
        assert!(cache.has_variant(&"b"));
        assert!(cache.has_variant(&"c"));
        assert_eq!(cache.current(), Some(&"c"));
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut cache = Swapcache::default();
        for key in 0..100 {
            cache.set_current(key);
        }
        assert_eq!(cache.variant_count(), 100);
    }
}
