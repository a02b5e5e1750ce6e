//! Swapcache capability tests:
//! - Variant isolation: values stored under one key survive switches and
//!   never leak into other variants
//! - Read-before-write fails with a distinguishable condition
//! - Memoization avoids recomputation across variant switches

use capkit::{Extensions, HasExtensions, Swapcacheable, SwapcacheError};

#[derive(Default)]
struct Vectorizer {
    ext: Extensions,
    fit_count: u32,
}

impl HasExtensions for Vectorizer {
    fn extensions(&self) -> &Extensions {
        &self.ext
    }
    fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.ext
    }
}

impl Swapcacheable for Vectorizer {
    type Key = String;
}

impl Vectorizer {
    fn variant(&mut self, name: &str) {
        self.set_variant(name.to_owned());
    }
}

#[test]
fn values_are_isolated_per_variant() {
    let mut v = Vectorizer::default();

    v.variant("A");
    v.set_cached("ngram_range", (1u32, 2u32)).unwrap();

    v.variant("B");
    assert!(matches!(
        v.cached::<(u32, u32)>("ngram_range"),
        Err(SwapcacheError::NotComputed { .. })
    ));
    v.set_cached("ngram_range", (1u32, 1u32)).unwrap();

    v.variant("A");
    assert_eq!(v.cached::<(u32, u32)>("ngram_range").unwrap(), &(1, 2));

    v.variant("B");
    assert_eq!(v.cached::<(u32, u32)>("ngram_range").unwrap(), &(1, 1));
}

#[test]
fn switching_back_returns_the_value_unchanged() {
    let mut v = Vectorizer::default();
    v.variant("k1");
    v.set_cached("vocab", vec!["a".to_owned(), "b".to_owned()])
        .unwrap();

    v.variant("k2");
    v.variant("k1");
    assert_eq!(
        v.cached::<Vec<String>>("vocab").unwrap(),
        &vec!["a".to_owned(), "b".to_owned()]
    );
}

#[test]
fn reading_before_any_variant_fails() {
    let v = Vectorizer::default();
    assert!(matches!(
        v.cached::<u32>("ngram_range"),
        Err(SwapcacheError::NoVariant)
    ));
}

#[test]
fn writing_before_any_variant_fails() {
    let mut v = Vectorizer::default();
    assert!(matches!(
        v.set_cached("ngram_range", 1u32),
        Err(SwapcacheError::NoVariant)
    ));
}

#[test]
fn read_before_write_is_not_computed_not_a_default() {
    let mut v = Vectorizer::default();
    v.variant("A");
    let err = v.cached::<u32>("max_features").unwrap_err();
    assert!(matches!(err, SwapcacheError::NotComputed { .. }));
}

#[test]
fn wrong_typed_read_is_distinguishable() {
    let mut v = Vectorizer::default();
    v.variant("A");
    v.set_cached("max_features", 500u32).unwrap();
    assert!(matches!(
        v.cached::<String>("max_features"),
        Err(SwapcacheError::TypeMismatch { .. })
    ));
}

#[test]
fn current_variant_tracks_switches() {
    let mut v = Vectorizer::default();
    assert_eq!(v.current_variant(), None);

    v.variant("A");
    assert_eq!(v.current_variant(), Some(&"A".to_owned()));
    assert!(v.has_variant(&"A".to_owned()));
    assert!(!v.has_variant(&"B".to_owned()));
}

#[test]
fn memoization_computes_once_per_variant() {
    let mut v = Vectorizer::default();

    v.variant("A");
    let first = *v
        .cached_or_insert_with("fit_count", |this| {
            this.fit_count += 1;
            this.fit_count
        })
        .unwrap();
    let second = *v
        .cached_or_insert_with("fit_count", |this| {
            this.fit_count += 1;
            this.fit_count
        })
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 1);

    // A new variant has to derive its own value.
    v.variant("B");
    let third = *v
        .cached_or_insert_with("fit_count", |this| {
            this.fit_count += 1;
            this.fit_count
        })
        .unwrap();
    assert_eq!(third, 2);

    // Back on A, the original value is still there.
    v.variant("A");
    assert_eq!(v.cached::<u32>("fit_count").unwrap(), &1);
}

#[test]
fn capacity_bounds_stored_variants() {
    let mut v = Vectorizer::default();
    v.set_variant_capacity(Some(2));

    v.variant("A");
    v.variant("B");
    v.variant("C");

    assert!(!v.has_variant(&"A".to_owned()));
    assert!(v.has_variant(&"B".to_owned()));
    assert_eq!(v.current_variant(), Some(&"C".to_owned()));
}
