//! # Seeding Capability
//!
//! Reliable seeding for stochastic methods, usable both for one-off
//! reproduction of a single call (pass an explicit seed) and for whole-run
//! reproducibility (set a root seed once; every unseeded call derives a
//! fresh, reproducible seed from it).
//!
//! ## Derivation
//!
//! When a call supplies no seed, one is derived as
//!
//! ```text
//! derive_seed(parent, key, n) = splitmix64(parent ^ fnv1a(key) ^ n)
//! ```
//!
//! where `parent` is the innermost active seed if the call is nested inside
//! another seeded call, else the instance's root seed, and `n` is a
//! monotonically increasing per-key call counter. The scheme guarantees
//! that a fixed root seed and call sequence reproduce identical seeds,
//! that repeated calls under one key never reuse a seed, and that nested
//! calls chain off their enclosing call rather than clobbering it. FNV-1a
//! and splitmix64 are spelled out here (not delegated to `std`'s hashers)
//! so the derived values stay stable across platforms and compiler
//! releases.
//!
//! ## Usage
//!
//! ```
//! use capkit::{Extensions, HasExtensions, Seedable};
//! use rand::Rng;
//!
//! #[derive(Default)]
//! struct Sampler {
//!     ext: Extensions,
//! }
//!
//! impl HasExtensions for Sampler {
//!     fn extensions(&self) -> &Extensions {
//!         &self.ext
//!     }
//!     fn extensions_mut(&mut self) -> &mut Extensions {
//!         &mut self.ext
//!     }
//! }
//!
//! impl Seedable for Sampler {}
//!
//! impl Sampler {
//!     fn fit(&mut self, seed: Option<u64>) -> u64 {
//!         self.seeded("fit", seed, |_this, rng| rng.random())
//!     }
//! }
//!
//! let mut a = Sampler::default();
//! let mut b = Sampler::default();
//! a.set_root_seed(42);
//! b.set_root_seed(42);
//! assert_eq!(a.fit(None), b.fit(None));
//! assert_eq!(a.fit(None), b.fit(None));
//! assert_ne!(a.last_seed("fit"), None);
//! ```
//!
//! Single-threaded per instance: the active-seed stack is not designed for
//! concurrent mutation.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::compose::{typed_method, ComposableCapability, LayerFn, MethodTable};
use crate::store::HasExtensions;

// ============================================================================
// Derivation
// ============================================================================

/// FNV-1a over the key bytes. Inlined for cross-platform stability.
fn fnv1a(key: &str) -> u64 {
    let mut hash = 0xCBF29CE484222325u64;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001B3);
    }
    hash
}

/// splitmix64 finalizer: a full-avalanche mix of the combined inputs.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Derive a call seed from its parent seed, seed key, and per-key counter.
pub fn derive_seed(parent: u64, key: &str, counter: u64) -> u64 {
    splitmix64(parent ^ fnv1a(key) ^ counter)
}

// ============================================================================
// Seed State
// ============================================================================

/// One entry in the append-only seed history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRecord {
    /// The seed key the call was recorded under.
    pub key: String,
    /// The seed that was used.
    pub seed: u64,
    /// The per-key call counter at the time of the call (1-based).
    pub sequence: u64,
}

/// One frame of the active-seed stack.
struct ActiveSeed {
    seed: u64,
    /// Present only when a seeded dispatch layer owns the RNG for this
    /// frame; the static `seeded` path hands the RNG to the body directly.
    rng: Option<StdRng>,
}

/// Per-instance seeding bookkeeping.
///
/// Lives in the instance's [`crate::Extensions`] store and is created
/// lazily on first seeded call.
#[derive(Default)]
pub struct SeedState {
    root: Option<u64>,
    last: HashMap<String, u64>,
    history: Vec<SeedRecord>,
    counters: HashMap<String, u64>,
    active: Vec<ActiveSeed>,
    override_seed: Option<u64>,
}

impl SeedState {
    /// Set the root seed all unseeded derivations chain from.
    pub fn set_root(&mut self, seed: u64) {
        self.root = Some(seed);
    }

    /// The root seed, if one was ever set or lazily drawn.
    pub fn root(&self) -> Option<u64> {
        self.root
    }

    /// The most recent seed used under `key`.
    pub fn last_seed(&self, key: &str) -> Option<u64> {
        self.last.get(key).copied()
    }

    /// The full append-only seed history, oldest first.
    pub fn history(&self) -> &[SeedRecord] {
        &self.history
    }

    /// The seed of the innermost in-progress seeded call.
    pub fn active_seed(&self) -> Option<u64> {
        self.active.last().map(|frame| frame.seed)
    }

    /// Park a one-shot explicit seed, consumed by the next [`Self::begin`].
    ///
    /// This is how an explicit seed reaches a seeded dispatch layer, whose
    /// call surface is type-erased and has no seed parameter of its own.
    pub fn set_override(&mut self, seed: u64) {
        self.override_seed = Some(seed);
    }

    /// Drop an unconsumed override (the call had no seeded layer).
    pub fn clear_override(&mut self) {
        self.override_seed = None;
    }

    /// Enter a seeded region: resolve the seed, record it, and push it on
    /// the active stack. Returns the seed in effect for the region.
    ///
    /// A caller-supplied seed is used verbatim; it overwrites the per-key
    /// "last used" entry but history keeps every call. With no seed
    /// supplied, the seed is derived from the innermost active seed (or the
    /// root), the key, and the per-key call counter. A root that was never
    /// set is drawn from OS entropy on first use and recorded, so the run
    /// stays reproducible after the fact.
    pub fn begin(&mut self, key: &str, seed: Option<u64>) -> u64 {
        let explicit = seed.or_else(|| self.override_seed.take());
        let counter = self.counters.entry(key.to_owned()).or_insert(0);
        *counter += 1;
        let sequence = *counter;

        let seed = match explicit {
            Some(seed) => seed,
            None => {
                let parent = self.active.last().map(|frame| frame.seed);
                let parent = match parent {
                    Some(parent) => parent,
                    None => self.root_or_init(),
                };
                derive_seed(parent, key, sequence)
            }
        };

        debug!(target: "capkit::seed", key, seed, sequence, "entering seeded region");
        self.active.push(ActiveSeed { seed, rng: None });
        self.last.insert(key.to_owned(), seed);
        self.history.push(SeedRecord {
            key: key.to_owned(),
            seed,
            sequence,
        });
        seed
    }

    /// Leave the innermost seeded region, restoring the enclosing context.
    pub fn end(&mut self) {
        self.active.pop();
    }

    /// Attach an RNG to the innermost active frame (dispatch-layer path).
    pub(crate) fn attach_rng(&mut self, rng: StdRng) {
        if let Some(frame) = self.active.last_mut() {
            frame.rng = Some(rng);
        }
    }

    /// The RNG of the innermost frame that owns one.
    pub(crate) fn active_rng(&mut self) -> Option<&mut StdRng> {
        self.active
            .iter_mut()
            .rev()
            .find_map(|frame| frame.rng.as_mut())
    }

    fn root_or_init(&mut self) -> u64 {
        match self.root {
            Some(root) => root,
            None => {
                let root = rand::rng().random();
                debug!(target: "capkit::seed", root, "root seed drawn from entropy");
                self.root = Some(root);
                root
            }
        }
    }
}

// ============================================================================
// Seedable Trait
// ============================================================================

/// Deterministic seeding for stochastic methods.
///
/// Attach by implementing the (empty) trait on any [`HasExtensions`] type.
/// All state is created lazily on first use; a type that never calls a
/// seeded method carries no seeding state at all.
pub trait Seedable: HasExtensions {
    /// Set the root seed that unseeded derivations chain from.
    fn set_root_seed(&mut self, seed: u64) {
        self.extensions_mut().get_or_default::<SeedState>().set_root(seed);
    }

    /// The root seed, if one was ever set or lazily drawn.
    fn root_seed(&self) -> Option<u64> {
        self.extensions().get::<SeedState>().and_then(SeedState::root)
    }

    /// The most recent seed used under `key`, for reproducing a
    /// sub-computation in isolation.
    fn last_seed(&self, key: &str) -> Option<u64> {
        self.extensions()
            .get::<SeedState>()
            .and_then(|state| state.last_seed(key))
    }

    /// The append-only record of every seed ever used, oldest first.
    fn seed_history(&self) -> &[SeedRecord] {
        self.extensions()
            .get::<SeedState>()
            .map(SeedState::history)
            .unwrap_or(&[])
    }

    /// Record a seed under `key` without running a body. Returns the seed
    /// used (supplied verbatim, or derived).
    fn reseed(&mut self, key: &str, seed: Option<u64>) -> u64 {
        let state = self.extensions_mut().get_or_default::<SeedState>();
        let used = state.begin(key, seed);
        state.end();
        used
    }

    /// Run `body` inside a seeded region keyed by `key`.
    ///
    /// The body receives a `StdRng` initialized with the region's seed.
    /// The region's seed is pushed on the active stack for the duration of
    /// the call, so nested `seeded` calls derive from it; the prior context
    /// is restored on return, including when the body returns an `Err`
    /// (bookkeeping completes first, then the error propagates unchanged).
    fn seeded<T>(
        &mut self,
        key: &str,
        seed: Option<u64>,
        body: impl FnOnce(&mut Self, &mut StdRng) -> T,
    ) -> T
    where
        Self: Sized,
    {
        let used = self
            .extensions_mut()
            .get_or_default::<SeedState>()
            .begin(key, seed);
        let mut rng = StdRng::seed_from_u64(used);
        let out = body(self, &mut rng);
        self.extensions_mut().get_or_default::<SeedState>().end();
        out
    }
}

// ============================================================================
// Composer Integration
// ============================================================================

/// Seeding as a composable capability: installs a `"last_seed"` accessor
/// (`String -> Option<u64>`) into the composed method table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedingCapability;

impl<B: 'static> ComposableCapability<B> for SeedingCapability {
    fn capability_name(&self) -> &'static str {
        "seeding"
    }

    fn install(&self, table: &mut MethodTable<B>) {
        table.provide(
            "seeding",
            "last_seed",
            typed_method("last_seed", |_base: &mut B, cx, key: String| {
                Ok(cx
                    .extensions()
                    .get::<SeedState>()
                    .and_then(|state| state.last_seed(&key)))
            }),
        );
    }
}

/// An around-layer that runs the wrapped method inside a seeded region.
///
/// The region's RNG is reachable from the method body through
/// [`crate::CallContext::rng`]. An explicit seed injected with
/// [`crate::Composed::call_with_seed`] is consumed by the innermost seeded
/// layer of that call.
pub fn seeded_layer<B: 'static>(key: &str) -> LayerFn<B> {
    let key = key.to_owned();
    Box::new(move |base, ext, input, inner| {
        let state = ext.get_or_default::<SeedState>();
        let seed = state.begin(&key, None);
        state.attach_rng(StdRng::seed_from_u64(seed));
        let out = inner(base, ext, input);
        ext.get_or_default::<SeedState>().end();
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(derive_seed(42, "fit", 1), derive_seed(42, "fit", 1));
    }

    #[test]
    fn test_derivation_separates_keys_counters_and_parents() {
        let base = derive_seed(42, "fit", 1);
        assert_ne!(base, derive_seed(42, "fit", 2));
        assert_ne!(base, derive_seed(42, "transform", 1));
        assert_ne!(base, derive_seed(43, "fit", 1));
    }

    #[test]
    fn test_begin_uses_explicit_seed_verbatim() {
        let mut state = SeedState::default();
        assert_eq!(state.begin("fit", Some(7)), 7);
        state.end();
        assert_eq!(state.last_seed("fit"), Some(7));
    }

    #[test]
    fn test_history_is_append_only_while_last_overwrites() {
        let mut state = SeedState::default();
        state.begin("fit", Some(1));
        state.end();
        state.begin("fit", Some(2));
        state.end();

        assert_eq!(state.last_seed("fit"), Some(2));
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[0].seed, 1);
        assert_eq!(state.history()[1].seed, 2);
        assert_eq!(state.history()[1].sequence, 2);
    }

    #[test]
    fn test_nested_regions_chain_off_active_seed() {
        let mut state = SeedState::default();
        state.set_root(42);

        let outer = state.begin("outer", None);
        let inner = state.begin("inner", None);
        state.end();
        state.end();

        assert_eq!(inner, derive_seed(outer, "inner", 1));
        assert_ne!(inner, outer);
    }

    #[test]
    fn test_unset_root_is_drawn_once_and_recorded() {
        let mut state = SeedState::default();
        assert_eq!(state.root(), None);
        state.begin("fit", None);
        state.end();
        let root = state.root().expect("root initialized on first use");
        state.begin("fit", None);
        state.end();
        assert_eq!(state.root(), Some(root));
    }
}
