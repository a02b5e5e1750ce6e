//! # capkit - Per-Instance Capability Traits
//!
//! Reusable cross-cutting behaviors for arbitrary types, without a common
//! base class:
//!
//! - **Seeding**: deterministic, nestable seeding of stochastic methods
//!   with per-key history ([`Seedable`])
//! - **Timing**: cumulative wall-clock profiling of methods and blocks
//!   ([`Timeable`])
//! - **Swapcache**: memoized attribute surfaces keyed by configuration
//!   variant ([`Swapcacheable`])
//! - **Persistence**: serde-backed save/load with atomic file publication
//!   ([`Saveable`])
//! - **Progress**: lazy, bypassable progress reporting over sized
//!   iterables ([`ProgressReporting`])
//! - **Composition**: retrofit any of the above, plus around-layer method
//!   decoration, onto an existing type without modifying it ([`Composer`])
//!
//! ## Design Philosophy
//!
//! Each capability is a trait whose behavior ships entirely as default
//! methods over one state handle: a type embeds an [`Extensions`] store,
//! implements [`HasExtensions`] (two accessors), and opts into capabilities
//! with empty `impl` blocks. All capability state is lazily initialized,
//! namespaced by its Rust type, and private to the instance; a capability
//! that is never used costs nothing and changes nothing.
//!
//! Wrappers never alter what they wrap: a seeded or timed body's error
//! propagates unchanged after bookkeeping completes, and a disabled
//! progress wrap is a plain pass-through.
//!
//! All operations are synchronous and single-threaded per instance;
//! sharing an instance across threads requires external synchronization.

pub mod compose;
pub mod error;
pub mod progress;
pub mod saveable;
pub mod seed;
pub mod store;
pub mod swapcache;
pub mod timing;

// Re-export the working surface at the crate root.
pub use compose::{
    typed_method, BoxedAny, CallContext, ComposableCapability, Composed, Composer, LayerFn,
    MethodFn, MethodOrigin, MethodTable,
};
pub use error::{ComposeError, SaveError, SwapcacheError, TimingError};
pub use progress::{ProgressCapability, ProgressConfig, ProgressIter, ProgressReporting};
pub use saveable::Saveable;
pub use seed::{derive_seed, seeded_layer, SeedRecord, SeedState, Seedable, SeedingCapability};
pub use store::{Extensions, HasExtensions};
pub use swapcache::{Swapcache, SwapcacheCapability, Swapcacheable};
pub use timing::{
    human_duration, timed_layer, Profile, Timeable, TimingCapability, TimingLog,
};
