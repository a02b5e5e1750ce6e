//! # Post-hoc Composer
//!
//! Retrofits capabilities and method decoration onto an already-defined
//! type without touching it. Rust cannot synthesize nominal types at
//! runtime, so composition is a builder that produces a delegating wrapper:
//! [`Composer`] collects methods, around-layers, and capabilities, and
//! [`Composer::build`] yields a [`Composed`] value owning the base, a lazy
//! [`Extensions`] state store, and an explicit method table dispatched by
//! name with type-checked, `Any`-erased inputs and outputs.
//!
//! ## Method lookup precedence
//!
//! Explicitly registered methods (decorated or not) shadow
//! capability-installed methods. Among capabilities, the earliest attached
//! wins a contested name. Layers on one method run outermost-first in
//! `decorate` order. `build` rejects duplicate explicit registrations and
//! decoration of names that were never registered.
//!
//! The base type is never mutated: instances of it constructed before or
//! after composition carry none of the composed behavior or state.
//!
//! ```
//! use capkit::{Composer, SeedingCapability};
//!
//! struct Counter {
//!     calls: u32,
//! }
//!
//! let mut composed = Composer::new()
//!     .method("bump", |c: &mut Counter, _cx, by: u32| {
//!         c.calls += by;
//!         c.calls
//!     })
//!     .attach(SeedingCapability)
//!     .build(Counter { calls: 0 })
//!     .unwrap();
//!
//! let total: u32 = composed.call("bump", 2u32).unwrap();
//! assert_eq!(total, 2);
//! assert!(composed.has_method("last_seed"));
//! ```

use std::any::{type_name, Any};
use std::collections::HashMap;

use rand::rngs::StdRng;
use tracing::debug;

use crate::error::ComposeError;
use crate::progress::ProgressReporting;
use crate::seed::{SeedState, Seedable};
use crate::store::{Extensions, HasExtensions};
use crate::swapcache::Swapcacheable;
use crate::timing::Timeable;

// ============================================================================
// Type-Erased Method Machinery
// ============================================================================

/// A type-erased value crossing the dynamic dispatch boundary.
pub type BoxedAny = Box<dyn Any>;

/// A registered method: base value, capability state, erased input.
pub type MethodFn<B> =
    Box<dyn Fn(&mut B, &mut Extensions, BoxedAny) -> Result<BoxedAny, ComposeError>>;

/// An around-layer: runs bookkeeping before/after delegating to `inner`.
/// The layer owns the decision to call `inner` and must pass the erased
/// input through untouched.
pub type LayerFn<B> =
    Box<dyn Fn(&mut B, &mut Extensions, BoxedAny, &MethodFn<B>) -> Result<BoxedAny, ComposeError>>;

/// Per-call view handed to registered method bodies.
pub struct CallContext<'a> {
    ext: &'a mut Extensions,
}

impl CallContext<'_> {
    /// The instance's capability state store.
    pub fn extensions(&mut self) -> &mut Extensions {
        self.ext
    }

    /// The RNG of the innermost seeded layer wrapping this call.
    ///
    /// Fails with [`ComposeError::NoActiveRng`] when the method was not
    /// dispatched through a [`crate::seeded_layer`].
    pub fn rng(&mut self) -> Result<&mut StdRng, ComposeError> {
        self.ext
            .get_or_default::<SeedState>()
            .active_rng()
            .ok_or(ComposeError::NoActiveRng)
    }
}

/// Build a [`MethodFn`] from a typed closure.
///
/// Input and output are checked at the dispatch boundary; a mismatched
/// input fails with [`ComposeError::InputType`] naming the method. This is
/// the hook for writing custom [`ComposableCapability`] implementations.
pub fn typed_method<B, I, O>(
    name: impl Into<String>,
    f: impl Fn(&mut B, &mut CallContext<'_>, I) -> Result<O, ComposeError> + 'static,
) -> MethodFn<B>
where
    B: 'static,
    I: Any,
    O: Any,
{
    let name = name.into();
    Box::new(move |base, ext, input| {
        let input = input
            .downcast::<I>()
            .map_err(|_| ComposeError::InputType {
                method: name.clone(),
                expected: type_name::<I>(),
            })?;
        let mut cx = CallContext { ext };
        let out = f(base, &mut cx, *input)?;
        Ok(Box::new(out) as BoxedAny)
    })
}

// ============================================================================
// Method Table
// ============================================================================

/// Where a method table entry came from; determines lookup precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOrigin {
    /// Registered explicitly on the [`Composer`].
    Base,
    /// Installed by the named capability.
    Capability(&'static str),
}

struct MethodEntry<B> {
    body: MethodFn<B>,
    origin: MethodOrigin,
}

/// Name-keyed dispatch table of a composed wrapper.
pub struct MethodTable<B> {
    entries: HashMap<String, MethodEntry<B>>,
}

impl<B> Default for MethodTable<B> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<B: 'static> MethodTable<B> {
    /// Install a capability-provided method. Skipped when the name is
    /// already taken, which is what gives explicit registrations and
    /// earlier-attached capabilities precedence.
    pub fn provide(&mut self, capability: &'static str, name: &str, body: MethodFn<B>) {
        if self.entries.contains_key(name) {
            debug!(
                target: "capkit::compose",
                capability,
                name,
                "skipping capability method, name already taken"
            );
            return;
        }
        self.entries.insert(
            name.to_owned(),
            MethodEntry {
                body,
                origin: MethodOrigin::Capability(capability),
            },
        );
    }

    fn insert_base(&mut self, name: String, body: MethodFn<B>) -> Result<(), ComposeError> {
        if self.entries.contains_key(&name) {
            return Err(ComposeError::DuplicateMethod { name });
        }
        self.entries
            .insert(name, MethodEntry { body, origin: MethodOrigin::Base });
        Ok(())
    }

    fn wrap(&mut self, name: &str, layer: LayerFn<B>) -> Result<(), ComposeError> {
        let MethodEntry { body, origin } =
            self.entries
                .remove(name)
                .ok_or_else(|| ComposeError::DecorateUnknownMethod {
                    name: name.to_owned(),
                })?;
        let wrapped: MethodFn<B> =
            Box::new(move |base, ext, input| layer(base, ext, input, &body));
        self.entries
            .insert(name.to_owned(), MethodEntry { body: wrapped, origin });
        Ok(())
    }
}

// ============================================================================
// Composable Capabilities
// ============================================================================

/// A capability that can be attached to a composed wrapper, contributing
/// named methods to its dispatch table.
///
/// The built-in capabilities ([`crate::SeedingCapability`],
/// [`crate::TimingCapability`], [`crate::SwapcacheCapability`],
/// [`crate::ProgressCapability`]) install their accessors; custom
/// capabilities build entries with [`typed_method`] and
/// [`MethodTable::provide`].
pub trait ComposableCapability<B> {
    /// Name reported by [`Composed::capability_names`].
    fn capability_name(&self) -> &'static str;

    /// Install this capability's methods into the table.
    fn install(&self, table: &mut MethodTable<B>);
}

// ============================================================================
// Composer
// ============================================================================

/// Builder for a [`Composed`] wrapper around a base type.
pub struct Composer<B> {
    methods: Vec<(String, MethodFn<B>)>,
    layers: Vec<(String, LayerFn<B>)>,
    capabilities: Vec<Box<dyn ComposableCapability<B>>>,
}

impl<B: 'static> Default for Composer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: 'static> Composer<B> {
    /// Start an empty composition.
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            layers: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// Register a method of the base type under `name`.
    pub fn method<I, O>(
        self,
        name: &str,
        f: impl Fn(&mut B, &mut CallContext<'_>, I) -> O + 'static,
    ) -> Self
    where
        I: Any,
        O: Any,
    {
        self.try_method(
            name,
            move |base: &mut B, cx: &mut CallContext<'_>, input: I| Ok(f(base, cx, input)),
        )
    }

    /// Register a fallible method of the base type under `name`.
    pub fn try_method<I, O>(
        mut self,
        name: &str,
        f: impl Fn(&mut B, &mut CallContext<'_>, I) -> Result<O, ComposeError> + 'static,
    ) -> Self
    where
        I: Any,
        O: Any,
    {
        self.methods.push((name.to_owned(), typed_method(name, f)));
        self
    }

    /// Wrap the method registered under `name` in an around-layer. May be
    /// repeated; earlier decorations end up outermost.
    pub fn decorate(mut self, name: &str, layer: LayerFn<B>) -> Self {
        self.layers.push((name.to_owned(), layer));
        self
    }

    /// Attach a capability. Attach order is the precedence order for
    /// contested method names; re-attaching a capability is a no-op.
    pub fn attach(mut self, capability: impl ComposableCapability<B> + 'static) -> Self {
        self.capabilities.push(Box::new(capability));
        self
    }

    /// Assemble the wrapper around `base`.
    ///
    /// Validates the recipe: a duplicate explicit method name fails with
    /// [`ComposeError::DuplicateMethod`], and a decoration naming a method
    /// that was never registered fails with
    /// [`ComposeError::DecorateUnknownMethod`]. All capability state is
    /// lazily initialized on first use; no constructor chaining is needed.
    pub fn build(self, base: B) -> Result<Composed<B>, ComposeError> {
        let mut table = MethodTable::default();
        for (name, body) in self.methods {
            table.insert_base(name, body)?;
        }
        // Layers are applied innermost-first so the first `decorate` call
        // ends up outermost.
        for (name, layer) in self.layers.into_iter().rev() {
            table.wrap(&name, layer)?;
        }

        let mut capability_names: Vec<&'static str> = Vec::new();
        for capability in &self.capabilities {
            let name = capability.capability_name();
            if capability_names.contains(&name) {
                continue;
            }
            capability.install(&mut table);
            capability_names.push(name);
        }

        Ok(Composed {
            base,
            ext: Extensions::new(),
            table,
            capability_names,
        })
    }
}

// ============================================================================
// Composed
// ============================================================================

/// A base value wrapped with capabilities and a decorated method table.
///
/// All capability traits are implemented on the wrapper (with `String`
/// variant keys for the swapcache), so the typed capability APIs work
/// directly alongside the name-dispatched [`Self::call`] surface.
pub struct Composed<B> {
    base: B,
    ext: Extensions,
    table: MethodTable<B>,
    capability_names: Vec<&'static str>,
}

impl<B: 'static> Composed<B> {
    /// Invoke the method registered under `name` with a typed input,
    /// expecting a typed output.
    pub fn call<I, O>(&mut self, name: &str, input: I) -> Result<O, ComposeError>
    where
        I: Any,
        O: Any,
    {
        let entry = self
            .table
            .entries
            .get(name)
            .ok_or_else(|| ComposeError::UnknownMethod {
                name: name.to_owned(),
            })?;
        let out = (entry.body)(&mut self.base, &mut self.ext, Box::new(input))?;
        out.downcast::<O>()
            .map(|boxed| *boxed)
            .map_err(|_| ComposeError::OutputType {
                method: name.to_owned(),
                expected: type_name::<O>(),
            })
    }

    /// Like [`Self::call`], with an explicit seed consumed by the
    /// innermost seeded layer of this one call.
    pub fn call_with_seed<I, O>(
        &mut self,
        name: &str,
        seed: u64,
        input: I,
    ) -> Result<O, ComposeError>
    where
        I: Any,
        O: Any,
    {
        self.ext.get_or_default::<SeedState>().set_override(seed);
        let out = self.call(name, input);
        // If the method had no seeded layer the override must not leak
        // into a later call.
        self.ext.get_or_default::<SeedState>().clear_override();
        out
    }

    /// Whether a method is registered under `name`.
    pub fn has_method(&self, name: &str) -> bool {
        self.table.entries.contains_key(name)
    }

    /// Where the method registered under `name` came from.
    pub fn method_origin(&self, name: &str) -> Option<MethodOrigin> {
        self.table.entries.get(name).map(|entry| entry.origin)
    }

    /// Names of the attached capabilities, in attach order.
    pub fn capability_names(&self) -> &[&'static str] {
        &self.capability_names
    }

    /// Shared access to the wrapped base value.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Mutable access to the wrapped base value.
    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    /// Unwrap, discarding capability state and the method table.
    pub fn into_base(self) -> B {
        self.base
    }
}

impl<B> HasExtensions for Composed<B> {
    fn extensions(&self) -> &Extensions {
        &self.ext
    }

    fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.ext
    }
}

impl<B: 'static> Seedable for Composed<B> {}
impl<B: 'static> Timeable for Composed<B> {}
impl<B: 'static> ProgressReporting for Composed<B> {}

impl<B: 'static> Swapcacheable for Composed<B> {
    type Key = String;
}
