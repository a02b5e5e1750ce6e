//! Post-hoc composer tests:
//! - Dispatch with type-checked erased inputs/outputs
//! - Build-time validation of the composition recipe
//! - Documented precedence: explicit methods shadow capability methods,
//!   earlier-attached capabilities shadow later ones
//! - Seeded/timed layers reproduce the definition-time capability
//!   behavior on a type that never opted in

use capkit::{
    seeded_layer, timed_layer, typed_method, ComposableCapability, ComposeError, Composer,
    MethodOrigin, MethodTable, Profile, Seedable, SeedingCapability, Swapcacheable, Timeable,
    TimingCapability,
};

/// A plain type with no capability impls at all.
struct Estimator {
    threshold: f64,
    fits: u32,
}

impl Estimator {
    fn new() -> Self {
        Self {
            threshold: 0.5,
            fits: 0,
        }
    }
}

fn composed_estimator() -> capkit::Composed<Estimator> {
    Composer::new()
        .method("fit", |e: &mut Estimator, cx, samples: u32| {
            e.fits += 1;
            let rng = cx.rng().expect("fit is dispatched through a seeded layer");
            use rand::Rng;
            let noise: f64 = rng.random();
            e.threshold = noise / f64::from(samples.max(1));
            e.threshold
        })
        .method("score", |e: &mut Estimator, _cx, (): ()| e.threshold)
        .decorate("fit", seeded_layer("fit"))
        .decorate("fit", timed_layer("fit"))
        .attach(SeedingCapability)
        .attach(TimingCapability)
        .build(Estimator::new())
        .unwrap()
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn calls_dispatch_with_typed_values() {
    let mut composed = Composer::new()
        .method("double", |_e: &mut Estimator, _cx, x: u32| x * 2)
        .build(Estimator::new())
        .unwrap();

    let out: u32 = composed.call("double", 21u32).unwrap();
    assert_eq!(out, 42);
}

#[test]
fn unknown_method_fails() {
    let mut composed = Composer::<Estimator>::new().build(Estimator::new()).unwrap();
    let result: Result<u32, _> = composed.call("absent", 1u32);
    assert!(matches!(result, Err(ComposeError::UnknownMethod { .. })));
}

#[test]
fn mismatched_input_type_fails() {
    let mut composed = Composer::new()
        .method("double", |_e: &mut Estimator, _cx, x: u32| x * 2)
        .build(Estimator::new())
        .unwrap();

    let result: Result<u32, _> = composed.call("double", "twenty-one");
    assert!(matches!(result, Err(ComposeError::InputType { .. })));
}

#[test]
fn mismatched_output_type_fails() {
    let mut composed = Composer::new()
        .method("double", |_e: &mut Estimator, _cx, x: u32| x * 2)
        .build(Estimator::new())
        .unwrap();

    let result: Result<String, _> = composed.call("double", 21u32);
    assert!(matches!(result, Err(ComposeError::OutputType { .. })));
}

#[test]
fn base_value_stays_reachable() {
    let mut composed = composed_estimator();
    composed.call::<u32, f64>("fit", 10u32).unwrap();
    assert_eq!(composed.base().fits, 1);

    let estimator = composed.into_base();
    assert_eq!(estimator.fits, 1);
}

// ============================================================================
// Build Validation
// ============================================================================

#[test]
fn duplicate_method_names_are_rejected() {
    let result = Composer::new()
        .method("fit", |_e: &mut Estimator, _cx, (): ()| 0u32)
        .method("fit", |_e: &mut Estimator, _cx, (): ()| 1u32)
        .build(Estimator::new());
    assert!(matches!(result, Err(ComposeError::DuplicateMethod { .. })));
}

#[test]
fn decorating_an_unregistered_method_is_rejected() {
    let result = Composer::new()
        .method("fit", |_e: &mut Estimator, _cx, (): ()| 0u32)
        .decorate("transform", timed_layer("transform"))
        .build(Estimator::new());
    assert!(matches!(
        result,
        Err(ComposeError::DecorateUnknownMethod { .. })
    ));
}

// ============================================================================
// Non-Mutation of the Base Type
// ============================================================================

#[test]
fn composing_leaves_the_base_type_untouched() {
    let _composed = composed_estimator();

    // An Estimator built directly has none of the composed behavior or
    // state: same fields, nothing else to observe.
    let plain = Estimator::new();
    assert_eq!(plain.fits, 0);
    assert_eq!(plain.threshold, 0.5);
}

// ============================================================================
// Precedence
// ============================================================================

struct NamedCapability {
    name: &'static str,
}

impl ComposableCapability<Estimator> for NamedCapability {
    fn capability_name(&self) -> &'static str {
        self.name
    }

    fn install(&self, table: &mut MethodTable<Estimator>) {
        let name = self.name;
        table.provide(
            self.name,
            "whoami",
            typed_method("whoami", move |_e: &mut Estimator, _cx, (): ()| {
                Ok(name.to_owned())
            }),
        );
    }
}

#[test]
fn explicit_methods_shadow_capability_methods() {
    let mut composed = Composer::new()
        .method("whoami", |_e: &mut Estimator, _cx, (): ()| {
            "explicit".to_owned()
        })
        .attach(NamedCapability { name: "first" })
        .build(Estimator::new())
        .unwrap();

    let who: String = composed.call("whoami", ()).unwrap();
    assert_eq!(who, "explicit");
    assert_eq!(composed.method_origin("whoami"), Some(MethodOrigin::Base));
}

#[test]
fn earliest_attached_capability_wins_contested_names() {
    let mut composed = Composer::new()
        .attach(NamedCapability { name: "first" })
        .attach(NamedCapability { name: "second" })
        .build(Estimator::new())
        .unwrap();

    let who: String = composed.call("whoami", ()).unwrap();
    assert_eq!(who, "first");
    assert_eq!(
        composed.method_origin("whoami"),
        Some(MethodOrigin::Capability("first"))
    );
    assert_eq!(composed.capability_names(), &["first", "second"]);
}

#[test]
fn layers_run_outermost_first_in_decorate_order() {
    #[derive(Default)]
    struct Trace(Vec<&'static str>);

    fn tracing_layer(tag: &'static str) -> capkit::LayerFn<Estimator> {
        Box::new(move |base, ext, input, inner| {
            ext.get_or_default::<Trace>().0.push(tag);
            inner(base, ext, input)
        })
    }

    let mut composed = Composer::new()
        .method("fit", |_e: &mut Estimator, _cx, (): ()| ())
        .decorate("fit", tracing_layer("outer"))
        .decorate("fit", tracing_layer("inner"))
        .build(Estimator::new())
        .unwrap();

    composed.call::<(), ()>("fit", ()).unwrap();
    use capkit::HasExtensions;
    let trace = composed.extensions().get::<Trace>().unwrap();
    assert_eq!(trace.0, vec!["outer", "inner"]);
}

// ============================================================================
// Seeded and Timed Layers
// ============================================================================

#[test]
fn seeded_dispatch_reproduces_with_a_fixed_root() {
    let run = || {
        let mut composed = composed_estimator();
        composed.set_root_seed(42);
        let first: f64 = composed.call("fit", 100u32).unwrap();
        let second: f64 = composed.call("fit", 100u32).unwrap();
        (first, second, composed.last_seed("fit").unwrap())
    };

    let (a1, a2, a_seed) = run();
    let (b1, b2, b_seed) = run();
    assert_eq!(a1, b1);
    assert_eq!(a2, b2);
    assert_eq!(a_seed, b_seed);
    assert_ne!(a1, a2);
}

#[test]
fn call_with_seed_is_used_verbatim() {
    let mut composed = composed_estimator();
    let first: f64 = composed.call_with_seed("fit", 7, 100u32).unwrap();
    assert_eq!(composed.last_seed("fit"), Some(7));

    // The same explicit seed reproduces the same draw.
    let mut other = composed_estimator();
    let second: f64 = other.call_with_seed("fit", 7, 100u32).unwrap();
    assert_eq!(first, second);
}

#[test]
fn timed_dispatch_profiles_every_call() {
    let mut composed = composed_estimator();
    composed.call::<u32, f64>("fit", 10u32).unwrap();
    composed.call::<u32, f64>("fit", 10u32).unwrap();

    assert_eq!(composed.profile("fit").unwrap().count, 2);

    // The timing accessor installed by the capability agrees.
    let profile: Profile = composed.call("profile", "fit".to_owned()).unwrap();
    assert_eq!(profile.count, 2);
}

#[test]
fn rng_outside_a_seeded_layer_is_an_error() {
    let mut composed = Composer::new()
        .try_method("draw", |_e: &mut Estimator, cx, (): ()| {
            cx.rng().map(|_rng| ())
        })
        .build(Estimator::new())
        .unwrap();

    let result: Result<(), _> = composed.call("draw", ());
    assert!(matches!(result, Err(ComposeError::NoActiveRng)));
}

#[test]
fn capability_accessor_errors_pass_through() {
    let mut composed = composed_estimator();
    let result: Result<Profile, _> = composed.call("profile", "never".to_owned());
    assert!(matches!(result, Err(ComposeError::Timing(_))));
}

// ============================================================================
// Capability Trait Surface on the Wrapper
// ============================================================================

#[test]
fn the_wrapper_carries_the_typed_capability_surface() {
    let mut composed = composed_estimator();

    composed.set_variant("bigram".to_owned());
    composed.set_cached("vocab_size", 120usize).unwrap();
    composed.set_variant("unigram".to_owned());
    assert!(composed.cached::<usize>("vocab_size").is_err());
    composed.set_variant("bigram".to_owned());
    assert_eq!(composed.cached::<usize>("vocab_size").unwrap(), &120);

    composed.timed("flush", |_c| ());
    assert_eq!(composed.profile("flush").unwrap().count, 1);
}
