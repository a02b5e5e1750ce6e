//! # Timing Capability
//!
//! Wall-clock profiling of methods and named blocks. Every timed call
//! appends one duration sample to a per-key log; the log is cumulative
//! across the instance's lifetime and never edited retroactively. A failing
//! body still gets its sample recorded before the error propagates, so the
//! profile never under-counts.
//!
//! ```
//! use std::time::Duration;
//!
//! use capkit::{Extensions, HasExtensions, Timeable};
//!
//! #[derive(Default)]
//! struct Worker {
//!     ext: Extensions,
//! }
//!
//! impl HasExtensions for Worker {
//!     fn extensions(&self) -> &Extensions {
//!         &self.ext
//!     }
//!     fn extensions_mut(&mut self) -> &mut Extensions {
//!         &mut self.ext
//!     }
//! }
//!
//! impl Timeable for Worker {}
//!
//! let mut w = Worker::default();
//! w.timed("step", |_this| std::thread::sleep(Duration::from_millis(1)));
//! w.timed("step", |_this| ());
//!
//! let profile = w.profile("step").unwrap();
//! assert_eq!(profile.count, 2);
//! assert!(profile.max >= profile.min);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::compose::{typed_method, ComposableCapability, LayerFn, MethodTable};
use crate::error::TimingError;
use crate::store::HasExtensions;

// ============================================================================
// Timing Log
// ============================================================================

/// Per-instance duration log: timer key to append-only samples.
#[derive(Default, Debug, Clone)]
pub struct TimingLog {
    samples: HashMap<String, Vec<Duration>>,
}

impl TimingLog {
    /// Append one sample under `key`.
    pub fn record(&mut self, key: &str, duration: Duration) {
        debug!(target: "capkit::timing", key, ?duration, "recorded sample");
        self.samples.entry(key.to_owned()).or_default().push(duration);
    }

    /// All samples recorded under `key`, in call order.
    pub fn times_for(&self, key: &str) -> Result<&[Duration], TimingError> {
        self.samples
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| TimingError::UnknownKey { key: key.to_owned() })
    }

    /// Profile of the samples recorded under `key`.
    pub fn profile(&self, key: &str) -> Result<Profile, TimingError> {
        Profile::from_samples(self.times_for(key)?)
            .ok_or_else(|| TimingError::UnknownKey { key: key.to_owned() })
    }

    /// Profiles for every key with at least one sample, ordered by key.
    pub fn profiles(&self) -> BTreeMap<String, Profile> {
        self.samples
            .iter()
            .filter_map(|(key, samples)| {
                Profile::from_samples(samples).map(|p| (key.clone(), p))
            })
            .collect()
    }
}

// ============================================================================
// Profile
// ============================================================================

/// Summary statistics over one timer key's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    /// Number of samples (equals the number of timed calls).
    pub count: usize,
    /// Sum of all samples.
    pub total: Duration,
    /// Arithmetic mean.
    pub mean: Duration,
    /// Smallest sample.
    pub min: Duration,
    /// Largest sample.
    pub max: Duration,
}

impl Profile {
    fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        let mut min = samples[0];
        let mut max = samples[0];
        for sample in samples {
            min = min.min(*sample);
            max = max.max(*sample);
        }
        Some(Self {
            count: samples.len(),
            total,
            mean: total / samples.len() as u32,
            min,
            max,
        })
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count > 1 {
            write!(f, "{} (x{})", human_duration(self.mean), self.count)
        } else {
            write!(f, "{}", human_duration(self.mean))
        }
    }
}

/// Unit ladder for duration formatting: how many of this unit make one of
/// the next.
const CUTOFFS_AND_UNITS: &[(f64, &str)] = &[
    (1000.0, "μs"),
    (1000.0, "ms"),
    (60.0, "s"),
    (60.0, "min"),
    (24.0, "h"),
    (7.0, "days"),
];

/// Render a duration in the largest unit that keeps the value above one.
pub fn human_duration(duration: Duration) -> String {
    let mut value = duration.as_secs_f64() * 1e6;
    for (cutoff, unit) in CUTOFFS_AND_UNITS {
        if value < *cutoff {
            return format!("{value:.1} {unit}");
        }
        value /= cutoff;
    }
    format!("{value:.1} weeks")
}

fn render_summary(profiles: &BTreeMap<String, Profile>) -> String {
    let mut rows: Vec<(&String, &Profile)> = profiles.iter().collect();
    rows.sort_by_key(|(_, p)| p.total);

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (key, profile) in rows {
        out.push_str(&format!("{key:width$}  {profile}\n"));
    }
    out
}

// ============================================================================
// Timeable Trait
// ============================================================================

/// Wall-clock profiling for methods and named blocks.
///
/// Attach by implementing the (empty) trait on any [`HasExtensions`] type.
pub trait Timeable: HasExtensions {
    /// Run `body`, recording its wall-clock duration under `key`.
    ///
    /// Exactly one sample is recorded per call, whether the body succeeds
    /// or returns an `Err`; a body's error propagates unchanged after the
    /// sample is recorded. Nested timed calls record independently.
    fn timed<T>(&mut self, key: &str, body: impl FnOnce(&mut Self) -> T) -> T
    where
        Self: Sized,
    {
        let start = Instant::now();
        let out = body(self);
        let elapsed = start.elapsed();
        self.extensions_mut()
            .get_or_default::<TimingLog>()
            .record(key, elapsed);
        out
    }

    /// Samples recorded under `key`, in call order.
    fn times_for(&self, key: &str) -> Result<Vec<Duration>, TimingError> {
        match self.extensions().get::<TimingLog>() {
            Some(log) => log.times_for(key).map(<[Duration]>::to_vec),
            None => Err(TimingError::UnknownKey { key: key.to_owned() }),
        }
    }

    /// Profile of the samples recorded under `key`. Fails with
    /// [`TimingError::UnknownKey`] for a key that never recorded a sample.
    fn profile(&self, key: &str) -> Result<Profile, TimingError> {
        match self.extensions().get::<TimingLog>() {
            Some(log) => log.profile(key),
            None => Err(TimingError::UnknownKey { key: key.to_owned() }),
        }
    }

    /// Profiles for every key with at least one sample, ordered by key.
    fn profile_durations(&self) -> BTreeMap<String, Profile> {
        self.extensions()
            .get::<TimingLog>()
            .map(TimingLog::profiles)
            .unwrap_or_default()
    }

    /// Human-readable profile table: keys aligned, cheapest first.
    fn profile_summary(&self) -> String {
        render_summary(&self.profile_durations())
    }
}

// ============================================================================
// Composer Integration
// ============================================================================

/// Timing as a composable capability: installs `"profile"`
/// (`String -> Profile`) and `"profile_summary"` (`() -> String`) into the
/// composed method table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingCapability;

impl<B: 'static> ComposableCapability<B> for TimingCapability {
    fn capability_name(&self) -> &'static str {
        "timing"
    }

    fn install(&self, table: &mut MethodTable<B>) {
        table.provide(
            "timing",
            "profile",
            typed_method("profile", |_base: &mut B, cx, key: String| {
                match cx.extensions().get::<TimingLog>() {
                    Some(log) => Ok(log.profile(&key)?),
                    None => Err(TimingError::UnknownKey { key }.into()),
                }
            }),
        );
        table.provide(
            "timing",
            "profile_summary",
            typed_method("profile_summary", |_base: &mut B, cx, (): ()| {
                let profiles = cx
                    .extensions()
                    .get::<TimingLog>()
                    .map(TimingLog::profiles)
                    .unwrap_or_default();
                Ok(render_summary(&profiles))
            }),
        );
    }
}

/// An around-layer that records the wrapped method's wall-clock duration.
pub fn timed_layer<B: 'static>(key: &str) -> LayerFn<B> {
    let key = key.to_owned();
    Box::new(move |base, ext, input, inner| {
        let start = Instant::now();
        let out = inner(base, ext, input);
        ext.get_or_default::<TimingLog>().record(&key, start.elapsed());
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_duration_unit_ladder() {
        assert_eq!(human_duration(Duration::from_micros(500)), "500.0 μs");
        assert_eq!(human_duration(Duration::from_millis(1000)), "1.0 s");
        assert_eq!(human_duration(Duration::from_secs(720)), "12.0 min");
        assert_eq!(human_duration(Duration::from_secs(3600)), "1.0 h");
    }

    #[test]
    fn test_profile_statistics() {
        let mut log = TimingLog::default();
        log.record("fit", Duration::from_millis(10));
        log.record("fit", Duration::from_millis(30));

        let profile = log.profile("fit").unwrap();
        assert_eq!(profile.count, 2);
        assert_eq!(profile.total, Duration::from_millis(40));
        assert_eq!(profile.mean, Duration::from_millis(20));
        assert_eq!(profile.min, Duration::from_millis(10));
        assert_eq!(profile.max, Duration::from_millis(30));
    }

    #[test]
    fn test_profile_unknown_key_is_an_error() {
        let log = TimingLog::default();
        assert!(matches!(
            log.profile("never"),
            Err(TimingError::UnknownKey { .. })
        ));
    }
}
