//! # Progress Reporting Capability
//!
//! Wraps a sized iterable so its consumption emits coarse progress events
//! through `tracing`. The wrapping is bypassed entirely when the instance's
//! progress toggle is off or the iterable is shorter than the configured
//! threshold, and it is lazy: nothing is consumed until the caller
//! iterates.
//!
//! This capability reports; it does not render. Hook a `tracing`
//! subscriber to turn the events into whatever cosmetics the application
//! wants.

use tracing::info;

use crate::compose::{typed_method, ComposableCapability, MethodTable};
use crate::store::HasExtensions;

/// Per-instance progress configuration.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Master toggle. Disabled means every wrap is a pass-through.
    pub enabled: bool,
    /// Iterables with `len <= min_len` are passed through unwrapped.
    pub min_len: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_len: 3,
        }
    }
}

struct Meter {
    label: String,
    total: usize,
    done: usize,
    next_report: usize,
    step: usize,
}

impl Meter {
    fn new(label: &str, total: usize) -> Self {
        let step = (total / 10).max(1);
        Self {
            label: label.to_owned(),
            total,
            done: 0,
            next_report: step,
            step,
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        if self.done >= self.next_report || self.done == self.total {
            info!(
                target: "capkit::progress",
                label = %self.label,
                done = self.done,
                total = self.total,
                "progress"
            );
            self.next_report = self.done + self.step;
        }
    }
}

/// A lazy iterator wrapper that reports consumption progress.
///
/// Produced by [`ProgressReporting::progress`]. When reporting is bypassed
/// the wrapper is a zero-state pass-through.
pub struct ProgressIter<I> {
    inner: I,
    meter: Option<Meter>,
}

impl<I> ProgressIter<I> {
    /// Whether this wrapper actually reports (false when bypassed).
    pub fn is_reporting(&self) -> bool {
        self.meter.is_some()
    }
}

impl<I: Iterator> Iterator for ProgressIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next();
        if let Some(meter) = &mut self.meter {
            if item.is_some() {
                meter.tick();
            }
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<I: ExactSizeIterator> ExactSizeIterator for ProgressIter<I> {}

/// Progress reporting over sized iterables.
///
/// Attach by implementing the (empty) trait on any [`HasExtensions`] type.
pub trait ProgressReporting: HasExtensions {
    /// Wrap `iter` so consuming it reports progress under `label`.
    ///
    /// Bypassed (plain pass-through, no reporting state) when progress is
    /// disabled for this instance or the iterable's length is at or below
    /// the threshold. The underlying iterable is not touched until the
    /// result is iterated.
    fn progress<I>(&self, label: &str, iter: I) -> ProgressIter<I::IntoIter>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
    {
        let config = self
            .extensions()
            .get::<ProgressConfig>()
            .cloned()
            .unwrap_or_default();
        let inner = iter.into_iter();
        let total = inner.len();
        let meter = if config.enabled && total > config.min_len {
            Some(Meter::new(label, total))
        } else {
            None
        };
        ProgressIter { inner, meter }
    }

    /// Toggle progress reporting for this instance.
    fn set_progress_enabled(&mut self, enabled: bool) {
        self.extensions_mut()
            .get_or_default::<ProgressConfig>()
            .enabled = enabled;
    }

    /// Set the length at or below which wrapping is bypassed.
    fn set_progress_threshold(&mut self, min_len: usize) {
        self.extensions_mut()
            .get_or_default::<ProgressConfig>()
            .min_len = min_len;
    }

    /// Whether progress reporting is currently enabled.
    fn progress_enabled(&self) -> bool {
        self.extensions()
            .get::<ProgressConfig>()
            .map(|config| config.enabled)
            .unwrap_or(true)
    }
}

// ============================================================================
// Composer Integration
// ============================================================================

/// Progress reporting as a composable capability: installs a
/// `"set_progress_enabled"` method (`bool -> ()`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressCapability;

impl<B: 'static> ComposableCapability<B> for ProgressCapability {
    fn capability_name(&self) -> &'static str {
        "progress"
    }

    fn install(&self, table: &mut MethodTable<B>) {
        table.provide(
            "progress",
            "set_progress_enabled",
            typed_method("set_progress_enabled", |_base: &mut B, cx, enabled: bool| {
                cx.extensions()
                    .get_or_default::<ProgressConfig>()
                    .enabled = enabled;
                Ok(())
            }),
        );
    }
}
