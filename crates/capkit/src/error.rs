//! # Error Types
//!
//! Every capability surfaces its misuse conditions as a dedicated enum so
//! callers can match on exactly what went wrong. Nothing here is ever used
//! to smuggle a default value back to the caller: reading a cache slot that
//! was never computed, profiling a timer that never ran, or loading a blob
//! with the wrong shape all fail loudly.
//!
//! Errors raised *inside* a wrapped user body are never touched by the
//! wrappers in this crate; they propagate unchanged after bookkeeping
//! completes.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the timing capability.
#[derive(Debug, Error)]
pub enum TimingError {
    /// A profile was requested for a key that never recorded a sample.
    #[error("no durations recorded under timer key {key:?}")]
    UnknownKey { key: String },
}

/// Errors from the swapcache capability.
#[derive(Debug, Error)]
pub enum SwapcacheError {
    /// No variant has been made current yet (`set_variant` never called).
    #[error("no current variant: call set_variant before touching cached attributes")]
    NoVariant,

    /// The attribute has never been set under the current variant.
    ///
    /// This is the signal to the caller that the value must be (re)derived
    /// for this variant; it is never answered with a stale value from a
    /// different variant.
    #[error("attribute {attr:?} not computed for the current variant")]
    NotComputed { attr: String },

    /// The attribute is stored under the current variant, but with a
    /// different type than the one requested.
    #[error("attribute {attr:?} is not a {expected}")]
    TypeMismatch {
        attr: String,
        expected: &'static str,
    },
}

/// Errors from the saveable capability.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The underlying I/O operation failed. Propagated untranslated.
    #[error("i/o failure during save/load")]
    Io(#[from] std::io::Error),

    /// The instance could not be serialized.
    #[error("state could not be serialized")]
    Encode(#[source] serde_json::Error),

    /// The blob's shape does not match the expected state schema.
    #[error("blob format/version mismatch")]
    Format(#[source] serde_json::Error),

    /// `save_new` refused to overwrite an existing file.
    #[error("refusing to overwrite existing file {path:?}")]
    AlreadyExists { path: PathBuf },
}

/// Errors from the post-hoc composer's dynamic dispatch surface.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// No method registered under this name.
    #[error("no method named {name:?}")]
    UnknownMethod { name: String },

    /// Two explicit registrations used the same method name.
    #[error("method {name:?} registered twice")]
    DuplicateMethod { name: String },

    /// A decoration referenced a method name that was never registered.
    #[error("cannot decorate unknown method {name:?}")]
    DecorateUnknownMethod { name: String },

    /// The input value passed to `call` does not match the registered
    /// method's input type.
    #[error("method {method:?} expects input of type {expected}")]
    InputType {
        method: String,
        expected: &'static str,
    },

    /// The output type requested from `call` does not match what the
    /// method produced.
    #[error("method {method:?} does not produce output of type {expected}")]
    OutputType {
        method: String,
        expected: &'static str,
    },

    /// `CallContext::rng` was used outside any seeded layer.
    #[error("no seeded layer is active on this call")]
    NoActiveRng,

    /// A capability-provided method hit a timing misuse condition.
    #[error(transparent)]
    Timing(#[from] TimingError),

    /// A capability-provided method hit a swapcache misuse condition.
    #[error(transparent)]
    Swapcache(#[from] SwapcacheError),
}
