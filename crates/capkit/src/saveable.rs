//! # Saveable Capability
//!
//! Persistence by delegation to serde: the serializable subset of an
//! instance's state goes to a JSON blob on disk, written to a temporary
//! file in the destination directory and atomically published, so a failed
//! save never leaves a partial file visible. Transient state (the
//! [`crate::Extensions`] store, open handles) is excluded with
//! `#[serde(skip)]`.
//!
//! The blob format is an implementation detail, not a wire contract: the
//! only promise is that `load(save(x))` reconstructs `x`'s serializable
//! state. A blob whose shape does not match the expected schema fails with
//! [`SaveError::Format`].
//!
//! ```no_run
//! use capkit::{Extensions, HasExtensions, Saveable};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Model {
//!     weights: Vec<f64>,
//!     #[serde(skip)]
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
//!
//! impl Saveable for Model {}
//!
//! let mut model = Model { weights: vec![0.1, 0.7], ..Model::default() };
//! model.save("model.json".as_ref()).unwrap();
//! let restored = Model::load("model.json".as_ref()).unwrap();
//! assert_eq!(restored.weights, vec![0.1, 0.7]);
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::SaveError;

/// Serde-backed persistence with atomic publication.
///
/// Attach by implementing the (empty) trait on any `Serialize +
/// DeserializeOwned` type; override the hooks to adjust state around the
/// round trip.
pub trait Saveable: Serialize + DeserializeOwned + Sized {
    /// Called before serialization. Use it to flush derived state into
    /// serializable fields.
    fn before_save(&mut self) {}

    /// Called after deserialization. Use it to rebuild transient state
    /// that `#[serde(skip)]` left behind.
    fn after_load(&mut self) {}

    /// Serialize this instance to `path`.
    ///
    /// The blob is written to a temporary file in the destination
    /// directory, flushed, and atomically renamed into place; on any
    /// failure the temporary file is removed and nothing appears at
    /// `path`. An existing file at `path` is replaced.
    fn save(&mut self, path: &Path) -> Result<(), SaveError> {
        self.before_save();
        let blob = serde_json::to_vec_pretty(&*self).map_err(SaveError::Encode)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&blob)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|err| SaveError::Io(err.error))?;

        info!(target: "capkit::saveable", ?path, bytes = blob.len(), "saved");
        Ok(())
    }

    /// Like [`Self::save`], but refuses to overwrite an existing file.
    fn save_new(&mut self, path: &Path) -> Result<(), SaveError> {
        if path.exists() {
            return Err(SaveError::AlreadyExists {
                path: path.to_owned(),
            });
        }
        self.save(path)
    }

    /// Reconstruct an instance from the blob at `path`.
    ///
    /// Fails with [`SaveError::Format`] when the blob's shape does not
    /// match this type's state schema, and with [`SaveError::Io`] when the
    /// file cannot be read.
    fn load(path: &Path) -> Result<Self, SaveError> {
        let blob = fs::read(path)?;
        let mut value: Self = serde_json::from_slice(&blob).map_err(SaveError::Format)?;
        value.after_load();
        debug!(target: "capkit::saveable", ?path, "loaded");
        Ok(value)
    }
}
