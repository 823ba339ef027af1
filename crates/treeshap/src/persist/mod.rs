//! Ensemble persistence.
//!
//! Two formats share one schema ([`schema::EnsembleSchema`]):
//!
//! - JSON: `{"format_version": 1, "ensemble": {...}}`, human-readable
//! - Binary: a checksummed 32-byte header plus a postcard payload, see [`native`]
//!
//! Loading always re-validates every tree, so a file that loads is an ensemble
//! that could have been built directly.
//!
//! # Example
//!
//! ```
//! use treeshap::{BuildConfig, Ensemble, OutputTransform, TreeArrays};
//!
//! let mut tree = TreeArrays::new();
//! tree.push_split(0, 0.5, 1, 2, 2.0);
//! tree.push_leaf(-1.0, 1.0);
//! tree.push_leaf(1.0, 1.0);
//! let ensemble =
//!     Ensemble::from_arrays(vec![tree], 1, 0.0, OutputTransform::Identity, &BuildConfig::default())
//!         .unwrap();
//!
//! let bytes = ensemble.to_bytes().unwrap();
//! let loaded = Ensemble::from_bytes(&bytes).unwrap();
//! assert_eq!(loaded.n_trees(), 1);
//!
//! let mut json = Vec::new();
//! ensemble.write_json(&mut json).unwrap();
//! let loaded = Ensemble::read_json(json.as_slice()).unwrap();
//! assert_eq!(loaded.expected_value(), ensemble.expected_value());
//! ```

mod convert;
mod error;
pub mod native;
pub mod schema;

pub use error::{ReadError, WriteError};

use std::io::{Read, Write};

use tracing::debug;

use crate::config::BuildConfig;
use crate::repr::Ensemble;

use schema::{EnsembleDocument, EnsembleSchema, FORMAT_VERSION};

impl Ensemble {
    // =========================================================================
    // JSON
    // =========================================================================

    /// Write the ensemble as a pretty-printed JSON document.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), WriteError> {
        let document = EnsembleDocument {
            format_version: FORMAT_VERSION,
            ensemble: EnsembleSchema::from(self),
        };
        serde_json::to_writer_pretty(writer, &document)?;
        Ok(())
    }

    /// Read a JSON document written by [`write_json`](Self::write_json).
    pub fn read_json<R: Read>(reader: R) -> Result<Self, ReadError> {
        Self::read_json_with(reader, &BuildConfig::default())
    }

    /// Read a JSON document, validating trees with `config`.
    pub fn read_json_with<R: Read>(reader: R, config: &BuildConfig) -> Result<Self, ReadError> {
        let document: EnsembleDocument = serde_json::from_reader(reader)?;
        if document.format_version > FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion {
                major: document.format_version,
                minor: 0,
            });
        }
        let ensemble = document.ensemble.into_ensemble(config)?;
        debug!(n_trees = ensemble.n_trees(), "loaded ensemble from JSON");
        Ok(ensemble)
    }

    // =========================================================================
    // Binary
    // =========================================================================

    /// Write the ensemble in the native binary format.
    pub fn write_binary<W: Write>(&self, mut writer: W) -> Result<(), WriteError> {
        native::write_to(&mut writer, &EnsembleSchema::from(self))
    }

    /// Read the native binary format.
    pub fn read_binary<R: Read>(reader: R) -> Result<Self, ReadError> {
        Self::read_binary_with(reader, &BuildConfig::default())
    }

    /// Read the native binary format, validating trees with `config`.
    pub fn read_binary_with<R: Read>(mut reader: R, config: &BuildConfig) -> Result<Self, ReadError> {
        let ensemble = native::read_from(&mut reader)?.into_ensemble(config)?;
        debug!(n_trees = ensemble.n_trees(), "loaded ensemble from binary");
        Ok(ensemble)
    }

    /// Serialize to a byte vector in the native binary format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WriteError> {
        let mut buf = Vec::new();
        self.write_binary(&mut buf)?;
        Ok(buf)
    }

    /// Deserialize from bytes in the native binary format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReadError> {
        Self::read_binary(bytes)
    }
}
