//! crates/cv_io/src/lib.rs
//! I/O side of the validator: everything that touches bytes or files.
//!
//! - `document`: JSON and tabular (TSV) loaders producing the in-memory document
//! - `canonical_json`: sorted-key compact JSON and atomic file writes
//! - `hasher`: SHA-256 helpers and the canonical record hash
//! - `config`: built-in COUNTER rule tables (`BuiltinRules`)
//!
//! Shared error type (`IoError`) with `From` conversions used across modules.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for cv_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, read, create_dir_all, rename, fsync).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON parse or serialization errors.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// Malformed tabular sheet (no heading row, ragged header block, …).
    #[error("tabular error at row {row}: {msg}")]
    Tabular { row: usize, msg: String },

    /// Input exceeds a configured size limit.
    #[error("input too large: {0}")]
    Limit(String),

    /// The input format could not be determined or is not supported.
    #[error("unsupported input: {0}")]
    Unsupported(String),
}

pub type IoResult<T> = Result<T, IoError>;

/* ---------------- From conversions (used by file modules) ---------------- */

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

impl From<serde_json::Error> for IoError {
    fn from(e: serde_json::Error) -> Self {
        // serde_json keeps a line/column, not a pointer.
        IoError::Json {
            pointer: format!("line {} column {}", e.line(), e.column()),
            msg: e.to_string(),
        }
    }
}

pub mod canonical_json;
pub mod config;
pub mod document;
pub mod hasher;

pub mod prelude {
    pub use crate::{IoError, IoResult};

    pub use crate::canonical_json::{to_canonical_json_bytes, write_canonical_file};
    pub use crate::config::BuiltinRules;
    pub use crate::document::{Document, InputFormat, JsonDocument, TabularSheet};
    pub use crate::hasher::{canonical_hash, sha256_file, HashVariant};
}
