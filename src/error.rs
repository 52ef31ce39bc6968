//! Error taxonomy for the reconciliation pipeline.
//!
//! Per-file errors (`IngestError`) are isolated by the caller and never abort
//! the batch: a `SchemaMismatch` routes the file to the relaxed fallback
//! reader, anything else fails that one file. Dataset-level invariant
//! violations (`ReconError`) indicate a logic defect and are allowed to abort.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading a single source file.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The file's header lacks columns required by the strict schema. The
    /// caller branches on this variant into the fallback ingestion path.
    #[error("schema mismatch in {path}: missing column {missing:?}")]
    SchemaMismatch { path: PathBuf, missing: String },

    /// Integer coercion failed for every row of the file, not just a few.
    /// Routed to the fallback path like a schema mismatch.
    #[error("file-wide type coercion failure in {path}")]
    TypeCoercion { path: PathBuf },

    /// A date string did not match the format inferred from the file's first
    /// row. Propagates and fails the file; guessing corrupts timestamps.
    #[error("date {value:?} does not match inferred format {format}")]
    DateFormat { value: String, format: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Dataset-level invariant violations. These fail loudly.
#[derive(Debug, Error)]
pub enum ReconError {
    /// Duplicate rental_id survived deduplication.
    #[error("duplicate rental_id {rental_id} after deduplication")]
    DuplicateKey { rental_id: i64 },
}
