//! Error types for the parts of the engine that surface `Result` to callers.
//!
//! Programmer errors (null region, empty stack pop, unknown region variant,
//! non-empty destination stack on task switch) are deliberately *not*
//! represented here: spec.md §4.1/§7 treats those as unconditional
//! `panic!`/abort conditions, not recoverable errors. This enum only covers
//! the two recoverable kinds from spec.md §7: sink I/O failures and
//! initialise-time environment errors.
//!
//! Grounded on `RecoveryError` in `cargo-rtic-scope`'s `recovery.rs`: a
//! `thiserror`-derived enum with one variant per failure mode and `#[source]`
//! wrapping the underlying `std::io::Error`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to create trace output directory {path}: {source}")]
    CreateTraceDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive sink write failed: {0}")]
    Sink(#[source] std::io::Error),

    #[error("archive sink could not be opened: {0}")]
    OpenArchive(#[source] std::io::Error),
}

pub type TraceResult<T> = Result<T, TraceError>;
