use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for track and covariate io.
#[derive(Error, Debug)]
pub enum TrackError {
    /// IO error occurred during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The track could not be opened.
    #[error("Failed to open track {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The track has no entry for the requested chromosome.
    #[error("Chromosome '{0}' is not present in the track")]
    UnknownChromosome(String),

    /// Reading values from an open track failed.
    #[error("Failed to read {chr}:{start}-{end}: {reason}")]
    Read {
        chr: String,
        start: u32,
        end: u32,
        reason: String,
    },

    /// Writing an output track failed.
    #[error("Failed to write track {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// A covariate file is missing or malformed.
    #[error("Covariate file {path:?}: {reason}")]
    Covariate { path: PathBuf, reason: String },

    /// Requested covariate rows fall outside the matrix.
    #[error("Covariate rows {start}..{end} out of range for '{chr}' ({rows} rows)")]
    CovariateRange {
        chr: String,
        start: usize,
        end: usize,
        rows: usize,
    },

    /// A temporary record file ended in the middle of a record.
    #[error("Truncated record file: {0:?}")]
    TruncatedRecords(PathBuf),

    /// A shared in-memory store was poisoned by a panicking writer.
    #[error("In-memory store lock poisoned")]
    Poisoned,
}

/// Result type alias for track io.
pub type Result<T> = std::result::Result<T, TrackError>;
