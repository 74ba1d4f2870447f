//! # Input/Output for signal tracks and covariates.
//!
//! Tracks are read and written through the [TrackStore]/[TrackReader]/[TrackWriter]
//! traits so that the correction stages never touch a file format directly.
//! Two stores are provided: [BigWigStore] backed by `bigtools`, and
//! [MemoryTrackStore] which keeps everything in memory. Covariate matrices are
//! served the same way through [CovariateStore], and [records] holds the
//! fixed-width codec used to hand corrected records from workers to the merge.
//!
pub mod bigwig;
pub mod covariates;
pub mod error;
pub mod memory;
pub mod records;
pub mod track;

// re-expose core types
pub use bigwig::*;
pub use covariates::*;
pub use error::*;
pub use memory::*;
pub use records::{CorrectedRecord, RECORD_SIZE, RecordReader, RecordWriter, read_records};
pub use track::*;
