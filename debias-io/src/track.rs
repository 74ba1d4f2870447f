use std::path::Path;

use crate::error::Result;
use crate::records::CorrectedRecord;

///
/// Read access to one signal track. Closed when dropped.
///
pub trait TrackReader {
    ///
    /// Per-base values over `[start, end)` of `chr`. Bases without data are NaN.
    ///
    fn values(&mut self, chr: &str, start: u32, end: u32) -> Result<Vec<f32>>;

    ///
    /// Length of `chr`, or `None` when the track does not know the chromosome.
    ///
    fn chrom_length(&self, chr: &str) -> Option<u32>;

    ///
    /// `(chrom, length)` for every chromosome in the track header.
    ///
    fn chrom_sizes(&self) -> Vec<(String, u32)>;
}

///
/// Write access to one output track. Records for a chromosome must arrive
/// sorted and non-overlapping, and a chromosome's records must be contiguous.
///
pub trait TrackWriter: Send {
    fn add_records(&mut self, chr: &str, records: &[CorrectedRecord]) -> Result<()>;

    /// Finalize the track. Nothing is guaranteed to be on disk before this.
    fn close(self: Box<Self>) -> Result<()>;
}

///
/// Opens and creates tracks. Shared by every worker.
///
pub trait TrackStore: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn TrackReader>>;

    ///
    /// Create an output track at `path` with the given `(chrom, length)` header.
    ///
    fn create(&self, path: &Path, header: &[(String, u32)]) -> Result<Box<dyn TrackWriter>>;

    ///
    /// Copy a track verbatim.
    ///
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
}
