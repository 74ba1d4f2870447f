use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Result, TrackError};
use crate::records::CorrectedRecord;
use crate::track::{TrackReader, TrackStore, TrackWriter};

///
/// A dense per-base signal track held in memory.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTrack {
    pub chrom_sizes: Vec<(String, u32)>,
    pub values: HashMap<String, Vec<f32>>,
}

impl MemoryTrack {
    ///
    /// A track whose chromosomes are all NaN, sized by `chrom_sizes`.
    ///
    pub fn empty(chrom_sizes: &[(String, u32)]) -> Self {
        let values = chrom_sizes
            .iter()
            .map(|(chr, length)| (chr.clone(), vec![f32::NAN; *length as usize]))
            .collect();

        MemoryTrack {
            chrom_sizes: chrom_sizes.to_vec(),
            values,
        }
    }

    ///
    /// Build a track from explicit per-chromosome values; lengths are taken
    /// from the value vectors.
    ///
    pub fn from_values(values: Vec<(&str, Vec<f32>)>) -> Self {
        let mut track = MemoryTrack::default();
        for (chr, chrom_values) in values {
            track
                .chrom_sizes
                .push((chr.to_string(), chrom_values.len() as u32));
            track.values.insert(chr.to_string(), chrom_values);
        }
        track
    }
}

impl TrackReader for MemoryTrack {
    fn values(&mut self, chr: &str, start: u32, end: u32) -> Result<Vec<f32>> {
        let chrom_values = self
            .values
            .get(chr)
            .ok_or_else(|| TrackError::UnknownChromosome(chr.to_string()))?;

        let (start, end) = (start as usize, end as usize);
        if start > end || end > chrom_values.len() {
            return Err(TrackError::Read {
                chr: chr.to_string(),
                start: start as u32,
                end: end as u32,
                reason: format!("chromosome length is {}", chrom_values.len()),
            });
        }

        Ok(chrom_values[start..end].to_vec())
    }

    fn chrom_length(&self, chr: &str) -> Option<u32> {
        self.chrom_sizes
            .iter()
            .find(|(name, _)| name == chr)
            .map(|(_, length)| *length)
    }

    fn chrom_sizes(&self) -> Vec<(String, u32)> {
        self.chrom_sizes.clone()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tracks: HashMap<PathBuf, MemoryTrack>,
    records: HashMap<PathBuf, Vec<(String, CorrectedRecord)>>,
}

///
/// [TrackStore] that keeps tracks in a shared map keyed by path. Written
/// tracks become readable after their writer is closed; the raw records
/// handed to the writer are kept for inspection.
///
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTrackStore {
    pub fn new() -> Self {
        MemoryTrackStore::default()
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, track: MemoryTrack) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| TrackError::Poisoned)?;
        state.tracks.insert(path.into(), track);
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Result<Option<MemoryTrack>> {
        let state = self.state.lock().map_err(|_| TrackError::Poisoned)?;
        Ok(state.tracks.get(path).cloned())
    }

    ///
    /// Records written to `path`, in write order, or `None` if no writer for
    /// `path` was ever closed.
    ///
    pub fn records(&self, path: &Path) -> Result<Option<Vec<(String, CorrectedRecord)>>> {
        let state = self.state.lock().map_err(|_| TrackError::Poisoned)?;
        Ok(state.records.get(path).cloned())
    }

    pub fn contains(&self, path: &Path) -> Result<bool> {
        let state = self.state.lock().map_err(|_| TrackError::Poisoned)?;
        Ok(state.tracks.contains_key(path))
    }
}

impl TrackStore for MemoryTrackStore {
    fn open(&self, path: &Path) -> Result<Box<dyn TrackReader>> {
        let track = self.get(path)?.ok_or_else(|| TrackError::Open {
            path: path.to_owned(),
            reason: "no such track".to_string(),
        })?;
        Ok(Box::new(track))
    }

    fn create(&self, path: &Path, header: &[(String, u32)]) -> Result<Box<dyn TrackWriter>> {
        Ok(Box::new(MemoryTrackWriter {
            path: path.to_owned(),
            track: MemoryTrack::empty(header),
            records: Vec::new(),
            state: Arc::clone(&self.state),
        }))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| TrackError::Poisoned)?;
        let track = state.tracks.get(from).cloned().ok_or_else(|| TrackError::Open {
            path: from.to_owned(),
            reason: "no such track".to_string(),
        })?;
        state.tracks.insert(to.to_owned(), track);
        Ok(())
    }
}

struct MemoryTrackWriter {
    path: PathBuf,
    track: MemoryTrack,
    records: Vec<(String, CorrectedRecord)>,
    state: Arc<Mutex<MemoryState>>,
}

impl TrackWriter for MemoryTrackWriter {
    fn add_records(&mut self, chr: &str, records: &[CorrectedRecord]) -> Result<()> {
        let chrom_values = self
            .track
            .values
            .get_mut(chr)
            .ok_or_else(|| TrackError::UnknownChromosome(chr.to_string()))?;

        for record in records {
            let (start, end) = (record.start as usize, record.end as usize);
            if start >= end || end > chrom_values.len() {
                return Err(TrackError::Write {
                    path: self.path.clone(),
                    reason: format!("record {}:{}-{} out of bounds", chr, start, end),
                });
            }
            chrom_values[start..end].fill(record.value);
            self.records.push((chr.to_string(), *record));
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let MemoryTrackWriter {
            path,
            track,
            records,
            state,
        } = *self;

        let mut state = state.lock().map_err(|_| TrackError::Poisoned)?;
        state.records.insert(path.clone(), records);
        state.tracks.insert(path, track);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn store() -> MemoryTrackStore {
        let store = MemoryTrackStore::new();
        store
            .insert(
                "ctrl1.bw",
                MemoryTrack::from_values(vec![("chr1", vec![f32::NAN, 1.0, 2.0, 3.0])]),
            )
            .unwrap();
        store
    }

    #[rstest]
    fn test_read_values(store: MemoryTrackStore) {
        let mut reader = store.open(Path::new("ctrl1.bw")).unwrap();

        assert_eq!(reader.chrom_length("chr1"), Some(4));
        assert_eq!(reader.values("chr1", 1, 4).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(reader.values("chr1", 2, 5).is_err());
        assert!(reader.values("chr2", 0, 1).is_err());
    }

    #[rstest]
    fn test_missing_track(store: MemoryTrackStore) {
        assert!(store.open(Path::new("missing.bw")).is_err());
    }

    #[rstest]
    fn test_write_then_read(store: MemoryTrackStore) {
        let path = Path::new("out/ctrl1_corrected.bw");
        let mut writer = store
            .create(path, &[("chr1".to_string(), 6)])
            .unwrap();
        writer
            .add_records("chr1", &[CorrectedRecord::new(1, 3, 5.0)])
            .unwrap();
        assert!(!store.contains(path).unwrap());
        writer.close().unwrap();

        let mut reader = store.open(path).unwrap();
        let values = reader.values("chr1", 0, 6).unwrap();
        assert!(values[0].is_nan());
        assert_eq!(&values[1..3], &[5.0, 5.0]);
        assert!(values[3..].iter().all(|v| v.is_nan()));

        assert_eq!(
            store.records(path).unwrap().unwrap(),
            vec![("chr1".to_string(), CorrectedRecord::new(1, 3, 5.0))]
        );
    }

    #[rstest]
    fn test_copy(store: MemoryTrackStore) {
        store
            .copy(Path::new("ctrl1.bw"), Path::new("ctrl1_normalized.bw"))
            .unwrap();
        let mut reader = store.open(Path::new("ctrl1_normalized.bw")).unwrap();
        assert_eq!(reader.chrom_sizes(), vec![("chr1".to_string(), 4)]);
        assert_eq!(reader.values("chr1", 1, 4).unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
