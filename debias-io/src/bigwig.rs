use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bigtools::beddata::BedParserStreamingIterator;
use bigtools::utils::reopen::ReopenableFile;
use bigtools::{BigWigRead, BigWigWrite, Value};
use log::debug;
use tempfile::NamedTempFile;
use tokio::runtime;

use crate::error::{Result, TrackError};
use crate::records::{CorrectedRecord, RecordReader, RecordWriter};
use crate::track::{TrackReader, TrackStore, TrackWriter};

///
/// [TrackStore] for bigWig files.
///
/// `threads` sizes the tokio runtime used when an output track is finalized.
///
#[derive(Debug, Clone)]
pub struct BigWigStore {
    pub threads: usize,
}

impl Default for BigWigStore {
    fn default() -> Self {
        BigWigStore { threads: 1 }
    }
}

impl BigWigStore {
    pub fn new(threads: usize) -> Self {
        BigWigStore {
            threads: threads.max(1),
        }
    }
}

impl TrackStore for BigWigStore {
    fn open(&self, path: &Path) -> Result<Box<dyn TrackReader>> {
        let path_str = path.to_string_lossy().to_string();
        let reader = BigWigRead::open_file(&path_str).map_err(|e| TrackError::Open {
            path: path.to_owned(),
            reason: format!("{:?}", e),
        })?;

        let chrom_sizes = reader
            .chroms()
            .iter()
            .map(|info| (info.name.clone(), info.length))
            .collect();

        Ok(Box::new(BigWigTrack {
            reader,
            chrom_sizes,
        }))
    }

    fn create(&self, path: &Path, header: &[(String, u32)]) -> Result<Box<dyn TrackWriter>> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let spool = NamedTempFile::new_in(&parent)?;
        let records = RecordWriter::from_file(spool.reopen()?);

        Ok(Box::new(BigWigTrackWriter {
            path: path.to_owned(),
            chrom_sizes: header.iter().cloned().collect(),
            threads: self.threads,
            spool,
            records,
            segments: Vec::new(),
        }))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
        Ok(())
    }
}

///
/// An open bigWig file.
///
pub struct BigWigTrack {
    reader: BigWigRead<ReopenableFile>,
    chrom_sizes: Vec<(String, u32)>,
}

impl TrackReader for BigWigTrack {
    fn values(&mut self, chr: &str, start: u32, end: u32) -> Result<Vec<f32>> {
        if self.chrom_length(chr).is_none() {
            return Err(TrackError::UnknownChromosome(chr.to_string()));
        }

        self.reader
            .values(chr, start, end)
            .map_err(|e| TrackError::Read {
                chr: chr.to_string(),
                start,
                end,
                reason: format!("{:?}", e),
            })
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

///
/// Output bigWig under construction.
///
/// bigtools consumes one sorted stream, so records are spooled to a temporary
/// file next to the output and streamed into the writer on [TrackWriter::close].
///
pub struct BigWigTrackWriter {
    path: PathBuf,
    chrom_sizes: HashMap<String, u32>,
    threads: usize,
    spool: NamedTempFile,
    records: RecordWriter,
    // (chrom, record count) in write order
    segments: Vec<(String, u64)>,
}

impl TrackWriter for BigWigTrackWriter {
    fn add_records(&mut self, chr: &str, records: &[CorrectedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if !self.chrom_sizes.contains_key(chr) {
            return Err(TrackError::UnknownChromosome(chr.to_string()));
        }

        self.records.write_records(records)?;

        match self.segments.last_mut() {
            Some((last, count)) if last == chr => *count += records.len() as u64,
            _ => self.segments.push((chr.to_string(), records.len() as u64)),
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let BigWigTrackWriter {
            path,
            chrom_sizes,
            threads,
            spool,
            records,
            segments,
        } = *self;

        debug!("Writing {} records to {:?}", records.written(), path);
        records.finish()?;

        let values = SpooledValues {
            reader: RecordReader::open(spool.path())?,
            segments: segments.into_iter(),
            current: None,
        };

        let runtime = if threads == 1 {
            runtime::Builder::new_current_thread().build()?
        } else {
            runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .build()?
        };

        let write_error = |reason: String| TrackError::Write {
            path: path.clone(),
            reason,
        };

        let out = BigWigWrite::create_file(path.to_string_lossy().to_string(), chrom_sizes)
            .map_err(|e| write_error(format!("{:?}", e)))?;

        let data = BedParserStreamingIterator::wrap_iter(values, true);
        out.write(data, runtime)
            .map_err(|e| write_error(format!("{:?}", e)))?;

        // spool is removed when dropped
        drop(spool);
        Ok(())
    }
}

struct SpooledValues {
    reader: RecordReader<std::io::BufReader<std::fs::File>>,
    segments: std::vec::IntoIter<(String, u64)>,
    current: Option<(String, u64)>,
}

impl Iterator for SpooledValues {
    type Item = std::result::Result<(String, Value), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.current.as_mut() {
                Some((chr, remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    let chr = chr.clone();
                    return Some(match self.reader.next() {
                        Some(Ok(record)) => Ok((
                            chr,
                            Value {
                                start: record.start,
                                end: record.end,
                                value: record.value,
                            },
                        )),
                        Some(Err(e)) => Err(io::Error::other(e.to_string())),
                        None => Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "record spool ended early",
                        )),
                    });
                }
                _ => self.current = Some(self.segments.next()?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    fn header() -> Vec<(String, u32)> {
        vec![("chr1".to_string(), 1_000), ("chr2".to_string(), 500)]
    }

    fn write_track(store: &BigWigStore, path: &Path) {
        let mut writer = store.create(path, &header()).unwrap();
        writer
            .add_records(
                "chr1",
                &[
                    CorrectedRecord::new(10, 20, 1.5),
                    CorrectedRecord::new(20, 25, -2.0),
                ],
            )
            .unwrap();
        writer
            .add_records("chr1", &[CorrectedRecord::new(100, 101, 9.0)])
            .unwrap();
        writer
            .add_records("chr2", &[CorrectedRecord::new(0, 3, 4.0)])
            .unwrap();
        writer.close().unwrap();
    }

    #[rstest]
    fn test_write_then_read_bigwig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/ctrl1_corrected.bw");
        let store = BigWigStore::new(1);

        write_track(&store, &path);

        let mut reader = store.open(&path).unwrap();
        assert_eq!(reader.chrom_length("chr1"), Some(1_000));
        assert_eq!(reader.chrom_length("chr3"), None);

        let values = reader.values("chr1", 8, 27).unwrap();
        assert!(values[0].is_nan() && values[1].is_nan());
        assert_eq!(&values[2..12], &[1.5; 10]);
        assert_eq!(&values[12..17], &[-2.0; 5]);
        assert!(values[17].is_nan() && values[18].is_nan());

        assert_eq!(reader.values("chr2", 0, 3).unwrap(), vec![4.0, 4.0, 4.0]);
        assert!(reader.values("chr3", 0, 3).is_err());
    }

    #[rstest]
    fn test_spool_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp1_corrected.bw");
        let store = BigWigStore::new(2);

        write_track(&store, &path);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[rstest]
    fn test_unknown_chromosome_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BigWigStore::default();
        let mut writer = store.create(&dir.path().join("x.bw"), &header()).unwrap();

        assert!(
            writer
                .add_records("chrUn", &[CorrectedRecord::new(0, 1, 1.0)])
                .is_err()
        );
    }

    #[rstest]
    fn test_copy() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("ctrl1.bw");
        let to = dir.path().join("out/ctrl1_normalized.bw");
        let store = BigWigStore::default();

        write_track(&store, &from);
        store.copy(&from, &to).unwrap();

        let mut reader = store.open(&to).unwrap();
        assert_eq!(reader.values("chr2", 0, 3).unwrap(), vec![4.0, 4.0, 4.0]);
    }
}
