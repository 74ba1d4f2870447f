//! Fixed-width little-endian codec for corrected records.
//!
//! Each record is 12 bytes: `u32 start`, `u32 end`, `f32 value`. Files hold no
//! header; the chromosome is implied by whoever owns the file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, TrackError};

/// Size in bytes of one encoded [CorrectedRecord].
pub const RECORD_SIZE: usize = 12;

///
/// One run of equal corrected values over `[start, end)`.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedRecord {
    pub start: u32,
    pub end: u32,
    pub value: f32,
}

impl CorrectedRecord {
    pub fn new(start: u32, end: u32, value: f32) -> Self {
        CorrectedRecord { start, end, value }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.start)?;
        writer.write_u32::<LittleEndian>(self.end)?;
        writer.write_f32::<LittleEndian>(self.value)
    }

    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        CorrectedRecord {
            start: LittleEndian::read_u32(&buf[0..4]),
            end: LittleEndian::read_u32(&buf[4..8]),
            value: LittleEndian::read_f32(&buf[8..12]),
        }
    }
}

///
/// Append-only writer of encoded records.
///
pub struct RecordWriter {
    inner: BufWriter<File>,
    written: u64,
}

impl RecordWriter {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(RecordWriter {
            inner: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    /// Wrap an already opened file, appending at its current position.
    pub fn from_file(file: File) -> Self {
        RecordWriter {
            inner: BufWriter::new(file),
            written: 0,
        }
    }

    pub fn write_records(&mut self, records: &[CorrectedRecord]) -> Result<()> {
        for record in records {
            record.write_to(&mut self.inner)?;
        }
        self.written += records.len() as u64;
        Ok(())
    }

    /// Number of records written through this writer.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn finish(mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

///
/// Streaming reader over an encoded record file.
///
pub struct RecordReader<R: Read> {
    inner: R,
    path: PathBuf,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(RecordReader {
            inner: BufReader::new(File::open(path)?),
            path: path.to_owned(),
        })
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, path: PathBuf) -> Self {
        RecordReader { inner, path }
    }

    fn next_record(&mut self) -> Result<Option<CorrectedRecord>> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Ok(None),
            RECORD_SIZE => Ok(Some(CorrectedRecord::from_bytes(&buf))),
            _ => Err(TrackError::TruncatedRecords(self.path.clone())),
        }
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<CorrectedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

///
/// Read a whole record file into memory.
///
pub fn read_records(path: &Path) -> Result<Vec<CorrectedRecord>> {
    RecordReader::open(path)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_encoding_is_little_endian() {
        let mut buf = Vec::new();
        CorrectedRecord::new(1, 258, 1.0).write_to(&mut buf).unwrap();

        assert_eq!(buf.len(), RECORD_SIZE);
        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
        assert_eq!(&buf[4..8], &[2, 1, 0, 0]);
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes());
    }

    #[rstest]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctrl1_chr1_0.rec");

        let records = vec![
            CorrectedRecord::new(10, 12, -3.0),
            CorrectedRecord::new(12, 13, 7.0),
            CorrectedRecord::new(40, 41, f32::MAX),
        ];

        let mut writer = RecordWriter::create(&path).unwrap();
        writer.write_records(&records[..1]).unwrap();
        writer.write_records(&records[1..]).unwrap();
        assert_eq!(writer.written(), 3);
        writer.finish().unwrap();

        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[rstest]
    fn test_empty_file_has_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.rec");
        RecordWriter::create(&path).unwrap().finish().unwrap();

        assert!(read_records(&path).unwrap().is_empty());
    }

    #[rstest]
    fn test_truncated_file_is_an_error() {
        let mut buf = Vec::new();
        CorrectedRecord::new(0, 1, 2.0).write_to(&mut buf).unwrap();
        buf.extend_from_slice(&[0, 0, 0]);

        let reader = RecordReader::new(buf.as_slice(), PathBuf::from("bad.rec"));
        let result: Result<Vec<_>> = reader.collect();
        assert!(matches!(result, Err(TrackError::TruncatedRecords(_))));
    }
}
