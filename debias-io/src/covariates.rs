use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use ndarray::{Array2, ArrayView2, s};
use ndarray_npy::ViewNpyExt;

use crate::error::{Result, TrackError};

///
/// Per-chromosome covariate matrix, one row per genomic position and one
/// column per feature.
///
pub trait CovariateSource {
    fn feature_count(&self) -> usize;

    /// Number of rows (positions) in the matrix.
    fn row_count(&self) -> usize;

    ///
    /// Copy out rows `[start, end)`.
    ///
    fn rows(&self, start: usize, end: usize) -> Result<Array2<f32>>;
}

///
/// Opens the covariate matrix of a chromosome. Shared by every worker.
///
pub trait CovariateStore: Send + Sync {
    fn open(&self, chr: &str) -> Result<Box<dyn CovariateSource>>;
}

///
/// Covariates stored as one `{prefix}_{chr}.npy` (2-D, little-endian `f32`,
/// C order) per chromosome inside `dir`.
///
#[derive(Debug, Clone)]
pub struct NpyCovariateStore {
    pub dir: PathBuf,
    pub prefix: String,
}

impl NpyCovariateStore {
    pub fn new<P: Into<PathBuf>>(dir: P, prefix: impl Into<String>) -> Self {
        NpyCovariateStore {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn path_for(&self, chr: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.npy", self.prefix, chr))
    }
}

impl CovariateStore for NpyCovariateStore {
    fn open(&self, chr: &str) -> Result<Box<dyn CovariateSource>> {
        Ok(Box::new(NpyCovariates::open(chr, &self.path_for(chr))?))
    }
}

///
/// A memory mapped `.npy` covariate matrix. The header is parsed once on open;
/// row reads decode straight from the mapped payload.
///
pub struct NpyCovariates {
    chr: String,
    path: PathBuf,
    mmap: Mmap,
    /// Byte offset of the first value, right after the header.
    data_offset: usize,
    shape: (usize, usize),
}

impl NpyCovariates {
    pub fn open(chr: &str, path: &Path) -> Result<Self> {
        let covariate_error = |reason: String| TrackError::Covariate {
            path: path.to_owned(),
            reason,
        };

        let file = File::open(path).map_err(|e| covariate_error(e.to_string()))?;
        // SAFETY: covariate files are read-only inputs for the lifetime of a run
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| covariate_error(e.to_string()))?;

        let (shape, standard) = {
            let view = ArrayView2::<f32>::view_npy(&mmap[..])
                .map_err(|e| covariate_error(format!("{:?}", e)))?;
            (view.dim(), view.is_standard_layout())
        };
        if !standard {
            return Err(covariate_error("matrix is not in C order".to_string()));
        }

        // the payload runs to the end of the file
        let payload = shape.0 * shape.1 * size_of::<f32>();
        let data_offset = mmap.len() - payload;

        Ok(NpyCovariates {
            chr: chr.to_string(),
            path: path.to_owned(),
            mmap,
            data_offset,
            shape,
        })
    }
}

impl CovariateSource for NpyCovariates {
    fn feature_count(&self) -> usize {
        self.shape.1
    }

    fn row_count(&self) -> usize {
        self.shape.0
    }

    fn rows(&self, start: usize, end: usize) -> Result<Array2<f32>> {
        check_range(&self.chr, start, end, self.shape.0)?;

        let row_bytes = self.shape.1 * size_of::<f32>();
        let from = self.data_offset + start * row_bytes;
        let to = self.data_offset + end * row_bytes;
        let values: Vec<f32> = self.mmap[from..to]
            .chunks_exact(size_of::<f32>())
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Array2::from_shape_vec((end - start, self.shape.1), values).map_err(|e| {
            TrackError::Covariate {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })
    }
}

///
/// In-memory covariates keyed by chromosome.
///
#[derive(Debug, Clone, Default)]
pub struct MemoryCovariateStore {
    matrices: HashMap<String, Arc<Array2<f32>>>,
}

impl MemoryCovariateStore {
    pub fn new() -> Self {
        MemoryCovariateStore::default()
    }

    pub fn insert(&mut self, chr: &str, matrix: Array2<f32>) {
        self.matrices.insert(chr.to_string(), Arc::new(matrix));
    }
}

impl CovariateStore for MemoryCovariateStore {
    fn open(&self, chr: &str) -> Result<Box<dyn CovariateSource>> {
        let matrix = self
            .matrices
            .get(chr)
            .ok_or_else(|| TrackError::Covariate {
                path: PathBuf::from(chr),
                reason: "no covariates for chromosome".to_string(),
            })?;

        Ok(Box::new(MemoryCovariates {
            chr: chr.to_string(),
            matrix: Arc::clone(matrix),
        }))
    }
}

struct MemoryCovariates {
    chr: String,
    matrix: Arc<Array2<f32>>,
}

impl CovariateSource for MemoryCovariates {
    fn feature_count(&self) -> usize {
        self.matrix.ncols()
    }

    fn row_count(&self) -> usize {
        self.matrix.nrows()
    }

    fn rows(&self, start: usize, end: usize) -> Result<Array2<f32>> {
        check_range(&self.chr, start, end, self.matrix.nrows())?;
        Ok(self.matrix.slice(s![start..end, ..]).to_owned())
    }
}

fn check_range(chr: &str, start: usize, end: usize, rows: usize) -> Result<()> {
    if start > end || end > rows {
        return Err(TrackError::CovariateRange {
            chr: chr.to_string(),
            start,
            end,
            rows,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use ndarray_npy::write_npy;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn matrix() -> Array2<f32> {
        array![
            [0.1, 1.0, 2.0],
            [0.2, 1.1, 2.1],
            [0.3, f32::NAN, 2.2],
            [0.4, 1.3, 2.3]
        ]
    }

    #[rstest]
    fn test_npy_store_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = NpyCovariateStore::new(dir.path(), "hg38_fragLen200");
        write_npy(store.path_for("chr1"), &matrix()).unwrap();

        assert!(
            store
                .path_for("chr1")
                .ends_with("hg38_fragLen200_chr1.npy")
        );

        let source = store.open("chr1").unwrap();
        assert_eq!(source.feature_count(), 3);
        assert_eq!(source.row_count(), 4);

        let rows = source.rows(1, 3).unwrap();
        assert_eq!(rows.dim(), (2, 3));
        assert_eq!(rows[[0, 0]], 0.2);
        assert!(rows[[1, 1]].is_nan());

        assert!(source.rows(2, 5).is_err());
    }

    #[rstest]
    #[case(0, 4)]
    #[case(0, 1)]
    #[case(3, 4)]
    #[case(1, 1)]
    fn test_npy_rows_match_matrix(#[case] start: usize, #[case] end: usize) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov_chr1.npy");
        let expected = array![[1.5f32, -2.0], [3.25, 4.0], [f32::MAX, 0.0], [7.0, 8.5]];
        write_npy(&path, &expected).unwrap();

        let source = NpyCovariates::open("chr1", &path).unwrap();
        let file_len = std::fs::metadata(&path).unwrap().len() as usize;
        assert_eq!(source.data_offset, file_len - 8 * size_of::<f32>());

        // repeated reads reuse the parsed header
        for _ in 0..3 {
            assert_eq!(
                source.rows(start, end).unwrap(),
                expected.slice(s![start..end, ..]).to_owned()
            );
        }
    }

    #[rstest]
    fn test_npy_garbage_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cov_chr1.npy");
        std::fs::write(&path, b"not an npy file").unwrap();

        assert!(matches!(
            NpyCovariates::open("chr1", &path).err(),
            Some(TrackError::Covariate { .. })
        ));
    }

    #[rstest]
    fn test_npy_store_missing_chromosome() {
        let dir = tempfile::tempdir().unwrap();
        let store = NpyCovariateStore::new(dir.path(), "hg38");
        assert!(matches!(
            store.open("chr2").err(),
            Some(TrackError::Covariate { .. })
        ));
    }

    #[rstest]
    fn test_memory_store_rows() {
        let mut store = MemoryCovariateStore::new();
        store.insert("chr1", matrix());

        let source = store.open("chr1").unwrap();
        assert_eq!(source.rows(3, 4).unwrap(), array![[0.4, 1.3, 2.3]]);
        assert_eq!(source.rows(2, 2).unwrap().nrows(), 0);
        assert!(store.open("chrX").is_err());
    }
}
