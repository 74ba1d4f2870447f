use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use debias_core::consts::COVARIATE_FILE_INDEX_OFFSET;
use debias_io::{CovariateSource, NpyCovariateStore};

use crate::errors::{CorrectError, Result};

/// Column order of every stored covariate matrix.
pub const COVARIATE_ORDER: [&str; 6] = [
    "MGW_shear",
    "ProT_shear",
    "Anneal_pcr",
    "Denature_pcr",
    "Map_map",
    "Gquad_gquad",
];

///
/// Families of sequencing bias a run can correct for. Each selects one or
/// more columns of [COVARIATE_ORDER].
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasType {
    Shear,
    Pcr,
    Map,
    Gquad,
}

impl BiasType {
    pub fn columns(&self) -> &'static [usize] {
        match self {
            BiasType::Shear => &[0, 1],
            BiasType::Pcr => &[2, 3],
            BiasType::Map => &[4],
            BiasType::Gquad => &[5],
        }
    }
}

impl FromStr for BiasType {
    type Err = CorrectError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "shear" => Ok(BiasType::Shear),
            "pcr" => Ok(BiasType::Pcr),
            "map" => Ok(BiasType::Map),
            "gquad" => Ok(BiasType::Gquad),
            other => Err(CorrectError::Config(format!(
                "unknown bias type '{}' (expected shear, pcr, map or gquad)",
                other
            ))),
        }
    }
}

impl Display for BiasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BiasType::Shear => "shear",
            BiasType::Pcr => "pcr",
            BiasType::Map => "map",
            BiasType::Gquad => "gquad",
        };
        write!(f, "{}", name)
    }
}

///
/// Which stored covariates a run uses and where they live.
///
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCovariates {
    pub order: Vec<String>,
    pub selected: Vec<bool>,
    pub frag_len: u32,
    pub dir: PathBuf,
    /// File name prefix; the covariate directory's own name.
    pub prefix: String,
}

impl StoredCovariates {
    pub fn new(bias_types: &[BiasType], dir: &Path, frag_len: Option<u32>) -> Result<Self> {
        if bias_types.is_empty() {
            return Err(CorrectError::Config("no bias types selected".to_string()));
        }

        let prefix = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                CorrectError::Config(format!("covariate directory {:?} has no name", dir))
            })?;

        let frag_len = frag_len.or_else(|| parse_frag_len(&prefix)).ok_or_else(|| {
            CorrectError::Config(format!(
                "no fragment length given and none found in '{}'",
                prefix
            ))
        })?;

        let mut selected = vec![false; COVARIATE_ORDER.len()];
        for bias_type in bias_types {
            for &column in bias_type.columns() {
                selected[column] = true;
            }
        }

        Ok(StoredCovariates {
            order: COVARIATE_ORDER.iter().map(|s| s.to_string()).collect(),
            selected,
            frag_len,
            dir: dir.to_owned(),
            prefix,
        })
    }

    pub fn feature_count(&self) -> usize {
        self.order.len()
    }

    /// Columns used by the regression, in [COVARIATE_ORDER] order.
    pub fn selected_columns(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    /// Names of the used columns.
    pub fn selected_names(&self) -> Vec<&str> {
        self.selected_columns()
            .into_iter()
            .map(|i| self.order[i].as_str())
            .collect()
    }

    ///
    /// Reject a chromosome's matrix unless it has one column per entry of
    /// [COVARIATE_ORDER] and a row for every position before `end`.
    ///
    pub fn check_source(&self, chr: &str, source: &dyn CovariateSource, end: u32) -> Result<()> {
        if source.feature_count() != self.feature_count() {
            return Err(CorrectError::Config(format!(
                "covariates of {} have {} features, expected {}",
                chr,
                source.feature_count(),
                self.feature_count()
            )));
        }

        let needed = end.saturating_sub(COVARIATE_FILE_INDEX_OFFSET) as usize;
        if source.row_count() < needed {
            return Err(CorrectError::Config(format!(
                "covariates of {} have {} rows, positions up to {} need {}",
                chr,
                source.row_count(),
                end,
                needed
            )));
        }
        Ok(())
    }

    pub fn npy_store(&self) -> NpyCovariateStore {
        NpyCovariateStore::new(&self.dir, self.prefix.clone())
    }
}

///
/// Extract `N` from a `fragLen<N>` tag in a directory name.
///
pub fn parse_frag_len(name: &str) -> Option<u32> {
    let (_, rest) = name.split_once("fragLen")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().filter(|&n| n > 0)
}
