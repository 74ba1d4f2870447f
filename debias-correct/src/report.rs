use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::corrector::CorrectionModel;
use crate::errors::Result;

pub const REPORT_FILE_NAME: &str = "coefficients.json";

///
/// The fitted model of a run: scalers and both regimes' coefficients, split
/// into control and experimental tracks. Coefficient vectors are
/// `[intercept, one per entry of feature_order]`.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientReport {
    pub feature_order: Vec<String>,
    pub selected: Vec<bool>,
    pub frag_len: u32,
    pub high_rc: f64,
    pub ctrl_tracks: Vec<PathBuf>,
    pub exp_tracks: Vec<PathBuf>,
    pub ctrl_scalers: Vec<f64>,
    pub exp_scalers: Vec<f64>,
    pub ctrl_regular: Vec<Vec<f64>>,
    pub ctrl_high: Vec<Vec<f64>>,
    pub exp_regular: Vec<Vec<f64>>,
    pub exp_high: Vec<Vec<f64>>,
}

impl CoefficientReport {
    pub fn new(
        feature_order: Vec<String>,
        selected: Vec<bool>,
        frag_len: u32,
        tracks: &[PathBuf],
        ctrl_count: usize,
        model: &CorrectionModel,
    ) -> Self {
        let split = ctrl_count.min(tracks.len());
        CoefficientReport {
            feature_order,
            selected,
            frag_len,
            high_rc: model.high_rc,
            ctrl_tracks: tracks[..split].to_vec(),
            exp_tracks: tracks[split..].to_vec(),
            ctrl_scalers: model.scalers[..split].to_vec(),
            exp_scalers: model.scalers[split..].to_vec(),
            ctrl_regular: model.regular[..split].to_vec(),
            ctrl_high: model.high[..split].to_vec(),
            exp_regular: model.regular[split..].to_vec(),
            exp_high: model.high[split..].to_vec(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_report_splits_controls_and_experiments() {
        let model = CorrectionModel {
            scalers: vec![1.0, 0.5, 2.0],
            regular: vec![vec![0.1, 1.0], vec![0.2, 2.0], vec![0.3, 3.0]],
            high: vec![vec![1.1, 1.0], vec![1.2, 2.0], vec![1.3, 3.0]],
            high_rc: 42.0,
            selected: vec![0],
            replicate_min: 1.0,
        };
        let tracks = vec![
            PathBuf::from("ctrl1.bw"),
            PathBuf::from("ctrl2.bw"),
            PathBuf::from("exp1.bw"),
        ];

        let report = CoefficientReport::new(
            vec!["Map_map".to_string()],
            vec![true],
            200,
            &tracks,
            2,
            &model,
        );

        assert_eq!(report.ctrl_scalers, vec![1.0, 0.5]);
        assert_eq!(report.exp_scalers, vec![2.0]);
        assert_eq!(report.exp_high, vec![vec![1.3, 3.0]]);
        assert_eq!(report.exp_tracks, vec![PathBuf::from("exp1.bw")]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REPORT_FILE_NAME);
        report.write(&path).unwrap();
        assert_eq!(CoefficientReport::read(&path).unwrap(), report);
    }
}
