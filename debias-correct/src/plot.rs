use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{CorrectError, Result};
use crate::regression::{Regime, ScatterSamples};

///
/// Receives the observed-vs-fitted scatter samples of each track.
///
pub trait PlotSink: Send + Sync {
    fn write_samples(&self, stem: &str, samples: &[(Regime, &ScatterSamples)]) -> Result<()>;
}

///
/// Writes `fit_{stem}.tsv` with one `regime, observed, predicted` row per
/// sample.
///
#[derive(Debug, Clone)]
pub struct TsvPlotSink {
    pub dir: PathBuf,
}

impl TsvPlotSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        TsvPlotSink { dir: dir.into() }
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("fit_{}.tsv", stem))
    }
}

impl PlotSink for TsvPlotSink {
    fn write_samples(&self, stem: &str, samples: &[(Regime, &ScatterSamples)]) -> Result<()> {
        let path = self.path_for(stem);
        let mut writer = BufWriter::new(File::create(&path)?);

        writeln!(writer, "regime\tobserved\tpredicted")?;
        for (regime, sample) in samples {
            for (observed, fitted) in sample.observed.iter().zip(&sample.fitted) {
                writeln!(writer, "{}\t{}\t{}", regime, observed, fitted)?;
            }
        }
        writer.flush()?;

        Ok(())
    }
}

///
/// Keeps samples in memory, keyed by track stem.
///
#[derive(Debug, Default)]
pub struct MemoryPlotSink {
    samples: Mutex<HashMap<String, Vec<(Regime, ScatterSamples)>>>,
}

impl MemoryPlotSink {
    pub fn new() -> Self {
        MemoryPlotSink::default()
    }

    pub fn get(&self, stem: &str) -> Option<Vec<(Regime, ScatterSamples)>> {
        self.samples
            .lock()
            .ok()
            .and_then(|samples| samples.get(stem).cloned())
    }
}

impl PlotSink for MemoryPlotSink {
    fn write_samples(&self, stem: &str, samples: &[(Regime, &ScatterSamples)]) -> Result<()> {
        let mut stored = self
            .samples
            .lock()
            .map_err(|_| CorrectError::Worker("plot sink lock poisoned".to_string()))?;
        stored.insert(
            stem.to_string(),
            samples
                .iter()
                .map(|(regime, sample)| (*regime, (*sample).clone()))
                .collect(),
        );
        Ok(())
    }
}

///
/// Pearson correlation, `None` when either side has no variance.
///
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

pub fn read_tsv_rows(path: &Path) -> Result<Vec<(String, f64, f64)>> {
    let content = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| CorrectError::Config(format!("bad value '{}' in {:?}: {}", s, path, e)))
        };
        if fields.len() != 3 {
            return Err(CorrectError::Config(format!("malformed row '{}' in {:?}", line, path)));
        }
        rows.push((fields[0].to_string(), parse(fields[1])?, parse(fields[2])?));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_tsv_sink() {
        let dir = tempfile::tempdir().unwrap();
        let sink = TsvPlotSink::new(dir.path());

        let regular = ScatterSamples {
            observed: vec![1.0, 2.5],
            fitted: vec![1.5, 2.0],
        };
        let high = ScatterSamples {
            observed: vec![40.0],
            fitted: vec![38.0],
        };
        sink.write_samples("ctrl1", &[(Regime::Regular, &regular), (Regime::High, &high)])
            .unwrap();

        let rows = read_tsv_rows(&dir.path().join("fit_ctrl1.tsv")).unwrap();
        assert_eq!(
            rows,
            vec![
                ("regular".to_string(), 1.0, 1.5),
                ("regular".to_string(), 2.5, 2.0),
                ("high".to_string(), 40.0, 38.0),
            ]
        );
    }

    #[rstest]
    fn test_memory_sink() {
        let sink = MemoryPlotSink::new();
        let sample = ScatterSamples {
            observed: vec![1.0],
            fitted: vec![2.0],
        };
        sink.write_samples("exp1", &[(Regime::High, &sample)]).unwrap();

        assert_eq!(sink.get("exp1"), Some(vec![(Regime::High, sample)]));
        assert_eq!(sink.get("ctrl1"), None);
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0], Some(1.0))]
    #[case(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0], Some(-1.0))]
    #[case(&[1.0, 1.0, 1.0], &[3.0, 2.0, 1.0], None)]
    #[case(&[1.0], &[3.0], None)]
    fn test_pearson(#[case] x: &[f64], #[case] y: &[f64], #[case] expected: Option<f64>) {
        let r = pearson(x, y);
        match (r, expected) {
            (Some(r), Some(e)) => assert!((r - e).abs() < 1e-12),
            (r, e) => assert_eq!(r, e),
        }
    }
}
