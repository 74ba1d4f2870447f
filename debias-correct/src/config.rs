use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::covariates::BiasType;
use crate::errors::{CorrectError, Result};

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|c| c.into())
        .unwrap_or(1)
}

fn default_true() -> bool {
    true
}

///
/// Run configuration for a correction. Loaded from YAML or TOML and/or built
/// from command line arguments, validated once, then treated as immutable.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectConfig {
    /// Control tracks; the first one is the reference.
    pub ctrl_tracks: Vec<PathBuf>,
    #[serde(default)]
    pub exp_tracks: Vec<PathBuf>,
    /// BED of analysis regions.
    pub regions: PathBuf,
    #[serde(default)]
    pub blacklist: Option<PathBuf>,
    pub covariate_dir: PathBuf,
    pub bias_types: Vec<BiasType>,
    /// Defaults to the `fragLen<N>` tag in the covariate directory name.
    #[serde(default)]
    pub frag_len: Option<u32>,
    pub output_dir: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Estimate per-track scalers against the reference track.
    #[serde(default = "default_true")]
    pub normalize: bool,
    /// Also write normalized, uncorrected tracks.
    #[serde(default)]
    pub generate_normalized: bool,
    /// Defaults to the number of input tracks.
    #[serde(default)]
    pub min_frag_filter: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CorrectConfig {
    fn default() -> Self {
        CorrectConfig {
            ctrl_tracks: Vec::new(),
            exp_tracks: Vec::new(),
            regions: PathBuf::new(),
            blacklist: None,
            covariate_dir: PathBuf::new(),
            bias_types: Vec::new(),
            frag_len: None,
            output_dir: PathBuf::from("."),
            workers: default_workers(),
            normalize: true,
            generate_normalized: false,
            min_frag_filter: None,
            seed: None,
        }
    }
}

impl CorrectConfig {
    ///
    /// Load a config file; `.toml` is read as TOML, everything else as YAML.
    ///
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config from {:?}: {}", path, e))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        Ok(config)
    }

    ///
    /// All tracks, controls first.
    ///
    pub fn tracks(&self) -> Vec<PathBuf> {
        self.ctrl_tracks
            .iter()
            .chain(self.exp_tracks.iter())
            .cloned()
            .collect()
    }

    pub fn track_count(&self) -> usize {
        self.ctrl_tracks.len() + self.exp_tracks.len()
    }

    pub fn min_frag_filter_value(&self) -> f64 {
        self.min_frag_filter
            .unwrap_or(self.track_count() as f64)
    }

    ///
    /// Structural checks that do not touch the filesystem.
    ///
    pub fn validate(&self) -> Result<()> {
        if self.ctrl_tracks.is_empty() {
            return Err(CorrectError::Config(
                "at least one control track is required".to_string(),
            ));
        }
        if self.regions.as_os_str().is_empty() {
            return Err(CorrectError::Config("a regions file is required".to_string()));
        }
        if self.covariate_dir.as_os_str().is_empty() {
            return Err(CorrectError::Config(
                "a covariate directory is required".to_string(),
            ));
        }
        if self.bias_types.is_empty() {
            return Err(CorrectError::Config(
                "at least one bias type is required".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(CorrectError::Config("workers must be at least 1".to_string()));
        }
        if self.frag_len == Some(0) {
            return Err(CorrectError::Config("fragment length must be positive".to_string()));
        }
        if let Some(value) = self.min_frag_filter {
            if !value.is_finite() || value < 0.0 {
                return Err(CorrectError::Config(format!(
                    "invalid minimum fragment filter: {}",
                    value
                )));
            }
        }

        let tracks = self.tracks();
        for (i, track) in tracks.iter().enumerate() {
            if tracks[..i].contains(track) {
                return Err(CorrectError::Config(format!(
                    "track {:?} is listed more than once",
                    track
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn config() -> CorrectConfig {
        CorrectConfig {
            ctrl_tracks: vec![PathBuf::from("ctrl1.bw"), PathBuf::from("ctrl2.bw")],
            exp_tracks: vec![PathBuf::from("exp1.bw")],
            regions: PathBuf::from("regions.bed"),
            covariate_dir: PathBuf::from("hg38_fragLen200_kmer50"),
            bias_types: vec![BiasType::Shear, BiasType::Map],
            output_dir: PathBuf::from("out"),
            workers: 4,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debias.yaml");
        std::fs::write(
            &path,
            "ctrl_tracks: [ctrl1.bw]\n\
             regions: regions.bed\n\
             covariate_dir: covari\n\
             bias_types: [shear, pcr, gquad]\n\
             output_dir: out\n\
             workers: 2\n\
             seed: 7\n",
        )
        .unwrap();

        let config = CorrectConfig::from_file(&path).unwrap();
        assert_eq!(config.ctrl_tracks, vec![PathBuf::from("ctrl1.bw")]);
        assert_eq!(
            config.bias_types,
            vec![BiasType::Shear, BiasType::Pcr, BiasType::Gquad]
        );
        assert!(config.normalize);
        assert!(!config.generate_normalized);
        assert_eq!(config.seed, Some(7));
        config.validate().unwrap();
    }

    #[rstest]
    fn test_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debias.toml");
        std::fs::write(
            &path,
            "ctrl_tracks = [\"ctrl1.bw\"]\n\
             exp_tracks = [\"exp1.bw\"]\n\
             regions = \"regions.bed\"\n\
             covariate_dir = \"hg38_fragLen200\"\n\
             bias_types = [\"map\", \"shear\"]\n\
             output_dir = \"out\"\n\
             normalize = false\n",
        )
        .unwrap();

        let config = CorrectConfig::from_file(&path).unwrap();
        assert_eq!(config.exp_tracks, vec![PathBuf::from("exp1.bw")]);
        assert_eq!(config.bias_types, vec![BiasType::Map, BiasType::Shear]);
        assert_eq!(config.workers, default_workers());
        assert!(!config.normalize);
        config.validate().unwrap();
    }

    #[rstest]
    fn test_unknown_field_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debias.yaml");
        std::fs::write(&path, "ctrl_tracks: [a.bw]\nnot_a_field: 1\n").unwrap();

        assert!(CorrectConfig::from_file(&path).is_err());
    }

    #[rstest]
    fn test_min_frag_filter_defaults_to_track_count(config: CorrectConfig) {
        assert_eq!(config.min_frag_filter_value(), 3.0);

        let config = CorrectConfig {
            min_frag_filter: Some(10.0),
            ..config
        };
        assert_eq!(config.min_frag_filter_value(), 10.0);
    }

    #[rstest]
    #[case::no_ctrl(|c: &mut CorrectConfig| c.ctrl_tracks.clear())]
    #[case::no_bias(|c: &mut CorrectConfig| c.bias_types.clear())]
    #[case::no_regions(|c: &mut CorrectConfig| c.regions = PathBuf::new())]
    #[case::zero_workers(|c: &mut CorrectConfig| c.workers = 0)]
    #[case::zero_frag_len(|c: &mut CorrectConfig| c.frag_len = Some(0))]
    #[case::duplicate_track(|c: &mut CorrectConfig| c.exp_tracks.push(PathBuf::from("ctrl1.bw")))]
    #[case::negative_filter(|c: &mut CorrectConfig| c.min_frag_filter = Some(-1.0))]
    fn test_validate_rejects(config: CorrectConfig, #[case] breaks: fn(&mut CorrectConfig)) {
        let mut config = config;
        breaks(&mut config);
        assert!(matches!(config.validate(), Err(CorrectError::Config(_))));
    }
}
