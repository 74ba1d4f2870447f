use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use log::info;

use debias_correct::{BiasType, CorrectConfig, run};

fn paths(matches: &ArgMatches, id: &str) -> Option<Vec<PathBuf>> {
    matches
        .get_many::<String>(id)
        .map(|values| values.map(PathBuf::from).collect())
}

fn path(matches: &ArgMatches, id: &str) -> Option<PathBuf> {
    matches.get_one::<String>(id).map(PathBuf::from)
}

///
/// Start from the config file, if any, and apply every option given on the
/// command line on top of it.
///
pub fn config_from_matches(matches: &ArgMatches) -> Result<CorrectConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(file) => CorrectConfig::from_file(Path::new(file))?,
        None => CorrectConfig::default(),
    };

    if let Some(ctrl) = paths(matches, "ctrl") {
        config.ctrl_tracks = ctrl;
    }
    if let Some(exp) = paths(matches, "exp") {
        config.exp_tracks = exp;
    }
    if let Some(regions) = path(matches, "regions") {
        config.regions = regions;
    }
    if let Some(blacklist) = path(matches, "blacklist") {
        config.blacklist = Some(blacklist);
    }
    if let Some(covariates) = path(matches, "covariates") {
        config.covariate_dir = covariates;
    }
    if let Some(bias) = matches.get_many::<String>("bias") {
        config.bias_types = bias
            .map(|b| b.parse::<BiasType>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
    }
    if let Some(output) = path(matches, "output") {
        config.output_dir = output;
    }
    if let Some(&frag_len) = matches.get_one::<u32>("frag-len") {
        config.frag_len = Some(frag_len);
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.workers = workers;
    }
    if let Some(&min_frag_filter) = matches.get_one::<f64>("min-frag-filter") {
        config.min_frag_filter = Some(min_frag_filter);
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = Some(seed);
    }
    if matches.get_flag("no-normalize") {
        config.normalize = false;
    }
    if matches.get_flag("generate-normalized") {
        config.generate_normalized = true;
    }

    config.validate()?;
    Ok(config)
}

pub fn run_correct(matches: &ArgMatches) -> Result<()> {
    let config = config_from_matches(matches)?;

    info!(
        "Correcting {} control and {} experimental tracks into {:?}",
        config.ctrl_tracks.len(),
        config.exp_tracks.len(),
        config.output_dir
    );

    let output = run(config).context("Bias correction failed")?;

    for path in output.corrected.iter().chain(&output.normalized) {
        info!("Output: {}", path.display());
    }
    info!("Coefficients: {}", output.report.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::correct::cli::create_correct_cli;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn matches(args: &[&str]) -> ArgMatches {
        create_correct_cli()
            .try_get_matches_from(std::iter::once("correct").chain(args.iter().copied()))
            .unwrap()
    }

    #[rstest]
    fn test_config_from_arguments() {
        let config = config_from_matches(&matches(&[
            "--ctrl",
            "ctrl1.bw",
            "ctrl2.bw",
            "--exp",
            "exp1.bw",
            "--regions",
            "regions.bed",
            "--covariates",
            "hg38_fragLen200",
            "--bias",
            "shear",
            "gquad",
            "--workers",
            "3",
            "--no-normalize",
            "--seed",
            "11",
        ]))
        .unwrap();

        assert_eq!(
            config.ctrl_tracks,
            vec![PathBuf::from("ctrl1.bw"), PathBuf::from("ctrl2.bw")]
        );
        assert_eq!(config.exp_tracks, vec![PathBuf::from("exp1.bw")]);
        assert_eq!(config.bias_types, vec![BiasType::Shear, BiasType::Gquad]);
        assert_eq!(config.workers, 3);
        assert!(!config.normalize);
        assert_eq!(config.seed, Some(11));
        assert_eq!(config.frag_len, None);
    }

    #[rstest]
    fn test_arguments_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("debias.yaml");
        std::fs::write(
            &file,
            "ctrl_tracks: [ctrl1.bw]\n\
             regions: regions.bed\n\
             covariate_dir: hg38_fragLen200\n\
             bias_types: [map]\n\
             output_dir: out\n\
             workers: 8\n",
        )
        .unwrap();

        let config = config_from_matches(&matches(&[
            "--config",
            file.to_str().unwrap(),
            "--workers",
            "2",
            "--frag-len",
            "150",
            "--generate-normalized",
        ]))
        .unwrap();

        assert_eq!(config.ctrl_tracks, vec![PathBuf::from("ctrl1.bw")]);
        assert_eq!(config.bias_types, vec![BiasType::Map]);
        assert_eq!(config.workers, 2);
        assert_eq!(config.frag_len, Some(150));
        assert!(config.generate_normalized);
        assert!(config.normalize);
    }

    #[rstest]
    fn test_unknown_bias_type() {
        let result = config_from_matches(&matches(&[
            "--ctrl",
            "ctrl1.bw",
            "--regions",
            "regions.bed",
            "--covariates",
            "hg38_fragLen200",
            "--bias",
            "gc",
        ]));
        assert!(result.is_err());
    }

    #[rstest]
    fn test_missing_required_inputs() {
        assert!(config_from_matches(&matches(&["--bias", "map"])).is_err());
    }
}
