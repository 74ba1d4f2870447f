use std::path::PathBuf;
use std::time::Instant;

use log::{info, warn};

use debias_core::models::RegionSet;
use debias_io::{BigWigStore, CovariateStore, TrackStore};

use crate::config::CorrectConfig;
use crate::context::CorrectionContext;
use crate::corrector::{CorrectionModel, correct_genome};
use crate::covariates::StoredCovariates;
use crate::errors::{CorrectError, Result, Stage, StageContext};
use crate::merge::{merge_tracks, write_normalized_tracks};
use crate::plot::{PlotSink, TsvPlotSink, pearson};
use crate::regression::{FitResult, fit_models};
use crate::report::{CoefficientReport, REPORT_FILE_NAME};
use crate::sampler::select_training_sets;
use crate::scaler::estimate_scalers;

///
/// Files produced by a run.
///
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutput {
    pub corrected: Vec<PathBuf>,
    pub normalized: Vec<PathBuf>,
    pub report: PathBuf,
    pub scalers: Vec<f64>,
}

///
/// Analysis regions of a run: the regions BED, minus the blacklist, with
/// overlapping and book-ended regions merged.
///
pub fn load_regions(config: &CorrectConfig) -> Result<RegionSet> {
    let regions = RegionSet::try_from(config.regions.as_path())
        .map_err(|e| CorrectError::Config(format!("{:#}", e)))?
        .merged();

    let Some(blacklist) = &config.blacklist else {
        return Ok(regions);
    };

    let excluded = RegionSet::try_from(blacklist.as_path())
        .map_err(|e| CorrectError::Config(format!("{:#}", e)))?;
    let kept = regions.subtract(&excluded);
    info!(
        "Blacklist removed {} bp from the analysis regions",
        regions.cumulative_size() - kept.cumulative_size()
    );

    Ok(kept)
}

///
/// Run a correction against bigWig tracks and `.npy` covariates on disk.
///
pub fn run(config: CorrectConfig) -> Result<CorrectionOutput> {
    config.validate()?;

    let regions = load_regions(&config)?;
    let covariates =
        StoredCovariates::new(&config.bias_types, &config.covariate_dir, config.frag_len)?;
    let track_store = BigWigStore::default();
    let covariate_store = covariates.npy_store();
    let plot_sink = TsvPlotSink::new(&config.output_dir);

    run_with(config, regions, &track_store, &covariate_store, &plot_sink)
}

fn timed<T>(stage: Stage, work: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let result = work().in_stage(stage);
    if result.is_ok() {
        info!("{} stage finished in {:.2?}", stage, start.elapsed());
    }
    result
}

fn write_scatter_samples(ctx: &CorrectionContext, regular: &FitResult, high: &FitResult) -> Result<()> {
    for (track_index, stem) in ctx.stems.iter().enumerate() {
        let samples = [
            (regular.regime, &regular.samples[track_index]),
            (high.regime, &high.samples[track_index]),
        ];

        for (regime, sample) in &samples {
            match pearson(&sample.observed, &sample.fitted) {
                Some(r) => info!("{} {} regime fit: pearson r = {:.4}", stem, regime, r),
                None => warn!("{} {} regime fit: correlation undefined", stem, regime),
            }
        }

        ctx.plot_sink.write_samples(stem, &samples)?;
    }
    Ok(())
}

///
/// Run a correction with the given stores.
///
pub fn run_with(
    config: CorrectConfig,
    regions: RegionSet,
    track_store: &dyn TrackStore,
    covariate_store: &dyn CovariateStore,
    plot_sink: &dyn PlotSink,
) -> Result<CorrectionOutput> {
    let run_start = Instant::now();
    let ctx = CorrectionContext::new(config, regions, track_store, covariate_store, plot_sink)?;

    let training = timed(Stage::Sampling, || {
        let mut rng = ctx.rng(0);
        select_training_sets(
            ctx.track_store,
            ctx.reference(),
            &ctx.regions,
            ctx.output_dir(),
            ctx.workers(),
            &mut rng,
        )
    })?;

    let scalers = timed(Stage::Scaling, || {
        let scaler_set = training.combined_or(&ctx.regions);
        estimate_scalers(
            ctx.track_store,
            &ctx.tracks,
            &scaler_set,
            ctx.config.normalize,
            ctx.workers(),
        )
    })?;

    let model = timed(Stage::Regression, || {
        let regular_set = training.regular_or(&ctx.regions);
        let high_set = training.high_or(&ctx.regions);
        let (regular, high) = fit_models(&ctx, &regular_set, &high_set, &scalers)?;

        write_scatter_samples(&ctx, &regular, &high)?;

        Ok(CorrectionModel::new(
            scalers.clone(),
            &regular,
            &high,
            training.high_rc,
            ctx.covariates.selected_columns(),
            ctx.min_frag_filter,
        ))
    })?;

    for name in ctx.covariates.selected_names() {
        info!("Selected covariate: {}", name);
    }

    let report = ctx.output_dir().join(REPORT_FILE_NAME);
    CoefficientReport::new(
        ctx.covariates.order.clone(),
        ctx.covariates.selected.clone(),
        ctx.covariates.frag_len,
        &ctx.tracks,
        ctx.ctrl_count,
        &model,
    )
    .write(&report)?;

    let temp_files = timed(Stage::Correction, || correct_genome(&ctx, &model))?;

    let (corrected, normalized) = timed(Stage::Merge, || {
        let corrected = merge_tracks(&ctx, &temp_files)?;
        let normalized = if ctx.config.generate_normalized {
            write_normalized_tracks(&ctx, &model.scalers)?
        } else {
            Vec::new()
        };
        Ok((corrected, normalized))
    })?;

    info!("Correction finished in {:.2?}", run_start.elapsed());

    Ok(CorrectionOutput {
        corrected,
        normalized,
        report,
        scalers: model.scalers,
    })
}
