//! Log-space least squares fit of read counts against covariates.
//!
//! For every track and each read-count regime the model
//! `ln(count / scaler) = b0 + sum(b_i * feature_i)` is fit over the
//! coordinate-aligned training positions. Coefficient vectors always carry
//! one slot per stored feature; features that are not selected stay at 0.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display};

use faer::Mat;
use faer::linalg::solvers::SolveLstsq;
use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2, s};
use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

use debias_core::align_coordinates;
use debias_core::consts::{COVARIATE_FILE_INDEX_OFFSET, SCATTERPLOT_SAMPLE_COUNT};
use debias_core::models::{Region, RegionSet};
use debias_io::CovariateStore;

use crate::context::CorrectionContext;
use crate::covariates::StoredCovariates;
use crate::errors::{CorrectError, Result};
use crate::pool::WorkerPool;
use crate::scaler::read_counts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Regular,
    High,
}

impl Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Regular => write!(f, "regular"),
            Regime::High => write!(f, "high"),
        }
    }
}

///
/// Observed scaled counts and model predictions at the scatter sample
/// positions of one track.
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScatterSamples {
    pub observed: Vec<f64>,
    pub fitted: Vec<f64>,
}

///
/// Coefficients and scatter samples of one regime, one entry per track.
///
#[derive(Debug, Clone)]
pub struct FitResult {
    pub regime: Regime,
    pub coefficients: Vec<Vec<f64>>,
    pub samples: Vec<ScatterSamples>,
}

///
/// Positions to sample for a scatter plot: everything for small populations,
/// otherwise [SCATTERPLOT_SAMPLE_COUNT] distinct positions.
///
pub fn scatterplot_sample_indices<R: Rng + ?Sized>(population: usize, rng: &mut R) -> Vec<usize> {
    if population <= SCATTERPLOT_SAMPLE_COUNT {
        return (0..population).collect();
    }
    rand::seq::index::sample(rng, population, SCATTERPLOT_SAMPLE_COUNT).into_vec()
}

///
/// Narrow every training region so its covariate windows stay inside the
/// chromosome. Regions that vanish, or whose chromosome has no known length,
/// are dropped.
///
pub fn align_training_set(
    training: &RegionSet,
    chrom_lengths: &HashMap<String, u32>,
    frag_len: u32,
) -> RegionSet {
    training
        .iter()
        .filter_map(|region| {
            let length = *chrom_lengths.get(&region.chr)?;
            let (start, end) = align_coordinates(region.start, region.end, length, frag_len)?;
            Region::new(region.chr.as_str(), start, end).ok()
        })
        .collect()
}

///
/// Covariate rows of every position of `aligned`, concatenated in region
/// order. Each chromosome's matrix is opened and shape-checked once.
///
pub fn load_training_covariates(
    store: &dyn CovariateStore,
    covariates: &StoredCovariates,
    aligned: &RegionSet,
) -> Result<Array2<f32>> {
    let total = aligned.cumulative_size() as usize;

    let mut by_chrom: BTreeMap<&str, Vec<(usize, &Region)>> = BTreeMap::new();
    let mut offset = 0;
    for region in aligned.iter() {
        by_chrom
            .entry(region.chr.as_str())
            .or_default()
            .push((offset, region));
        offset += region.width() as usize;
    }

    let mut features = Array2::from_elem((total, covariates.feature_count()), f32::NAN);
    for (chr, regions) in by_chrom {
        let source = store.open(chr)?;
        let end = regions.iter().map(|(_, r)| r.end).max().unwrap_or(0);
        covariates.check_source(chr, source.as_ref(), end)?;

        for (offset, region) in regions {
            let rows = source.rows(
                (region.start - COVARIATE_FILE_INDEX_OFFSET) as usize,
                (region.end - COVARIATE_FILE_INDEX_OFFSET) as usize,
            )?;
            features
                .slice_mut(s![offset..offset + region.width() as usize, ..])
                .assign(&rows);
        }
    }

    Ok(features)
}

///
/// Least squares fit of `ln(counts)` on the `selected` columns of `features`
/// plus an intercept. Rows with a non-positive count or a non-finite selected
/// feature are left out. Returns `1 + features.ncols()` coefficients.
///
pub fn fit_coefficients(
    counts: &[f64],
    features: ArrayView2<f32>,
    selected: &[usize],
) -> Result<Vec<f64>> {
    if counts.len() != features.nrows() {
        return Err(CorrectError::RegressionFit(format!(
            "{} counts for {} covariate rows",
            counts.len(),
            features.nrows()
        )));
    }

    if let Some(&column) = selected.iter().find(|&&c| c >= features.ncols()) {
        return Err(CorrectError::RegressionFit(format!(
            "selected column {} outside {} covariate columns",
            column,
            features.ncols()
        )));
    }

    let usable: Vec<usize> = (0..counts.len())
        .filter(|&i| {
            counts[i] > 0.0
                && counts[i].is_finite()
                && selected.iter().all(|&c| features[[i, c]].is_finite())
        })
        .collect();

    let unknowns = selected.len() + 1;
    if usable.len() < unknowns {
        return Err(CorrectError::RegressionFit(format!(
            "{} usable positions for {} coefficients",
            usable.len(),
            unknowns
        )));
    }

    let x = Mat::<f64>::from_fn(usable.len(), unknowns, |i, j| {
        if j == 0 {
            1.0
        } else {
            features[[usable[i], selected[j - 1]]] as f64
        }
    });
    let y = Mat::<f64>::from_fn(usable.len(), 1, |i, _| counts[usable[i]].ln());

    let beta = x.qr().solve_lstsq(&y);

    let mut coefficients = vec![0.0; features.ncols() + 1];
    coefficients[0] = beta[(0, 0)];
    for (j, &column) in selected.iter().enumerate() {
        coefficients[column + 1] = beta[(j + 1, 0)];
    }

    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(CorrectError::RegressionFit(format!(
            "singular design matrix, coefficients {:?}",
            coefficients
        )));
    }

    Ok(coefficients)
}

///
/// `exp(b0 + sum(b_i * feature_i))` over the selected features of one
/// covariate row. NaN features contribute nothing. Every selected column
/// must exist in `row`.
///
pub fn predict(row: ArrayView1<f32>, coefficients: &[f64], selected: &[usize]) -> f64 {
    let linear = selected.iter().fold(coefficients[0], |acc, &c| {
        let feature = row[c];
        if feature.is_nan() {
            acc
        } else {
            acc + feature as f64 * coefficients[c + 1]
        }
    });
    linear.exp()
}

///
/// Fit every track over one regime's training set.
///
pub fn fit_regime(
    ctx: &CorrectionContext,
    regime: Regime,
    training: &RegionSet,
    scalers: &[f64],
    rng: &mut StdRng,
) -> Result<FitResult> {
    let aligned = align_training_set(training, &ctx.chrom_lengths, ctx.covariates.frag_len);
    debug!(
        "{} regime: {} aligned training regions ({} bp)",
        regime,
        aligned.len(),
        aligned.cumulative_size()
    );

    let features = load_training_covariates(ctx.covariate_store, &ctx.covariates, &aligned)?;
    let selected = ctx.covariates.selected_columns();
    let sample = scatterplot_sample_indices(aligned.cumulative_size() as usize, rng);

    let mut coefficients = Vec::with_capacity(ctx.tracks.len());
    let mut samples = Vec::with_capacity(ctx.tracks.len());

    for (track, &scaler) in ctx.tracks.iter().zip(scalers) {
        let mut reader = ctx.track_store.open(track)?;
        let counts: Vec<f64> = read_counts(reader.as_mut(), &aligned)?
            .into_iter()
            .map(|c| c / scaler)
            .collect();

        let coefs = fit_coefficients(&counts, features.view(), &selected).map_err(|e| {
            CorrectError::RegressionFit(format!("{} regime of {:?}: {}", regime, track, e))
        })?;
        info!("{} regime coefficients for {:?}: {:?}", regime, track, coefs);

        samples.push(ScatterSamples {
            observed: sample.iter().map(|&i| counts[i]).collect(),
            fitted: sample
                .iter()
                .map(|&i| predict(features.row(i), &coefs, &selected))
                .collect(),
        });
        coefficients.push(coefs);
    }

    Ok(FitResult {
        regime,
        coefficients,
        samples,
    })
}

///
/// Fit the regular and high read-count regimes side by side.
///
pub fn fit_models(
    ctx: &CorrectionContext,
    regular: &RegionSet,
    high: &RegionSet,
    scalers: &[f64],
) -> Result<(FitResult, FitResult)> {
    let tasks = vec![
        (Regime::Regular, regular, ctx.rng(1)),
        (Regime::High, high, ctx.rng(2)),
    ];

    let pool = WorkerPool::new(2);
    let mut fits = pool.run(tasks, |(regime, training, mut rng)| {
        fit_regime(ctx, regime, training, scalers, &mut rng)
    })?;

    let high_fit = fits.pop();
    let regular_fit = fits.pop();
    match (regular_fit, high_fit) {
        (Some(regular), Some(high)) => Ok((regular, high)),
        _ => Err(CorrectError::Worker(
            "regression pool returned too few results".to_string(),
        )),
    }
}
