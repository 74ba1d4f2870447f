//! Percentile-stratified selection of training bins.
//!
//! Mean reference read counts are computed per 1 kb bin over the analysis
//! regions, cut into 11 strata at fixed percentiles, and each stratum is
//! subsampled to a fixed share of at most 1000 bins. The five lower strata
//! form the regular read-count training set, the six upper ones the high
//! read-count set.

use std::fs::{File, remove_file};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rand::Rng;

use debias_core::array_split;
use debias_core::consts::{
    HIGH_RC_PERCENTILE_INDEX, MAX_TRAINING_BASES, TRAINING_BIN_SIZE, TRAINING_PERCENTILES,
};
use debias_core::models::{Region, RegionSet};
use debias_core::utils::round_half_even;
use debias_io::{TrackReader, TrackStore};

use crate::errors::{CorrectError, Result};
use crate::pool::WorkerPool;

/// Number of strata between consecutive cut points.
pub const BUCKET_COUNT: usize = TRAINING_PERCENTILES.len() - 1;

/// Strata below this index feed the regular read-count set.
pub const REGULAR_BUCKET_COUNT: usize = 5;

///
/// One percentile stratum and its candidate bins on disk.
///
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingBucketMeta {
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub target_count: usize,
    pub candidate_count: usize,
    pub candidate_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TrainingSets {
    pub regular: RegionSet,
    pub high: RegionSet,
    /// Reference read count above which a position counts as high.
    pub high_rc: f64,
    pub cut_points: Vec<i64>,
}

impl TrainingSets {
    ///
    /// Training bins for scaler estimation: both sets, or every analysis region
    /// if either set came out empty.
    ///
    pub fn combined_or(&self, all: &RegionSet) -> RegionSet {
        if self.regular.is_empty() || self.high.is_empty() {
            warn!("Degenerate training set; estimating scalers over all analysis regions");
            all.clone()
        } else {
            self.regular.clone() + self.high.clone()
        }
    }

    pub fn regular_or(&self, all: &RegionSet) -> RegionSet {
        if self.regular.is_empty() {
            warn!("Empty regular read-count training set; using all analysis regions");
            all.clone()
        } else {
            self.regular.clone()
        }
    }

    pub fn high_or(&self, all: &RegionSet) -> RegionSet {
        if self.high.is_empty() {
            warn!("Empty high read-count training set; using all analysis regions");
            all.clone()
        } else {
            self.high.clone()
        }
    }
}

///
/// Mean of each of `bin_count` nearly equal chunks of `values`. A chunk with a
/// NaN has a NaN mean.
///
pub fn bin_means(values: &[f32], bin_count: usize) -> Vec<f64> {
    array_split(values, bin_count)
        .into_iter()
        .map(|chunk| {
            if chunk.is_empty() {
                return f64::NAN;
            }
            let sum: f64 = chunk.iter().map(|&v| v as f64).sum();
            sum / chunk.len() as f64
        })
        .collect()
}

///
/// Per-bin mean read counts of every region, plus the total number of bins.
/// A region contributes `max(1, width / 1000)` bins spanning all of it.
///
pub fn region_bin_means(reader: &mut dyn TrackReader, regions: &RegionSet) -> Result<(Vec<f64>, usize)> {
    let mut means = Vec::new();
    let mut total_bins = 0;

    for region in regions.iter() {
        let bin_count = ((region.width() / TRAINING_BIN_SIZE) as usize).max(1);
        total_bins += bin_count;

        let values = reader.values(&region.chr, region.start, region.end)?;
        means.extend(bin_means(&values, bin_count));
    }

    Ok((means, total_bins))
}

///
/// Linear-interpolated percentile of sorted data.
///
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (sorted.len() - 1) as f64 * p / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

///
/// Integer cut points at [TRAINING_PERCENTILES] of the positive, non-NaN means.
///
pub fn cut_points(means: &[f64]) -> Result<Vec<i64>> {
    let mut valid: Vec<f64> = means
        .iter()
        .copied()
        .filter(|m| !m.is_nan() && *m > 0.0)
        .collect();

    if valid.is_empty() {
        return Err(CorrectError::NoTrainingSignal);
    }
    valid.sort_by(|a, b| a.total_cmp(b));

    Ok(TRAINING_PERCENTILES
        .iter()
        .map(|&p| percentile(&valid, p) as i64)
        .collect())
}

///
/// Bins to draw from each stratum given the total number of bins available.
///
pub fn bucket_targets(total_bins: usize) -> [usize; BUCKET_COUNT] {
    let max_bins = (MAX_TRAINING_BASES / TRAINING_BIN_SIZE as u64) as usize;
    let total = total_bins.min(max_bins) as f64;

    let regular = round_half_even(total * 0.5 / 5.0) as usize;
    let high = round_half_even(total * 0.5 / 9.0) as usize;

    let mut targets = [high; BUCKET_COUNT];
    targets[..REGULAR_BUCKET_COUNT].fill(regular);
    targets[BUCKET_COUNT - 1] = 3 * high;
    targets
}

///
/// Scan every region in whole 1 kb bins and write the bins whose mean falls in
/// `[lower, upper)` to a candidate file in `work_dir`. Returns `None` (and
/// leaves no file behind) when nothing qualifies.
///
pub fn fill_bucket(
    reader: &mut dyn TrackReader,
    regions: &RegionSet,
    lower: i64,
    upper: i64,
    target_count: usize,
    work_dir: &Path,
) -> Result<Option<TrainingBucketMeta>> {
    let candidates = tempfile::Builder::new()
        .prefix("candidates_")
        .suffix(".txt")
        .tempfile_in(work_dir)?;
    let (file, candidate_path) = candidates.keep().map_err(|e| e.error)?;
    let mut out = BufWriter::new(file);

    let (lower_f, upper_f) = (lower as f64, upper as f64);
    let in_bucket = |mean: f64| mean > 0.0 && mean >= lower_f && mean < upper_f;
    let mut candidate_count = 0;

    for region in regions.iter() {
        let bin_count = (region.width() / TRAINING_BIN_SIZE) as usize;

        if bin_count == 0 {
            let values = reader.values(&region.chr, region.start, region.end)?;
            let mean = bin_means(&values, 1)[0];
            if in_bucket(mean) {
                writeln!(out, "{}", region.as_string())?;
                candidate_count += 1;
            }
            continue;
        }

        let end = region.start + bin_count as u32 * TRAINING_BIN_SIZE;
        let values = reader.values(&region.chr, region.start, end)?;

        for (i, mean) in bin_means(&values, bin_count).into_iter().enumerate() {
            if in_bucket(mean) {
                let bin_start = region.start + i as u32 * TRAINING_BIN_SIZE;
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    region.chr,
                    bin_start,
                    bin_start + TRAINING_BIN_SIZE
                )?;
                candidate_count += 1;
            }
        }
    }
    out.flush()?;
    drop(out);

    if candidate_count == 0 {
        remove_file(&candidate_path)?;
        return Ok(None);
    }

    Ok(Some(TrainingBucketMeta {
        lower_bound: lower,
        upper_bound: upper,
        target_count,
        candidate_count,
        candidate_path,
    }))
}

///
/// Draw the bucket's training bins and delete its candidate file. Buckets with
/// fewer candidates than their target contribute every candidate.
///
pub fn subsample_bucket<R: Rng + ?Sized>(meta: &TrainingBucketMeta, rng: &mut R) -> Result<Vec<Region>> {
    let reader = BufReader::new(File::open(&meta.candidate_path)?);
    let mut candidates = Vec::with_capacity(meta.candidate_count);
    for line in reader.lines() {
        let line = line?;
        let region = line
            .parse::<Region>()
            .map_err(|e| CorrectError::Io(std::io::Error::other(e)))?;
        candidates.push(region);
    }
    remove_file(&meta.candidate_path)?;

    if candidates.len() < meta.target_count {
        return Ok(candidates);
    }

    let mut picked = rand::seq::index::sample(rng, candidates.len(), meta.target_count).into_vec();
    picked.sort_unstable();

    Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
}

///
/// Build the regular and high read-count training sets from the reference
/// track.
///
pub fn select_training_sets<R: Rng + ?Sized>(
    store: &dyn TrackStore,
    reference: &Path,
    regions: &RegionSet,
    work_dir: &Path,
    workers: usize,
    rng: &mut R,
) -> Result<TrainingSets> {
    let (means, total_bins) = {
        let mut reader = store.open(reference)?;
        region_bin_means(reader.as_mut(), regions)?
    };

    let cuts = cut_points(&means)?;
    let targets = bucket_targets(total_bins);
    let high_rc = cuts[HIGH_RC_PERCENTILE_INDEX] as f64;
    debug!("Training cut points: {:?}, targets: {:?}", cuts, targets);

    let intervals: Vec<(i64, i64, usize)> = (0..BUCKET_COUNT)
        .map(|i| (cuts[i], cuts[i + 1], targets[i]))
        .collect();

    let pool = WorkerPool::new(workers.min(BUCKET_COUNT));
    let buckets = pool.run(intervals, |(lower, upper, target)| {
        let mut reader = store.open(reference)?;
        fill_bucket(reader.as_mut(), regions, lower, upper, target, work_dir)
    })?;

    let mut regular = RegionSet::new();
    let mut high = RegionSet::new();
    for (i, bucket) in buckets.iter().enumerate() {
        let Some(meta) = bucket else {
            debug!("No candidates in training stratum {}", i);
            continue;
        };

        let picked = subsample_bucket(meta, &mut *rng)?;
        let target = if i < REGULAR_BUCKET_COUNT {
            &mut regular
        } else {
            &mut high
        };
        for region in picked {
            target.push(region);
        }
    }

    info!(
        "Training sets: {} regular bins, {} high read-count bins (high read count > {})",
        regular.len(),
        high.len(),
        high_rc
    );

    Ok(TrainingSets {
        regular,
        high,
        high_rc,
        cut_points: cuts,
    })
}
