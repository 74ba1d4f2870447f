use std::path::{Path, PathBuf};

use log::info;

use debias_core::models::RegionSet;
use debias_io::{TrackReader, TrackStore};

use crate::errors::{CorrectError, Result};
use crate::pool::WorkerPool;

///
/// Concatenated read counts of `regions`, missing values read as 0.
///
pub fn read_counts(reader: &mut dyn TrackReader, regions: &RegionSet) -> Result<Vec<f64>> {
    let mut counts = Vec::with_capacity(regions.cumulative_size() as usize);
    for region in regions.iter() {
        let values = reader.values(&region.chr, region.start, region.end)?;
        counts.extend(values.into_iter().map(|v| if v.is_nan() { 0.0 } else { v as f64 }));
    }
    Ok(counts)
}

///
/// Slope of the no-intercept least squares fit `other ≈ scaler * reference`.
///
pub fn estimate_scaler(reference: &[f64], other: &[f64]) -> Result<f64> {
    if reference.len() != other.len() {
        return Err(CorrectError::RegressionFit(format!(
            "scaler inputs differ in length ({} vs {})",
            reference.len(),
            other.len()
        )));
    }

    let (xy, xx) = reference
        .iter()
        .zip(other)
        .fold((0.0, 0.0), |(xy, xx), (&x, &y)| (xy + x * y, xx + x * x));

    if xx == 0.0 {
        return Err(CorrectError::RegressionFit(
            "reference track has no signal over the training set".to_string(),
        ));
    }

    Ok(xy / xx)
}

///
/// One scaler per track (controls first). The reference track is fixed at 1;
/// the others are estimated concurrently over `training`. With normalization
/// off every scaler is 1.
///
pub fn estimate_scalers(
    store: &dyn TrackStore,
    tracks: &[PathBuf],
    training: &RegionSet,
    normalize: bool,
    workers: usize,
) -> Result<Vec<f64>> {
    if !normalize || tracks.len() < 2 {
        return Ok(vec![1.0; tracks.len()]);
    }

    let reference = {
        let mut reader = store.open(&tracks[0])?;
        read_counts(reader.as_mut(), training)?
    };

    let others: Vec<&Path> = tracks[1..].iter().map(|p| p.as_path()).collect();
    let pool = WorkerPool::new(workers.min(others.len()));
    let estimated = pool.run(others, |track| {
        let mut reader = store.open(track)?;
        let counts = read_counts(reader.as_mut(), training)?;
        estimate_scaler(&reference, &counts)
    })?;

    let mut scalers = Vec::with_capacity(tracks.len());
    scalers.push(1.0);
    scalers.extend(estimated);

    for (track, scaler) in tracks.iter().zip(&scalers) {
        info!("Scaler for {:?}: {}", track, scaler);
    }

    Ok(scalers)
}
