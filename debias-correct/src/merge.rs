use std::fs::remove_file;
use std::path::{Path, PathBuf};

use log::{debug, info};

use debias_core::models::RegionSet;
use debias_io::{TrackReader, TrackStore, TrackWriter, read_records};

use crate::coalesce::coalesce;
use crate::context::CorrectionContext;
use crate::corrector::TempTrackFile;
use crate::errors::Result;
use crate::pool::WorkerPool;

pub fn corrected_path(output_dir: &Path, stem: &str) -> PathBuf {
    output_dir.join(format!("{}_corrected.bw", stem))
}

pub fn normalized_path(output_dir: &Path, stem: &str) -> PathBuf {
    output_dir.join(format!("{}_normalized.bw", stem))
}

///
/// Concatenate temporary record files, in the order given, into one output
/// track. Each file is deleted once consumed.
///
pub fn merge_track(
    store: &dyn TrackStore,
    header: &[(String, u32)],
    files: &[&TempTrackFile],
    output: &Path,
) -> Result<()> {
    let mut writer = store.create(output, header)?;

    for file in files {
        let records = read_records(&file.path)?;
        writer.add_records(&file.chrom, &records)?;
        remove_file(&file.path)?;
    }

    writer.close()?;
    Ok(())
}

///
/// Merge the temporary files of every track into `{stem}_corrected.bw`, one
/// worker per track.
///
pub fn merge_tracks(ctx: &CorrectionContext, temp_files: &[TempTrackFile]) -> Result<Vec<PathBuf>> {
    let per_track: Vec<(usize, Vec<&TempTrackFile>)> = (0..ctx.tracks.len())
        .map(|track_index| {
            let files = temp_files
                .iter()
                .filter(|file| file.track_index == track_index)
                .collect();
            (track_index, files)
        })
        .collect();

    let pool = WorkerPool::new(ctx.tracks.len());
    let outputs = pool.run(per_track, |(track_index, files)| {
        let output = corrected_path(ctx.output_dir(), &ctx.stems[track_index]);
        debug!("Merging {} temporary files into {:?}", files.len(), output);
        merge_track(ctx.track_store, &ctx.header, &files, &output)?;
        Ok(output)
    })?;

    for output in &outputs {
        info!("Wrote {:?}", output);
    }
    Ok(outputs)
}

///
/// Rewrite a track over `regions` with NaN and non-positive values left out
/// and everything else divided by `scaler`.
///
pub fn write_normalized(
    reader: &mut dyn TrackReader,
    writer: &mut dyn TrackWriter,
    regions: &RegionSet,
    scaler: f64,
) -> Result<()> {
    for region in regions.iter() {
        let values = reader.values(&region.chr, region.start, region.end)?;

        let (positions, scaled): (Vec<u32>, Vec<f32>) = values
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan() && *v > 0.0)
            .map(|(i, v)| (region.start + i as u32, (v as f64 / scaler) as f32))
            .unzip();

        if positions.is_empty() {
            continue;
        }
        writer.add_records(&region.chr, &coalesce(&positions, &scaled, Some(region.end)))?;
    }
    Ok(())
}

///
/// Write `{stem}_normalized.bw` for every track. The reference track is
/// copied as is.
///
pub fn write_normalized_tracks(ctx: &CorrectionContext, scalers: &[f64]) -> Result<Vec<PathBuf>> {
    let tasks: Vec<usize> = (0..ctx.tracks.len()).collect();

    let pool = WorkerPool::new(ctx.workers().min(ctx.tracks.len()));
    let outputs = pool.run(tasks, |track_index| {
        let output = normalized_path(ctx.output_dir(), &ctx.stems[track_index]);
        if track_index == 0 {
            ctx.track_store.copy(ctx.reference(), &output)?;
        } else {
            let mut reader = ctx.track_store.open(&ctx.tracks[track_index])?;
            let mut writer = ctx.track_store.create(&output, &ctx.header)?;
            write_normalized(
                reader.as_mut(),
                writer.as_mut(),
                &ctx.regions,
                scalers[track_index],
            )?;
            writer.close()?;
        }
        Ok(output)
    })?;

    for output in &outputs {
        info!("Wrote {:?}", output);
    }
    Ok(outputs)
}
