//! Genome-wide application of the fitted models.
//!
//! The analysis regions are cut into 50 kb bins and split into contiguous
//! jobs. Each job walks its bins chromosome by chromosome, subtracts the
//! predicted read count from every qualifying position of every track and
//! appends the run-length encoded residuals to one temporary record file per
//! `(track, chromosome task)`.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use ndarray::ArrayView2;

use debias_core::consts::{COVARIATE_FILE_INDEX_OFFSET, GENOME_BIN_SIZE};
use debias_core::models::{Region, RegionSet};
use debias_core::utils::round_half_even;
use debias_core::{align_coordinates, array_split, divide_genome};
use debias_io::{CorrectedRecord, RecordWriter, TrackReader};

use crate::coalesce::coalesce;
use crate::context::CorrectionContext;
use crate::errors::{CorrectError, Result};
use crate::pool::WorkerPool;
use crate::regression::{FitResult, predict};

///
/// Consecutive genome bins of one chromosome inside a job. `chrom_id` is
/// unique within the run and names the task's temporary files.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ChromTask {
    pub chrom: String,
    pub chrom_id: usize,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionJob {
    pub tasks: Vec<ChromTask>,
}

///
/// Residual records of one track for one chromosome task, waiting to be
/// merged.
///
#[derive(Debug, Clone, PartialEq)]
pub struct TempTrackFile {
    pub track_index: usize,
    pub chrom: String,
    pub chrom_id: usize,
    pub path: PathBuf,
}

///
/// Everything needed to turn observed counts into residuals.
///
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionModel {
    /// One per track, controls first.
    pub scalers: Vec<f64>,
    pub regular: Vec<Vec<f64>>,
    pub high: Vec<Vec<f64>>,
    pub high_rc: f64,
    pub selected: Vec<usize>,
    /// Minimum scaled count of a single track at a corrected position.
    pub replicate_min: f64,
}

impl CorrectionModel {
    pub fn new(
        scalers: Vec<f64>,
        regular: &FitResult,
        high: &FitResult,
        high_rc: f64,
        selected: Vec<usize>,
        min_frag_filter: f64,
    ) -> Self {
        let replicate_min = round_half_even(min_frag_filter / scalers.len().max(1) as f64);
        CorrectionModel {
            scalers,
            regular: regular.coefficients.clone(),
            high: high.coefficients.clone(),
            high_rc,
            selected,
            replicate_min,
        }
    }

    ///
    /// Residual records of one track over one aligned region.
    ///
    /// `counts` are the track's raw counts, `training` the reference counts,
    /// `overall` marks positions whose summed count passes the fragment
    /// filter, and `covariates` holds one row per position.
    ///
    pub fn residual_records(
        &self,
        track_index: usize,
        region: &Region,
        counts: &[f64],
        training: &[f64],
        overall: &[bool],
        covariates: ArrayView2<f32>,
    ) -> Vec<CorrectedRecord> {
        let scaler = self.scalers[track_index];
        let regular = &self.regular[track_index];
        let high = &self.high[track_index];

        let mut positions = Vec::new();
        let mut residuals = Vec::new();

        for i in 0..counts.len() {
            if !overall[i] {
                continue;
            }

            let scaled = counts[i] / scaler;
            if scaled < self.replicate_min {
                continue;
            }

            let coefficients = if training[i] > self.high_rc {
                high
            } else {
                regular
            };
            let residual = scaled - predict(covariates.row(i), coefficients, &self.selected);

            if !within_f32_range(residual) {
                continue;
            }

            positions.push(region.start + i as u32);
            residuals.push(round_half_even(residual) as f32);
        }

        coalesce(&positions, &residuals, Some(region.end))
    }
}

///
/// Whether `value` survives conversion to a finite `f32`.
///
pub fn within_f32_range(value: f64) -> bool {
    value >= f32::MIN as f64 && value <= f32::MAX as f64
}

///
/// Cut the analysis regions into genome bins and split them into at most
/// `workers * ctrl_count` contiguous jobs.
///
pub fn plan_jobs(regions: &RegionSet, workers: usize, ctrl_count: usize) -> Vec<CorrectionJob> {
    let bins = divide_genome(regions, GENOME_BIN_SIZE);
    if bins.is_empty() {
        return Vec::new();
    }

    let job_count = bins.len().min(workers.max(1) * ctrl_count.max(1));
    let mut chrom_id = 0;

    array_split(&bins, job_count)
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut tasks: Vec<ChromTask> = Vec::new();
            for bin in chunk {
                match tasks.last_mut() {
                    Some(task) if task.chrom == bin.chr => task.regions.push(bin.clone()),
                    _ => {
                        tasks.push(ChromTask {
                            chrom: bin.chr.clone(),
                            chrom_id,
                            regions: vec![bin.clone()],
                        });
                        chrom_id += 1;
                    }
                }
            }
            CorrectionJob { tasks }
        })
        .collect()
}

pub fn temp_file_path(output_dir: &Path, stem: &str, chrom: &str, chrom_id: usize) -> PathBuf {
    output_dir.join(format!("{}.{}.{}.tmp", stem, chrom, chrom_id))
}

fn read_values(reader: &mut dyn TrackReader, chr: &str, start: u32, end: u32) -> Result<Vec<f64>> {
    Ok(reader
        .values(chr, start, end)?
        .into_iter()
        .map(|v| if v.is_nan() { 0.0 } else { v as f64 })
        .collect())
}

///
/// Correct every track over one chromosome task.
///
pub fn correct_chrom_task(
    ctx: &CorrectionContext,
    model: &CorrectionModel,
    task: &ChromTask,
) -> Result<Vec<TempTrackFile>> {
    let chrom_length = ctx.chrom_lengths.get(&task.chrom).copied().ok_or_else(|| {
        CorrectError::Config(format!("no length known for chromosome {}", task.chrom))
    })?;

    let aligned: Vec<Region> = task
        .regions
        .iter()
        .filter_map(|region| {
            let (start, end) = align_coordinates(
                region.start,
                region.end,
                chrom_length,
                ctx.covariates.frag_len,
            )?;
            Some(Region {
                chr: region.chr.clone(),
                start,
                end,
            })
        })
        .collect();

    let mut training = Vec::with_capacity(aligned.len());
    let mut overall = Vec::with_capacity(aligned.len());
    {
        let mut readers = ctx
            .tracks
            .iter()
            .map(|track| ctx.track_store.open(track))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for region in &aligned {
            let mut sums = vec![0.0; region.width() as usize];
            for (i, reader) in readers.iter_mut().enumerate() {
                let counts = read_values(reader.as_mut(), &region.chr, region.start, region.end)?;
                for (sum, count) in sums.iter_mut().zip(&counts) {
                    *sum += count;
                }
                if i == 0 {
                    training.push(counts);
                }
            }
            overall.push(
                sums.into_iter()
                    .map(|sum| sum > ctx.min_frag_filter)
                    .collect::<Vec<bool>>(),
            );
        }
    }

    let covariates = ctx.covariate_store.open(&task.chrom)?;
    let end = aligned.iter().map(|region| region.end).max().unwrap_or(0);
    ctx.covariates.check_source(&task.chrom, covariates.as_ref(), end)?;

    let mut temp_files = Vec::with_capacity(ctx.tracks.len());
    for (track_index, track) in ctx.tracks.iter().enumerate() {
        let path = temp_file_path(
            ctx.output_dir(),
            &ctx.stems[track_index],
            &task.chrom,
            task.chrom_id,
        );
        let mut reader = ctx.track_store.open(track)?;
        let mut writer = RecordWriter::create(&path)?;

        for (i, region) in aligned.iter().enumerate() {
            let counts = read_values(reader.as_mut(), &region.chr, region.start, region.end)?;
            let rows = covariates.rows(
                (region.start - COVARIATE_FILE_INDEX_OFFSET) as usize,
                (region.end - COVARIATE_FILE_INDEX_OFFSET) as usize,
            )?;

            let records = model.residual_records(
                track_index,
                region,
                &counts,
                &training[i],
                &overall[i],
                rows.view(),
            );
            writer.write_records(&records)?;
        }

        debug!(
            "{}: {} records for {}:{}",
            ctx.stems[track_index],
            writer.written(),
            task.chrom,
            task.chrom_id
        );
        writer.finish()?;

        temp_files.push(TempTrackFile {
            track_index,
            chrom: task.chrom.clone(),
            chrom_id: task.chrom_id,
            path,
        });
    }

    Ok(temp_files)
}

///
/// Run the correction jobs and return the temporary files in job-submission
/// order.
///
pub fn correct_genome(ctx: &CorrectionContext, model: &CorrectionModel) -> Result<Vec<TempTrackFile>> {
    let jobs = plan_jobs(&ctx.regions, ctx.workers(), ctx.ctrl_count);
    let bin_count: usize = jobs
        .iter()
        .flat_map(|job| job.tasks.iter())
        .map(|task| task.regions.len())
        .sum();
    info!(
        "Correcting {} genome bins in {} jobs",
        bin_count,
        jobs.len()
    );

    let progress = ProgressBar::new(jobs.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
    {
        progress.set_style(style.progress_chars("##-"));
    }

    let pool = WorkerPool::new(ctx.workers().min(bin_count)).with_progress(progress.clone());
    let per_job = pool.run(jobs, |job| {
        let mut files = Vec::new();
        for task in &job.tasks {
            files.extend(correct_chrom_task(ctx, model, task)?);
        }
        Ok(files)
    })?;
    progress.finish_and_clear();

    Ok(per_job.into_iter().flatten().collect())
}
