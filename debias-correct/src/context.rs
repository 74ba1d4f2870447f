use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use debias_core::models::RegionSet;
use debias_core::utils::file_stem;
use debias_io::{CovariateStore, TrackStore};

use crate::config::CorrectConfig;
use crate::covariates::StoredCovariates;
use crate::errors::{CorrectError, Result};
use crate::plot::PlotSink;

///
/// Everything the stages share, resolved once before the run starts.
///
pub struct CorrectionContext<'a> {
    pub config: CorrectConfig,
    /// Controls then experiments; index 0 is the reference track.
    pub tracks: Vec<PathBuf>,
    /// Output name stem of each track.
    pub stems: Vec<String>,
    pub ctrl_count: usize,
    pub covariates: StoredCovariates,
    /// Analysis regions, restricted to chromosomes of the reference track.
    pub regions: RegionSet,
    /// `(chrom, length)` of every analysis chromosome, lengths from the reference.
    pub header: Vec<(String, u32)>,
    pub chrom_lengths: HashMap<String, u32>,
    pub min_frag_filter: f64,
    pub track_store: &'a dyn TrackStore,
    pub covariate_store: &'a dyn CovariateStore,
    pub plot_sink: &'a dyn PlotSink,
}

impl<'a> CorrectionContext<'a> {
    pub fn new(
        config: CorrectConfig,
        regions: RegionSet,
        track_store: &'a dyn TrackStore,
        covariate_store: &'a dyn CovariateStore,
        plot_sink: &'a dyn PlotSink,
    ) -> Result<Self> {
        config.validate()?;

        let covariates =
            StoredCovariates::new(&config.bias_types, &config.covariate_dir, config.frag_len)?;

        let tracks = config.tracks();
        let stems = tracks
            .iter()
            .map(|track| file_stem(track).map_err(|e| CorrectError::Config(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        for (i, stem) in stems.iter().enumerate() {
            if stems[..i].contains(stem) {
                return Err(CorrectError::Config(format!(
                    "two tracks share the output name '{}'",
                    stem
                )));
            }
        }

        let reference_sizes = track_store.open(&tracks[0])?.chrom_sizes();
        let chrom_lengths: HashMap<String, u32> = reference_sizes.into_iter().collect();

        let (regions, missing) = regions.clip_to_chrom_sizes(&chrom_lengths);
        for chr in &missing {
            warn!("Dropping regions on '{}': not present in {:?}", chr, tracks[0]);
        }
        if regions.is_empty() {
            return Err(CorrectError::Config(
                "no analysis regions left on chromosomes of the reference track".to_string(),
            ));
        }

        let header: Vec<(String, u32)> = regions
            .chroms()
            .iter()
            .filter_map(|chr| chrom_lengths.get(chr).map(|&len| (chr.clone(), len)))
            .collect();

        info!(
            "{} analysis regions ({} bp) on {} chromosomes",
            regions.len(),
            regions.cumulative_size(),
            header.len()
        );

        std::fs::create_dir_all(&config.output_dir)?;

        Ok(CorrectionContext {
            min_frag_filter: config.min_frag_filter_value(),
            ctrl_count: config.ctrl_tracks.len(),
            config,
            tracks,
            stems,
            covariates,
            regions,
            header,
            chrom_lengths,
            track_store,
            covariate_store,
            plot_sink,
        })
    }

    pub fn reference(&self) -> &Path {
        &self.tracks[0]
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    ///
    /// Random number generator for one consumer of randomness. Seeded runs
    /// give each stream its own derived seed.
    ///
    pub fn rng(&self, stream: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_os_rng(),
        }
    }
}
