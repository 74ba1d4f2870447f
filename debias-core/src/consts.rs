/// Width of a training bin in base pairs.
pub const TRAINING_BIN_SIZE: u32 = 1_000;

/// Upper bound on the number of training bases sampled (in bins of [TRAINING_BIN_SIZE]).
pub const MAX_TRAINING_BASES: u64 = 1_000_000;

/// Width of one genome-division bin for the correction pass.
pub const GENOME_BIN_SIZE: u32 = 50_000;

/// Maximum number of points handed to the scatter-plot sink.
pub const SCATTERPLOT_SAMPLE_COUNT: usize = 10_000;

/// Extra bases the sonication shear window reaches beyond the fragment window.
pub const SONICATION_SHEAR_BIAS_OFFSET: i64 = 2;

/// Offset between a region start and the start of its fragment window.
pub const START_INDEX_ADJUSTMENT: i64 = 1;

/// Row 0 of a covariate matrix corresponds to this genomic position.
pub const COVARIATE_FILE_INDEX_OFFSET: u32 = 3;

/// Percentiles (of non-zero bin means) delimiting the training buckets.
pub const TRAINING_PERCENTILES: [f64; 12] = [
    0.0, 20.0, 40.0, 60.0, 80.0, 90.0, 92.0, 94.0, 96.0, 98.0, 99.0, 100.0,
];

/// Index into [TRAINING_PERCENTILES] of the high read-count threshold (90th).
pub const HIGH_RC_PERCENTILE_INDEX: usize = 5;
