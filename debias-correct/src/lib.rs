//! # Read-count bias correction of signal tracks.
//!
//! A run selects percentile-stratified training bins from the reference
//! track, estimates per-track scalers, fits log-space regressions of read
//! count on stored covariates for a regular and a high read-count regime, and
//! writes, for every track, the residual of observed minus predicted counts.
//!
//! ```no_run
//! use debias_correct::{CorrectConfig, run};
//!
//! let config = CorrectConfig::from_file("debias.yaml".as_ref()).unwrap();
//! let output = run(config).unwrap();
//! println!("{:?}", output.corrected);
//! ```
//!
pub mod coalesce;
pub mod config;
pub mod context;
pub mod corrector;
pub mod covariates;
pub mod errors;
pub mod merge;
pub mod pipeline;
pub mod plot;
pub mod pool;
pub mod regression;
pub mod report;
pub mod sampler;
pub mod scaler;

pub use config::CorrectConfig;
pub use covariates::BiasType;
pub use errors::{CorrectError, Result, Stage};
pub use pipeline::{CorrectionOutput, load_regions, run, run_with};
