use std::fmt::{self, Display};

use thiserror::Error;

use debias_io::TrackError;

///
/// Pipeline stages, used to name the stage a fatal error came from.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sampling,
    Scaling,
    Regression,
    Correction,
    Merge,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sampling => "sampling",
            Stage::Scaling => "scaling",
            Stage::Regression => "regression",
            Stage::Correction => "correction",
            Stage::Merge => "merge",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug)]
pub enum CorrectError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Track(#[from] TrackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("No training bins with a positive mean read count")]
    NoTrainingSignal,

    #[error("Regression failed: {0}")]
    RegressionFit(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<CorrectError>,
    },
}

impl CorrectError {
    /// The stage this error was raised in, if it has been attributed to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CorrectError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CorrectError>;

///
/// Attach the failing [Stage] to an error.
///
pub trait StageContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| match e {
            already @ CorrectError::StageFailed { .. } => already,
            other => CorrectError::StageFailed {
                stage,
                source: Box::new(other),
            },
        })
    }
}
