//! Crate-level error taxonomy.
//!
//! Collaborator errors ([`TrainerError`], [`SolverError`]) are wrapped with the
//! stage that failed; cancellation is lifted into [`RuleFitError::Cancelled`]
//! regardless of where it was observed.

use serde::{Deserialize, Serialize};

use crate::data::FrameError;
use crate::model::ConfigError;
use crate::rules::ExtractError;
use crate::training::{SolverError, TrainerError};

/// Errors raised by training, scoring and persistence.
#[derive(Debug, thiserror::Error)]
pub enum RuleFitError {
    #[error("invalid parameters: {0}")]
    Config(#[from] ConfigError),

    #[error("candidate rule count {candidates} exceeds the limit of {limit}")]
    ResourceLimit { candidates: usize, limit: usize },

    /// The scored frame does not match the training schema.
    #[error("schema mismatch: {0}")]
    Schema(#[source] FrameError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid tree {tree} at depth {depth}: {reason}")]
    InvalidTree { depth: u32, tree: usize, reason: String },

    #[error("response column '{0}' not found")]
    MissingResponse(String),

    #[error("response column '{column}' is unusable: {reason}")]
    ResponseType { column: String, reason: String },

    #[error("family {family} is incompatible with response '{column}': {reason}")]
    FamilyMismatch {
        family: String,
        column: String,
        reason: String,
    },

    #[error("{stage} failed: {source}")]
    Trainer {
        stage: String,
        #[source]
        source: TrainerError,
    },

    #[error("{stage} failed: {source}")]
    Solver {
        stage: String,
        #[source]
        source: SolverError,
    },

    #[error("cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("model (de)serialization failed: {0}")]
    Persistence(#[from] serde_json::Error),

    /// A deserialized model whose parts do not fit together.
    #[error("persisted model is inconsistent: {0}")]
    InconsistentModel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RuleFitError {
    pub(crate) fn trainer(stage: impl Into<String>, source: TrainerError) -> Self {
        let stage = stage.into();
        match source {
            TrainerError::Cancelled => RuleFitError::Cancelled { stage },
            source => RuleFitError::Trainer { stage, source },
        }
    }

    pub(crate) fn solver(stage: impl Into<String>, source: SolverError) -> Self {
        let stage = stage.into();
        match source {
            SolverError::Cancelled => RuleFitError::Cancelled { stage },
            source => RuleFitError::Solver { stage, source },
        }
    }
}

impl From<ExtractError> for RuleFitError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::ResourceLimit { candidates, limit } => {
                RuleFitError::ResourceLimit { candidates, limit }
            }
            ExtractError::InvalidTree { depth, tree, reason } => {
                RuleFitError::InvalidTree { depth, tree, reason }
            }
        }
    }
}

/// Non-fatal conditions recorded on a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    /// No path point converged; the model is intercept-only.
    SolverDidNotConverge { n_points: usize },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::SolverDidNotConverge { n_points } => write!(
                f,
                "none of the {n_points} regularization path points converged; fell back to the intercept-only model"
            ),
        }
    }
}
