//! Training collaborators: response families, metrics, tree trainers, the
//! regularization-path solver and the rule-count selector.

pub mod family;
pub mod linear;
pub mod metrics;
pub mod selector;
pub mod trees;

pub use family::{Family, FamilyKind};
pub use linear::{
    CoordinateDescentSolver, LinearProblem, PathPoint, PathSolver, RegularizationPath, SolverError,
};
pub use metrics::{MetricBuilder, MetricsKind, ModelMetrics};
pub use selector::{Selection, SelectionPolicy, select};
pub use trees::{
    GainParams, GradientBoostingTrainer, RandomForestTrainer, TrainerError, TrainingData, TreeTrainer,
};
