//! RuleFit models: parameters, training and the persisted model.

mod importance;
mod linear;
mod params;
mod rulefit;
mod trainer;

pub use importance::{RuleImportance, importance_table};
pub use linear::{CoefficientEntry, LinearModel, SparseCoefficients};
pub use params::{Algorithm, ConfigError, ModelType, RuleFitParams, RuleFitParamsBuilder};
pub use rulefit::{RuleFitModel, ScoreResult};
pub use trainer::RuleFitTrainer;
