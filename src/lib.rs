//! rulefit: interpretable rule ensembles.
//!
//! Trees are grown for each requested depth, every root-to-node path becomes a
//! candidate rule, duplicates are collapsed, and a lasso path over the rule
//! indicators (optionally with the raw features) picks a small set of rules.
//!
//! ```no_run
//! use rulefit::model::{RuleFitModel, RuleFitParams};
//! use rulefit::testing::binomial_frame;
//!
//! # fn main() -> Result<(), rulefit::RuleFitError> {
//! let frame = binomial_frame(500, 42);
//! let params = RuleFitParams::builder()
//!     .response_column("y")
//!     .min_rule_length(2)
//!     .max_rule_length(3)
//!     .max_num_rules(10)
//!     .build()?;
//! let model = RuleFitModel::train(&frame, params)?;
//! let scored = model.score(&frame, true)?;
//! println!("{:?}", scored.metrics);
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod repr;
pub mod rules;
pub mod testing;
pub mod training;
pub mod utils;

pub use data::{Column, Frame, FrameSchema};
pub use error::{FitWarning, RuleFitError};
pub use model::{ModelType, RuleFitModel, RuleFitParams, RuleFitTrainer, ScoreResult};
pub use rules::{ActivationLayout, RuleEnsemble};
pub use training::{Family, FamilyKind, ModelMetrics};
pub use utils::{CancellationToken, Parallelism};
