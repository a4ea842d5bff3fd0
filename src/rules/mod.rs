//! Rule extraction, deduplication and activation columns.

mod activation;
mod ensemble;
mod extract;

pub use activation::{ActivationColumn, ActivationLayout, LINEAR_PREFIX};
pub use ensemble::{DuplicateRuleError, RuleEnsemble};
pub use extract::{ExtractError, PathExtractor};
