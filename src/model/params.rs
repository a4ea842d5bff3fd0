//! RuleFit training parameters with builder pattern.
//!
//! [`RuleFitParams`] is built with the `bon` builder and validated on
//! `build()`. The parameters are persisted with the trained model.
//!
//! # Example
//!
//! ```
//! use rulefit::model::{ModelType, RuleFitParams};
//!
//! // Defaults: rules of length 3, automatic rule count, rules + linear terms
//! let params = RuleFitParams::builder().response_column("y").build().unwrap();
//! assert_eq!(params.max_num_rules, -1);
//!
//! let params = RuleFitParams::builder()
//!     .response_column("label")
//!     .min_rule_length(2)
//!     .max_rule_length(4)
//!     .max_num_rules(20)
//!     .model_type(ModelType::Rules)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.depths().collect::<Vec<_>>(), vec![2, 3, 4]);
//! ```

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::training::{FamilyKind, SelectionPolicy};

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during parameter validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("response_column must not be empty")]
    EmptyResponse,
    #[error("min_rule_length must be at least 1")]
    ZeroMinRuleLength,
    #[error("min_rule_length ({min}) must not exceed max_rule_length ({max})")]
    RuleLengthRange { min: u32, max: u32 },
    #[error("rule_generation_ntrees must be at least 1")]
    ZeroTrees,
    #[error("max_num_rules must be -1 (automatic) or non-negative, got {0}")]
    InvalidMaxNumRules(i64),
    #[error("knee_fraction must be in (0, 1), got {0}")]
    InvalidKneeFraction(f64),
    #[error("n_lambdas must be at least 1")]
    ZeroLambdas,
    #[error("max_candidate_rules must be at least 1")]
    ZeroCandidateLimit,
    #[error("column '{0}' cannot be both the response and the weights")]
    ResponseAsWeights(String),
    #[error("response column '{0}' is listed in ignored_columns")]
    ResponseIgnored(String),
    #[error("model_type Linear trains no trees; algorithm {0:?} cannot be set")]
    LinearWithTreeAlgorithm(Algorithm),
}

// =============================================================================
// Enums
// =============================================================================

/// Tree algorithm used to generate rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Resolves to [`Algorithm::Drf`].
    #[default]
    Auto,
    /// Distributed random forest: bagged, feature-subsampled trees.
    Drf,
    /// Gradient boosting.
    Gbm,
}

impl Algorithm {
    pub fn resolve(self) -> Algorithm {
        match self {
            Algorithm::Auto => Algorithm::Drf,
            other => other,
        }
    }
}

/// Which columns the linear model is fitted over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelType {
    /// Rule indicators only.
    Rules,
    /// Rule indicators followed by the original features.
    #[default]
    RulesAndLinear,
    /// Original features only; no trees are trained.
    Linear,
}

impl ModelType {
    #[inline]
    pub fn has_rules(self) -> bool {
        !matches!(self, ModelType::Linear)
    }

    #[inline]
    pub fn has_linear(self) -> bool {
        !matches!(self, ModelType::Rules)
    }
}

// =============================================================================
// RuleFitParams
// =============================================================================

/// Parameters for RuleFit training.
///
/// Rules are generated from one tree set per depth in
/// `min_rule_length..=max_rule_length`, each with `rule_generation_ntrees`
/// trees (per class for multinomial responses).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct RuleFitParams {
    /// Name of the response column. Required.
    #[builder(into)]
    pub response_column: String,

    /// Name of a numeric sample-weight column.
    #[builder(into)]
    pub weights_column: Option<String>,

    /// Columns excluded from the features.
    #[builder(default)]
    pub ignored_columns: Vec<String>,

    /// Model id; defaults to one derived from the training frame id.
    #[builder(into)]
    pub model_id: Option<String>,

    /// Tree algorithm. Default: `Auto` (DRF).
    #[builder(default)]
    pub algorithm: Algorithm,

    /// Minimum rule length (conditions per rule). Default: 3.
    #[builder(default = 3)]
    pub min_rule_length: u32,

    /// Maximum rule length. Default: 3.
    #[builder(default = 3)]
    pub max_rule_length: u32,

    /// Maximum number of nonzero coefficients; `-1` selects automatically.
    #[builder(default = -1)]
    pub max_num_rules: i64,

    /// Default: `RulesAndLinear`.
    #[builder(default)]
    pub model_type: ModelType,

    /// Trees per depth. Default: 50.
    #[builder(default = 50)]
    pub rule_generation_ntrees: u32,

    /// Response family. Inferred from the response column when `None`.
    pub family: Option<FamilyKind>,

    /// Random seed. Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Upper bound on candidate rules before deduplication. Default: 1,000,000.
    #[builder(default = 1_000_000)]
    pub max_candidate_rules: usize,

    /// Knee threshold relative to the best marginal deviance gain. Default: 0.05.
    #[builder(default = 0.05)]
    pub knee_fraction: f64,

    /// Number of lambda values on the regularization path. Default: 100.
    #[builder(default = 100)]
    pub n_lambdas: usize,

    /// Number of threads. `None` or `0` uses all cores, `1` runs sequentially.
    pub n_threads: Option<usize>,
}

/// Custom finishing function that validates the parameters.
impl<S: rule_fit_params_builder::IsComplete> RuleFitParamsBuilder<S> {
    /// Build and validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is invalid.
    pub fn build(self) -> Result<RuleFitParams, ConfigError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl RuleFitParams {
    /// Validate parameter values and combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_column.is_empty() {
            return Err(ConfigError::EmptyResponse);
        }
        if self.min_rule_length == 0 {
            return Err(ConfigError::ZeroMinRuleLength);
        }
        if self.min_rule_length > self.max_rule_length {
            return Err(ConfigError::RuleLengthRange {
                min: self.min_rule_length,
                max: self.max_rule_length,
            });
        }
        if self.rule_generation_ntrees == 0 {
            return Err(ConfigError::ZeroTrees);
        }
        if self.max_num_rules < -1 {
            return Err(ConfigError::InvalidMaxNumRules(self.max_num_rules));
        }
        if !(self.knee_fraction > 0.0 && self.knee_fraction < 1.0) {
            return Err(ConfigError::InvalidKneeFraction(self.knee_fraction));
        }
        if self.n_lambdas == 0 {
            return Err(ConfigError::ZeroLambdas);
        }
        if self.max_candidate_rules == 0 {
            return Err(ConfigError::ZeroCandidateLimit);
        }
        if self.weights_column.as_deref() == Some(self.response_column.as_str()) {
            return Err(ConfigError::ResponseAsWeights(self.response_column.clone()));
        }
        if self.ignored_columns.contains(&self.response_column) {
            return Err(ConfigError::ResponseIgnored(self.response_column.clone()));
        }
        if self.model_type == ModelType::Linear && self.algorithm != Algorithm::Auto {
            return Err(ConfigError::LinearWithTreeAlgorithm(self.algorithm));
        }
        Ok(())
    }

    /// Tree depths to generate rules from.
    pub fn depths(&self) -> std::ops::RangeInclusive<u32> {
        self.min_rule_length..=self.max_rule_length
    }

    /// Rule-count selection policy implied by `max_num_rules`.
    pub fn selection_policy(&self) -> SelectionPolicy {
        match usize::try_from(self.max_num_rules) {
            Ok(k) => SelectionPolicy::MaxRules(k),
            Err(_) => SelectionPolicy::Knee {
                fraction: self.knee_fraction,
            },
        }
    }

    /// Columns that are not features: response, weights and ignored columns.
    pub fn non_feature_columns(&self) -> Vec<&str> {
        std::iter::once(self.response_column.as_str())
            .chain(self.weights_column.as_deref())
            .chain(self.ignored_columns.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn builder() -> RuleFitParamsBuilder<rule_fit_params_builder::SetResponseColumn> {
        RuleFitParams::builder().response_column("y")
    }

    #[test]
    fn defaults() {
        let params = builder().build().unwrap();
        assert_eq!(params.algorithm, Algorithm::Auto);
        assert_eq!(params.algorithm.resolve(), Algorithm::Drf);
        assert_eq!((params.min_rule_length, params.max_rule_length), (3, 3));
        assert_eq!(params.model_type, ModelType::RulesAndLinear);
        assert_eq!(params.rule_generation_ntrees, 50);
        assert_eq!(params.seed, 42);
        assert_eq!(params.max_candidate_rules, 1_000_000);
        assert_eq!(params.selection_policy(), SelectionPolicy::Knee { fraction: 0.05 });
    }

    #[rstest]
    #[case(builder().min_rule_length(0).build(), ConfigError::ZeroMinRuleLength)]
    #[case(
        builder().min_rule_length(4).max_rule_length(2).build(),
        ConfigError::RuleLengthRange { min: 4, max: 2 }
    )]
    #[case(builder().rule_generation_ntrees(0).build(), ConfigError::ZeroTrees)]
    #[case(builder().max_num_rules(-2).build(), ConfigError::InvalidMaxNumRules(-2))]
    #[case(builder().knee_fraction(1.0).build(), ConfigError::InvalidKneeFraction(1.0))]
    #[case(builder().weights_column("y").build(), ConfigError::ResponseAsWeights("y".into()))]
    #[case(
        builder().ignored_columns(vec!["y".into()]).build(),
        ConfigError::ResponseIgnored("y".into())
    )]
    #[case(
        builder().model_type(ModelType::Linear).algorithm(Algorithm::Gbm).build(),
        ConfigError::LinearWithTreeAlgorithm(Algorithm::Gbm)
    )]
    fn invalid_params(#[case] result: Result<RuleFitParams, ConfigError>, #[case] expected: ConfigError) {
        assert_eq!(result.unwrap_err(), expected);
    }

    #[test]
    fn explicit_rule_count_policy() {
        let params = builder().max_num_rules(5).build().unwrap();
        assert_eq!(params.selection_policy(), SelectionPolicy::MaxRules(5));
    }

    #[test]
    fn non_feature_columns() {
        let params = builder()
            .weights_column("w")
            .ignored_columns(vec!["id".into()])
            .build()
            .unwrap();
        assert_eq!(params.non_feature_columns(), vec!["y", "w", "id"]);
    }
}
