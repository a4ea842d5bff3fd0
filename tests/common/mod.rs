//! Shared helpers for integration tests.

#![allow(dead_code)]

use rulefit::RuleFitModel;

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Lengths of all rules in the model's ensemble.
pub fn rule_lengths(model: &RuleFitModel) -> Vec<usize> {
    model.ensemble().iter().map(|r| r.length()).collect()
}

/// Indices of activation columns with a nonzero coefficient.
pub fn nonzero_columns(model: &RuleFitModel) -> Vec<usize> {
    model.linear_model().coefficients().columns().collect()
}
