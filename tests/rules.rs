//! Integration tests for rule extraction and the rule ensemble.

#[path = "rules/ensemble.rs"]
mod ensemble;

#[path = "rules/extraction.rs"]
mod extraction;
