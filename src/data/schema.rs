//! The training feature schema: names, types and categorical levels.
//!
//! This module defines the schema types that describe the training features:
//! their names, logical types and (for categorical features) the level domain.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Logical feature types.
///
/// Features are stored as `f32` regardless of type. The `FeatureType` indicates
/// how to interpret the values when splitting and building activation columns.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureType {
    /// Continuous numeric feature.
    ///
    /// Missing values: `f32::NAN`
    #[default]
    Numeric,

    /// Categorical feature stored as float, interpreted as a level index.
    ///
    /// Missing values: `f32::NAN` (or negative values)
    /// Valid codes: `0.0, 1.0, ..., levels.len() - 1`
    Categorical {
        /// Level names, indexed by code.
        levels: Vec<String>,
    },
}

impl FeatureType {
    /// Returns true if this is a categorical feature.
    #[inline]
    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureType::Categorical { .. })
    }

    /// Number of levels for categorical features, `None` for numeric ones.
    #[inline]
    pub fn n_levels(&self) -> Option<usize> {
        match self {
            FeatureType::Numeric => None,
            FeatureType::Categorical { levels } => Some(levels.len()),
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureType::Numeric => "numeric",
            FeatureType::Categorical { .. } => "categorical",
        }
    }
}

/// Metadata for a single feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMeta {
    /// Feature (column) name.
    pub name: String,

    /// Feature type.
    pub feature_type: FeatureType,
}

impl FeatureMeta {
    /// Create metadata for a numeric feature.
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_type: FeatureType::Numeric,
        }
    }

    /// Create metadata for a categorical feature with the given levels.
    pub fn categorical(name: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            feature_type: FeatureType::Categorical { levels },
        }
    }

    /// Name of level `code`, if this is a categorical feature and the code is in range.
    pub fn level_name(&self, code: u32) -> Option<&str> {
        match &self.feature_type {
            FeatureType::Categorical { levels } => levels.get(code as usize).map(String::as_str),
            FeatureType::Numeric => None,
        }
    }
}

/// Schema describing the training features, in frame order.
///
/// The schema is persisted with a trained model: feature indices stored in
/// rule conditions and activation columns refer to positions in this schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FeatureMeta>", into = "Vec<FeatureMeta>")]
pub struct FrameSchema {
    features: Vec<FeatureMeta>,
    name_index: HashMap<String, usize>,
}

impl FrameSchema {
    /// Create a schema from per-feature metadata.
    pub fn from_features(features: Vec<FeatureMeta>) -> Self {
        let name_index = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            features,
            name_index,
        }
    }

    /// Number of features in the schema.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Get metadata for a feature by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&FeatureMeta> {
        self.features.get(index)
    }

    /// Look up a feature index by name.
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    /// Feature name by index, or `"f{index}"` when out of range.
    pub fn name(&self, index: usize) -> String {
        self.features
            .get(index)
            .map_or_else(|| format!("f{index}"), |f| f.name.clone())
    }

    /// Iterate over feature metadata.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureMeta> {
        self.features.iter()
    }

    /// Feature names in schema order.
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }
}

impl From<Vec<FeatureMeta>> for FrameSchema {
    fn from(features: Vec<FeatureMeta>) -> Self {
        Self::from_features(features)
    }
}

impl From<FrameSchema> for Vec<FeatureMeta> {
    fn from(schema: FrameSchema) -> Self {
        schema.features
    }
}
