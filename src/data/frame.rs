//! In-memory columnar frame.
//!
//! A [`Frame`] is an ordered collection of named, typed columns of equal
//! length. Values are stored as `f32`; missing values are `NaN`. Categorical
//! columns store level codes plus the level names that give them meaning.

use std::collections::{BTreeSet, HashMap, HashSet};

use ndarray::Array2;

use super::schema::{FeatureMeta, FeatureType, FrameSchema};

/// Errors raised when building frames or extracting features from them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("column '{name}' has {len} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        len: usize,
        expected: usize,
    },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{name}' is {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Column storage.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f32>),
    Categorical {
        /// Level codes (`NaN` = missing).
        codes: Vec<f32>,
        /// Level names, indexed by code.
        levels: Vec<String>,
    },
}

/// A named column.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Numeric column. `NaN` marks missing values.
    pub fn numeric(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Categorical column from raw codes and their level names.
    pub fn categorical(name: impl Into<String>, codes: Vec<f32>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical { codes, levels },
        }
    }

    /// Categorical column from string labels.
    ///
    /// The level domain is the sorted set of distinct labels; `None` is missing.
    pub fn from_labels(name: impl Into<String>, labels: &[Option<&str>]) -> Self {
        let levels: Vec<String> = labels
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let index: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let codes = labels
            .iter()
            .map(|l| l.map_or(f32::NAN, |l| index[l] as f32))
            .collect();
        Self::categorical(name, codes, levels)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Raw values (numeric values or categorical codes).
    #[inline]
    pub fn values(&self) -> &[f32] {
        match &self.data {
            ColumnData::Numeric(values) => values,
            ColumnData::Categorical { codes, .. } => codes,
        }
    }

    /// Level names for categorical columns.
    #[inline]
    pub fn levels(&self) -> Option<&[String]> {
        match &self.data {
            ColumnData::Numeric(_) => None,
            ColumnData::Categorical { levels, .. } => Some(levels),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_categorical(&self) -> bool {
        matches!(self.data, ColumnData::Categorical { .. })
    }

    fn type_name(&self) -> &'static str {
        if self.is_categorical() {
            "categorical"
        } else {
            "numeric"
        }
    }

    /// Feature metadata describing this column.
    pub fn meta(&self) -> FeatureMeta {
        match &self.data {
            ColumnData::Numeric(_) => FeatureMeta::numeric(self.name.clone()),
            ColumnData::Categorical { levels, .. } => {
                FeatureMeta::categorical(self.name.clone(), levels.clone())
            }
        }
    }
}

/// An ordered set of equal-length columns with an identity.
#[derive(Clone, Debug)]
pub struct Frame {
    id: String,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Frame {
    /// Create a frame, checking column lengths and name uniqueness.
    pub fn new(id: impl Into<String>, columns: Vec<Column>) -> Result<Self, FrameError> {
        let n_rows = columns.first().map_or(0, Column::len);
        let mut seen = HashSet::new();
        for col in &columns {
            if col.len() != n_rows {
                return Err(FrameError::LengthMismatch {
                    name: col.name.clone(),
                    len: col.len(),
                    expected: n_rows,
                });
            }
            if !seen.insert(col.name.as_str()) {
                return Err(FrameError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self {
            id: id.into(),
            columns,
            n_rows,
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append a computed column.
    pub fn push_column(&mut self, column: Column) -> Result<(), FrameError> {
        let len = column.len();
        if !self.columns.is_empty() && len != self.n_rows {
            return Err(FrameError::LengthMismatch {
                name: column.name,
                len,
                expected: self.n_rows,
            });
        }
        if self.column(&column.name).is_some() {
            return Err(FrameError::DuplicateColumn(column.name));
        }
        self.n_rows = len;
        self.columns.push(column);
        Ok(())
    }

    /// Copy of this frame without the named column.
    pub fn without_column(&self, name: &str) -> Self {
        Self {
            id: self.id.clone(),
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
            n_rows: self.n_rows,
        }
    }

    /// Schema of all columns except the excluded ones, in frame order.
    pub fn schema_excluding(&self, exclude: &[&str]) -> FrameSchema {
        FrameSchema::from_features(
            self.columns
                .iter()
                .filter(|c| !exclude.contains(&c.name.as_str()))
                .map(Column::meta)
                .collect(),
        )
    }

    /// Extract a row-major feature matrix laid out according to `schema`.
    ///
    /// Columns are matched by name. Categorical codes are remapped into the
    /// schema's level domain; levels unknown to the schema become missing.
    /// A schema feature absent from the frame is an error when its index is in
    /// `required`, otherwise it is filled with missing values.
    pub fn feature_matrix(
        &self,
        schema: &FrameSchema,
        required: &BTreeSet<usize>,
    ) -> Result<Array2<f32>, FrameError> {
        let mut out = Array2::from_elem((self.n_rows, schema.n_features()), f32::NAN);

        for (j, meta) in schema.iter().enumerate() {
            let Some(col) = self.column(&meta.name) else {
                if required.contains(&j) {
                    return Err(FrameError::MissingColumn(meta.name.clone()));
                }
                log::warn!(
                    "frame '{}' has no column '{}'; filling with missing values",
                    self.id,
                    meta.name
                );
                continue;
            };

            let mut dst = out.column_mut(j);
            match (&meta.feature_type, &col.data) {
                (FeatureType::Numeric, ColumnData::Numeric(values)) => {
                    dst.iter_mut().zip(values).for_each(|(d, &v)| *d = v);
                }
                (FeatureType::Categorical { levels }, ColumnData::Categorical { codes, levels: col_levels }) => {
                    let remap = remap_levels(levels, col_levels);
                    dst.iter_mut().zip(codes).for_each(|(d, &c)| {
                        *d = if c.is_nan() || c < 0.0 {
                            f32::NAN
                        } else {
                            remap.get(c as usize).copied().unwrap_or(f32::NAN)
                        };
                    });
                }
                (expected, _) => {
                    return Err(FrameError::TypeMismatch {
                        name: meta.name.clone(),
                        expected: expected.type_name(),
                        found: col.type_name(),
                    });
                }
            }
        }

        Ok(out)
    }
}

/// Map codes of `found` levels onto codes of the `expected` domain (`NaN` if unseen).
fn remap_levels(expected: &[String], found: &[String]) -> Vec<f32> {
    let index: HashMap<&str, usize> = expected
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();
    found
        .iter()
        .map(|l| index.get(l.as_str()).map_or(f32::NAN, |&i| i as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::new(
            "train",
            vec![
                Column::numeric("x", vec![1.0, 2.0, f32::NAN]),
                Column::from_labels("color", &[Some("red"), None, Some("blue")]),
                Column::numeric("y", vec![0.0, 1.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = Frame::new(
            "bad",
            vec![Column::numeric("a", vec![1.0]), Column::numeric("b", vec![1.0, 2.0])],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Frame::new(
            "bad",
            vec![Column::numeric("a", vec![1.0]), Column::numeric("a", vec![2.0])],
        )
        .unwrap_err();
        assert_eq!(err, FrameError::DuplicateColumn("a".into()));
    }

    #[test]
    fn labels_are_sorted_into_levels() {
        let col = Column::from_labels("c", &[Some("b"), Some("a"), None, Some("b")]);
        assert_eq!(col.levels().unwrap(), &["a".to_string(), "b".to_string()]);
        assert_eq!(&col.values()[..2], &[1.0, 0.0]);
        assert!(col.values()[2].is_nan());
    }

    #[test]
    fn schema_excludes_response() {
        let schema = frame().schema_excluding(&["y"]);
        assert_eq!(schema.names(), vec!["x", "color"]);
        assert!(schema.get(1).unwrap().feature_type.is_categorical());
    }

    #[test]
    fn feature_matrix_remaps_levels() {
        let train = frame();
        let schema = train.schema_excluding(&["y"]);

        // Score frame: columns reordered, one unseen level.
        let score = Frame::new(
            "score",
            vec![
                Column::from_labels("color", &[Some("green"), Some("red"), Some("blue")]),
                Column::numeric("x", vec![5.0, 6.0, 7.0]),
            ],
        )
        .unwrap();

        let all: BTreeSet<usize> = (0..schema.n_features()).collect();
        let m = score.feature_matrix(&schema, &all).unwrap();
        assert_eq!(m.column(0).to_vec(), vec![5.0, 6.0, 7.0]);
        // training domain: blue = 0, red = 1; green unseen
        assert!(m[[0, 1]].is_nan());
        assert_eq!(m[[1, 1]], 1.0);
        assert_eq!(m[[2, 1]], 0.0);
    }

    #[test]
    fn feature_matrix_missing_column() {
        let schema = frame().schema_excluding(&["y"]);
        let score = frame().without_column("x");

        let required: BTreeSet<usize> = [0].into_iter().collect();
        let err = score.feature_matrix(&schema, &required).unwrap_err();
        assert_eq!(err, FrameError::MissingColumn("x".into()));

        let m = score.feature_matrix(&schema, &BTreeSet::new()).unwrap();
        assert!(m.column(0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn feature_matrix_type_mismatch() {
        let schema = frame().schema_excluding(&["y"]);
        let score = Frame::new(
            "score",
            vec![
                Column::numeric("x", vec![1.0]),
                Column::numeric("color", vec![0.0]),
            ],
        )
        .unwrap();
        let err = score.feature_matrix(&schema, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, FrameError::TypeMismatch { .. }));
    }

    #[test]
    fn push_column_appends() {
        let mut f = frame();
        f.push_column(Column::numeric("z", vec![0.0; 3])).unwrap();
        assert_eq!(f.n_cols(), 4);
        let err = f.push_column(Column::numeric("w", vec![0.0])).unwrap_err();
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                name: "w".into(),
                len: 1,
                expected: 3
            }
        );
    }
}
