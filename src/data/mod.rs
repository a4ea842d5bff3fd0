//! Data handling: columnar frames and the training feature schema.

mod frame;
mod schema;

pub use frame::{Column, ColumnData, Frame, FrameError};
pub use schema::{FeatureMeta, FeatureType, FrameSchema};
