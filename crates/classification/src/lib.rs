//! `invintel-classification`
//!
//! Value (ABC) and variability (XYZ) classification, trend/seasonality
//! signals, and the combined classification matrix.

pub mod abc;
pub mod matrix;
pub mod trend;
pub mod xyz;

pub use abc::{AbcRank, rank};
pub use matrix::{
    ClassificationBatch, ClassificationResult, QuadrantSummary, classify, most_critical_by_product,
};
pub use trend::{SeasonalPattern, TrendAnalysis, TrendDirection, analyze};
pub use xyz::{Variability, classify_variability};
