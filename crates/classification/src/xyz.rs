//! XYZ classification by coefficient of variation.

use serde::{Deserialize, Serialize};

use invintel_core::{DemandStats, XyzConfig, XyzTier};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variability {
    pub tier: XyzTier,
    pub stats: DemandStats,
    /// `None` when there were no sales (mean of zero).
    pub cv: Option<f64>,
}

/// Classify a per-period demand vector. A zero mean yields `NoSales` without
/// computing a ratio.
pub fn classify_variability(periods: &[f64], config: &XyzConfig) -> Variability {
    let stats = DemandStats::from_values(periods);
    match stats.coefficient_of_variation() {
        Some(cv) => Variability {
            tier: config.tier_for_cv(cv),
            stats,
            cv: Some(cv),
        },
        None => Variability {
            tier: XyzTier::NoSales,
            stats,
            cv: None,
        },
    }
}
