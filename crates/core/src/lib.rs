//! `invintel-core`: shared building blocks of the inventory intelligence engine.
//!
//! This crate contains **pure** primitives (no IO): identifiers, the error
//! model, classification tiers, the demand model and engine configuration.

pub mod config;
pub mod demand;
pub mod error;
pub mod id;
pub mod tier;

pub use config::{
    AbcConfig, AbcScope, DpduConfig, EmergencyConfig, EmergencyLevel, EmergencyRule, EngineConfig,
    IntensityBand, LeadTimeConfig, NoSalesFloor, PackSizes, ServiceLevels, SurplusPolicy,
    TrendConfig, XyzConfig,
};
pub use demand::{DemandPoint, DemandSeries, DemandStats, DemandWindow, Granularity};
pub use error::{EngineError, EngineResult};
pub use id::{ProductId, ScanId, StoreId};
pub use tier::{AbcTier, Quadrant, XyzTier, most_critical_abc};

/// Failure isolated to a single product/store during a batch.
///
/// Batches record these and carry on; only a total absence of usable input
/// fails a whole run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntityError {
    pub product_id: Option<ProductId>,
    pub store_id: Option<StoreId>,
    pub message: String,
}

impl EntityError {
    pub fn new(
        product_id: Option<ProductId>,
        store_id: Option<StoreId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            store_id,
            message: message.into(),
        }
    }
}
