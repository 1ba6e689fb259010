//! `invintel-engine`
//!
//! **Responsibility:** the library surface of the inventory intelligence engine.
//!
//! - Classification, stock policies, scarcity distribution and emergency scans
//!   behind one facade (`InventoryEngine`).
//! - Collaborator traits for demand data, configuration and policy storage.
//! - No network or disk IO of its own beyond reading the configuration file.

pub mod collaborators;
pub mod config_source;
pub mod engine;

pub use collaborators::{ConfigSource, DemandAggregator, InMemoryPolicySink, PolicySink};
pub use config_source::{CONFIG_PATH_ENV, FileConfigSource, apply_overrides, parse_config};
pub use engine::{InventoryEngine, PlanReport};

pub use invintel_classification::{ClassificationBatch, ClassificationResult, QuadrantSummary};
pub use invintel_core::{
    DemandPoint, DemandSeries, DemandStats, DemandWindow, EngineConfig, EngineError, EngineResult,
    EntityError, ProductId, Quadrant, StoreId,
};
pub use invintel_distribution::{DistributionRequest, DistributionResult, StoreDemand};
pub use invintel_emergency::{
    CancellationToken, DemandCurve, EmergencyScan, InMemoryScanStore, ScanScope, ScanStatus,
    ScanStore, SignalSource, StockSignal, TriggerType,
};
pub use invintel_policy::StockPolicy;
