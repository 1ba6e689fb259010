//! Boundaries to the systems around the engine.
//!
//! The engine performs no IO itself: demand history, configuration and
//! policy storage all come through these traits.

use std::sync::{Mutex, PoisonError};

use invintel_core::{
    DemandSeries, DemandWindow, EngineConfig, EngineError, EngineResult, ProductId, StoreId,
};
use invintel_policy::StockPolicy;

/// Historical demand and live stock, populated by the extraction pipelines.
pub trait DemandAggregator: Send + Sync {
    /// Series for the window, optionally narrowed to one product and/or store.
    fn fetch_demand_series(
        &self,
        product_id: Option<&ProductId>,
        store_id: Option<&StoreId>,
        window: DemandWindow,
    ) -> EngineResult<Vec<DemandSeries>>;

    fn fetch_current_stock(&self, product_id: &ProductId, store_id: &StoreId) -> EngineResult<f64>;
}

pub trait ConfigSource: Send + Sync {
    fn fetch_config(&self) -> EngineResult<EngineConfig>;
}

/// A fixed, in-process configuration.
impl ConfigSource for EngineConfig {
    fn fetch_config(&self) -> EngineResult<EngineConfig> {
        Ok(self.clone())
    }
}

/// Where computed policies go. Policies are never persisted by the engine.
pub trait PolicySink: Send + Sync {
    fn store_policies(&self, policies: &[StockPolicy]) -> EngineResult<()>;
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPolicySink {
    inner: Mutex<Vec<StockPolicy>>,
}

impl InMemoryPolicySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StockPolicy> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PolicySink for InMemoryPolicySink {
    fn store_policies(&self, policies: &[StockPolicy]) -> EngineResult<()> {
        self.inner
            .lock()
            .map_err(|_| EngineError::unavailable("policy sink lock poisoned"))?
            .extend_from_slice(policies);
        Ok(())
    }
}
