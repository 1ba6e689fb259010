//! The engine facade.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use invintel_classification::{ClassificationBatch, ClassificationResult, QuadrantSummary, classify};
use invintel_core::{
    DemandSeries, DemandStats, DemandWindow, EngineConfig, EngineError, EngineResult, EntityError,
    ProductId, StoreId,
};
use invintel_distribution::{DistributionRequest, DistributionResult};
use invintel_emergency::{
    CancellationToken, DemandCurve, EmergencyScan, FlatCurve, InMemoryScanStore, ScanContext,
    ScanScope, ScanStore, SignalSource, TriggerType,
};
use invintel_policy::{PolicyInput, StockPolicy, compute_policies};

use crate::collaborators::{ConfigSource, DemandAggregator, PolicySink};

/// Output of one planning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub window: DemandWindow,
    pub classification: ClassificationBatch,
    pub summary: QuadrantSummary,
    pub policies: Vec<StockPolicy>,
    /// Per product/store failures from every stage.
    pub errors: Vec<EntityError>,
}

/// Wires the algorithms to their collaborators.
///
/// Configuration is fetched and validated on every call, so an invalid
/// configuration never reaches the algorithms.
pub struct InventoryEngine {
    demand: Arc<dyn DemandAggregator>,
    config: Arc<dyn ConfigSource>,
    sink: Arc<dyn PolicySink>,
    scans: Arc<dyn ScanStore>,
    signals: Option<Arc<dyn SignalSource>>,
    curve: Arc<dyn DemandCurve>,
}

impl InventoryEngine {
    pub fn new(
        demand: Arc<dyn DemandAggregator>,
        config: Arc<dyn ConfigSource>,
        sink: Arc<dyn PolicySink>,
    ) -> Self {
        Self {
            demand,
            config,
            sink,
            scans: InMemoryScanStore::arc(),
            signals: None,
            curve: Arc::new(FlatCurve),
        }
    }

    pub fn with_scan_store(mut self, scans: Arc<dyn ScanStore>) -> Self {
        self.scans = scans;
        self
    }

    pub fn with_signal_source(mut self, signals: Arc<dyn SignalSource>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Intraday demand curve used for intensity; flat by default.
    pub fn with_demand_curve(mut self, curve: Arc<dyn DemandCurve>) -> Self {
        self.curve = curve;
        self
    }

    pub fn config(&self) -> EngineResult<EngineConfig> {
        self.config.fetch_config()?.validated()
    }

    pub fn classify(&self, series: &[DemandSeries]) -> EngineResult<ClassificationBatch> {
        let config = self.config()?;
        Ok(classify(series, &config))
    }

    pub fn compute_stock_policy(
        &self,
        classification: &ClassificationResult,
        stats: &DemandStats,
        current_stock: f64,
    ) -> EngineResult<StockPolicy> {
        let config = self.config()?;
        invintel_policy::compute_stock_policy(classification, stats, current_stock, &config)
    }

    pub fn distribute(&self, request: &DistributionRequest) -> EngineResult<DistributionResult> {
        let config = self.config()?;
        invintel_distribution::distribute(request, &config)
    }

    pub fn distribute_many(
        &self,
        requests: &[DistributionRequest],
    ) -> EngineResult<Vec<EngineResult<DistributionResult>>> {
        let config = self.config()?;
        Ok(invintel_distribution::distribute_many(requests, &config))
    }

    pub fn run_emergency_scan(
        &self,
        scope: ScanScope,
        trigger: TriggerType,
    ) -> EngineResult<EmergencyScan> {
        self.run_emergency_scan_with(scope, trigger, &CancellationToken::new())
    }

    /// Like `run_emergency_scan`, aborting between stores once `cancel` fires.
    pub fn run_emergency_scan_with(
        &self,
        scope: ScanScope,
        trigger: TriggerType,
        cancel: &CancellationToken,
    ) -> EngineResult<EmergencyScan> {
        let config = self.config()?;
        let source = self
            .signals
            .as_deref()
            .ok_or_else(|| EngineError::unavailable("no stock signal source configured"))?;
        let ctx = ScanContext {
            store: self.scans.as_ref(),
            source,
            curve: self.curve.as_ref(),
            config: &config.emergency,
            cancel,
        };
        invintel_emergency::run_emergency_scan(&ctx, scope, trigger)
    }

    pub fn current_scan(&self, scope: &ScanScope) -> EngineResult<Option<EmergencyScan>> {
        Ok(self.scans.current(scope)?)
    }

    pub fn scan_history(&self, scope: &ScanScope, limit: usize) -> EngineResult<Vec<EmergencyScan>> {
        Ok(self.scans.list(scope, limit)?)
    }

    /// Fetch demand, classify, derive a policy per product/store and hand
    /// the policies to the sink.
    ///
    /// Fails only when there is no demand data at all or a collaborator is
    /// down; malformed series and missing stock readings become `errors`.
    pub fn plan(
        &self,
        as_of: NaiveDate,
        product_id: Option<&ProductId>,
        store_id: Option<&StoreId>,
    ) -> EngineResult<PlanReport> {
        let config = self.config()?;
        let window = DemandWindow::trailing(as_of, config.abc.lookback_days);

        let series = self.demand.fetch_demand_series(product_id, store_id, window)?;
        if series.is_empty() {
            return Err(EngineError::unavailable(format!(
                "no demand data for {} .. {}",
                window.start, window.end
            )));
        }

        let classification = classify(&series, &config);
        let mut errors = classification.errors.clone();

        let mut inputs = Vec::with_capacity(classification.results.len());
        for result in &classification.results {
            match self.demand.fetch_current_stock(&result.product_id, &result.store_id) {
                Ok(current_stock) => inputs.push(PolicyInput {
                    classification: result.clone(),
                    stats: result.daily_stats,
                    current_stock,
                }),
                Err(e) => {
                    warn!(product = %result.product_id, store = %result.store_id, error = %e, "no current stock");
                    errors.push(EntityError::new(
                        Some(result.product_id.clone()),
                        Some(result.store_id.clone()),
                        e.to_string(),
                    ));
                }
            }
        }

        let batch = compute_policies(&inputs, &config);
        errors.extend(batch.errors);
        self.sink.store_policies(&batch.policies)?;

        let summary = QuadrantSummary::from_results(&classification.results);
        info!(
            as_of = %as_of,
            series = series.len(),
            policies = batch.policies.len(),
            errors = errors.len(),
            "planning run finished"
        );

        Ok(PlanReport {
            window,
            classification,
            summary,
            policies: batch.policies,
            errors,
        })
    }
}
