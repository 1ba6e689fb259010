//! Stock policy calculator.
//!
//! Formulas (daily demand statistics, lead time `L` in days):
//! - safety = Z(quadrant) x stdev x sqrt(L)
//! - reorder point = mean x L + safety
//! - maximum = reorder point + mean x replenishment cycle
//! - minimum = max(0, reorder point - mean x buffer days)
//! - suggested order = max(0, maximum - current stock), rounded up to the pack size
//!
//! Products without sales get the configured static floor instead.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use invintel_classification::ClassificationResult;
use invintel_core::{
    DemandStats, EngineConfig, EngineError, EngineResult, EntityError, ProductId, Quadrant, StoreId,
};

/// How a policy was derived.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyBasis {
    Statistical,
    NoSalesFloor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPolicy {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub quadrant: Quadrant,
    pub basis: PolicyBasis,
    /// Z-score applied; zero under the no-sales floor.
    pub service_level_z: f64,
    pub minimum: f64,
    pub safety: f64,
    pub maximum: f64,
    pub reorder_point: f64,
    /// Multiple of `pack_size`.
    pub suggested_order: u64,
    pub pack_size: u32,
}

impl StockPolicy {
    pub fn needs_reorder(&self, current_stock: f64) -> bool {
        current_stock <= self.reorder_point
    }
}

/// Round a quantity up to a whole number of packs. Non-positive quantities order nothing.
pub fn round_up_to_pack(quantity: f64, pack_size: u32) -> u64 {
    // Absorb float noise so 24.000000001 with a pack of 12 stays at 2 packs.
    const EPS: f64 = 1e-9;
    if !(quantity > EPS) {
        return 0;
    }
    let pack = u64::from(pack_size.max(1));
    let packs = ((quantity - EPS) / pack as f64).ceil() as u64;
    packs * pack
}

pub fn compute_stock_policy(
    classification: &ClassificationResult,
    stats: &DemandStats,
    current_stock: f64,
    config: &EngineConfig,
) -> EngineResult<StockPolicy> {
    stats.validate()?;
    if !current_stock.is_finite() {
        return Err(EngineError::validation(format!(
            "current stock for {} @ {} is not finite",
            classification.product_id, classification.store_id
        )));
    }

    let pack_size = config.pack_sizes.pack_size(&classification.product_id);
    let quadrant = classification.quadrant;

    if quadrant.is_no_sales() || stats.mean <= 0.0 {
        let floor = &config.no_sales_floor;
        return Ok(StockPolicy {
            product_id: classification.product_id.clone(),
            store_id: classification.store_id.clone(),
            quadrant,
            basis: PolicyBasis::NoSalesFloor,
            service_level_z: 0.0,
            minimum: floor.minimum,
            safety: 0.0,
            maximum: floor.maximum,
            reorder_point: floor.minimum,
            suggested_order: round_up_to_pack(floor.maximum - current_stock, pack_size),
            pack_size,
        });
    }

    let z = config.service_levels.z_for(quadrant).ok_or_else(|| {
        EngineError::invalid_config(format!("no service level configured for quadrant {quadrant}"))
    })?;
    let lead = &config.lead_time;

    let safety = (z * stats.stdev * lead.lead_time_days.sqrt()).max(0.0);
    let reorder_point = (stats.mean * lead.lead_time_days + safety).max(0.0);
    let maximum = (reorder_point + stats.mean * lead.replenishment_cycle_days).max(0.0);
    let minimum = (reorder_point - stats.mean * lead.buffer_days).max(0.0);

    Ok(StockPolicy {
        product_id: classification.product_id.clone(),
        store_id: classification.store_id.clone(),
        quadrant,
        basis: PolicyBasis::Statistical,
        service_level_z: z,
        minimum,
        safety,
        maximum,
        reorder_point,
        suggested_order: round_up_to_pack(maximum - current_stock, pack_size),
        pack_size,
    })
}

/// Everything needed to derive one product/store policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub classification: ClassificationResult,
    /// Daily demand statistics.
    pub stats: DemandStats,
    pub current_stock: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyBatch {
    pub policies: Vec<StockPolicy>,
    pub errors: Vec<EntityError>,
}

/// Compute policies in parallel; a failing input is recorded and skipped.
pub fn compute_policies(inputs: &[PolicyInput], config: &EngineConfig) -> PolicyBatch {
    let outcomes: Vec<Result<StockPolicy, EntityError>> = inputs
        .par_iter()
        .map(|input| {
            compute_stock_policy(&input.classification, &input.stats, input.current_stock, config)
                .map_err(|e| {
                    EntityError::new(
                        Some(input.classification.product_id.clone()),
                        Some(input.classification.store_id.clone()),
                        e.to_string(),
                    )
                })
        })
        .collect();

    let mut batch = PolicyBatch::default();
    for outcome in outcomes {
        match outcome {
            Ok(p) => batch.policies.push(p),
            Err(e) => batch.errors.push(e),
        }
    }

    debug!(
        inputs = inputs.len(),
        policies = batch.policies.len(),
        errors = batch.errors.len(),
        "stock policies computed"
    );
    batch
}
