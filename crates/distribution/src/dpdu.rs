//! DPD+U: demand-proportional distribution plus urgency.
//!
//! Each store's weight blends its share of total requested demand with its
//! share of total urgency (inverse days-of-stock). Supply is poured according
//! to those weights with water-filling: a store that would receive more than
//! it asked for is capped and the excess is re-poured over the remaining
//! stores. Integer quantities come from a largest-remainder pass.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use invintel_core::{
    DpduConfig, EngineConfig, EngineError, EngineResult, EntityError, ProductId, StoreId,
    SurplusPolicy,
};

/// One competing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDemand {
    pub store_id: StoreId,
    /// Units requested. Must be non-negative.
    pub demand: i64,
    /// Days until the store runs out at its current pace. Negative values mean
    /// it already has; they are treated as zero.
    pub days_of_stock: f64,
}

impl StoreDemand {
    pub fn new(store_id: StoreId, demand: i64, days_of_stock: f64) -> Self {
        Self {
            store_id,
            demand,
            days_of_stock,
        }
    }
}

/// A single replenishment event: one pool of central supply, many stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRequest {
    pub product_id: Option<ProductId>,
    /// Units available at the central warehouse.
    pub supply: i64,
    pub stores: Vec<StoreDemand>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    FullySatisfied,
    Scarce,
}

/// Allocation plus the figures that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAllocation {
    pub store_id: StoreId,
    pub requested: u64,
    pub allocated: u64,
    pub pct_demand: f64,
    pub pct_urgency: f64,
    pub weight: f64,
}

impl StoreAllocation {
    pub fn shortfall(&self) -> u64 {
        self.requested - self.allocated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreShortfall {
    pub store_id: StoreId,
    pub requested: u64,
    pub allocated: u64,
    pub shortfall: u64,
    pub weight: f64,
}

/// Recorded whenever total requested demand exceeds supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConflict {
    pub total_demand: u64,
    pub supply: u64,
    pub total_shortfall: u64,
    pub demand_weight: f64,
    pub urgency_weight: f64,
    pub shortfalls: Vec<StoreShortfall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub product_id: Option<ProductId>,
    pub status: DistributionStatus,
    /// Same order as the request's stores. Stores left out because of
    /// malformed data appear with nothing requested and nothing allocated.
    pub allocations: Vec<StoreAllocation>,
    pub conflict: Option<DistributionConflict>,
    /// Supply left once every store is satisfied (zero under scarcity).
    pub surplus: u64,
    pub surplus_disposition: SurplusPolicy,
    /// Stores left out of the event and why.
    pub errors: Vec<EntityError>,
}

impl DistributionResult {
    pub fn total_allocated(&self) -> u64 {
        self.allocations.iter().map(|a| a.allocated).sum()
    }

    pub fn is_scarce(&self) -> bool {
        self.status == DistributionStatus::Scarce
    }
}

/// Split `request.supply` across the request's stores.
///
/// Invariants: every allocation is at most the store's demand, and allocations
/// sum to the supply whenever supply does not exceed total demand (otherwise
/// every store gets its full demand and the rest is `surplus`).
pub fn distribute(request: &DistributionRequest, config: &EngineConfig) -> EngineResult<DistributionResult> {
    config.dpdu.validate()?;
    if request.supply < 0 {
        return Err(EngineError::infeasible(format!(
            "supply must be non-negative (got {})",
            request.supply
        )));
    }

    let dpdu = &config.dpdu;
    let supply = request.supply as u64;
    let Screened { demands, errors } = screen_stores(request);
    let total_demand = demands
        .iter()
        .try_fold(0u64, |acc, d| acc.checked_add(*d))
        .ok_or_else(|| EngineError::validation("total requested demand does not fit in 64 bits"))?;
    if total_demand == 0 {
        return Err(EngineError::infeasible(format!(
            "no usable demand among {} stores ({} left out)",
            request.stores.len(),
            errors.len()
        )));
    }

    let weights = Weights::compute(request, &demands, dpdu);
    let target = supply.min(total_demand);
    let continuous = water_fill(target as f64, &demands, &weights.blended);
    let allocated = largest_remainder(&continuous, &demands, &weights.blended, target);

    let allocations: Vec<StoreAllocation> = request
        .stores
        .iter()
        .enumerate()
        .map(|(i, s)| StoreAllocation {
            store_id: s.store_id.clone(),
            requested: demands[i],
            allocated: allocated[i],
            pct_demand: weights.pct_demand[i],
            pct_urgency: weights.pct_urgency[i],
            weight: weights.blended[i],
        })
        .collect();

    let scarce = total_demand > supply;
    let conflict = scarce.then(|| {
        let shortfalls: Vec<StoreShortfall> = allocations
            .iter()
            .filter(|a| a.shortfall() > 0)
            .map(|a| StoreShortfall {
                store_id: a.store_id.clone(),
                requested: a.requested,
                allocated: a.allocated,
                shortfall: a.shortfall(),
                weight: a.weight,
            })
            .collect();
        DistributionConflict {
            total_demand,
            supply,
            total_shortfall: total_demand - supply,
            demand_weight: dpdu.demand_weight,
            urgency_weight: dpdu.urgency_weight,
            shortfalls,
        }
    });

    if let Some(c) = &conflict {
        info!(
            product = ?request.product_id,
            supply,
            total_demand,
            shortfall = c.total_shortfall,
            stores_short = c.shortfalls.len(),
            "scarce supply distributed"
        );
    } else {
        debug!(product = ?request.product_id, supply, total_demand, "supply covers demand");
    }

    Ok(DistributionResult {
        product_id: request.product_id.clone(),
        status: if scarce {
            DistributionStatus::Scarce
        } else {
            DistributionStatus::FullySatisfied
        },
        allocations,
        conflict,
        surplus: supply - target,
        surplus_disposition: dpdu.surplus,
        errors,
    })
}

/// Independent distribution events, computed in parallel. Results keep input order.
pub fn distribute_many(
    requests: &[DistributionRequest],
    config: &EngineConfig,
) -> Vec<EngineResult<DistributionResult>> {
    requests.par_iter().map(|r| distribute(r, config)).collect()
}

struct Screened {
    /// Usable demand per store; zero for stores left out.
    demands: Vec<u64>,
    errors: Vec<EntityError>,
}

/// Leave out stores with a negative request, no days-of-stock figure, or an
/// id already seen earlier in the request.
fn screen_stores(request: &DistributionRequest) -> Screened {
    let mut seen = HashSet::new();
    let mut out = Screened {
        demands: Vec::with_capacity(request.stores.len()),
        errors: Vec::new(),
    };
    for s in &request.stores {
        let problem = if s.demand < 0 {
            Some(format!("requested a negative quantity ({})", s.demand))
        } else if s.days_of_stock.is_nan() {
            Some("has no days-of-stock figure".to_string())
        } else if !seen.insert(&s.store_id) {
            Some("appears more than once".to_string())
        } else {
            None
        };

        match problem {
            Some(problem) => {
                warn!(product = ?request.product_id, store = %s.store_id, %problem, "store left out of distribution");
                out.errors.push(EntityError::new(
                    request.product_id.clone(),
                    Some(s.store_id.clone()),
                    format!("store {} {problem}", s.store_id),
                ));
                out.demands.push(0);
            }
            None => out.demands.push(s.demand as u64),
        }
    }
    out
}

/// Normalize to shares of the total; an all-zero input splits equally.
fn shares(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        let n = values.len().max(1) as f64;
        vec![1.0 / n; values.len()]
    }
}

struct Weights {
    pct_demand: Vec<f64>,
    pct_urgency: Vec<f64>,
    blended: Vec<f64>,
}

impl Weights {
    /// Stores requesting nothing take no part in the weighting.
    fn compute(request: &DistributionRequest, demands: &[u64], dpdu: &DpduConfig) -> Self {
        let n = demands.len();
        let participants: Vec<usize> = (0..n).filter(|&i| demands[i] > 0).collect();

        let d: Vec<f64> = participants.iter().map(|&i| demands[i] as f64).collect();
        let u: Vec<f64> = participants
            .iter()
            .map(|&i| 1.0 / request.stores[i].days_of_stock.max(dpdu.min_days_of_stock))
            .collect();
        let (pd, pu) = (shares(&d), shares(&u));

        let mut out = Self {
            pct_demand: vec![0.0; n],
            pct_urgency: vec![0.0; n],
            blended: vec![0.0; n],
        };
        for (k, &i) in participants.iter().enumerate() {
            out.pct_demand[i] = pd[k];
            out.pct_urgency[i] = pu[k];
            out.blended[i] = dpdu.demand_weight * pd[k] + dpdu.urgency_weight * pu[k];
        }
        out
    }
}

/// Pour `target` over the stores by weight, capping each at its demand and
/// re-pouring the excess until the supply is gone or everyone is full.
fn water_fill(target: f64, demands: &[u64], weights: &[f64]) -> Vec<f64> {
    const EPS: f64 = 1e-9;
    let n = demands.len();
    let mut alloc = vec![0.0; n];
    let mut active: Vec<bool> = demands.iter().map(|d| *d > 0).collect();

    loop {
        let remaining = target - alloc.iter().sum::<f64>();
        let open: Vec<usize> = (0..n).filter(|&i| active[i]).collect();
        if remaining <= EPS || open.is_empty() {
            break;
        }

        let open_weight: f64 = open.iter().map(|&i| weights[i]).sum();
        let share_of = |i: usize| {
            if open_weight > 0.0 {
                remaining * weights[i] / open_weight
            } else {
                remaining / open.len() as f64
            }
        };

        let mut capped = false;
        for &i in &open {
            let cap = demands[i] as f64;
            if alloc[i] + share_of(i) >= cap - EPS {
                alloc[i] = cap;
                active[i] = false;
                capped = true;
            }
        }
        if !capped {
            for &i in &open {
                alloc[i] += share_of(i);
            }
            break;
        }
    }
    alloc
}

/// Round to integers summing exactly to `target` without exceeding any demand.
/// Leftover units go to the largest fractional parts, then the higher weight,
/// then input order.
fn largest_remainder(continuous: &[f64], demands: &[u64], weights: &[f64], target: u64) -> Vec<u64> {
    let mut out: Vec<u64> = continuous
        .iter()
        .zip(demands)
        .map(|(c, d)| (c.max(0.0).floor() as u64).min(*d))
        .collect();

    let mut order: Vec<usize> = (0..out.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = continuous[a] - continuous[a].floor();
        let fb = continuous[b] - continuous[b].floor();
        fb.total_cmp(&fa)
            .then(weights[b].total_cmp(&weights[a]))
            .then(a.cmp(&b))
    });

    let mut assigned: u64 = out.iter().sum();
    while assigned < target {
        let before = assigned;
        for &i in &order {
            if assigned == target {
                break;
            }
            if out[i] < demands[i] {
                out[i] += 1;
                assigned += 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    while assigned > target {
        let before = assigned;
        for &i in order.iter().rev() {
            if assigned == target {
                break;
            }
            if out[i] > 0 {
                out[i] -= 1;
                assigned -= 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store(id: &str, demand: i64, days: f64) -> StoreDemand {
        StoreDemand::new(StoreId::new(id).unwrap(), demand, days)
    }

    fn request(supply: i64, stores: Vec<StoreDemand>) -> DistributionRequest {
        DistributionRequest {
            product_id: Some(ProductId::new("SKU-1").unwrap()),
            supply,
            stores,
        }
    }

    fn allocated(result: &DistributionResult) -> Vec<u64> {
        result.allocations.iter().map(|a| a.allocated).collect()
    }

    #[test]
    fn single_store_with_enough_supply_is_fully_satisfied() {
        let r = distribute(&request(100, vec![store("S1", 80, 3.0)]), &EngineConfig::default()).unwrap();
        assert_eq!(allocated(&r), vec![80]);
        assert_eq!(r.status, DistributionStatus::FullySatisfied);
        assert!(r.conflict.is_none());
        assert_eq!(r.surplus, 20);
        assert_eq!(r.surplus_disposition, SurplusPolicy::Discard);
    }

    #[test]
    fn two_store_scarcity_favours_the_urgent_store() {
        let r = distribute(
            &request(60, vec![store("S1", 100, 2.0), store("S2", 50, 10.0)]),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(allocated(&r), vec![44, 16]);
        assert_eq!(r.total_allocated(), 60);
        assert!(r.is_scarce());

        let conflict = r.conflict.unwrap();
        assert_eq!(conflict.total_demand, 150);
        assert_eq!(conflict.total_shortfall, 90);
        assert_eq!(conflict.shortfalls.len(), 2);
        assert_eq!(conflict.demand_weight, 0.60);
        assert!(r.allocations[0].weight > r.allocations[1].weight);
        assert!(r.allocations[0].pct_urgency > r.allocations[0].pct_demand);
    }

    #[test]
    fn capped_surplus_is_redistributed() {
        // S2 is nearly out but wants little; its excess flows to S1 and S3.
        let r = distribute(
            &request(100, vec![store("S1", 200, 5.0), store("S2", 5, 0.0), store("S3", 100, 5.0)]),
            &EngineConfig::default(),
        )
        .unwrap();
        let a = allocated(&r);
        assert_eq!(a[1], 5);
        assert_eq!(a.iter().sum::<u64>(), 100);
        assert!(a[0] > a[2]);
    }

    #[test]
    fn zero_days_of_stock_gets_capped_urgency_not_infinity() {
        let r = distribute(
            &request(10, vec![store("S1", 50, 0.0), store("S2", 50, -3.0)]),
            &EngineConfig::default(),
        )
        .unwrap();
        assert!(r.allocations.iter().all(|a| a.weight.is_finite()));
        assert_eq!(allocated(&r), vec![5, 5]);
    }

    #[test]
    fn zero_demand_store_gets_nothing() {
        let r = distribute(
            &request(10, vec![store("S1", 0, 0.0), store("S2", 20, 4.0)]),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(allocated(&r), vec![0, 10]);
        assert_eq!(r.allocations[0].weight, 0.0);
    }

    #[test]
    fn zero_supply_allocates_nothing() {
        let r = distribute(&request(0, vec![store("S1", 5, 1.0)]), &EngineConfig::default()).unwrap();
        assert_eq!(allocated(&r), vec![0]);
        assert!(r.is_scarce());
    }

    #[test]
    fn surplus_policy_is_reported() {
        let mut config = EngineConfig::default();
        config.dpdu.surplus = SurplusPolicy::ReturnToPool;
        let r = distribute(&request(30, vec![store("S1", 10, 1.0), store("S2", 5, 1.0)]), &config).unwrap();
        assert_eq!(allocated(&r), vec![10, 5]);
        assert_eq!(r.surplus, 15);
        assert_eq!(r.surplus_disposition, SurplusPolicy::ReturnToPool);
    }

    #[test]
    fn infeasible_requests_are_rejected() {
        let config = EngineConfig::default();
        assert!(matches!(
            distribute(&request(-1, vec![store("S1", 5, 1.0)]), &config),
            Err(EngineError::Infeasible(_))
        ));
        assert!(matches!(
            distribute(&request(10, vec![store("S1", 0, 1.0)]), &config),
            Err(EngineError::Infeasible(_))
        ));
        assert!(matches!(
            distribute(&request(10, vec![]), &config),
            Err(EngineError::Infeasible(_))
        ));
        // Every store left out: nothing usable remains.
        assert!(matches!(
            distribute(&request(10, vec![store("S1", -5, 1.0), store("S2", 5, f64::NAN)]), &config),
            Err(EngineError::Infeasible(_))
        ));
    }

    #[test]
    fn malformed_store_is_left_out_and_the_rest_still_served() {
        let r = distribute(
            &request(60, vec![store("S1", 100, 2.0), store("S2", 50, f64::NAN)]),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(allocated(&r), vec![60, 0]);
        assert_eq!(r.allocations[1].requested, 0);
        assert_eq!(r.allocations[1].weight, 0.0);
        assert!(r.is_scarce());
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].store_id, Some(StoreId::new("S2").unwrap()));
        assert_eq!(r.errors[0].product_id, Some(ProductId::new("SKU-1").unwrap()));
    }

    #[test]
    fn negative_request_and_repeated_store_are_left_out() {
        let r = distribute(
            &request(
                8,
                vec![store("S1", 5, 1.0), store("S2", -4, 1.0), store("S1", 7, 1.0), store("S3", 5, 1.0)],
            ),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(allocated(&r), vec![4, 0, 0, 4]);
        assert_eq!(r.total_allocated(), 8);
        assert_eq!(r.errors.len(), 2);
        assert_eq!(r.conflict.unwrap().total_demand, 10);
    }

    #[test]
    fn overflowing_total_demand_is_rejected() {
        let r = distribute(
            &request(
                10,
                vec![store("S1", i64::MAX, 1.0), store("S2", i64::MAX, 1.0), store("S3", i64::MAX, 1.0)],
            ),
            &EngineConfig::default(),
        );
        assert!(matches!(r, Err(EngineError::Validation(_))));
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut config = EngineConfig::default();
        config.dpdu.urgency_weight = 0.5;
        assert!(matches!(
            distribute(&request(10, vec![store("S1", 5, 1.0)]), &config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn batch_keeps_order_and_isolates_errors() {
        let config = EngineConfig::default();
        let results = distribute_many(
            &[
                request(10, vec![store("S1", 5, 1.0)]),
                request(-1, vec![store("S1", 5, 1.0)]),
                request(3, vec![store("S1", 5, 1.0), store("S2", 5, 1.0)]),
            ],
            &config,
        );
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().errors.is_empty());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().total_allocated(), 3);
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let req = request(
            37,
            vec![store("S1", 13, 1.5), store("S2", 13, 1.5), store("S3", 13, 1.5)],
        );
        let a = distribute(&req, &EngineConfig::default()).unwrap();
        let b = distribute(&req, &EngineConfig::default()).unwrap();
        assert_eq!(a, b);
        // 37 over three identical stores: the extra unit goes to the first in input order.
        assert_eq!(allocated(&a), vec![13, 12, 12]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: allocations never exceed demand, and they sum to the
        /// supply whenever the supply is not larger than total demand.
        #[test]
        fn sums_to_supply_and_respects_demand(
            supply in 0i64..5_000,
            stores in prop::collection::vec((0i64..1_000, -2.0f64..30.0), 1..12),
            demand_weight in 0.0f64..=1.0,
        ) {
            prop_assume!(stores.iter().any(|(d, _)| *d > 0));
            let mut config = EngineConfig::default();
            config.dpdu.demand_weight = demand_weight;
            config.dpdu.urgency_weight = 1.0 - demand_weight;

            let req = request(
                supply,
                stores
                    .iter()
                    .enumerate()
                    .map(|(i, (d, t))| store(&format!("S{i}"), *d, *t))
                    .collect(),
            );
            let r = distribute(&req, &config).unwrap();
            let total_demand: i64 = stores.iter().map(|(d, _)| *d).sum();

            for (a, (d, _)) in r.allocations.iter().zip(&stores) {
                prop_assert!(a.allocated as i64 <= *d);
            }
            if supply <= total_demand {
                prop_assert_eq!(r.total_allocated() as i64, supply);
                prop_assert_eq!(r.surplus, 0);
            } else {
                prop_assert_eq!(r.total_allocated() as i64, total_demand);
                prop_assert_eq!(r.surplus as i64, supply - total_demand);
            }
            prop_assert_eq!(r.conflict.is_some(), total_demand > supply);
        }
    }
}
