//! Combined ABC x XYZ classification over a demand snapshot.
//!
//! ABC needs a global sort, so it runs first as one aggregation pass. XYZ and
//! trend analysis are independent per series and fan out with rayon.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use invintel_core::{
    AbcScope, AbcTier, DemandSeries, DemandStats, EngineConfig, EntityError, ProductId, Quadrant, StoreId,
    XyzTier, most_critical_abc,
};

use crate::abc;
use crate::trend::{self, TrendAnalysis};
use crate::xyz;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub value_tier: AbcTier,
    pub variability_tier: XyzTier,
    pub quadrant: Quadrant,
    /// Consumption value used for ranking (network total under `AbcScope::Network`).
    pub value: f64,
    pub cumulative_share: f64,
    pub coefficient_of_variation: Option<f64>,
    /// Mean demand per period of the configured granularity.
    pub mean_demand: f64,
    pub stdev_demand: f64,
    /// Daily statistics of the same series, the input of stock policies.
    pub daily_stats: DemandStats,
    pub trend: TrendAnalysis,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationBatch {
    /// One entry per well-formed input series, in input order.
    pub results: Vec<ClassificationResult>,
    pub errors: Vec<EntityError>,
}

#[derive(Debug, Copy, Clone)]
struct ValueRank {
    tier: AbcTier,
    value: f64,
    cumulative_share: f64,
}

/// Classify every series. Pure: identical inputs give identical outputs.
///
/// Malformed series are reported in `errors` and excluded from ranking; a
/// series without sales is a normal result with tier `D` / `NO_SALES`.
pub fn classify(series: &[DemandSeries], config: &EngineConfig) -> ClassificationBatch {
    let mut errors = Vec::new();
    let valid: Vec<&DemandSeries> = series
        .iter()
        .filter(|s| match s.validate() {
            Ok(()) => true,
            Err(e) => {
                errors.push(EntityError::new(
                    Some(s.product_id.clone()),
                    Some(s.store_id.clone()),
                    e.to_string(),
                ));
                false
            }
        })
        .collect();

    let ranks = match config.abc.scope {
        AbcScope::PerStore => rank_per_store(&valid, config),
        AbcScope::Network => rank_network(&valid, config),
    };

    let results: Vec<ClassificationResult> = valid
        .par_iter()
        .zip(ranks.par_iter())
        .map(|(s, rank)| classify_one(s, *rank, config))
        .collect();

    debug!(
        series = series.len(),
        classified = results.len(),
        errors = errors.len(),
        scope = ?config.abc.scope,
        "classification finished"
    );

    ClassificationBatch { results, errors }
}

fn classify_one(series: &DemandSeries, rank: ValueRank, config: &EngineConfig) -> ClassificationResult {
    let periods = series.buckets(config.xyz.granularity);
    let variability = xyz::classify_variability(&periods, &config.xyz);
    let trend = trend::analyze(&periods, &config.trend);

    ClassificationResult {
        product_id: series.product_id.clone(),
        store_id: series.store_id.clone(),
        value_tier: rank.tier,
        variability_tier: variability.tier,
        quadrant: Quadrant::combine(rank.tier, variability.tier),
        value: rank.value,
        cumulative_share: rank.cumulative_share,
        coefficient_of_variation: variability.cv,
        mean_demand: variability.stats.mean,
        stdev_demand: variability.stats.stdev,
        daily_stats: DemandStats::daily(series),
        trend,
    }
}

/// Rank within each store. Returns one rank per input, aligned by index.
fn rank_per_store(series: &[&DemandSeries], config: &EngineConfig) -> Vec<ValueRank> {
    let mut by_store: HashMap<&StoreId, Vec<(usize, f64)>> = HashMap::new();
    for (i, s) in series.iter().enumerate() {
        by_store
            .entry(&s.store_id)
            .or_default()
            .push((i, s.total_value()));
    }

    let mut out = vec![
        ValueRank {
            tier: AbcTier::D,
            value: 0.0,
            cumulative_share: 0.0,
        };
        series.len()
    ];
    for entries in by_store.into_values() {
        for r in abc::rank(entries, &config.abc) {
            out[r.key] = ValueRank {
                tier: r.tier,
                value: r.value,
                cumulative_share: r.cumulative_share,
            };
        }
    }
    out
}

/// Rank products by their value summed across stores; every store gets the
/// product's network tier.
fn rank_network(series: &[&DemandSeries], config: &EngineConfig) -> Vec<ValueRank> {
    let mut order: Vec<&ProductId> = Vec::new();
    let mut totals: HashMap<&ProductId, f64> = HashMap::new();
    for s in series {
        let total = totals.entry(&s.product_id).or_insert_with(|| {
            order.push(&s.product_id);
            0.0
        });
        *total += s.total_value();
    }

    let entries = order.iter().map(|p| (*p, totals[p])).collect();
    let by_product: HashMap<&ProductId, ValueRank> = abc::rank(entries, &config.abc)
        .into_iter()
        .map(|r| {
            (
                r.key,
                ValueRank {
                    tier: r.tier,
                    value: r.value,
                    cumulative_share: r.cumulative_share,
                },
            )
        })
        .collect();

    series.iter().map(|s| by_product[&s.product_id]).collect()
}

/// Number of results per quadrant code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuadrantSummary(pub BTreeMap<Quadrant, usize>);

impl QuadrantSummary {
    pub fn from_results(results: &[ClassificationResult]) -> Self {
        let mut counts = BTreeMap::new();
        for r in results {
            *counts.entry(r.quadrant).or_insert(0) += 1;
        }
        Self(counts)
    }

    pub fn count(&self, quadrant: Quadrant) -> usize {
        self.0.get(&quadrant).copied().unwrap_or(0)
    }
}

/// Most critical value tier per product across the stores that reported it,
/// in order of first appearance.
pub fn most_critical_by_product(results: &[ClassificationResult]) -> Vec<(ProductId, AbcTier)> {
    let mut order: Vec<&ProductId> = Vec::new();
    let mut tiers: HashMap<&ProductId, Vec<Option<AbcTier>>> = HashMap::new();
    for r in results {
        tiers
            .entry(&r.product_id)
            .or_insert_with(|| {
                order.push(&r.product_id);
                Vec::new()
            })
            .push(Some(r.value_tier));
    }
    order
        .into_iter()
        .filter_map(|p| {
            let reported = tiers.remove(p).unwrap_or_default();
            most_critical_abc(reported).map(|t| (p.clone(), t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use invintel_core::{DemandPoint, DemandWindow, Granularity};
    use proptest::prelude::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn window() -> DemandWindow {
        DemandWindow::new(date(1), date(28)).unwrap()
    }

    /// `daily` quantity every day, with `price` per unit.
    fn steady(product: &str, store: &str, daily: f64, price: f64) -> DemandSeries {
        let points = (1..=28)
            .map(|d| DemandPoint::new(date(d), daily, daily * price))
            .collect();
        DemandSeries::new(
            ProductId::new(product).unwrap(),
            StoreId::new(store).unwrap(),
            window(),
            points,
        )
    }

    fn by_product<'a>(batch: &'a ClassificationBatch, product: &str, store: &str) -> &'a ClassificationResult {
        batch
            .results
            .iter()
            .find(|r| r.product_id.as_str() == product && r.store_id.as_str() == store)
            .unwrap()
    }

    #[test]
    fn per_store_ranking_and_quadrants() {
        let mut erratic = steady("P3", "S1", 0.0, 1.0);
        erratic.points = vec![DemandPoint::new(date(3), 30.0, 30.0)];

        let series = vec![
            steady("P1", "S1", 10.0, 8.0), // 2240
            steady("P2", "S1", 2.0, 5.0),  // 280
            erratic,                       // 30
            steady("P4", "S1", 0.0, 1.0),  // no sales
        ];
        let batch = classify(&series, &EngineConfig::default());
        assert!(batch.errors.is_empty());
        assert_eq!(batch.results.len(), 4);

        let p1 = by_product(&batch, "P1", "S1");
        assert_eq!(p1.quadrant, Quadrant::Ranked(AbcTier::B, XyzTier::X));

        let p3 = by_product(&batch, "P3", "S1");
        assert_eq!(p3.value_tier, AbcTier::C);
        assert_eq!(p3.variability_tier, XyzTier::Z);

        let p4 = by_product(&batch, "P4", "S1");
        assert_eq!(p4.value_tier, AbcTier::D);
        assert_eq!(p4.variability_tier, XyzTier::NoSales);
        assert_eq!(p4.quadrant, Quadrant::NoSales);
        assert_eq!(p4.coefficient_of_variation, None);
    }

    #[test]
    fn stores_rank_independently() {
        let series = vec![
            steady("P1", "S1", 10.0, 10.0),
            steady("P2", "S1", 1.0, 10.0),
            steady("P1", "S2", 1.0, 10.0),
            steady("P2", "S2", 10.0, 10.0),
        ];
        let batch = classify(&series, &EngineConfig::default());
        assert_eq!(by_product(&batch, "P1", "S1").value_tier, AbcTier::B);
        assert_eq!(by_product(&batch, "P1", "S2").value_tier, AbcTier::C);
        assert_eq!(by_product(&batch, "P2", "S2").value_tier, AbcTier::B);
    }

    #[test]
    fn network_scope_assigns_one_tier_per_product() {
        let mut config = EngineConfig::default();
        config.abc.scope = AbcScope::Network;
        let series = vec![
            steady("P1", "S1", 10.0, 10.0),
            steady("P1", "S2", 10.0, 10.0),
            steady("P2", "S1", 1.0, 10.0),
            steady("P3", "S2", 1.0, 1.0),
        ];
        let batch = classify(&series, &config);
        let p1_s1 = by_product(&batch, "P1", "S1");
        let p1_s2 = by_product(&batch, "P1", "S2");
        assert_eq!(p1_s1.value_tier, p1_s2.value_tier);
        assert_eq!(p1_s1.value, 5600.0);
        assert_eq!(p1_s1.value_tier, AbcTier::B);
        assert_eq!(by_product(&batch, "P3", "S2").value_tier, AbcTier::C);
    }

    #[test]
    fn malformed_series_are_isolated() {
        let mut bad = steady("P2", "S1", 1.0, 1.0);
        bad.points[0].quantity = f64::NAN;
        let series = vec![steady("P1", "S1", 1.0, 1.0), bad];
        let batch = classify(&series, &EngineConfig::default());
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].product_id.as_ref().unwrap().as_str(), "P2");
    }

    #[test]
    fn inverted_window_is_isolated() {
        let mut bad = steady("P2", "S1", 1.0, 1.0);
        bad.window = DemandWindow {
            start: date(28),
            end: date(1),
        };
        let series = vec![steady("P1", "S1", 1.0, 1.0), bad];
        let batch = classify(&series, &EngineConfig::default());
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].product_id.as_str(), "P1");
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].product_id.as_ref().unwrap().as_str(), "P2");
    }

    #[test]
    fn daily_stats_belong_to_their_own_series() {
        let mut bad = steady("P1", "S1", 1.0, 1.0);
        bad.points[0].revenue = f64::INFINITY;
        let mut config = EngineConfig::default();
        config.xyz.granularity = Granularity::Weekly;
        let series = vec![bad, steady("P2", "S1", 3.0, 1.0), steady("P3", "S1", 7.0, 1.0)];
        let batch = classify(&series, &config);
        assert_eq!(by_product(&batch, "P2", "S1").daily_stats.mean, 3.0);
        assert_eq!(by_product(&batch, "P3", "S1").daily_stats.mean, 7.0);
        assert_eq!(by_product(&batch, "P3", "S1").daily_stats.samples, 28);
    }

    #[test]
    fn empty_input_is_an_empty_batch() {
        let batch = classify(&[], &EngineConfig::default());
        assert!(batch.results.is_empty() && batch.errors.is_empty());
    }

    #[test]
    fn summary_and_most_critical() {
        let series = vec![
            steady("P1", "S1", 10.0, 10.0),
            steady("P2", "S1", 1.0, 10.0),
            steady("P1", "S2", 1.0, 10.0),
            steady("P2", "S2", 10.0, 10.0),
            steady("P3", "S2", 0.0, 10.0),
        ];
        let batch = classify(&series, &EngineConfig::default());
        let summary = QuadrantSummary::from_results(&batch.results);
        assert_eq!(summary.count(Quadrant::NoSales), 1);
        assert_eq!(summary.count(Quadrant::Ranked(AbcTier::B, XyzTier::X)), 2);

        let critical = most_critical_by_product(&batch.results);
        let names: Vec<_> = critical.iter().map(|(p, t)| (p.as_str(), *t)).collect();
        assert_eq!(
            names,
            vec![("P1", AbcTier::B), ("P2", AbcTier::B), ("P3", AbcTier::D)]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: classification is a pure function of its inputs.
        #[test]
        fn classify_is_idempotent(
            quantities in prop::collection::vec(prop::collection::vec(0.0f64..50.0, 28), 1..8)
        ) {
            let series: Vec<DemandSeries> = quantities
                .iter()
                .enumerate()
                .map(|(i, qs)| {
                    let points = qs
                        .iter()
                        .enumerate()
                        .map(|(d, q)| DemandPoint::new(date(d as u32 + 1), *q, *q * 3.0))
                        .collect();
                    DemandSeries::new(
                        ProductId::new(format!("P{i}")).unwrap(),
                        StoreId::new(format!("S{}", i % 2)).unwrap(),
                        window(),
                        points,
                    )
                })
                .collect();
            let config = EngineConfig::default();
            let first = classify(&series, &config);
            let second = classify(&series, &config);
            prop_assert_eq!(first, second);
        }
    }
}
