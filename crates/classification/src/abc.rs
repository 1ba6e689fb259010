//! ABC (Pareto) ranking by consumption value.

use serde::{Deserialize, Serialize};

use invintel_core::{AbcConfig, AbcTier};

/// Ranking outcome for one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbcRank<K> {
    pub key: K,
    pub value: f64,
    /// 1-based position after sorting by value, descending.
    pub rank: usize,
    pub cumulative_share: f64,
    pub tier: AbcTier,
}

/// Rank `entries` by value and assign tiers from cumulative share.
///
/// The sort is stable, so entries with identical value keep their input order.
/// An entry lands in a tier only if the running share *including it* stays
/// within that tier's breakpoint. Zero-value entries get `D`; if the total is
/// zero every entry gets `D`. Output is in rank order.
pub fn rank<K>(entries: Vec<(K, f64)>, config: &AbcConfig) -> Vec<AbcRank<K>> {
    let mut entries: Vec<(K, f64)> = entries
        .into_iter()
        .map(|(k, v)| (k, if v.is_finite() && v > 0.0 { v } else { 0.0 }))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total: f64 = entries.iter().map(|(_, v)| *v).sum();
    let mut running = 0.0;

    entries
        .into_iter()
        .enumerate()
        .map(|(i, (key, value))| {
            if total <= 0.0 || value <= 0.0 {
                return AbcRank {
                    key,
                    value,
                    rank: i + 1,
                    cumulative_share: if total > 0.0 { running / total } else { 0.0 },
                    tier: AbcTier::D,
                };
            }
            running += value;
            let cumulative_share = (running / total).min(1.0);
            AbcRank {
                key,
                value,
                rank: i + 1,
                cumulative_share,
                tier: config.tier_for_share(cumulative_share),
            }
        })
        .collect()
}
