//! Stockout-risk and data-anomaly detection for a single stock record.
//!
//! Model:
//! - coverage = current stock / demand still expected this period
//! - intensity = sales so far today / sales expected by this time of day
//! - an ordered rule table maps (coverage, intensity band) to an emergency level
//! - anomalies are checked independently of the rule table

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use invintel_core::{
    EmergencyConfig, EmergencyLevel, EngineError, EngineResult, IntensityBand, ProductId, StoreId,
};

/// Live stock and sales figures for one product in one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSignal {
    pub product_id: ProductId,
    pub store_id: StoreId,
    /// When the figures were read; the time of day drives the expected pace.
    pub observed_at: NaiveDateTime,
    pub current_stock: f64,
    /// Demand still expected before the next replenishment.
    pub remaining_period_demand: f64,
    pub sales_today: f64,
    /// Full-day expected sales.
    pub expected_daily_sales: f64,
    pub historical_daily_mean: f64,
    pub days_without_movement: u32,
}

impl StockSignal {
    fn validate(&self) -> EngineResult<()> {
        let fields = [
            ("current_stock", self.current_stock),
            ("remaining_period_demand", self.remaining_period_demand),
            ("sales_today", self.sales_today),
            ("expected_daily_sales", self.expected_daily_sales),
            ("historical_daily_mean", self.historical_daily_mean),
        ];
        for (name, v) in fields {
            if !v.is_finite() {
                return Err(EngineError::validation(format!("{name} is not a finite number")));
            }
        }
        for (name, v) in &fields[1..] {
            if *v < 0.0 {
                return Err(EngineError::validation(format!("{name} is negative ({v})")));
            }
        }
        Ok(())
    }
}

/// Share of a day's demand expected to have happened by `at` (0..=1).
///
/// The shape of the curve is owned by whoever models intraday seasonality;
/// the detector only looks values up.
pub trait DemandCurve: Send + Sync {
    fn elapsed_share(&self, store_id: &StoreId, at: NaiveTime) -> f64;
}

impl<F> DemandCurve for F
where
    F: Fn(&StoreId, NaiveTime) -> f64 + Send + Sync,
{
    fn elapsed_share(&self, store_id: &StoreId, at: NaiveTime) -> f64 {
        self(store_id, at)
    }
}

/// Demand spread evenly over the 24 hours.
#[derive(Debug, Copy, Clone, Default)]
pub struct FlatCurve;

impl DemandCurve for FlatCurve {
    fn elapsed_share(&self, _store_id: &StoreId, at: NaiveTime) -> f64 {
        at.num_seconds_from_midnight() as f64 / 86_400.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergency {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub level: EmergencyLevel,
    /// `None` means nothing left to cover (unbounded).
    pub coverage: Option<f64>,
    pub intensity: Option<f64>,
    pub band: IntensityBand,
    pub explanation: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    NegativeStock,
    SalesSpike,
    StuckRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub kind: AnomalyKind,
    /// >= 1.0; how far past the trigger threshold the record is.
    pub severity: f64,
    pub explanation: String,
}

/// What one signal produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub emergency: Option<Emergency>,
    pub anomalies: Vec<Anomaly>,
}

pub fn coverage(signal: &StockSignal) -> Option<f64> {
    if signal.remaining_period_demand <= 0.0 {
        return None;
    }
    Some(signal.current_stock.max(0.0) / signal.remaining_period_demand)
}

/// `None` when nothing was expected yet (start of day, or no expected demand).
pub fn intensity(signal: &StockSignal, curve: &dyn DemandCurve) -> Option<f64> {
    let share = curve
        .elapsed_share(&signal.store_id, signal.observed_at.time())
        .clamp(0.0, 1.0);
    let expected = signal.expected_daily_sales * share;
    if !expected.is_finite() || expected <= 0.0 {
        return None;
    }
    Some(signal.sales_today / expected)
}

pub fn evaluate(
    signal: &StockSignal,
    curve: &dyn DemandCurve,
    config: &EmergencyConfig,
) -> EngineResult<Detection> {
    signal.validate()?;

    let coverage = coverage(signal);
    let intensity = intensity(signal, curve);
    let band = intensity.map_or(IntensityBand::Normal, |i| config.band_for(i));

    let emergency = coverage.and_then(|c| {
        config
            .rules
            .iter()
            .find(|r| c < r.coverage_below && band >= r.min_intensity)
            .map(|rule| Emergency {
                product_id: signal.product_id.clone(),
                store_id: signal.store_id.clone(),
                level: rule.level,
                coverage: Some(c),
                intensity,
                band,
                explanation: format!(
                    "{} at {}: coverage {c:.2} below {:.2} with {band:?} intensity{}",
                    signal.product_id,
                    signal.store_id,
                    rule.coverage_below,
                    intensity.map(|i| format!(" ({i:.2}x expected)")).unwrap_or_default(),
                ),
            })
    });

    Ok(Detection {
        emergency,
        anomalies: anomalies(signal, config),
    })
}

fn anomalies(signal: &StockSignal, config: &EmergencyConfig) -> Vec<Anomaly> {
    let mut out = Vec::new();
    let mut push = |kind, severity: f64, explanation: String| {
        out.push(Anomaly {
            product_id: signal.product_id.clone(),
            store_id: signal.store_id.clone(),
            kind,
            severity,
            explanation,
        })
    };

    if signal.current_stock < 0.0 {
        push(
            AnomalyKind::NegativeStock,
            1.0 + signal.current_stock.abs().ln_1p(),
            format!(
                "{} at {} reports negative stock ({:.2})",
                signal.product_id, signal.store_id, signal.current_stock
            ),
        );
    }

    let mean = signal.historical_daily_mean;
    if mean > 0.0 {
        let ratio = signal.sales_today / mean;
        if ratio > config.spike_multiple {
            push(
                AnomalyKind::SalesSpike,
                ratio / config.spike_multiple,
                format!(
                    "{} at {} sold {:.2} today; historical daily mean={mean:.2} ({ratio:.1}x, threshold={:.1}x)",
                    signal.product_id, signal.store_id, signal.sales_today, config.spike_multiple
                ),
            );
        }
    }

    if signal.expected_daily_sales > 0.0 && signal.days_without_movement >= config.stuck_days {
        push(
            AnomalyKind::StuckRecord,
            signal.days_without_movement as f64 / config.stuck_days as f64,
            format!(
                "{} at {} has not moved for {} days while {:.2} units/day are expected",
                signal.product_id,
                signal.store_id,
                signal.days_without_movement,
                signal.expected_daily_sales
            ),
        );
    }

    out
}
