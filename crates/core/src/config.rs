//! Engine configuration.
//!
//! Every knob of the algorithms lives here so callers can override it from
//! outside. `EngineConfig::validate` is the single gate: invalid values are
//! rejected with a message naming the field, never clamped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::demand::Granularity;
use crate::error::{EngineError, EngineResult};
use crate::id::ProductId;
use crate::tier::{AbcTier, Quadrant, XyzTier};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub abc: AbcConfig,
    pub xyz: XyzConfig,
    pub trend: TrendConfig,
    pub service_levels: ServiceLevels,
    pub dpdu: DpduConfig,
    pub lead_time: LeadTimeConfig,
    pub no_sales_floor: NoSalesFloor,
    pub pack_sizes: PackSizes,
    pub emergency: EmergencyConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> EngineResult<()> {
        self.abc.validate()?;
        self.xyz.validate()?;
        self.trend.validate()?;
        self.service_levels.validate()?;
        self.dpdu.validate()?;
        self.lead_time.validate()?;
        self.no_sales_floor.validate()?;
        self.pack_sizes.validate()?;
        self.emergency.validate()?;
        Ok(())
    }

    /// Validate and return self, for builder-style construction.
    pub fn validated(self) -> EngineResult<Self> {
        self.validate()?;
        Ok(self)
    }
}

/// Whether ABC ranking happens within each store or across the network.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbcScope {
    #[default]
    PerStore,
    Network,
}

/// Cumulative-share breakpoints. Tier C always closes at 100%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbcConfig {
    pub a_max_share: f64,
    pub b_max_share: f64,
    pub scope: AbcScope,
    pub lookback_days: u32,
}

impl Default for AbcConfig {
    fn default() -> Self {
        Self {
            a_max_share: 0.80,
            b_max_share: 0.95,
            scope: AbcScope::PerStore,
            lookback_days: 90,
        }
    }
}

impl AbcConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let (a, b) = (self.a_max_share, self.b_max_share);
        if !(a.is_finite() && b.is_finite()) || a <= 0.0 || a >= b || b > 1.0 {
            return Err(EngineError::invalid_config(format!(
                "abc breakpoints must satisfy 0 < a < b <= 1 (a={a}, b={b})"
            )));
        }
        if self.lookback_days == 0 {
            return Err(EngineError::invalid_config("abc.lookback_days must be >= 1"));
        }
        Ok(())
    }

    pub fn tier_for_share(&self, cumulative_share: f64) -> AbcTier {
        // Tolerance absorbs float noise when a share lands exactly on a breakpoint.
        const EPS: f64 = 1e-9;
        if cumulative_share <= self.a_max_share + EPS {
            AbcTier::A
        } else if cumulative_share <= self.b_max_share + EPS {
            AbcTier::B
        } else {
            AbcTier::C
        }
    }
}

/// Coefficient-of-variation breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XyzConfig {
    pub x_max_cv: f64,
    pub y_max_cv: f64,
    pub granularity: Granularity,
}

impl Default for XyzConfig {
    fn default() -> Self {
        Self {
            x_max_cv: 0.5,
            y_max_cv: 1.0,
            granularity: Granularity::Daily,
        }
    }
}

impl XyzConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let (x, y) = (self.x_max_cv, self.y_max_cv);
        if !(x.is_finite() && y.is_finite()) || x <= 0.0 || x >= y {
            return Err(EngineError::invalid_config(format!(
                "xyz breakpoints must satisfy 0 < x < y (x={x}, y={y})"
            )));
        }
        Ok(())
    }

    pub fn tier_for_cv(&self, cv: f64) -> XyzTier {
        if cv <= self.x_max_cv {
            XyzTier::X
        } else if cv <= self.y_max_cv {
            XyzTier::Y
        } else {
            XyzTier::Z
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub short_window: usize,
    pub long_window: usize,
    /// Relative change above which a trend counts as rising/falling (0.05 = 5%).
    pub threshold_pct: f64,
    /// Periods averaged as "current" for the seasonality factor.
    pub seasonal_current_periods: usize,
    /// Deviation of the seasonality factor from 1.0 that marks a peak/low season.
    pub seasonal_band: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            short_window: 5,
            long_window: 20,
            threshold_pct: 0.05,
            seasonal_current_periods: 7,
            seasonal_band: 0.20,
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.short_window == 0 || self.short_window >= self.long_window {
            return Err(EngineError::invalid_config(format!(
                "trend windows must satisfy 0 < short < long (short={}, long={})",
                self.short_window, self.long_window
            )));
        }
        if !self.threshold_pct.is_finite() || self.threshold_pct < 0.0 {
            return Err(EngineError::invalid_config("trend.threshold_pct must be >= 0"));
        }
        if self.seasonal_current_periods == 0 {
            return Err(EngineError::invalid_config(
                "trend.seasonal_current_periods must be >= 1",
            ));
        }
        if !self.seasonal_band.is_finite() || self.seasonal_band <= 0.0 || self.seasonal_band >= 1.0 {
            return Err(EngineError::invalid_config(
                "trend.seasonal_band must be in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Target service level per quadrant, expressed as a Z-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceLevels(pub HashMap<Quadrant, f64>);

impl Default for ServiceLevels {
    fn default() -> Self {
        // 99% .. 80% one-sided service levels, tightest for AX.
        let z = [2.33, 2.05, 1.88, 1.65, 1.55, 1.41, 1.28, 1.04, 0.84];
        Self(Quadrant::RANKED.iter().copied().zip(z).collect())
    }
}

impl ServiceLevels {
    pub fn z_for(&self, quadrant: Quadrant) -> Option<f64> {
        self.0.get(&quadrant).copied()
    }

    pub fn set(&mut self, quadrant: Quadrant, z: f64) {
        self.0.insert(quadrant, z);
    }

    pub fn validate(&self) -> EngineResult<()> {
        for q in Quadrant::RANKED {
            match self.z_for(q) {
                None => {
                    return Err(EngineError::invalid_config(format!(
                        "service_levels missing quadrant {q}"
                    )));
                }
                Some(z) if !z.is_finite() || z < 0.0 => {
                    return Err(EngineError::invalid_config(format!(
                        "service_levels.{q} must be a non-negative Z-score (got {z})"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// What happens to supply left over once every store is fully satisfied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurplusPolicy {
    #[default]
    Discard,
    ReturnToPool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpduConfig {
    pub demand_weight: f64,
    pub urgency_weight: f64,
    /// Days-of-stock floor used for urgency; caps urgency at `1 / min_days_of_stock`.
    pub min_days_of_stock: f64,
    pub surplus: SurplusPolicy,
}

impl Default for DpduConfig {
    fn default() -> Self {
        Self {
            demand_weight: 0.60,
            urgency_weight: 0.40,
            min_days_of_stock: 0.1,
            surplus: SurplusPolicy::Discard,
        }
    }
}

impl DpduConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let (d, u) = (self.demand_weight, self.urgency_weight);
        if !(d.is_finite() && u.is_finite()) || d < 0.0 || u < 0.0 {
            return Err(EngineError::invalid_config(format!(
                "dpdu weights must be non-negative (demand={d}, urgency={u})"
            )));
        }
        if (d + u - 1.0).abs() > 1e-9 {
            return Err(EngineError::invalid_config(format!(
                "dpdu weights must sum to 1 (demand={d}, urgency={u})"
            )));
        }
        if !self.min_days_of_stock.is_finite() || self.min_days_of_stock <= 0.0 {
            return Err(EngineError::invalid_config(
                "dpdu.min_days_of_stock must be > 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadTimeConfig {
    pub lead_time_days: f64,
    pub replenishment_cycle_days: f64,
    pub buffer_days: f64,
}

impl Default for LeadTimeConfig {
    fn default() -> Self {
        Self {
            lead_time_days: 3.0,
            replenishment_cycle_days: 7.0,
            buffer_days: 2.0,
        }
    }
}

impl LeadTimeConfig {
    pub fn validate(&self) -> EngineResult<()> {
        for (name, v) in [
            ("lead_time_days", self.lead_time_days),
            ("replenishment_cycle_days", self.replenishment_cycle_days),
            ("buffer_days", self.buffer_days),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "lead_time.{name} must be >= 0 (got {v})"
                )));
            }
        }
        Ok(())
    }
}

/// Static policy applied to products without sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoSalesFloor {
    pub minimum: f64,
    pub maximum: f64,
}

impl Default for NoSalesFloor {
    fn default() -> Self {
        Self {
            minimum: 1.0,
            maximum: 2.0,
        }
    }
}

impl NoSalesFloor {
    pub fn validate(&self) -> EngineResult<()> {
        let (min, max) = (self.minimum, self.maximum);
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
            return Err(EngineError::invalid_config(format!(
                "no_sales_floor must satisfy 0 <= minimum <= maximum (minimum={min}, maximum={max})"
            )));
        }
        Ok(())
    }
}

/// Pack (bulk) unit per product; suggested orders are rounded up to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackSizes {
    pub default: u32,
    pub by_product: HashMap<ProductId, u32>,
}

impl Default for PackSizes {
    fn default() -> Self {
        Self {
            default: 1,
            by_product: HashMap::new(),
        }
    }
}

impl PackSizes {
    pub fn pack_size(&self, product_id: &ProductId) -> u32 {
        self.by_product
            .get(product_id)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.default == 0 {
            return Err(EngineError::invalid_config("pack_sizes.default must be >= 1"));
        }
        if let Some((product, _)) = self.by_product.iter().find(|(_, size)| **size == 0) {
            return Err(EngineError::invalid_config(format!(
                "pack_sizes.by_product.{product} must be >= 1"
            )));
        }
        Ok(())
    }
}

/// Sales pace relative to the expected pace at this time of day.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityBand {
    Low,
    Normal,
    High,
}

/// Severity of a stockout risk, most severe first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyLevel {
    Critical,
    High,
    Medium,
}

/// One row of the emergency rule table: coverage strictly below
/// `coverage_below` periods and intensity at least `min_intensity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRule {
    pub level: EmergencyLevel,
    pub coverage_below: f64,
    pub min_intensity: IntensityBand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    /// Intensity factor below this is `Low`.
    pub intensity_low_below: f64,
    /// Intensity factor at or above this is `High`.
    pub intensity_high_from: f64,
    /// Evaluated in order; the first matching rule wins.
    pub rules: Vec<EmergencyRule>,
    /// Sales today above `spike_multiple x` historical daily mean is implausible.
    pub spike_multiple: f64,
    /// Days without stock movement (with non-zero expected demand) before a record is stuck.
    pub stuck_days: u32,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            intensity_low_below: 0.8,
            intensity_high_from: 1.3,
            rules: vec![
                EmergencyRule {
                    level: EmergencyLevel::Critical,
                    coverage_below: 1.0,
                    min_intensity: IntensityBand::High,
                },
                EmergencyRule {
                    level: EmergencyLevel::High,
                    coverage_below: 1.0,
                    min_intensity: IntensityBand::Low,
                },
                EmergencyRule {
                    level: EmergencyLevel::Medium,
                    coverage_below: 2.0,
                    min_intensity: IntensityBand::High,
                },
            ],
            spike_multiple: 5.0,
            stuck_days: 7,
        }
    }
}

impl EmergencyConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let (low, high) = (self.intensity_low_below, self.intensity_high_from);
        if !(low.is_finite() && high.is_finite()) || low <= 0.0 || low >= high {
            return Err(EngineError::invalid_config(format!(
                "emergency intensity bands must satisfy 0 < low < high (low={low}, high={high})"
            )));
        }
        if self.rules.is_empty() {
            return Err(EngineError::invalid_config("emergency.rules must not be empty"));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if !rule.coverage_below.is_finite() || rule.coverage_below <= 0.0 {
                return Err(EngineError::invalid_config(format!(
                    "emergency.rules[{i}].coverage_below must be > 0"
                )));
            }
        }
        if !self.spike_multiple.is_finite() || self.spike_multiple <= 1.0 {
            return Err(EngineError::invalid_config("emergency.spike_multiple must be > 1"));
        }
        if self.stuck_days == 0 {
            return Err(EngineError::invalid_config("emergency.stuck_days must be >= 1"));
        }
        Ok(())
    }

    pub fn band_for(&self, intensity: f64) -> IntensityBand {
        if intensity < self.intensity_low_below {
            IntensityBand::Low
        } else if intensity >= self.intensity_high_from {
            IntensityBand::High
        } else {
            IntensityBand::Normal
        }
    }
}
