//! Rolling-window trend and seasonality signals.
//!
//! Not a forecast: the analyzer compares a short rolling average against a
//! long one, and the most recent periods against the whole window.

use serde::{Deserialize, Serialize};

use invintel_core::TrendConfig;
use invintel_core::demand::{mean, stddev_population};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    #[serde(rename = "creciente")]
    Increasing,
    #[serde(rename = "decreciente")]
    Decreasing,
    #[serde(rename = "estable")]
    Stable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeasonalPattern {
    #[serde(rename = "temporada_alta")]
    Peak,
    #[serde(rename = "temporada_baja")]
    Low,
    #[serde(rename = "normal")]
    Normal,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub short_avg: f64,
    pub long_avg: f64,
    /// (short - long) / long; zero when the long average is zero.
    pub change_pct: f64,
    pub direction: TrendDirection,
    /// In [0, 1]; capped by the fraction of the long window actually observed.
    pub confidence: f64,
    pub seasonality_factor: f64,
    pub seasonal_pattern: SeasonalPattern,
}

impl TrendAnalysis {
    fn flat(short_avg: f64, long_avg: f64, seasonality_factor: f64, pattern: SeasonalPattern) -> Self {
        Self {
            short_avg,
            long_avg,
            change_pct: 0.0,
            direction: TrendDirection::Stable,
            confidence: 0.0,
            seasonality_factor,
            seasonal_pattern: pattern,
        }
    }
}

fn tail(periods: &[f64], n: usize) -> &[f64] {
    &periods[periods.len().saturating_sub(n)..]
}

pub fn analyze(periods: &[f64], config: &TrendConfig) -> TrendAnalysis {
    let (seasonality_factor, seasonal_pattern) = seasonality(periods, config);

    let short_avg = mean(tail(periods, config.short_window));
    let long_slice = tail(periods, config.long_window);
    let long_avg = mean(long_slice);

    if long_avg <= 0.0 {
        return TrendAnalysis::flat(short_avg, long_avg, seasonality_factor, seasonal_pattern);
    }

    let change_pct = (short_avg - long_avg) / long_avg;
    let direction = if change_pct > config.threshold_pct {
        TrendDirection::Increasing
    } else if change_pct < -config.threshold_pct {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let sample_factor = (periods.len() as f64 / config.long_window as f64).min(1.0);
    let cv = stddev_population(long_slice, long_avg) / long_avg;
    let confidence = (sample_factor / (1.0 + cv)).clamp(0.0, 1.0);

    TrendAnalysis {
        short_avg,
        long_avg,
        change_pct,
        direction,
        confidence,
        seasonality_factor,
        seasonal_pattern,
    }
}

fn seasonality(periods: &[f64], config: &TrendConfig) -> (f64, SeasonalPattern) {
    let baseline = mean(periods);
    if baseline <= 0.0 {
        return (1.0, SeasonalPattern::Normal);
    }
    let factor = mean(tail(periods, config.seasonal_current_periods)) / baseline;
    let pattern = if factor >= 1.0 + config.seasonal_band {
        SeasonalPattern::Peak
    } else if factor <= 1.0 - config.seasonal_band {
        SeasonalPattern::Low
    } else {
        SeasonalPattern::Normal
    };
    (factor, pattern)
}
