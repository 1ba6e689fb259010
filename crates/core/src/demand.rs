//! Demand history snapshots and the statistics derived from them.
//!
//! A `DemandSeries` is an immutable snapshot handed over by the demand
//! aggregator. Days inside the series window without a record are zero-demand
//! days; bucketing fills them in so variability is not understated.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::id::{ProductId, StoreId};

/// Inclusive date window of a demand snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemandWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DemandWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> EngineResult<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    /// Trailing window of `days` days ending at `as_of` (inclusive).
    pub fn trailing(as_of: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start: as_of - Duration::days(span),
            end: as_of,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of days covered; zero for an inverted window.
    pub fn days(&self) -> usize {
        usize::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.start > self.end {
            return Err(EngineError::validation(format!(
                "window start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Aggregation period used when turning a series into a demand vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Daily,
    /// ISO weeks; partial weeks at the window edges count as whole periods.
    Weekly,
}

/// One day of sales for a product in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandPoint {
    pub date: NaiveDate,
    pub quantity: f64,
    pub revenue: f64,
}

impl DemandPoint {
    pub fn new(date: NaiveDate, quantity: f64, revenue: f64) -> Self {
        Self {
            date,
            quantity,
            revenue,
        }
    }
}

/// Historical sales of one product in one store over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSeries {
    pub product_id: ProductId,
    pub store_id: StoreId,
    pub window: DemandWindow,
    pub points: Vec<DemandPoint>,
}

impl DemandSeries {
    pub fn new(
        product_id: ProductId,
        store_id: StoreId,
        window: DemandWindow,
        points: Vec<DemandPoint>,
    ) -> Self {
        Self {
            product_id,
            store_id,
            window,
            points,
        }
    }

    /// Points falling inside the window, in their original order.
    pub fn in_window(&self) -> impl Iterator<Item = &DemandPoint> {
        self.points.iter().filter(|p| self.window.contains(p.date))
    }

    /// Consumption value (revenue) over the window. Non-positive or
    /// non-finite revenue contributes nothing.
    pub fn total_value(&self) -> f64 {
        self.in_window()
            .map(|p| p.revenue)
            .filter(|r| r.is_finite() && *r > 0.0)
            .sum()
    }

    /// Rejects an inverted window and quantities that would poison the
    /// statistics.
    pub fn validate(&self) -> EngineResult<()> {
        self.window.validate().map_err(|_| {
            EngineError::validation(format!(
                "window {} .. {} for {} @ {} ends before it starts",
                self.window.start, self.window.end, self.product_id, self.store_id
            ))
        })?;
        for p in &self.points {
            if !p.quantity.is_finite() || !p.revenue.is_finite() {
                return Err(EngineError::validation(format!(
                    "non-finite sales for {} @ {} on {}",
                    self.product_id, self.store_id, p.date
                )));
            }
            if p.quantity < 0.0 {
                return Err(EngineError::validation(format!(
                    "negative quantity {} for {} @ {} on {}",
                    p.quantity, self.product_id, self.store_id, p.date
                )));
            }
        }
        Ok(())
    }

    /// Quantity per period across the whole window, zero-filled.
    pub fn buckets(&self, granularity: Granularity) -> Vec<f64> {
        match granularity {
            Granularity::Daily => {
                let mut out = vec![0.0; self.window.days()];
                for p in self.in_window() {
                    let idx = (p.date - self.window.start).num_days() as usize;
                    out[idx] += p.quantity;
                }
                out
            }
            Granularity::Weekly => {
                let first = week_start(self.window.start);
                let last = week_start(self.window.end);
                let weeks = usize::try_from((last - first).num_days() / 7 + 1).unwrap_or(0);
                let mut out = vec![0.0; weeks];
                for p in self.in_window() {
                    let idx = ((week_start(p.date) - first).num_days() / 7) as usize;
                    out[idx] += p.quantity;
                }
                out
            }
        }
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Mean and population standard deviation of demand per period.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandStats {
    pub mean: f64,
    pub stdev: f64,
    pub samples: usize,
}

impl DemandStats {
    pub fn from_values(values: &[f64]) -> Self {
        let m = mean(values);
        Self {
            mean: m,
            stdev: stddev_population(values, m),
            samples: values.len(),
        }
    }

    /// Daily statistics, the basis for stock policies.
    pub fn daily(series: &DemandSeries) -> Self {
        Self::from_values(&series.buckets(Granularity::Daily))
    }

    /// Coefficient of variation, `None` when the mean is zero.
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        if self.mean > 0.0 {
            Some(self.stdev / self.mean)
        } else {
            None
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.mean.is_finite() && self.stdev.is_finite()) {
            return Err(EngineError::validation("demand statistics must be finite"));
        }
        if self.mean < 0.0 || self.stdev < 0.0 {
            return Err(EngineError::validation(
                "demand mean and stdev must be non-negative",
            ));
        }
        Ok(())
    }
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Population standard deviation (n), deterministic.
pub fn stddev_population(xs: &[f64], mean: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / (xs.len() as f64);
    var.sqrt()
}
