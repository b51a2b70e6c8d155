//! Period-end resampling.
//!
//! Daily closes are reduced to the last observation of each calendar month
//! or ISO week. The kept point retains its own date, so a month whose last
//! trading day is the 28th is dated the 28th.

use crate::domain::{PricePoint, PriceSeries};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    #[default]
    Monthly,
}

impl Frequency {
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Frequency::Weekly => 52.0,
            Frequency::Monthly => 12.0,
        }
    }

    /// Bucket key: (year, month) or (ISO year, ISO week).
    pub fn period_key(&self, date: NaiveDate) -> (i32, u32) {
        match self {
            Frequency::Monthly => (date.year(), date.month()),
            Frequency::Weekly => {
                let w = date.iso_week();
                (w.year(), w.week())
            }
        }
    }
}

/// Keep the last point of every period. Input need not be sorted.
pub fn to_period_end(points: &[PricePoint], freq: Frequency) -> Vec<PricePoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.date);

    let mut out: Vec<PricePoint> = Vec::new();
    for p in sorted {
        match out.last_mut() {
            Some(last) if freq.period_key(last.date) == freq.period_key(p.date) => *last = p,
            _ => out.push(p),
        }
    }
    out
}

pub fn resample_series(series: &PriceSeries, freq: Frequency) -> PriceSeries {
    PriceSeries::from_sorted(series.name(), to_period_end(series.points(), freq))
}
