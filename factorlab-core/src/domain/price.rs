//! Index closes and date-sorted series of them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single closing level of an index on a given date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// A close is usable when it is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series '{name}' has a duplicate date {date}")]
    DuplicateDate { name: String, date: NaiveDate },

    #[error("series '{name}' has an invalid close {close} on {date}")]
    InvalidClose {
        name: String,
        date: NaiveDate,
        close: f64,
    },
}

/// A named, date-sorted sequence of closes.
///
/// Construction sorts the points and rejects duplicate dates and
/// non-positive or non-finite closes, so every `PriceSeries` has strictly
/// increasing dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    name: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(name: impl Into<String>, mut points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        let name = name.into();
        points.sort_by_key(|p| p.date);

        for p in &points {
            if !p.is_valid() {
                return Err(SeriesError::InvalidClose {
                    name,
                    date: p.date,
                    close: p.close,
                });
            }
        }
        if let Some(w) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(SeriesError::DuplicateDate {
                name,
                date: w[0].date,
            });
        }

        Ok(Self { name, points })
    }

    /// Build from points already known to be sorted, unique and valid.
    pub(crate) fn from_sorted(name: impl Into<String>, points: Vec<PricePoint>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].date < w[1].date));
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn new_sorts_points() {
        let s = PriceSeries::new(
            "MOM",
            vec![
                PricePoint::new(d(2024, 3, 31), 110.0),
                PricePoint::new(d(2024, 1, 31), 100.0),
                PricePoint::new(d(2024, 2, 29), 105.0),
            ],
        )
        .unwrap();
        assert_eq!(s.closes(), vec![100.0, 105.0, 110.0]);
        assert_eq!(s.first().unwrap().date, d(2024, 1, 31));
        assert_eq!(s.last().unwrap().date, d(2024, 3, 31));
    }

    #[test]
    fn duplicate_date_rejected() {
        let err = PriceSeries::new(
            "MOM",
            vec![
                PricePoint::new(d(2024, 1, 31), 100.0),
                PricePoint::new(d(2024, 1, 31), 101.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SeriesError::DuplicateDate { .. }));
    }

    #[test]
    fn non_positive_close_rejected() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = PriceSeries::new("VAL", vec![PricePoint::new(d(2024, 1, 31), bad)]);
            assert!(matches!(err, Err(SeriesError::InvalidClose { .. })));
        }
    }

    #[test]
    fn empty_series_is_allowed() {
        let s = PriceSeries::new("EMPTY", vec![]).unwrap();
        assert!(s.is_empty());
        assert_eq!(s.len(), 0);
    }
}
