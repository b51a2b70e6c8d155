//! Multi-series time alignment.
//!
//! Series are inner-joined on date: a date survives only if every input has
//! a close on it. Price data is never forward-filled.

use crate::domain::PriceSeries;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignError {
    #[error("nothing to align: {0}")]
    Empty(String),

    #[error("series {0:?} share no common date")]
    NoOverlap(Vec<String>),

    #[error("malformed aligned data: {0}")]
    Malformed(String),
}

/// Closes for several series on a common, strictly increasing date axis.
///
/// Columns keep the order in which the series were passed in. The pipeline
/// treats the first column as the momentum leg and the second (if any) as
/// the value leg.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    dates: Vec<NaiveDate>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl AlignedSeries {
    /// Build from pre-aligned columns, validating shape and date order.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, AlignError> {
        if columns.is_empty() {
            return Err(AlignError::Empty("no columns".into()));
        }
        if dates.is_empty() {
            return Err(AlignError::Empty("no dates".into()));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AlignError::Malformed(
                "dates must be strictly increasing".into(),
            ));
        }
        let (names, columns): (Vec<String>, Vec<Vec<f64>>) = columns.into_iter().unzip();
        if let Some((name, col)) = names
            .iter()
            .zip(&columns)
            .find(|(_, c)| c.len() != dates.len())
        {
            return Err(AlignError::Malformed(format!(
                "column '{name}' has {} rows, expected {}",
                col.len(),
                dates.len()
            )));
        }
        Ok(Self {
            dates,
            names,
            columns,
        })
    }

    /// Wrap a single series (momentum-vs-cash policies need no join).
    pub fn single(series: &PriceSeries) -> Result<Self, AlignError> {
        if series.is_empty() {
            return Err(AlignError::Empty(format!("series '{}' is empty", series.name())));
        }
        Ok(Self {
            dates: series.dates(),
            names: vec![series.name().to_string()],
            columns: vec![series.closes()],
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(|c| c.as_slice())
    }

    pub fn closes(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.column(i))
    }

    /// Simple period returns for a named series; the first entry is NaN.
    pub fn returns(&self, name: &str) -> Option<Vec<f64>> {
        self.closes(name).map(simple_returns)
    }

    /// Closes of the momentum leg (first column).
    pub fn momentum(&self) -> &[f64] {
        &self.columns[0]
    }

    /// Closes of the value leg (second column), if present.
    pub fn value(&self) -> Option<&[f64]> {
        self.column(1)
    }

    /// The first `len` rows. Used to check that results up to a date do not
    /// depend on later prices.
    pub fn truncate(&self, len: usize) -> Self {
        let len = len.min(self.len());
        Self {
            dates: self.dates[..len].to_vec(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[..len].to_vec()).collect(),
        }
    }
}

/// `r[t] = x[t] / x[t-1] - 1`, with `r[0] = NaN`.
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    if !closes.is_empty() {
        out.push(f64::NAN);
    }
    out.extend(closes.windows(2).map(|w| w[1] / w[0] - 1.0));
    out
}

/// Inner-join two or more series on date.
pub fn align_series(series: &[PriceSeries]) -> Result<AlignedSeries, AlignError> {
    if series.len() < 2 {
        return Err(AlignError::Empty(format!(
            "need at least two series, got {}",
            series.len()
        )));
    }
    if let Some(s) = series.iter().find(|s| s.is_empty()) {
        return Err(AlignError::Empty(format!("series '{}' is empty", s.name())));
    }

    let mut common: BTreeSet<NaiveDate> = series[0].dates().into_iter().collect();
    for s in &series[1..] {
        let dates: BTreeSet<NaiveDate> = s.dates().into_iter().collect();
        common = common.intersection(&dates).copied().collect();
    }
    if common.is_empty() {
        return Err(AlignError::NoOverlap(
            series.iter().map(|s| s.name().to_string()).collect(),
        ));
    }
    let dates: Vec<NaiveDate> = common.into_iter().collect();

    let columns = series
        .iter()
        .map(|s| {
            let by_date: HashMap<NaiveDate, f64> =
                s.points().iter().map(|p| (p.date, p.close)).collect();
            let closes = dates.iter().map(|d| by_date[d]).collect();
            (s.name().to_string(), closes)
        })
        .collect();

    tracing::debug!(
        series = series.len(),
        rows = dates.len(),
        "aligned price series"
    );
    AlignedSeries::from_columns(dates, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PricePoint;

    fn series(name: &str, rows: &[(&str, f64)]) -> PriceSeries {
        PriceSeries::new(
            name,
            rows.iter()
                .map(|(d, c)| {
                    PricePoint::new(NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(), *c)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn inner_join_drops_unmatched_dates() {
        let mom = series(
            "MOM",
            &[("2024-01-31", 100.0), ("2024-02-29", 110.0), ("2024-03-31", 120.0)],
        );
        let val = series("VAL", &[("2024-02-29", 50.0), ("2024-03-31", 55.0), ("2024-04-30", 60.0)]);
        let aligned = align_series(&[mom, val]).unwrap();

        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned.momentum(), &[110.0, 120.0]);
        assert_eq!(aligned.value().unwrap(), &[50.0, 55.0]);
        assert_eq!(aligned.closes("VAL").unwrap(), &[50.0, 55.0]);
        assert!(aligned.closes("NOPE").is_none());
    }

    #[test]
    fn no_overlap_is_an_error() {
        let a = series("A", &[("2024-01-31", 1.0)]);
        let b = series("B", &[("2024-02-29", 1.0)]);
        assert!(matches!(align_series(&[a, b]), Err(AlignError::NoOverlap(_))));
    }

    #[test]
    fn fewer_than_two_series_is_empty_error() {
        let a = series("A", &[("2024-01-31", 1.0)]);
        assert!(matches!(align_series(&[a]), Err(AlignError::Empty(_))));
        assert!(matches!(align_series(&[]), Err(AlignError::Empty(_))));
    }

    #[test]
    fn empty_input_series_is_error() {
        let a = series("A", &[("2024-01-31", 1.0)]);
        let b = PriceSeries::new("B", vec![]).unwrap();
        assert!(matches!(align_series(&[a, b]), Err(AlignError::Empty(_))));
    }

    #[test]
    fn returns_start_with_nan() {
        let a = series("A", &[("2024-01-31", 100.0), ("2024-02-29", 110.0)]);
        let b = series("B", &[("2024-01-31", 10.0), ("2024-02-29", 9.0)]);
        let aligned = align_series(&[a, b]).unwrap();
        let r = aligned.returns("B").unwrap();
        assert!(r[0].is_nan());
        assert!((r[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn truncate_keeps_prefix() {
        let a = series("A", &[("2024-01-31", 1.0), ("2024-02-29", 2.0), ("2024-03-31", 3.0)]);
        let aligned = AlignedSeries::single(&a).unwrap();
        let t = aligned.truncate(2);
        assert_eq!(t.len(), 2);
        assert_eq!(t.momentum(), &[1.0, 2.0]);
        assert!(t.value().is_none());
    }

    #[test]
    fn from_columns_rejects_ragged() {
        let dates = vec![NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()];
        let err = AlignedSeries::from_columns(dates, vec![("A".into(), vec![1.0, 2.0])]);
        assert!(matches!(err, Err(AlignError::Malformed(_))));
    }
}
