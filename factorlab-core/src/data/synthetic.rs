//! Seeded synthetic month-end series for demos and tests.

use crate::domain::{PricePoint, PriceSeries};
use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// A month-end random walk starting at 100 on the month end of `start`.
///
/// Monthly returns are `drift + vol * u` with `u` uniform in [-1, 1].
/// Closes are floored at a small positive value so the series stays valid.
pub fn generate_monthly(
    name: &str,
    start: NaiveDate,
    months: usize,
    drift: f64,
    vol: f64,
    seed: u64,
) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut date = month_end(start);
    let mut close = 100.0_f64;
    let mut points = Vec::with_capacity(months);

    for _ in 0..months {
        points.push(PricePoint::new(date, close));
        let shock: f64 = rng.gen_range(-1.0..=1.0);
        close = (close * (1.0 + drift + vol * shock)).max(0.01);
        date = month_end(date.succ_opt().unwrap_or(date));
    }

    PriceSeries::from_sorted(name, points)
}
