//! Dated cash flows for money-weighted return calculations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An investor cash flow. Contributions are negative, the terminal value
/// is positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

impl CashFlow {
    pub fn new(date: NaiveDate, amount: f64) -> Self {
        Self { date, amount }
    }

    /// A contribution of `amount` (stored as a negative flow).
    pub fn contribution(date: NaiveDate, amount: f64) -> Self {
        Self::new(date, -amount.abs())
    }

    /// A terminal redemption of `value` (stored as a positive flow).
    pub fn redemption(date: NaiveDate, value: f64) -> Self {
        Self::new(date, value.abs())
    }
}
