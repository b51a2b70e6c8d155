//! Domain types for FactorLab

pub mod cash_flow;
pub mod decision;
pub mod price;
pub mod weights;

pub use cash_flow::CashFlow;
pub use decision::Decision;
pub use price::{PricePoint, PriceSeries, SeriesError};
pub use weights::{Regime, WeightError, WeightVector, WEIGHT_TOLERANCE};
