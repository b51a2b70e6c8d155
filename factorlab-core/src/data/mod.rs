//! Price data: CSV ingest, period-end resampling, multi-series alignment
//! and a seeded synthetic generator for demos and tests.

pub mod align;
pub mod ingest;
pub mod resample;
pub mod synthetic;

pub use align::{align_series, simple_returns, AlignError, AlignedSeries};
pub use ingest::{read_price_csv, read_price_csv_from, IngestError, IngestReport};
pub use resample::{resample_series, to_period_end, Frequency};
pub use synthetic::generate_monthly;

use crate::domain::SeriesError;
use thiserror::Error;

/// Any failure while turning raw files into an [`AlignedSeries`].
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Series(#[from] SeriesError),
}
