//! CSV price ingest.
//!
//! Reads files with a `Date` and a `Close` column (case-insensitive, other
//! columns ignored). Rows with a missing or non-positive close are skipped
//! and counted; an unparseable date aborts the load with its row number.

use crate::domain::{PricePoint, PriceSeries};
use chrono::NaiveDate;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d-%b-%Y", "%Y/%m/%d"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}: unrecognised date '{value}'")]
    BadDate { row: usize, value: String },

    #[error(transparent)]
    Series(#[from] crate::domain::SeriesError),
}

/// Row accounting for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_skipped: usize,
}

/// Read a price file. The series is named after the file stem.
pub fn read_price_csv(path: &Path) -> Result<(PriceSeries, IngestReport), IngestError> {
    let file = std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "series".into());
    read_price_csv_from(name, file)
}

pub fn read_price_csv_from<R: Read>(
    name: impl Into<String>,
    reader: R,
) -> Result<(PriceSeries, IngestReport), IngestError> {
    let name = name.into();
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |wanted: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(wanted))
            .ok_or(IngestError::MissingColumn(wanted))
    };
    let date_idx = find("date")?;
    let close_idx = find("close")?;

    let mut report = IngestReport::default();
    let mut points = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let row = i + 2;
        report.rows_read += 1;

        let raw_date = record.get(date_idx).unwrap_or("");
        let date = parse_date(raw_date).ok_or_else(|| IngestError::BadDate {
            row,
            value: raw_date.to_string(),
        })?;

        match record.get(close_idx).and_then(parse_close) {
            Some(close) => points.push(PricePoint::new(date, close)),
            None => {
                report.rows_skipped += 1;
                tracing::warn!(series = %name, row, %date, "skipping row without a usable close");
            }
        }
    }
    report.rows_kept = points.len();

    let series = PriceSeries::new(name, points)?;
    tracing::debug!(
        series = series.name(),
        kept = report.rows_kept,
        skipped = report.rows_skipped,
        "loaded price csv"
    );
    Ok((series, report))
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a close, tolerating thousands separators. Non-positive values
/// count as missing.
fn parse_close(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite() && *c > 0.0)
}
