//! Reporting and export: JSON, CSV and Markdown artifacts.
//!
//! - **JSON**: full round-trip `BacktestResult` with schema versioning, plus a
//!   flat dashboard payload of KPIs and `{date, value}` series
//! - **CSV**: per-period portfolio table, SIP ledger and sweep leaderboard
//! - **Markdown**: human-readable single-run report
//!
//! Everything here is a projection of an already computed result.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::metrics::drawdown_series;
use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::sip::{SipResult, SipSummary};
use crate::sweep::SweepRow;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("unsupported schema version {found} (max supported: {SCHEMA_VERSION})")]
    UnsupportedSchema { found: u32 },
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(data)?)
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// Deserialize a `BacktestResult`, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult, ExportError> {
    let result: BacktestResult = serde_json::from_str(json)?;
    if result.schema_version > SCHEMA_VERSION {
        return Err(ExportError::UnsupportedSchema {
            found: result.schema_version,
        });
    }
    Ok(result)
}

// ─── Dashboard payload ──────────────────────────────────────────────

/// One chart point. Undefined values serialize as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

fn points<I>(dates: &[NaiveDate], values: I) -> Vec<Point>
where
    I: IntoIterator<Item = Option<f64>>,
{
    dates
        .iter()
        .zip(values)
        .map(|(&date, value)| Point {
            date,
            value: value.filter(|v| v.is_finite()),
        })
        .collect()
}

fn defined(values: &[f64]) -> impl Iterator<Item = Option<f64>> + '_ {
    values.iter().map(|&v| Some(v))
}

/// KPI summary plus chart series, in the shape a static dashboard reads.
pub fn dashboard_json(result: &BacktestResult) -> Value {
    let p = &result.portfolio;
    let dates = p.dates();
    let navs = p.navs();
    let bench = p.benchmark_navs();
    let mom: Vec<f64> = p.periods.iter().map(|x| x.momentum_nav).collect();
    let pct = |v: &[f64]| -> Vec<f64> { drawdown_series(v).iter().map(|d| d * 100.0).collect() };
    let sip = &result.sip.strategy.summary;
    let a = &result.analytics;

    json!({
        "schema_version": result.schema_version,
        "run_id": result.run_id,
        "policy": result.policy,
        "synthetic": result.has_synthetic,
        "period": { "start": result.start_date, "end": result.end_date },
        "kpis": {
            "strategy_cagr_pct": result.metrics.cagr.map(|c| c * 100.0),
            "benchmark_cagr_pct": result.benchmark_metrics.cagr.map(|c| c * 100.0),
            "momentum_cagr_pct": result.momentum_metrics.cagr.map(|c| c * 100.0),
            "excess_cagr_pct": result.excess_cagr() * 100.0,
            "max_drawdown_pct": result.metrics.max_drawdown * 100.0,
            "benchmark_max_drawdown_pct": result.benchmark_metrics.max_drawdown * 100.0,
            "volatility_pct": result.metrics.volatility * 100.0,
            "sharpe": result.metrics.sharpe,
            "calmar": result.metrics.calmar,
            "ulcer_index": result.metrics.ulcer_index,
            "final_nav": result.metrics.final_nav,
            "switches": result.switches,
            "average_regime_length": a.average_run_length,
            "total_turnover": a.total_turnover,
            "sip_xirr_pct": sip.xirr_pct,
            "sip_xirr_converged": sip.xirr.converged(),
            "sip_total_invested": sip.total_invested,
            "sip_final_value": sip.final_value,
            "sip_mar": sip.mar_ratio,
            "sip_max_drawdown_pct": sip.max_value_drawdown_pct,
            "sip_max_investor_drawdown_pct": sip.max_investor_drawdown_pct,
            "benchmark_sip_xirr_pct": result.sip.benchmark.summary.xirr_pct,
            "momentum_sip_xirr_pct": result.sip.momentum.summary.xirr_pct,
        },
        "charts": {
            "nav": {
                "strategy": points(&dates, defined(&navs)),
                "benchmark": points(&dates, defined(&bench)),
                "momentum": points(&dates, defined(&mom)),
                "value": points(&dates, p.periods.iter().map(|x| x.value_nav)),
            },
            "allocation": {
                "momentum": points(&dates, p.periods.iter().map(|x| Some(x.weights.momentum))),
                "value": points(&dates, p.periods.iter().map(|x| Some(x.weights.value))),
                "cash": points(&dates, p.periods.iter().map(|x| Some(x.weights.cash))),
                "score": points(&dates, p.periods.iter().map(|x| x.score)),
            },
            "drawdown_pct": {
                "strategy": points(&dates, defined(&pct(&navs))),
                "benchmark": points(&dates, defined(&pct(&bench))),
            },
            "rolling_cagr_pct": a.rolling_cagr.iter().map(|r| json!({
                "years": r.years,
                "strategy": points(&dates, r.strategy.iter().map(|v| v.map(|c| c * 100.0))),
                "benchmark": points(&dates, r.benchmark.iter().map(|v| v.map(|c| c * 100.0))),
            })).collect::<Vec<_>>(),
            "rolling_volatility_pct": points(
                &dates,
                a.rolling_volatility.iter().map(|v| v.map(|x| x * 100.0)),
            ),
            "calendar_returns": a.calendar_years,
            "allocation_distribution": a.allocation_histogram,
            "regime_distribution": result.regime_distribution,
            "regime_runs": a.regime_runs,
            "transitions": a.transitions,
            "sip": {
                "invested": points(&dates, result.sip.strategy.rows.iter().map(|r| Some(r.invested))),
                "strategy_value": points(&dates, result.sip.strategy.rows.iter().map(|r| Some(r.value))),
                "benchmark_value": points(&dates, result.sip.benchmark.rows.iter().map(|r| Some(r.value))),
            },
        },
    })
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Per-period portfolio table. Undefined values are empty cells.
pub fn export_periods_csv(result: &BacktestResult) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "momentum_weight",
        "value_weight",
        "cash_weight",
        "regime",
        "score",
        "momentum_return",
        "value_return",
        "cash_return",
        "portfolio_return",
        "nav",
        "benchmark_return",
        "benchmark_nav",
        "momentum_nav",
        "value_nav",
        "turnover",
    ])?;
    for p in &result.portfolio.periods {
        wtr.write_record([
            p.date.to_string(),
            format!("{:.4}", p.weights.momentum),
            format!("{:.4}", p.weights.value),
            format!("{:.4}", p.weights.cash),
            p.label().unwrap_or_default().to_string(),
            p.score.map(|s| format!("{s:.2}")).unwrap_or_default(),
            opt(p.momentum_return),
            opt(p.value_return),
            format!("{:.6}", p.cash_return),
            opt(p.portfolio_return),
            format!("{:.4}", p.nav),
            opt(p.benchmark_return),
            format!("{:.4}", p.benchmark_nav),
            format!("{:.4}", p.momentum_nav),
            p.value_nav.map(|v| format!("{v:.4}")).unwrap_or_default(),
            format!("{:.4}", p.turnover),
        ])?;
    }
    finish(wtr)
}

pub fn export_sip_csv(sip: &SipResult) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "nav",
        "nav_below_high_pct",
        "multiplier",
        "contribution",
        "units",
        "invested",
        "value",
        "value_drawdown_pct",
        "investor_drawdown_pct",
        "gain_vs_invested_pct",
    ])?;
    for r in &sip.rows {
        wtr.write_record([
            r.date.to_string(),
            format!("{:.4}", r.nav),
            format!("{:.2}", r.nav_below_high_pct),
            format!("{}", r.multiplier),
            format!("{:.2}", r.contribution),
            format!("{:.6}", r.units),
            format!("{:.2}", r.invested),
            format!("{:.2}", r.value),
            format!("{:.2}", r.value_drawdown_pct),
            format!("{:.2}", r.investor_drawdown_pct),
            format!("{:.2}", r.gain_vs_invested_pct),
        ])?;
    }
    finish(wtr)
}

pub fn export_sweep_csv(rows: &[SweepRow]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "run_id",
        "policy",
        "params",
        "cagr_pct",
        "excess_cagr_pct",
        "max_drawdown_pct",
        "sharpe",
        "switches",
        "sip_xirr_pct",
    ])?;
    for row in rows {
        wtr.write_record([
            row.rank.to_string(),
            row.run_id.clone(),
            row.policy.name().to_string(),
            serde_json::to_string(&row.policy)?,
            format!("{:.2}", row.cagr * 100.0),
            format!("{:.2}", row.excess_cagr * 100.0),
            format!("{:.2}", row.max_drawdown * 100.0),
            format!("{:.3}", row.sharpe),
            row.switches.to_string(),
            format!("{:.2}", row.sip_xirr_pct),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for one run under `{policy}_{run_id prefix}/`:
/// - `manifest.json`: the full `BacktestResult`
/// - `dashboard.json`: KPIs and chart series
/// - `periods.csv`: per-period portfolio table
/// - `sip.csv`: SIP ledger on the strategy NAV
/// - `report.md`
///
/// Returns the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf, ExportError> {
    let prefix = result.run_id.get(..12).unwrap_or(&result.run_id);
    let run_dir = output_dir.join(format!("{}_{}", result.policy, prefix));
    std::fs::create_dir_all(&run_dir).map_err(|source| ExportError::Io {
        path: run_dir.clone(),
        source,
    })?;

    write_file(&run_dir.join("manifest.json"), &export_json(result)?)?;
    write_file(
        &run_dir.join("dashboard.json"),
        &serde_json::to_string_pretty(&dashboard_json(result))?,
    )?;
    write_file(&run_dir.join("periods.csv"), &export_periods_csv(result)?)?;
    write_file(&run_dir.join("sip.csv"), &export_sip_csv(&result.sip.strategy)?)?;
    write_file(&run_dir.join("report.md"), &generate_report(result))?;

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<BacktestResult, ExportError> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

fn pct_or_dash(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}%", x * 100.0))
        .unwrap_or_else(|| "-".into())
}

fn sip_row(md: &mut String, name: &str, sips: &[&SipSummary; 3], f: impl Fn(&SipSummary) -> String) {
    let _ = writeln!(md, "| {name} | {} | {} | {} |", f(sips[0]), f(sips[1]), f(sips[2]));
}

/// Markdown report for a single backtest run.
pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(4096);
    let m = &result.metrics;
    let b = &result.benchmark_metrics;
    let mo = &result.momentum_metrics;

    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n| --- | --- |\n");
    let _ = writeln!(md, "| Policy | {} |", result.policy);
    let _ = writeln!(md, "| Series | {} |", result.series.join(", "));
    if let (Some(start), Some(end)) = (result.start_date, result.end_date) {
        let _ = writeln!(md, "| Period | {start} to {end} |");
    }
    let _ = writeln!(md, "| Periods | {} |", result.portfolio.len());
    let _ = writeln!(md, "| Benchmark | {} |", result.portfolio.benchmark);
    let _ = writeln!(md, "| Run ID | {} |", result.run_id);
    let _ = writeln!(md, "| Dataset Hash | {} |", result.dataset_hash);
    if result.has_synthetic {
        md.push_str("| Data | **SYNTHETIC** |\n");
    }
    md.push('\n');

    md.push_str("## Performance\n\n");
    md.push_str("| Metric | Strategy | Benchmark | Momentum |\n| --- | --- | --- | --- |\n");
    let _ = writeln!(
        md,
        "| CAGR | {} | {} | {} |",
        pct_or_dash(m.cagr),
        pct_or_dash(b.cagr),
        pct_or_dash(mo.cagr)
    );
    let _ = writeln!(
        md,
        "| Total Return | {:.2}% | {:.2}% | {:.2}% |",
        m.total_return * 100.0,
        b.total_return * 100.0,
        mo.total_return * 100.0
    );
    let _ = writeln!(
        md,
        "| Max Drawdown | {:.2}% | {:.2}% | {:.2}% |",
        m.max_drawdown * 100.0,
        b.max_drawdown * 100.0,
        mo.max_drawdown * 100.0
    );
    let _ = writeln!(
        md,
        "| Volatility | {:.2}% | {:.2}% | {:.2}% |",
        m.volatility * 100.0,
        b.volatility * 100.0,
        mo.volatility * 100.0
    );
    let _ = writeln!(md, "| Sharpe | {:.3} | {:.3} | {:.3} |", m.sharpe, b.sharpe, mo.sharpe);
    let _ = writeln!(md, "| Calmar | {:.3} | {:.3} | {:.3} |", m.calmar, b.calmar, mo.calmar);
    let _ = writeln!(
        md,
        "| Ulcer Index | {:.2} | {:.2} | {:.2} |",
        m.ulcer_index, b.ulcer_index, mo.ulcer_index
    );
    md.push('\n');

    md.push_str("## SIP\n\n");
    md.push_str("| Metric | Strategy | Benchmark | Momentum |\n| --- | --- | --- | --- |\n");
    let sips = [
        &result.sip.strategy.summary,
        &result.sip.benchmark.summary,
        &result.sip.momentum.summary,
    ];
    sip_row(&mut md, "Invested", &sips, |s| format!("{:.0}", s.total_invested));
    sip_row(&mut md, "Final Value", &sips, |s| format!("{:.0}", s.final_value));
    sip_row(&mut md, "XIRR", &sips, |s| {
        if s.xirr.converged() {
            format!("{:.2}%", s.xirr_pct)
        } else {
            "n/a".into()
        }
    });
    sip_row(&mut md, "Max Drawdown", &sips, |s| {
        format!("{:.2}%", s.max_value_drawdown_pct)
    });
    sip_row(&mut md, "Investor Drawdown", &sips, |s| {
        format!("{:.2}%", s.max_investor_drawdown_pct)
    });
    sip_row(&mut md, "MAR", &sips, |s| format!("{:.3}", s.mar_ratio));
    md.push('\n');

    md.push_str("## Regimes\n\n");
    let _ = writeln!(md, "Switches: {}\n", result.switches);
    let _ = writeln!(
        md,
        "Average regime length: {:.1} periods\n",
        result.analytics.average_run_length
    );
    md.push_str("| Regime | Periods | Share |\n| --- | --- | --- |\n");
    for share in &result.regime_distribution {
        let _ = writeln!(
            md,
            "| {} | {} | {:.1}% |",
            share.label,
            share.periods,
            share.share * 100.0
        );
    }
    md.push('\n');

    if !result.analytics.calendar_years.is_empty() {
        md.push_str("## Calendar Years\n\n");
        md.push_str("| Year | Strategy | Benchmark | Excess |\n| --- | --- | --- | --- |\n");
        for y in &result.analytics.calendar_years {
            let _ = writeln!(
                md,
                "| {} | {:.2}% | {:.2}% | {:+.2}% |",
                y.year,
                y.strategy_pct,
                y.benchmark_pct,
                y.outperformance_pct()
            );
        }
        md.push('\n');
    }

    if !result.data_warnings.is_empty() {
        md.push_str("## Data Quality\n\n");
        for w in &result.data_warnings {
            let _ = writeln!(md, "- {w}");
        }
        md.push('\n');
    }

    md
}
