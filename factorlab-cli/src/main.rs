//! FactorLab CLI: backtest, sweep and SIP commands.
//!
//! Commands:
//! - `run`: one backtest from a TOML config, CSV files or synthetic prices
//! - `sweep`: rank a policy parameter grid on the same prices
//! - `sip`: SIP or dynamic SIP analysis of a single price file
//!
//! Logging goes to stderr and follows `RUST_LOG` (default `factorlab=info`).

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use factorlab_core::data::{read_price_csv, resample_series, Frequency};
use factorlab_core::policy::{
    CooldownConfig, DualConditionConfig, HysteresisConfig, PolicyConfig, QuarterlyConfig,
    RiskScoreConfig, ThresholdConfig,
};
use factorlab_runner::export::{export_sip_csv, export_sweep_csv};
use factorlab_runner::{
    load_prices, run_backtest, save_artifacts, simulate_sip, BacktestConfig, BacktestResult,
    DynamicSip, GridKind, ParamGrid, ParamSweep, SipConfig,
};

#[derive(Parser)]
#[command(
    name = "factorlab",
    about = "FactorLab: momentum vs value factor rotation backtests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest and save its artifacts.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Momentum index CSV (Date, Close).
        #[arg(long)]
        momentum: Option<PathBuf>,

        /// Value index CSV (Date, Close).
        #[arg(long)]
        value: Option<PathBuf>,

        /// Ignore configured files and use seeded synthetic prices.
        #[arg(long, default_value_t = false, conflicts_with_all = ["momentum", "value"])]
        synthetic: bool,

        /// Replace the configured policy with this one, using its defaults.
        #[arg(long, value_enum)]
        policy: Option<PolicyName>,

        /// First date to keep (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Last date to keep (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Sweep a policy parameter grid and print the leaderboard.
    Sweep {
        /// Path to a TOML config file. Its policy section is replaced per grid point.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Policy family to sweep.
        #[arg(long, value_enum)]
        grid: GridArg,

        /// Run grid points one at a time.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Rows to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Write the full leaderboard to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// SIP analysis of one price series.
    Sip {
        /// Price CSV (Date, Close).
        #[arg(long)]
        prices: PathBuf,

        /// Base contribution per period.
        #[arg(long, default_value_t = 10_000.0)]
        amount: f64,

        /// Scale contributions up when the NAV is below its high.
        #[arg(long, default_value_t = false)]
        dynamic: bool,

        /// Contribution frequency.
        #[arg(long, value_enum, default_value_t = FrequencyArg::Monthly)]
        frequency: FrequencyArg,

        /// Write the SIP ledger to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyName {
    Threshold,
    Quarterly,
    Cooldown,
    Hysteresis,
    RiskScore,
    DualCondition,
}

impl PolicyName {
    fn default_config(self) -> PolicyConfig {
        match self {
            PolicyName::Threshold => PolicyConfig::Threshold(ThresholdConfig::default()),
            PolicyName::Quarterly => PolicyConfig::Quarterly(QuarterlyConfig::default()),
            PolicyName::Cooldown => PolicyConfig::Cooldown(CooldownConfig::default()),
            PolicyName::Hysteresis => PolicyConfig::Hysteresis(HysteresisConfig::default()),
            PolicyName::RiskScore => PolicyConfig::RiskScore(RiskScoreConfig::default()),
            PolicyName::DualCondition => {
                PolicyConfig::DualCondition(DualConditionConfig::default())
            }
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GridArg {
    Threshold,
    Hysteresis,
    Cooldown,
}

impl From<GridArg> for GridKind {
    fn from(arg: GridArg) -> Self {
        match arg {
            GridArg::Threshold => GridKind::Threshold,
            GridArg::Hysteresis => GridKind::Hysteresis,
            GridArg::Cooldown => GridKind::Cooldown,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FrequencyArg {
    Weekly,
    Monthly,
}

impl From<FrequencyArg> for Frequency {
    fn from(arg: FrequencyArg) -> Self {
        match arg {
            FrequencyArg::Weekly => Frequency::Weekly,
            FrequencyArg::Monthly => Frequency::Monthly,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            momentum,
            value,
            synthetic,
            policy,
            start,
            end,
            output_dir,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if synthetic {
                cfg.data.momentum = None;
                cfg.data.value = None;
            }
            if momentum.is_some() {
                cfg.data.momentum = momentum;
            }
            if value.is_some() {
                cfg.data.value = value;
            }
            if let Some(p) = policy {
                cfg.policy = p.default_config();
            }
            if let Some(s) = start.as_deref() {
                cfg.data.start = Some(parse_date(s)?);
            }
            if let Some(e) = end.as_deref() {
                cfg.data.end = Some(parse_date(e)?);
            }
            run_cmd(&cfg, &output_dir)
        }
        Commands::Sweep {
            config,
            grid,
            sequential,
            top,
            output,
        } => {
            let cfg = load_config(config.as_deref())?;
            sweep_cmd(&cfg, grid.into(), sequential, top, output.as_deref())
        }
        Commands::Sip {
            prices,
            amount,
            dynamic,
            frequency,
            output,
        } => sip_cmd(&prices, amount, dynamic, frequency.into(), output.as_deref()),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "factorlab=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BacktestConfig> {
    match path {
        Some(p) => BacktestConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(BacktestConfig::default()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn run_cmd(config: &BacktestConfig, output_dir: &Path) -> Result<()> {
    config.validate().context("invalid configuration")?;
    tracing::info!(
        policy = config.policy.name(),
        synthetic = !config.data.uses_files(),
        "starting backtest"
    );
    let prices = load_prices(&config.data, config.policy.is_momentum_only())
        .context("failed to load prices")?;
    let result = run_backtest(config, &prices).context("backtest failed")?;

    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir).context("failed to save artifacts")?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn sweep_cmd(
    config: &BacktestConfig,
    kind: GridKind,
    sequential: bool,
    top: usize,
    output: Option<&Path>,
) -> Result<()> {
    config.validate().context("invalid base configuration")?;
    let grid = ParamGrid::default_for(kind);
    let momentum_only = grid.policies.iter().all(|p| p.is_momentum_only());
    let prices = load_prices(&config.data, momentum_only).context("failed to load prices")?;

    let results = ParamSweep::new()
        .with_parallelism(!sequential)
        .sweep(&grid, config, &prices)
        .context("sweep failed")?;
    if results.is_empty() {
        bail!("no valid grid points");
    }

    let rows = results.rows();
    println!();
    println!(
        "{:>4}  {:<14} {:>8} {:>8} {:>8} {:>7} {:>8}  params",
        "rank", "run_id", "CAGR", "excess", "max DD", "sharpe", "switches"
    );
    for row in rows.iter().take(top) {
        println!(
            "{:>4}  {:<14} {:>7.2}% {:>7.2}% {:>7.2}% {:>7.3} {:>8}  {}",
            row.rank,
            row.run_id.get(..12).unwrap_or(&row.run_id),
            row.cagr * 100.0,
            row.excess_cagr * 100.0,
            row.max_drawdown * 100.0,
            row.sharpe,
            row.switches,
            serde_json::to_string(&row.policy)?,
        );
    }
    println!();

    if let Some(path) = output {
        let csv = export_sweep_csv(&rows)?;
        std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Leaderboard saved to: {}", path.display());
    }
    Ok(())
}

fn sip_cmd(
    prices: &Path,
    amount: f64,
    dynamic: bool,
    frequency: Frequency,
    output: Option<&Path>,
) -> Result<()> {
    let (raw, _) = read_price_csv(prices)
        .with_context(|| format!("failed to read {}", prices.display()))?;
    let series = resample_series(&raw, frequency);
    let config = SipConfig {
        amount,
        dynamic: dynamic.then(DynamicSip::default),
    };
    let result = simulate_sip(
        &series.dates(),
        &series.closes(),
        &config,
        frequency.periods_per_year(),
    )
    .context("SIP simulation failed")?;
    let s = &result.summary;

    println!();
    println!("=== SIP: {} ===", series.name());
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        println!("Period:           {} to {} ({} contributions)", first.date, last.date, s.periods);
    }
    println!("Total Invested:   {:.0}", s.total_invested);
    println!("Final Value:      {:.0}", s.final_value);
    println!("Absolute Gain:    {:.0} ({:.2}%)", s.absolute_gain, s.total_return_pct);
    if s.xirr.converged() {
        println!("XIRR:             {:.2}%", s.xirr_pct);
    } else {
        println!("XIRR:             did not converge");
    }
    println!("Max Drawdown:     {:.2}%", s.max_value_drawdown_pct);
    println!("Investor DD:      {:.2}%", s.max_investor_drawdown_pct);
    println!("Worst vs Invested:{:.2}%", s.worst_gain_vs_invested_pct);
    println!("MAR:              {:.3}", s.mar_ratio);
    println!("Ulcer Index:      {:.2}", s.ulcer_index);
    if let Some(cagr) = s.nav_cagr_pct {
        println!("NAV CAGR:         {cagr:.2}%");
    }
    if dynamic {
        println!();
        println!("--- Dynamic SIP ---");
        println!("Average Contrib:  {:.0}", s.average_contribution);
        println!("Max Contrib:      {:.0}", s.max_contribution);
        println!("Average Cost:     {:.2}", s.average_cost);
        for (multiplier, periods) in &s.multiplier_usage {
            println!("  {multiplier}x: {periods} periods");
        }
    }
    println!();

    if let Some(path) = output {
        let csv = export_sip_csv(&result)?;
        std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))?;
        println!("SIP ledger saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    let b = &result.benchmark_metrics;
    let pct = |v: Option<f64>| v.map_or("n/a".to_string(), |x| format!("{:.2}%", x * 100.0));

    println!();
    println!("=== Backtest Result ===");
    println!("Policy:         {}", result.policy);
    println!("Series:         {}", result.series.join(", "));
    if let (Some(start), Some(end)) = (result.start_date, result.end_date) {
        println!("Period:         {start} to {end}");
    }
    println!("Periods:        {}", result.portfolio.len());
    println!("Benchmark:      {}", result.portfolio.benchmark);
    println!();
    println!("--- Performance ---");
    println!("CAGR:           {} (benchmark {})", pct(m.cagr), pct(b.cagr));
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!(
        "Max Drawdown:   {:.2}% (benchmark {:.2}%)",
        m.max_drawdown * 100.0,
        b.max_drawdown * 100.0
    );
    println!("Volatility:     {:.2}%", m.volatility * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Calmar:         {:.3}", m.calmar);
    println!("Ulcer Index:    {:.2}", m.ulcer_index);
    println!("Switches:       {}", result.switches);
    for share in &result.regime_distribution {
        println!("  {:<14}{:>5.1}%", share.label, share.share * 100.0);
    }
    println!();
    println!("--- SIP ---");
    let sip = &result.sip.strategy.summary;
    println!("Invested:       {:.0}", sip.total_invested);
    println!("Final Value:    {:.0}", sip.final_value);
    println!(
        "XIRR:           {:.2}% (benchmark {:.2}%)",
        sip.xirr_pct, result.sip.benchmark.summary.xirr_pct
    );
    println!("MAR:            {:.3}", sip.mar_ratio);
    if result.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    for warn in &result.data_warnings {
        println!("WARNING: {warn}");
    }
    println!();
}
