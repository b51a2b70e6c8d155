//! FactorLab Core: momentum-vs-value factor rotation engine.
//!
//! This crate contains the backtest pipeline up to the portfolio NAV:
//! - Domain types (price series, weight vectors, regimes, decisions, cash flows)
//! - CSV ingest, period-end resampling and date alignment
//! - Signal engine (rolling primitives, relative momentum, ratio trends)
//! - Allocation policies folded period by period behind one trait
//! - Lag enforcement and portfolio simulation

pub mod data;
pub mod domain;
pub mod engine;
pub mod policy;
pub mod signals;
