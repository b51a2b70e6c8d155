//! Lag enforcement.
//!
//! A decision taken with the close of period t can only earn returns from
//! period t+1 onwards. Every effective allocation is therefore a decision
//! from an earlier period; nothing here may read `decisions[t]` when
//! building `effective[t]` under a lagging rule.

use crate::domain::{Decision, WeightVector};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lag {
    /// Hold the previous period's decision.
    #[default]
    Period,
    /// Hold the decision from the last period of the previous quarter.
    Quarter,
    /// Decisions are already lagged.
    None,
}

/// Calendar quarter key for a date.
pub fn quarter_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), (date.month() - 1) / 3 + 1)
}

/// Turn per-period decisions into effective allocations.
///
/// Output has the same length and dates as `decisions`. Periods without a
/// usable earlier decision get `default` with no regime label.
pub fn enforce(decisions: &[Decision], lag: Lag, default: WeightVector) -> Vec<Decision> {
    let fallback = |date| Decision::new(date, default, None);
    let carried = |src: &Decision, date| Decision { date, ..*src };

    match lag {
        Lag::None => decisions.to_vec(),
        Lag::Period => decisions
            .iter()
            .enumerate()
            .map(|(t, d)| match t.checked_sub(1) {
                Some(prev) => carried(&decisions[prev], d.date),
                None => fallback(d.date),
            })
            .collect(),
        Lag::Quarter => {
            let mut out = Vec::with_capacity(decisions.len());
            let mut current_quarter = None;
            let mut last_of_previous: Option<usize> = None;
            for (t, d) in decisions.iter().enumerate() {
                let q = quarter_of(d.date);
                if current_quarter != Some(q) {
                    if current_quarter.is_some() {
                        last_of_previous = Some(t - 1);
                    }
                    current_quarter = Some(q);
                }
                out.push(match last_of_previous {
                    Some(i) => carried(&decisions[i], d.date),
                    None => fallback(d.date),
                });
            }
            out
        }
    }
}
