//! Continuous risk score driving a momentum/cash overlay.
//!
//! Each period sums independently-firing sub-scores (extension, heat,
//! distance from MA, z-score, volatility spike, deceleration, bubble,
//! drawdown danger) into a raw score in [0, 100]. An asymmetric
//! persistence filter turns it into the effective score:
//!
//! - a higher raw score is adopted immediately;
//! - a lower one is ignored while the short return is still negative,
//!   and otherwise closed at a capped rate per period (slower while
//!   recovering from a deep drawdown).
//!
//! Cash is `(score / 100)^exponent * max_cash`, the momentum weight is
//! rounded to `rounding` and clipped to `[min_momentum, max_momentum]`.

use super::{invalid, require_positive, AllocationPolicy, PolicyError, PolicyInput};
use crate::data::AlignedSeries;
use crate::domain::{Decision, WeightVector};
use crate::signals::rolling::{
    drawdown_from_peak, pct_change, rolling_mean, rolling_median, rolling_percentile_rank,
    rolling_std, shift, zscore, Window,
};
use crate::signals::SignalFrame;
use serde::{Deserialize, Serialize};

pub const RETURN_1: &str = "return_1";
pub const RETURN_SHORT: &str = "return_short";
pub const RETURN_SHORT_PREV: &str = "return_short_prev";
pub const RETURN_MEDIUM: &str = "return_medium";
pub const RETURN_LONG: &str = "return_long";
pub const MOVING_AVERAGE: &str = "moving_average";
pub const DISTANCE_FROM_MA: &str = "distance_from_ma";
pub const MEDIUM_ZSCORE: &str = "medium_zscore";
pub const MEDIUM_PERCENTILE: &str = "medium_percentile";
pub const DRAWDOWN: &str = "drawdown";
pub const VOLATILITY: &str = "volatility";
pub const VOLATILITY_MEDIAN: &str = "volatility_median";
pub const RAW_SCORE: &str = "risk_score_raw";

const MAX_SCORE: f64 = 100.0;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWindows {
    pub short_lookback: usize,
    pub medium_lookback: usize,
    pub long_lookback: usize,
    pub moving_average: Window,
    /// Window for the z-score, percentile and volatility median.
    pub stats: Window,
    pub volatility: Window,
    pub periods_per_year: f64,
}

impl Default for RiskWindows {
    fn default() -> Self {
        Self {
            short_lookback: 3,
            medium_lookback: 6,
            long_lookback: 24,
            moving_average: Window::new(10, 5),
            stats: Window::new(36, 12),
            volatility: Window::new(3, 2),
            periods_per_year: 12.0,
        }
    }
}

/// Points awarded once a value exceeds `above`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepTier {
    pub above: f64,
    pub points: f64,
}

/// Drawdown-danger tier. Fires when the drawdown is below `depth` and
/// every configured condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownTier {
    pub depth: f64,
    pub points: f64,
    #[serde(default)]
    pub short_return_below: Option<f64>,
    #[serde(default)]
    pub deepening: bool,
    #[serde(default)]
    pub below_moving_average: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreRules {
    pub extension_floor: f64,
    pub extension_points: f64,
    /// Checked highest first.
    pub heat: Vec<StepTier>,
    pub distance_floor: f64,
    pub distance_span: f64,
    pub distance_points: f64,
    pub zscore_floor: f64,
    pub zscore_points_per_unit: f64,
    pub zscore_points: f64,
    pub volatility_spike_multiple: f64,
    pub volatility_spike_points: f64,
    pub deceleration_min_return: f64,
    pub deceleration_points: f64,
    /// Checked highest first.
    pub bubble: Vec<StepTier>,
    /// First matching tier wins.
    pub drawdown: Vec<DrawdownTier>,
    /// A drawdown deeper than the previous one by this much is deepening.
    pub deepening_step: f64,
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self {
            extension_floor: 0.85,
            extension_points: 25.0,
            heat: vec![
                StepTier { above: 0.35, points: 20.0 },
                StepTier { above: 0.25, points: 10.0 },
            ],
            distance_floor: 0.25,
            distance_span: 0.25,
            distance_points: 20.0,
            zscore_floor: 1.5,
            zscore_points_per_unit: 15.0,
            zscore_points: 15.0,
            volatility_spike_multiple: 1.5,
            volatility_spike_points: 10.0,
            deceleration_min_return: 0.30,
            deceleration_points: 5.0,
            bubble: vec![
                StepTier { above: 1.5, points: 25.0 },
                StepTier { above: 1.0, points: 15.0 },
            ],
            drawdown: vec![
                DrawdownTier {
                    depth: -0.25,
                    points: 80.0,
                    short_return_below: Some(-0.10),
                    deepening: false,
                    below_moving_average: false,
                },
                DrawdownTier {
                    depth: -0.20,
                    points: 65.0,
                    short_return_below: Some(-0.10),
                    deepening: false,
                    below_moving_average: false,
                },
                DrawdownTier {
                    depth: -0.15,
                    points: 50.0,
                    short_return_below: None,
                    deepening: true,
                    below_moving_average: false,
                },
                DrawdownTier {
                    depth: -0.10,
                    points: 35.0,
                    short_return_below: None,
                    deepening: true,
                    below_moving_average: true,
                },
            ],
            deepening_step: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persistence {
    /// No decay while the short return is below this.
    pub freeze_below_short_return: f64,
    pub deep_drawdown: f64,
    /// Max points shed per period while drawdown is deeper than `deep_drawdown`.
    pub deep_drawdown_decay: f64,
    pub decay: f64,
}

impl Default for Persistence {
    fn default() -> Self {
        Self {
            freeze_below_short_return: 0.0,
            deep_drawdown: -0.15,
            deep_drawdown_decay: 20.0,
            decay: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashMapping {
    pub max_cash: f64,
    pub exponent: f64,
    pub rounding: f64,
    pub min_momentum: f64,
    pub max_momentum: f64,
}

impl Default for CashMapping {
    fn default() -> Self {
        Self {
            max_cash: 0.70,
            exponent: 2.0,
            rounding: 0.05,
            min_momentum: 0.5,
            max_momentum: 1.0,
        }
    }
}

impl CashMapping {
    /// Momentum weight for an effective score.
    pub fn momentum_weight(&self, score: f64) -> f64 {
        let cash = (score / MAX_SCORE).clamp(0.0, 1.0).powf(self.exponent) * self.max_cash;
        let rounded = ((1.0 - cash) / self.rounding).round() * self.rounding;
        let clipped = rounded.clamp(self.min_momentum, self.max_momentum);
        (clipped * 10_000.0).round() / 10_000.0
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if !(0.0..=1.0).contains(&self.max_cash) {
            return Err(invalid("max_cash", "must be within [0, 1]"));
        }
        if self.exponent <= 0.0 {
            return Err(invalid("exponent", "must be positive"));
        }
        if self.rounding <= 0.0 {
            return Err(invalid("rounding", "must be positive"));
        }
        if !(0.0 <= self.min_momentum
            && self.min_momentum <= self.max_momentum
            && self.max_momentum <= 1.0)
        {
            return Err(invalid(
                "min_momentum",
                "need 0 <= min_momentum <= max_momentum <= 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskScoreConfig {
    pub windows: RiskWindows,
    pub scoring: ScoreRules,
    pub persistence: Persistence,
    pub allocation: CashMapping,
}

// ─── Score breakdown ─────────────────────────────────────────────────

/// Per-period sub-scores behind a raw risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub extension: f64,
    pub heat: f64,
    pub distance: f64,
    pub zscore: f64,
    pub volatility_spike: f64,
    pub deceleration: f64,
    pub bubble: f64,
    pub drawdown: f64,
}

impl RiskBreakdown {
    /// Sum of sub-scores clipped to [0, 100].
    pub fn total(&self) -> f64 {
        (self.extension
            + self.heat
            + self.distance
            + self.zscore
            + self.volatility_spike
            + self.deceleration
            + self.bubble
            + self.drawdown)
            .clamp(0.0, MAX_SCORE)
    }
}

fn step_points(tiers: &[StepTier], value: Option<f64>) -> f64 {
    value
        .and_then(|v| tiers.iter().find(|t| v > t.above))
        .map_or(0.0, |t| t.points)
}

// ─── Policy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RiskScoreCash {
    config: RiskScoreConfig,
}

impl RiskScoreCash {
    pub fn new(config: RiskScoreConfig) -> Result<Self, PolicyError> {
        let w = &config.windows;
        require_positive("short_lookback", w.short_lookback)?;
        require_positive("medium_lookback", w.medium_lookback)?;
        require_positive("long_lookback", w.long_lookback)?;
        for window in [w.moving_average, w.stats, w.volatility] {
            require_positive("window", window.len)?;
        }
        config.allocation.validate()?;
        let mut config = config;
        // Highest tier first so the first match is the largest award.
        config
            .scoring
            .heat
            .sort_by(|a, b| b.above.total_cmp(&a.above));
        config
            .scoring
            .bubble
            .sort_by(|a, b| b.above.total_cmp(&a.above));
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskScoreConfig {
        &self.config
    }

    /// Sub-scores at `index`, reading only columns at `index` and `index - 1`.
    pub fn breakdown(&self, frame: &SignalFrame, index: usize) -> RiskBreakdown {
        let rules = &self.config.scoring;
        let at = |name: &str| frame.defined(name, index);

        let Some(medium) = at(RETURN_MEDIUM) else {
            return RiskBreakdown::default();
        };
        let short = at(RETURN_SHORT);
        let distance = at(DISTANCE_FROM_MA);
        let drawdown = at(DRAWDOWN);

        let extension = at(MEDIUM_PERCENTILE)
            .filter(|p| *p > rules.extension_floor)
            .map_or(0.0, |p| {
                (p - rules.extension_floor) / (1.0 - rules.extension_floor)
                    * rules.extension_points
            });

        let distance_points = distance
            .filter(|d| *d > rules.distance_floor)
            .map_or(0.0, |d| {
                ((d - rules.distance_floor) / rules.distance_span * rules.distance_points)
                    .min(rules.distance_points)
            });

        let zscore_points = at(MEDIUM_ZSCORE)
            .filter(|z| *z > rules.zscore_floor)
            .map_or(0.0, |z| {
                ((z - rules.zscore_floor) * rules.zscore_points_per_unit).min(rules.zscore_points)
            });

        let spike = match (at(VOLATILITY), at(VOLATILITY_MEDIAN)) {
            (Some(vol), Some(median)) if vol > rules.volatility_spike_multiple * median => {
                rules.volatility_spike_points
            }
            _ => 0.0,
        };

        let decelerating = match (short, at(RETURN_SHORT_PREV)) {
            (Some(now), Some(before)) => now < before,
            _ => false,
        };
        let deceleration = if decelerating && medium > rules.deceleration_min_return {
            rules.deceleration_points
        } else {
            0.0
        };

        let drawdown_points = drawdown.map_or(0.0, |dd| {
            let previous = if index == 0 {
                0.0
            } else {
                frame.defined(DRAWDOWN, index - 1).unwrap_or(0.0)
            };
            let deepening = dd < previous - rules.deepening_step;
            rules
                .drawdown
                .iter()
                .find(|tier| {
                    dd < tier.depth
                        && tier
                            .short_return_below
                            .map_or(true, |limit| short.is_some_and(|s| s < limit))
                        && (!tier.deepening || deepening)
                        && (!tier.below_moving_average || distance.is_some_and(|d| d < 0.0))
                })
                .map_or(0.0, |tier| tier.points)
        });

        RiskBreakdown {
            extension,
            heat: step_points(&rules.heat, short),
            distance: distance_points,
            zscore: zscore_points,
            volatility_spike: spike,
            deceleration,
            bubble: step_points(&rules.bubble, at(RETURN_LONG)),
            drawdown: drawdown_points,
        }
    }

    /// Apply the asymmetric persistence filter to one raw score.
    pub fn persist(&self, previous: f64, raw: f64, short: Option<f64>, drawdown: Option<f64>) -> f64 {
        if raw >= previous {
            return raw;
        }
        let p = &self.config.persistence;
        let max_decay = if short.is_some_and(|s| s < p.freeze_below_short_return) {
            0.0
        } else if drawdown.is_some_and(|dd| dd < p.deep_drawdown) {
            p.deep_drawdown_decay
        } else {
            p.decay
        };
        raw.max(previous - max_decay).clamp(0.0, MAX_SCORE)
    }

    fn weights_for(&self, score: f64) -> WeightVector {
        let momentum = self.config.allocation.momentum_weight(score);
        WeightVector {
            momentum,
            value: 0.0,
            cash: 1.0 - momentum,
        }
    }
}

impl AllocationPolicy for RiskScoreCash {
    /// Previous effective score.
    type State = f64;

    fn name(&self) -> &'static str {
        "risk_score"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        let w = &self.config.windows;
        let close = prices.momentum();

        let ret_1 = pct_change(close, 1);
        let ret_short = pct_change(close, w.short_lookback);
        let ret_medium = pct_change(close, w.medium_lookback);
        let ma = rolling_mean(close, w.moving_average);
        let distance = close
            .iter()
            .zip(&ma)
            .map(|(c, m)| (c - m) / m)
            .collect();
        let annualizer = w.periods_per_year.sqrt();
        let volatility: Vec<f64> = rolling_std(&ret_1, w.volatility)
            .into_iter()
            .map(|v| v * annualizer)
            .collect();

        let mut frame = SignalFrame::new();
        frame.insert(RETURN_SHORT_PREV, shift(&ret_short, w.short_lookback));
        frame.insert(MEDIUM_ZSCORE, zscore(&ret_medium, w.stats));
        frame.insert(MEDIUM_PERCENTILE, rolling_percentile_rank(&ret_medium, w.stats));
        frame.insert(VOLATILITY_MEDIAN, rolling_median(&volatility, w.stats));
        frame.insert(VOLATILITY, volatility);
        frame.insert(RETURN_LONG, pct_change(close, w.long_lookback));
        frame.insert(DRAWDOWN, drawdown_from_peak(close));
        frame.insert(RETURN_1, ret_1);
        frame.insert(RETURN_SHORT, ret_short);
        frame.insert(RETURN_MEDIUM, ret_medium);
        frame.insert(MOVING_AVERAGE, ma);
        frame.insert(DISTANCE_FROM_MA, distance);

        let raw = (0..prices.len())
            .map(|t| self.breakdown(&frame, t).total())
            .collect();
        frame.insert(RAW_SCORE, raw);
        Ok(frame)
    }

    fn initial_state(&self) -> f64 {
        0.0
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut f64) -> Decision {
        let raw = input.defined(RAW_SCORE).unwrap_or(0.0);
        let effective = if input.index == 0 {
            raw
        } else {
            self.persist(*state, raw, input.defined(RETURN_SHORT), input.defined(DRAWDOWN))
        };
        *state = effective;
        Decision::scored(input.date, self.weights_for(effective), effective)
    }

    fn default_weights(&self) -> WeightVector {
        WeightVector::ALL_MOMENTUM
    }
}
