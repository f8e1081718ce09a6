//! Adaptive amplitude threshold.
//!
//! The threshold learns from the session's own accepted reps:
//!
//! - **Learning** (fewer than 3 accepted): `max(p40 × 0.85, 0.8 × base)`
//! - **Performance**: `max(p70 × (1 + trend_adj), base)` with `trend_adj`
//!   of `+0.1` / `0` / `-0.1` for an improving / stable / declining trend
//!
//! While the trend is improving every accepted rep raises the threshold,
//! by at least the trend tolerance when older, larger amplitudes still pin
//! the percentile. Three rejected candidates in a row relax the active
//! threshold by 10 % until the next accepted rep. The threshold never drops
//! below `0.8 × base`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Adaptive threshold configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Accepted amplitudes remembered
    pub capacity: usize,
    /// Accepted reps before switching to the performance phase
    pub learning_reps: usize,
    pub learning_percentile: f64,
    pub learning_scale: f64,
    pub performance_percentile: f64,
    /// Share of the base threshold that is never undercut
    pub floor_fraction: f64,
    pub trend_adjustment: f64,
    /// Relative step tolerated against the trend direction
    pub trend_tolerance: f64,
    pub relax_after_rejections: u32,
    pub relax_factor: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            capacity: 15,
            learning_reps: 3,
            learning_percentile: 40.0,
            learning_scale: 0.85,
            performance_percentile: 70.0,
            floor_fraction: 0.8,
            trend_adjustment: 0.1,
            trend_tolerance: 0.02,
            relax_after_rejections: 3,
            relax_factor: 0.9,
        }
    }
}

/// Direction of the three most recent amplitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Per-session adaptive threshold
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    config: ThresholdConfig,
    base: f64,
    recent_amplitudes: VecDeque<f64>,
    accepted: usize,
    consecutive_rejections: u32,
    relaxed: bool,
    trend: Trend,
    current: f64,
}

impl AdaptiveThreshold {
    pub fn new(base: f64, config: ThresholdConfig) -> Self {
        let base = if base.is_finite() { base.max(0.0) } else { 0.0 };
        let mut threshold = Self {
            recent_amplitudes: VecDeque::with_capacity(config.capacity),
            config,
            base,
            accepted: 0,
            consecutive_rejections: 0,
            relaxed: false,
            trend: Trend::Stable,
            current: 0.0,
        };
        threshold.recompute();
        threshold
    }

    /// Active threshold
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    pub fn is_learning(&self) -> bool {
        self.accepted < self.config.learning_reps
    }

    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    pub fn recent_amplitudes(&self) -> impl Iterator<Item = &f64> {
        self.recent_amplitudes.iter()
    }

    fn floor(&self) -> f64 {
        self.base * self.config.floor_fraction
    }

    pub fn record_accepted(&mut self, amplitude: f64) {
        if !amplitude.is_finite() {
            tracing::debug!("ignoring non-finite rep amplitude");
            return;
        }
        let previous = self.current;
        if self.recent_amplitudes.len() == self.config.capacity.max(1) {
            self.recent_amplitudes.pop_front();
        }
        self.recent_amplitudes.push_back(amplitude);
        self.accepted += 1;
        self.consecutive_rejections = 0;
        self.relaxed = false;
        self.recompute();

        if !self.is_learning() && self.trend == Trend::Improving && self.current <= previous {
            self.current = previous * (1.0 + self.config.trend_tolerance);
            tracing::debug!(threshold = self.current, "improving trend raised a pinned threshold");
        }
    }

    pub fn record_rejection(&mut self) {
        self.consecutive_rejections += 1;
        if !self.relaxed && self.consecutive_rejections >= self.config.relax_after_rejections {
            self.relaxed = true;
            tracing::debug!(
                rejections = self.consecutive_rejections,
                "relaxing adaptive threshold"
            );
            self.recompute();
        }
    }

    pub fn reset(&mut self) {
        self.recent_amplitudes.clear();
        self.accepted = 0;
        self.consecutive_rejections = 0;
        self.relaxed = false;
        self.recompute();
    }

    fn recompute(&mut self) {
        let amplitudes: Vec<f64> = self.recent_amplitudes.iter().copied().collect();
        self.trend = classify_trend(&amplitudes, self.config.trend_tolerance);

        let learned = if amplitudes.is_empty() {
            self.floor()
        } else if self.is_learning() {
            let p = percentile(&amplitudes, self.config.learning_percentile);
            (p * self.config.learning_scale).max(self.floor())
        } else {
            let adjustment = match self.trend {
                Trend::Improving => self.config.trend_adjustment,
                Trend::Stable => 0.0,
                Trend::Declining => -self.config.trend_adjustment,
            };
            let p = percentile(&amplitudes, self.config.performance_percentile);
            (p * (1.0 + adjustment)).max(self.base)
        };

        let active = if self.relaxed {
            learned * self.config.relax_factor
        } else {
            learned
        };

        self.current = active.max(self.floor());
    }
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Trend of the three most recent amplitudes
pub fn classify_trend(amplitudes: &[f64], tolerance: f64) -> Trend {
    if amplitudes.len() < 3 {
        return Trend::Stable;
    }
    let last = &amplitudes[amplitudes.len() - 3..];
    let (a, b, c) = (last[0], last[1], last[2]);

    let rising = b >= a * (1.0 - tolerance) && c >= b * (1.0 - tolerance) && c > a * (1.0 + tolerance);
    let falling = b <= a * (1.0 + tolerance) && c <= b * (1.0 + tolerance) && c < a * (1.0 - tolerance);

    if rising {
        Trend::Improving
    } else if falling {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
