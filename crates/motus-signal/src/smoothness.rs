//! Movement smoothness scoring (SPARC).
//!
//! Three outputs are derived from one finished trajectory:
//!
//! - **Overall score**: spectral purity of the whole speed profile × 100
//! - **Per-repetition scores**: the same metric on each repetition's slice
//! - **Timeline**: a windowed jerk proxy normalized against the session's own
//!   jerk range, so within-session changes stay visible
//!
//! Every path degrades to the neutral score (50) instead of failing: too few
//! samples, no motion, or a non-finite intermediate all read as "unknown".

use serde::{Deserialize, Serialize};

use motus_core::kinematics::{differentiate, mean};
use motus_core::{Error, Result, Trajectory2D};
use nalgebra::Vector2;

use crate::spectral::SpectralAnalyzer;

/// Score reported when smoothness cannot be measured
pub const NEUTRAL_SMOOTHNESS: f64 = 50.0;

/// Smoothness analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparcConfig {
    /// Minimum speed samples for a spectral score
    pub min_samples: usize,
    /// Jerk samples per timeline window
    pub timeline_window: usize,
    /// Spacing between emitted timeline points (seconds)
    pub timeline_interval_secs: f64,
}

impl Default for SparcConfig {
    fn default() -> Self {
        Self {
            min_samples: 32,
            timeline_window: 10,
            timeline_interval_secs: 0.1,
        }
    }
}

/// Smoothness at one moment of the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub timestamp: f64,
    /// 0 (jerkiest window of the session) to 100 (smoothest)
    pub smoothness: f64,
}

/// Session smoothness result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparcResult {
    pub overall_score: f64,
    pub timeline: Vec<TimelinePoint>,
    pub per_rep_scores: Vec<f64>,
}

impl SparcResult {
    pub fn neutral(rep_count: usize) -> Self {
        Self {
            overall_score: NEUTRAL_SMOOTHNESS,
            timeline: Vec::new(),
            per_rep_scores: vec![NEUTRAL_SMOOTHNESS; rep_count],
        }
    }
}

/// How repetitions partition the speed series
#[derive(Debug, Clone, Copy)]
pub enum RepPartition<'a> {
    /// Exact `(start, end)` times of each repetition
    Bounds(&'a [(f64, f64)]),
    /// Only the count is known; split into equal chunks
    Count(usize),
}

impl RepPartition<'_> {
    fn len(&self) -> usize {
        match self {
            RepPartition::Bounds(bounds) => bounds.len(),
            RepPartition::Count(n) => *n,
        }
    }
}

/// SPARC smoothness analyzer
pub struct SparcAnalyzer {
    config: SparcConfig,
    spectral: SpectralAnalyzer,
}

impl SparcAnalyzer {
    pub fn new(config: SparcConfig) -> Self {
        Self {
            config,
            spectral: SpectralAnalyzer::new(),
        }
    }

    pub fn config(&self) -> &SparcConfig {
        &self.config
    }

    /// Spectral-purity score of a speed series, failing on insufficient or
    /// degenerate input
    pub fn try_score(&mut self, speeds: &[f64]) -> Result<f64> {
        if speeds.len() < self.config.min_samples {
            return Err(Error::InsufficientData {
                required: self.config.min_samples,
                available: speeds.len(),
            });
        }
        if speeds.iter().any(|s| !s.is_finite()) {
            return Err(Error::NumericInstability("non-finite speed sample".into()));
        }

        let purity = self.spectral.spectral_purity(speeds)?;
        Ok((purity * 100.0).clamp(0.0, 100.0))
    }

    /// Spectral-purity score in `[0, 100]`, neutral when unmeasurable
    pub fn score(&mut self, speeds: &[f64]) -> f64 {
        match self.try_score(speeds) {
            Ok(score) => score,
            Err(e) => {
                tracing::debug!("smoothness score fell back to neutral: {}", e);
                NEUTRAL_SMOOTHNESS
            }
        }
    }

    /// Full analysis of a positional trajectory (already projected to 2D)
    pub fn analyze_trajectory(&mut self, trajectory: &Trajectory2D, reps: RepPartition<'_>) -> SparcResult {
        let velocity = trajectory.velocity_profile();
        let speeds: Vec<(f64, f64)> = velocity.iter().map(|(t, v)| (*t, v.norm())).collect();
        let jerk = trajectory.jerk_profile();
        self.analyze_series(&speeds, &jerk, reps)
    }

    /// Full analysis of an inertial angular-speed series.
    ///
    /// The timeline uses the second derivative of angular speed as its jerk
    /// proxy.
    pub fn analyze_angular_speed(&mut self, times: &[f64], speeds: &[f64], reps: RepPartition<'_>) -> SparcResult {
        let series: Vec<(f64, f64)> = times.iter().copied().zip(speeds.iter().copied()).collect();
        let vector: Vec<(f64, Vector2<f64>)> = series
            .iter()
            .map(|&(t, s)| (t, Vector2::new(s, 0.0)))
            .collect();
        let jerk: Vec<(f64, f64)> = differentiate(&differentiate(&vector))
            .into_iter()
            .map(|(t, j)| (t, j.norm()))
            .collect();
        self.analyze_series(&series, &jerk, reps)
    }

    fn analyze_series(&mut self, speeds: &[(f64, f64)], jerk: &[(f64, f64)], reps: RepPartition<'_>) -> SparcResult {
        let values: Vec<f64> = speeds.iter().map(|(_, s)| *s).collect();
        let overall_score = self.score(&values);
        let per_rep_scores = self.per_rep_scores(speeds, reps);
        let timeline = self.timeline(jerk);

        debug_assert_eq!(per_rep_scores.len(), reps.len());

        SparcResult {
            overall_score,
            timeline,
            per_rep_scores,
        }
    }

    /// One spectral score per repetition
    pub fn per_rep_scores(&mut self, speeds: &[(f64, f64)], reps: RepPartition<'_>) -> Vec<f64> {
        match reps {
            RepPartition::Bounds(bounds) => bounds
                .iter()
                .map(|&(start, end)| {
                    let slice: Vec<f64> = speeds
                        .iter()
                        .filter(|(t, _)| *t >= start && *t <= end)
                        .map(|(_, s)| *s)
                        .collect();
                    self.score(&slice)
                })
                .collect(),
            RepPartition::Count(0) => Vec::new(),
            RepPartition::Count(n) => {
                let chunk = speeds.len() / n;
                (0..n)
                    .map(|i| {
                        if chunk == 0 {
                            return NEUTRAL_SMOOTHNESS;
                        }
                        let end = if i + 1 == n { speeds.len() } else { (i + 1) * chunk };
                        let slice: Vec<f64> = speeds[i * chunk..end].iter().map(|(_, s)| *s).collect();
                        self.score(&slice)
                    })
                    .collect()
            }
        }
    }

    /// Windowed smoothness timeline from a time-stamped jerk magnitude series
    pub fn timeline(&self, jerk: &[(f64, f64)]) -> Vec<TimelinePoint> {
        let window = self.config.timeline_window.max(1);
        if jerk.len() < window {
            return Vec::new();
        }

        let local: Vec<(f64, f64)> = jerk
            .windows(window)
            .map(|w| {
                let values: Vec<f64> = w.iter().map(|(_, j)| *j).collect();
                (w[window - 1].0, mean(&values))
            })
            .filter(|(_, j)| j.is_finite())
            .collect();

        let Some(&(first_time, _)) = local.first() else {
            return Vec::new();
        };

        let min = local.iter().map(|(_, j)| *j).fold(f64::INFINITY, f64::min);
        let max = local.iter().map(|(_, j)| *j).fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let to_smoothness = |j: f64| -> f64 {
            if range < 1e-12 {
                if max < 1e-9 {
                    100.0
                } else {
                    NEUTRAL_SMOOTHNESS
                }
            } else {
                (100.0 * (1.0 - (j - min) / range)).clamp(0.0, 100.0)
            }
        };

        let mut points = Vec::new();
        let mut next_emit = first_time;
        for &(t, j) in &local {
            if t + 1e-9 >= next_emit {
                points.push(TimelinePoint {
                    timestamp: t,
                    smoothness: to_smoothness(j),
                });
                next_emit = t + self.config.timeline_interval_secs;
            }
        }

        points
    }
}

impl Default for SparcAnalyzer {
    fn default() -> Self {
        Self::new(SparcConfig::default())
    }
}
