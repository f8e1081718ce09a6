//! Per-repetition quality scoring.
//!
//! composite = 0.40 · amplitude + 0.35 · consistency + 0.25 · timing

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use motus_core::kinematics::{mean, std_dev};

/// Quality scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub amplitude_weight: f64,
    pub consistency_weight: f64,
    pub timing_weight: f64,
    /// Amplitudes used for the consistency score
    pub consistency_window: usize,
    /// Coefficient of variation that scores zero consistency
    pub max_variation: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            amplitude_weight: 0.40,
            consistency_weight: 0.35,
            timing_weight: 0.25,
            consistency_window: 5,
            max_variation: 0.5,
        }
    }
}

/// Quality of one accepted rep, every component in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub amplitude_score: f64,
    pub consistency_score: f64,
    pub timing_score: f64,
    pub composite: f64,
}

/// Scores accepted reps against the active threshold and the session's
/// recent amplitudes
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
    recent: VecDeque<f64>,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.consistency_window),
            config,
        }
    }

    /// Score a rep and add its amplitude to the consistency window
    pub fn score(&mut self, amplitude: f64, threshold: f64, duration_secs: f64) -> QualityScore {
        if self.recent.len() == self.config.consistency_window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back(amplitude);

        let recent: Vec<f64> = self.recent.iter().copied().collect();
        let amplitude_score = amplitude_score(amplitude, threshold);
        let consistency_score = consistency_score(&recent, self.config.max_variation);
        let timing_score = timing_score(duration_secs);

        let composite = self.config.amplitude_weight * amplitude_score
            + self.config.consistency_weight * consistency_score
            + self.config.timing_weight * timing_score;

        QualityScore {
            amplitude_score,
            consistency_score,
            timing_score,
            composite: sanitize(composite),
        }
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Amplitude relative to the threshold.
///
/// 0 below, 50 at, linear to 100 at 1.5×, flat to 2.5×, then decays toward
/// 70 for exaggerated motion.
pub fn amplitude_score(amplitude: f64, threshold: f64) -> f64 {
    if !(threshold > 0.0) {
        return if amplitude > 0.0 { 100.0 } else { 0.0 };
    }
    let ratio = amplitude / threshold;
    let score = if ratio < 1.0 {
        0.0
    } else if ratio < 1.5 {
        50.0 + (ratio - 1.0) * 100.0
    } else if ratio <= 2.5 {
        100.0
    } else {
        70.0 + 20.0 * (-(ratio - 2.5)).exp()
    };
    sanitize(score)
}

/// Consistency from the coefficient of variation of recent amplitudes
pub fn consistency_score(amplitudes: &[f64], max_variation: f64) -> f64 {
    if amplitudes.len() < 2 {
        return 100.0;
    }
    let m = mean(amplitudes);
    if m.abs() < 1e-12 {
        return 100.0;
    }
    let cv = std_dev(amplitudes) / m.abs();
    sanitize(100.0 * (1.0 - cv / max_variation))
}

/// Rep duration score: rushing and struggling both cost points
pub fn timing_score(duration_secs: f64) -> f64 {
    let d = duration_secs;
    let score = if !d.is_finite() || d < 0.4 {
        30.0
    } else if d < 0.8 {
        30.0 + (d - 0.4) / 0.4 * 70.0
    } else if d <= 2.0 {
        100.0
    } else if d <= 4.0 {
        100.0 - (d - 2.0) / 2.0 * 50.0
    } else {
        50.0
    };
    sanitize(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amplitude_bands() {
        assert_eq!(amplitude_score(0.9, 1.0), 0.0);
        assert_eq!(amplitude_score(1.0, 1.0), 50.0);
        assert!((amplitude_score(1.25, 1.0) - 75.0).abs() < 1e-9);
        assert_eq!(amplitude_score(1.5, 1.0), 100.0);
        assert_eq!(amplitude_score(2.5, 1.0), 100.0);

        let rushed = amplitude_score(3.0, 1.0);
        assert!(rushed > 70.0 && rushed < 90.0);
        assert!(amplitude_score(10.0, 1.0) > 70.0);
    }

    #[test]
    fn test_consistency() {
        assert_eq!(consistency_score(&[5.0], 0.5), 100.0);
        assert_eq!(consistency_score(&[5.0, 5.0, 5.0], 0.5), 100.0);
        // cv = 0.5
        assert_eq!(consistency_score(&[1.0, 3.0], 0.5), 0.0);
        // cv = 0.25
        assert!((consistency_score(&[3.0, 5.0], 0.5) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_timing_bands() {
        assert_eq!(timing_score(0.2), 30.0);
        assert!((timing_score(0.6) - 65.0).abs() < 1e-9);
        assert_eq!(timing_score(1.0), 100.0);
        assert_eq!(timing_score(2.0), 100.0);
        assert!((timing_score(3.0) - 75.0).abs() < 1e-9);
        assert_eq!(timing_score(6.0), 50.0);
    }

    #[test]
    fn test_composite_weights() {
        let mut scorer = QualityScorer::default();
        let q = scorer.score(2.0, 1.0, 1.2);
        assert_eq!(q.amplitude_score, 100.0);
        assert_eq!(q.consistency_score, 100.0);
        assert_eq!(q.timing_score, 100.0);
        assert!((q.composite - 100.0).abs() < 1e-9);

        let q = scorer.score(6.0, 1.0, 0.2);
        assert!((q.composite - (0.40 * q.amplitude_score + 0.35 * q.consistency_score + 0.25 * 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_consistency_window_slides() {
        let mut scorer = QualityScorer::default();
        scorer.score(1.0, 1.0, 1.0);
        for _ in 0..5 {
            scorer.score(4.0, 1.0, 1.0);
        }
        // The outlier has left the window
        let q = scorer.score(4.0, 1.0, 1.0);
        assert_eq!(q.consistency_score, 100.0);
    }
}
