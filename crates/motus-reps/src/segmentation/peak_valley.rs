//! Peak-valley state machine for linear profiles.
//!
//! ```text
//!        Δ > delta               drop > max(f·swing, delta)
//!  Idle ───────────▶ Ascending ─────────────────────────▶ Descending
//!                        ▲                                    │
//!                        └──────── rise > delta ──────────────┘
//! ```
//!
//! Reps are offered at the peak (Ascending → Descending) and/or the trough
//! (Descending → Ascending) depending on [`Directionality`].

use motus_signal::ExponentialFilter;

use super::{Detection, Mark, RepCandidate};
use crate::profile::Directionality;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakValleyState {
    Idle,
    Ascending,
    Descending,
}

/// Detector constants in the units of the segmented signal
#[derive(Debug, Clone, Copy)]
pub struct PeakValleyParams {
    pub smoothing_alpha: f64,
    pub delta_threshold: f64,
    pub peak_drop_fraction: f64,
    pub cooldown_secs: f64,
    pub significance: f64,
    pub directionality: Directionality,
}

#[derive(Debug, Clone, Copy)]
struct Extreme {
    value: f64,
    mark: Mark,
}

/// Scalar turning-point detector
#[derive(Debug, Clone)]
pub struct PeakValleyDetector {
    params: PeakValleyParams,
    filter: ExponentialFilter,
    state: PeakValleyState,
    last_significant: Option<f64>,
    /// Low point the current ascent started from
    valley: Option<Extreme>,
    peak: Option<Extreme>,
    /// Running minimum while descending
    trough: Option<Extreme>,
    last_emit: Option<f64>,
}

impl PeakValleyDetector {
    pub fn new(params: PeakValleyParams) -> Self {
        Self {
            filter: ExponentialFilter::new(params.smoothing_alpha),
            params,
            state: PeakValleyState::Idle,
            last_significant: None,
            valley: None,
            peak: None,
            trough: None,
            last_emit: None,
        }
    }

    pub fn state(&self) -> PeakValleyState {
        self.state
    }

    pub fn update(&mut self, raw: f64, mark: Mark, threshold: f64) -> Option<Detection> {
        if let Some(last) = self.last_significant {
            if (raw - last).abs() < self.params.significance {
                return None;
            }
        }
        self.last_significant = Some(raw);

        let value = self.filter.filter(raw);
        let here = Extreme { value, mark };

        match self.state {
            PeakValleyState::Idle => {
                let valley = *self.valley.get_or_insert(here);
                if value < valley.value {
                    self.valley = Some(here);
                } else if value - valley.value > self.params.delta_threshold {
                    self.state = PeakValleyState::Ascending;
                    self.peak = Some(here);
                }
                None
            }
            PeakValleyState::Ascending => {
                let peak = *self.peak.get_or_insert(here);
                let valley = self.valley.unwrap_or(peak);

                if value > peak.value {
                    self.peak = Some(here);
                    return None;
                }

                let swing = peak.value - valley.value;
                let required = (self.params.peak_drop_fraction * swing).max(self.params.delta_threshold);
                if peak.value - value <= required {
                    return None;
                }

                self.state = PeakValleyState::Descending;
                self.trough = Some(here);

                match self.params.directionality {
                    Directionality::Unidirectional | Directionality::Bidirectional => {
                        self.offer(swing, valley.mark, mark, threshold)
                    }
                    Directionality::Cyclical => None,
                }
            }
            PeakValleyState::Descending => {
                let trough = *self.trough.get_or_insert(here);

                if value < trough.value {
                    self.trough = Some(here);
                    return None;
                }
                if value - trough.value <= self.params.delta_threshold {
                    return None;
                }

                let peak = self.peak.unwrap_or(trough);
                let start_valley = self.valley.unwrap_or(trough);

                self.state = PeakValleyState::Ascending;
                self.valley = Some(trough);
                self.peak = Some(here);
                self.trough = None;

                match self.params.directionality {
                    Directionality::Unidirectional => None,
                    Directionality::Bidirectional => {
                        self.offer(peak.value - trough.value, peak.mark, mark, threshold)
                    }
                    Directionality::Cyclical => {
                        self.offer(peak.value - start_valley.value, start_valley.mark, mark, threshold)
                    }
                }
            }
        }
    }

    fn offer(&mut self, amplitude: f64, start: Mark, end: Mark, threshold: f64) -> Option<Detection> {
        if amplitude < threshold {
            return Some(Detection::Rejected { amplitude });
        }
        if let Some(last) = self.last_emit {
            if end.time - last < self.params.cooldown_secs {
                tracing::debug!(amplitude, "rep suppressed by cooldown");
                return None;
            }
        }
        self.last_emit = Some(end.time);
        Some(Detection::Accepted(RepCandidate::new(amplitude, start, end)))
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn params(directionality: Directionality) -> PeakValleyParams {
        PeakValleyParams {
            smoothing_alpha: 0.2,
            delta_threshold: 0.01,
            peak_drop_fraction: 0.2,
            cooldown_secs: 0.4,
            significance: 0.002,
            directionality,
        }
    }

    /// Raised-cosine lifts: rest at 0, peak at `height`, `period` seconds each
    fn lifts(count: usize, height: f64, period: f64, rate: f64) -> Vec<(f64, f64)> {
        let n = (count as f64 * period * rate) as usize;
        (0..=n)
            .map(|i| {
                let t = i as f64 / rate;
                (t, height * 0.5 * (1.0 - (2.0 * PI * t / period).cos()))
            })
            .collect()
    }

    fn run(detector: &mut PeakValleyDetector, signal: &[(f64, f64)], threshold: f64) -> Vec<Detection> {
        signal
            .iter()
            .enumerate()
            .filter_map(|(i, &(t, v))| detector.update(v, Mark::new(i as u64, t), threshold))
            .collect()
    }

    fn accepted(detections: &[Detection]) -> Vec<RepCandidate> {
        detections
            .iter()
            .filter_map(|d| match d {
                Detection::Accepted(c) => Some(*c),
                Detection::Rejected { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_unidirectional_counts_each_lift() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Unidirectional));
        let reps = accepted(&run(&mut detector, &lifts(4, 0.3, 1.5, 60.0), 0.05));
        assert_eq!(reps.len(), 4);
        for rep in &reps {
            assert!(rep.amplitude > 0.2 && rep.amplitude <= 0.3);
            assert!(rep.end.seq > rep.start.seq);
        }
        for pair in reps.windows(2) {
            assert!(pair[1].start.seq >= pair[0].end.seq);
        }
    }

    #[test]
    fn test_bidirectional_counts_both_halves() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Bidirectional));
        let reps = accepted(&run(&mut detector, &lifts(3, 0.3, 1.5, 60.0), 0.05));
        // Three peaks and the two troughs between them
        assert_eq!(reps.len(), 5);
    }

    #[test]
    fn test_cyclical_counts_closed_cycles() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Cyclical));
        let reps = accepted(&run(&mut detector, &lifts(3, 0.3, 1.5, 60.0), 0.05));
        assert_eq!(reps.len(), 2);
    }

    #[test]
    fn test_small_motion_rejected() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Unidirectional));
        let detections = run(&mut detector, &lifts(2, 0.3, 1.5, 60.0), 0.5);
        assert!(accepted(&detections).is_empty());
        assert_eq!(detections.len(), 2);
        assert!(matches!(detections[0], Detection::Rejected { amplitude } if amplitude > 0.2));
    }

    #[test]
    fn test_jitter_never_leaves_idle() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Unidirectional));
        let jitter: Vec<(f64, f64)> = (0..200)
            .map(|i| (i as f64 / 60.0, if i % 2 == 0 { 0.0 } else { 0.0015 }))
            .collect();
        assert!(run(&mut detector, &jitter, 0.05).is_empty());
        assert_eq!(detector.state(), PeakValleyState::Idle);
    }

    #[test]
    fn test_cooldown_suppresses_fast_reps() {
        let mut p = params(Directionality::Unidirectional);
        p.cooldown_secs = 5.0;
        let mut detector = PeakValleyDetector::new(p);
        let reps = accepted(&run(&mut detector, &lifts(3, 0.3, 1.0, 60.0), 0.05));
        assert_eq!(reps.len(), 1);
    }

    #[test]
    fn test_irregular_sampling() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Unidirectional));
        // Same motion with a dropped-frame gap in every lift
        let signal: Vec<(f64, f64)> = lifts(3, 0.3, 1.5, 60.0)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| i % 90 < 30 || i % 90 > 40)
            .map(|(_, s)| s)
            .collect();
        assert_eq!(accepted(&run(&mut detector, &signal, 0.05)).len(), 3);
    }

    #[test]
    fn test_reset_restores_idle() {
        let mut detector = PeakValleyDetector::new(params(Directionality::Unidirectional));
        run(&mut detector, &lifts(1, 0.3, 1.5, 60.0)[..40], 0.05);
        assert_ne!(detector.state(), PeakValleyState::Idle);
        detector.reset();
        assert_eq!(detector.state(), PeakValleyState::Idle);
    }
}
