//! Direction reversal on the dominant gyroscope axis.
//!
//! A swing ends when the smoothed rotation rate changes sign. The reversal
//! counts only if the swing was fast enough (`min_velocity`) and wide enough
//! (`min_displacement_deg`); anything smaller is tremor.

use nalgebra::Vector3;

use motus_signal::ExponentialFilter;

use super::{Detection, Mark, RepCandidate};
use crate::profile::Directionality;

/// Picks the gyro axis carrying the most rotation during a warmup window,
/// then stays locked for the session
#[derive(Debug, Clone)]
pub struct DominantAxis {
    warmup: usize,
    seen: usize,
    totals: Vector3<f64>,
    locked: Option<usize>,
}

impl DominantAxis {
    pub fn new(warmup: usize) -> Self {
        Self {
            warmup: warmup.max(1),
            seen: 0,
            totals: Vector3::zeros(),
            locked: None,
        }
    }

    pub fn warmup(&self) -> usize {
        self.warmup
    }

    pub fn locked(&self) -> Option<usize> {
        self.locked
    }

    /// Feed one rate vector; returns the axis once the warmup has completed
    pub fn observe(&mut self, rate: &Vector3<f64>) -> Option<usize> {
        if self.locked.is_none() {
            self.totals += rate.abs();
            self.seen += 1;
            if self.seen >= self.warmup {
                let axis = self.totals.iamax();
                tracing::debug!(axis, "dominant rotation axis locked");
                self.locked = Some(axis);
            }
        }
        self.locked
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReversalParams {
    pub smoothing_alpha: f64,
    pub min_velocity: f64,
    pub min_displacement_deg: f64,
    pub significance_deg: f64,
    pub cooldown_secs: f64,
    pub directionality: Directionality,
    pub axis_warmup: usize,
}

/// Swing counter for inertial input
#[derive(Debug, Clone)]
pub struct ReversalDetector {
    params: ReversalParams,
    axis: DominantAxis,
    filter: ExponentialFilter,
    prev: Option<(f64, f64)>,
    /// Signed angle swept since the last reversal (degrees)
    swept: f64,
    /// Largest |rate| since the last reversal
    peak_rate: f64,
    /// Sign of the last rate outside the deadband, 0 before any
    direction: f64,
    flips: u32,
    rep_start: Option<Mark>,
    last_emit: Option<f64>,
}

impl ReversalDetector {
    pub fn new(params: ReversalParams) -> Self {
        Self {
            axis: DominantAxis::new(params.axis_warmup),
            filter: ExponentialFilter::new(params.smoothing_alpha),
            params,
            prev: None,
            swept: 0.0,
            peak_rate: 0.0,
            direction: 0.0,
            flips: 0,
            rep_start: None,
            last_emit: None,
        }
    }

    pub fn axis(&self) -> Option<usize> {
        self.axis.locked()
    }

    pub fn update(&mut self, rotation_rate: Vector3<f64>, mark: Mark, threshold: f64) -> Option<Detection> {
        let axis = self.axis.observe(&rotation_rate)?;
        let rate = self.filter.filter(rotation_rate[axis]);
        self.rep_start.get_or_insert(mark);

        let (prev_time, prev_rate) = self.prev.replace((mark.time, rate))?;
        let dt = mark.time - prev_time;
        if dt <= 0.0 {
            return None;
        }

        let step = (0.5 * (rate + prev_rate) * dt).to_degrees();
        self.swept += step;
        self.peak_rate = self.peak_rate.max(rate.abs());

        // Rates inside the deadband keep the previous direction
        if (rate * dt).to_degrees().abs() < self.params.significance_deg {
            return None;
        }
        let sign = rate.signum();
        let previous = std::mem::replace(&mut self.direction, sign);
        if previous == 0.0 || previous == sign {
            return None;
        }
        if self.peak_rate < self.params.min_velocity || self.swept.abs() < self.params.min_displacement_deg {
            return None;
        }

        let amplitude = self.swept.abs();
        self.swept = 0.0;
        self.peak_rate = 0.0;
        self.flips += 1;

        let counts = match self.params.directionality {
            Directionality::Unidirectional => previous > 0.0,
            Directionality::Bidirectional => true,
            Directionality::Cyclical => self.flips % 2 == 0,
        };
        if !counts {
            return None;
        }

        let start = self.rep_start.replace(mark).unwrap_or(mark);
        if amplitude < threshold {
            return Some(Detection::Rejected { amplitude });
        }
        if let Some(last) = self.last_emit {
            if mark.time - last < self.params.cooldown_secs {
                tracing::debug!(amplitude, "swing suppressed by cooldown");
                return None;
            }
        }
        self.last_emit = Some(mark.time);
        Some(Detection::Accepted(RepCandidate::new(amplitude, start, mark)))
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }
}
