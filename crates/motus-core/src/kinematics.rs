//! Finite-difference kinematics over planar trajectories.
//!
//! Samples arrive with irregular spacing, so every derivative divides by its
//! own Δt. Pairs closer than [`MIN_DT`] are skipped instead of producing
//! spikes.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::geometry::PlaneProjector;
use crate::types::{Point2D, Position3D};

/// Smallest time step (seconds) used as a derivative denominator
pub const MIN_DT: f64 = 1e-4;

/// Time-stamped vector series
pub type TimedSeries = Vec<(f64, Vector2<f64>)>;

/// Planar trajectory with one timestamp per point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory2D {
    pub times: Vec<f64>,
    pub points: Vec<Point2D>,
}

impl Trajectory2D {
    pub fn new(times: Vec<f64>, points: Vec<Point2D>) -> Self {
        debug_assert_eq!(times.len(), points.len());
        Self { times, points }
    }

    /// Flatten a 3D trajectory onto its best-fit axis plane
    pub fn from_positions(times: Vec<f64>, positions: &[Position3D]) -> Self {
        let projected = PlaneProjector::project(positions);
        Self::new(times, projected.points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn velocity_profile(&self) -> TimedSeries {
        let series: TimedSeries = self
            .times
            .iter()
            .zip(&self.points)
            .map(|(&t, p)| (t, p.to_vector()))
            .collect();
        differentiate(&series)
    }

    /// Speed magnitude per velocity sample
    pub fn speed_profile(&self) -> Vec<f64> {
        self.velocity_profile().iter().map(|(_, v)| v.norm()).collect()
    }

    /// Magnitude of the third derivative of position, time-stamped
    pub fn jerk_profile(&self) -> Vec<(f64, f64)> {
        let acceleration = differentiate(&self.velocity_profile());
        differentiate(&acceleration)
            .into_iter()
            .map(|(t, j)| (t, j.norm()))
            .collect()
    }
}

/// Forward-difference derivative, stamped at the later sample
pub fn differentiate(series: &[(f64, Vector2<f64>)]) -> TimedSeries {
    let mut out = Vec::with_capacity(series.len().saturating_sub(1));
    let mut iter = series.iter();
    let Some(mut prev) = iter.next() else {
        return out;
    };

    for current in iter {
        let dt = current.0 - prev.0;
        if dt < MIN_DT {
            continue;
        }
        out.push((current.0, (current.1 - prev.1) / dt));
        prev = current;
    }

    out
}

/// Running signed integral of a rate series (trapezoidal rule)
pub fn integrate(times: &[f64], rates: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(rates.len());
    let mut total = 0.0;
    for i in 0..rates.len().min(times.len()) {
        if i > 0 {
            let dt = times[i] - times[i - 1];
            if dt > 0.0 {
                total += 0.5 * (rates[i] + rates[i - 1]) * dt;
            }
        }
        out.push(total);
    }
    out
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}
