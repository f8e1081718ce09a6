//! Circular accumulation.
//!
//! The hand's radial vector is measured from a centroid that drifts toward
//! each new position. Consecutive radial vectors give a signed angle in a
//! local 2-axis frame whose normal is re-oriented by exponential blending,
//! so loops drawn in a tilted plane still accumulate. Each full rotation
//! quantum emits one rep, whatever its size: the amplitude is reported for
//! scoring, never used to reject a loop.
//!
//! The drifting centroid lags behind slow hands, so the rep amplitude is
//! measured separately, as the largest distance of the rep's points from
//! their own mean.

use nalgebra::Vector3;

use motus_signal::{ExponentialFilter, VectorExponentialFilter};

use super::reversal::DominantAxis;
use super::{Detection, Mark, RepCandidate};

/// Single-step rotations larger than this are tracking glitches (degrees)
const MAX_STEP_DEG: f64 = 135.0;

const MIN_RADIUS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct CircularParams {
    pub rotation_for_rep_deg: f64,
    pub cooldown_secs: f64,
    pub significance: f64,
    pub centroid_alpha: f64,
    pub normal_blend: f64,
}

/// Orient a normal so its largest component is positive; the sign of the
/// accumulated angle then tells clockwise from counter-clockwise
fn canonical(normal: Vector3<f64>) -> Vector3<f64> {
    let dominant = normal.iamax();
    if normal[dominant] < 0.0 {
        -normal
    } else {
        normal
    }
}

/// Largest distance of a loop's points from their mean
fn loop_radius(points: &[Vector3<f64>]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let mean = points.iter().sum::<Vector3<f64>>() / points.len() as f64;
    points.iter().map(|p| (p - mean).norm()).fold(0.0, f64::max)
}

/// Positional loop counter
#[derive(Debug, Clone)]
pub struct CircularDetector {
    params: CircularParams,
    centroid: VectorExponentialFilter,
    normal: Option<Vector3<f64>>,
    prev_position: Option<Vector3<f64>>,
    prev_radial: Option<Vector3<f64>>,
    accumulator: f64,
    /// Significant positions of the rep in progress
    rep_points: Vec<Vector3<f64>>,
    rep_start: Option<Mark>,
    last_emit: Option<f64>,
}

impl CircularDetector {
    pub fn new(params: CircularParams) -> Self {
        Self {
            centroid: VectorExponentialFilter::new(params.centroid_alpha),
            params,
            normal: None,
            prev_position: None,
            prev_radial: None,
            accumulator: 0.0,
            rep_points: Vec::new(),
            rep_start: None,
            last_emit: None,
        }
    }

    /// Signed rotation accumulated toward the next rep (degrees)
    pub fn accumulated_degrees(&self) -> f64 {
        self.accumulator
    }

    pub fn update(&mut self, position: Vector3<f64>, mark: Mark) -> Option<Detection> {
        if let Some(prev) = self.prev_position {
            if (position - prev).norm() < self.params.significance {
                return None;
            }
        }
        self.prev_position = Some(position);
        self.rep_start.get_or_insert(mark);
        self.rep_points.push(position);

        let centroid = self.centroid.filter(position);
        let radial = position - centroid;
        if radial.norm() < MIN_RADIUS {
            return None;
        }

        if let Some(prev) = self.prev_radial.replace(radial) {
            self.blend_normal(&prev, &radial);
            if let Some(delta) = self.signed_step(&prev, &radial) {
                self.accumulator += delta;
            }
        }

        self.try_emit(position, mark)
    }

    fn blend_normal(&mut self, prev: &Vector3<f64>, radial: &Vector3<f64>) {
        let Some(observed) = prev.cross(radial).try_normalize(1e-12) else {
            return;
        };
        self.normal = Some(match self.normal {
            None => canonical(observed),
            Some(current) => {
                // Keep the reference orientation so direction changes stay signed
                let aligned = if observed.dot(&current) < 0.0 { -observed } else { observed };
                let beta = self.params.normal_blend;
                (current * (1.0 - beta) + aligned * beta)
                    .try_normalize(1e-12)
                    .unwrap_or(current)
            }
        });
    }

    fn signed_step(&self, prev: &Vector3<f64>, radial: &Vector3<f64>) -> Option<f64> {
        let normal = self.normal?;
        let u = (prev - normal * prev.dot(&normal)).try_normalize(1e-12)?;
        let v = normal.cross(&u);
        let r = radial - normal * radial.dot(&normal);

        let delta = r.dot(&v).atan2(r.dot(&u)).to_degrees();
        if delta.abs() > MAX_STEP_DEG || !delta.is_finite() {
            return None;
        }
        Some(delta)
    }

    fn try_emit(&mut self, position: Vector3<f64>, mark: Mark) -> Option<Detection> {
        let quantum = self.params.rotation_for_rep_deg;
        if self.accumulator.abs() < quantum {
            return None;
        }
        if let Some(last) = self.last_emit {
            if mark.time - last < self.params.cooldown_secs {
                return None;
            }
        }

        self.accumulator -= quantum.copysign(self.accumulator);
        let amplitude = loop_radius(&self.rep_points);
        let start = self.rep_start.replace(mark).unwrap_or(mark);
        // The closing point opens the next rep
        self.rep_points.clear();
        self.rep_points.push(position);

        self.last_emit = Some(mark.time);
        Some(Detection::Accepted(RepCandidate::new(amplitude, start, mark)))
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }
}

/// Loop counter for inertial input: integrates the dominant-axis rotation
/// rate. Amplitude is the swept angle of the rep in degrees.
#[derive(Debug, Clone)]
pub struct RotationDetector {
    params: CircularParams,
    axis: DominantAxis,
    filter: ExponentialFilter,
    smoothing_alpha: f64,
    prev: Option<(f64, f64)>,
    accumulator: f64,
    rep_start: Option<Mark>,
    last_emit: Option<f64>,
}

impl RotationDetector {
    pub fn new(params: CircularParams, smoothing_alpha: f64, warmup: usize) -> Self {
        Self {
            params,
            axis: DominantAxis::new(warmup),
            filter: ExponentialFilter::new(smoothing_alpha),
            smoothing_alpha,
            prev: None,
            accumulator: 0.0,
            rep_start: None,
            last_emit: None,
        }
    }

    pub fn update(&mut self, rotation_rate: Vector3<f64>, mark: Mark) -> Option<Detection> {
        let axis = self.axis.observe(&rotation_rate)?;
        let rate = self.filter.filter(rotation_rate[axis]);
        self.rep_start.get_or_insert(mark);

        if let Some((prev_time, prev_rate)) = self.prev.replace((mark.time, rate)) {
            let dt = mark.time - prev_time;
            if dt > 0.0 {
                self.accumulator += (0.5 * (rate + prev_rate) * dt).to_degrees();
            }
        }

        let quantum = self.params.rotation_for_rep_deg;
        if self.accumulator.abs() < quantum {
            return None;
        }
        if let Some(last) = self.last_emit {
            if mark.time - last < self.params.cooldown_secs {
                return None;
            }
        }

        let amplitude = self.accumulator.abs();
        self.accumulator -= quantum.copysign(self.accumulator);
        let start = self.rep_start.replace(mark).unwrap_or(mark);

        self.last_emit = Some(mark.time);
        Some(Detection::Accepted(RepCandidate::new(amplitude, start, mark)))
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.params, self.smoothing_alpha, self.axis.warmup());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn params() -> CircularParams {
        CircularParams {
            rotation_for_rep_deg: 340.0,
            cooldown_secs: 0.3,
            significance: 0.002,
            centroid_alpha: 0.1,
            normal_blend: 0.1,
        }
    }

    fn loops(rotations: f64, radius: f64, per_rotation: usize, tilt: f64) -> Vec<Vector3<f64>> {
        let n = (rotations * per_rotation as f64) as usize;
        (0..=n)
            .map(|i| {
                let a = 2.0 * PI * i as f64 / per_rotation as f64;
                let (x, y) = (radius * a.cos(), radius * a.sin());
                // Rotate the loop plane about the x axis
                Vector3::new(x, y * tilt.cos(), y * tilt.sin())
            })
            .collect()
    }

    fn detect(detector: &mut CircularDetector, points: &[Vector3<f64>]) -> Vec<RepCandidate> {
        points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| detector.update(*p, Mark::new(i as u64, i as f64 / 60.0)))
            .filter_map(|d| match d {
                Detection::Accepted(c) => Some(c),
                Detection::Rejected { .. } => None,
            })
            .collect()
    }

    fn count(detector: &mut CircularDetector, points: &[Vector3<f64>]) -> usize {
        detect(detector, points).len()
    }

    #[test]
    fn test_counts_full_loops() {
        let mut detector = CircularDetector::new(params());
        assert_eq!(count(&mut detector, &loops(3.0, 0.2, 60, 0.0)), 3);
    }

    #[test]
    fn test_partial_loop_is_not_a_rep() {
        let mut detector = CircularDetector::new(params());
        assert_eq!(count(&mut detector, &loops(0.8, 0.2, 60, 0.0)), 0);
        assert!(detector.accumulated_degrees() > 0.0);
    }

    #[test]
    fn test_tilted_plane() {
        let mut detector = CircularDetector::new(params());
        assert_eq!(count(&mut detector, &loops(3.0, 0.2, 60, 1.0)), 3);
    }

    #[test]
    fn test_direction_is_signed() {
        let mut detector = CircularDetector::new(params());
        let mut points = loops(0.5, 0.2, 60, 0.0);
        for p in points.iter_mut() {
            p.y = -p.y;
        }
        count(&mut detector, &points);
        assert!(detector.accumulated_degrees() < 0.0);
    }

    #[test]
    fn test_slow_loops_count() {
        // Six seconds per rotation at 60 Hz
        let mut detector = CircularDetector::new(params());
        let reps = detect(&mut detector, &loops(3.0, 0.15, 360, 0.0));
        assert_eq!(reps.len(), 3);
        for rep in &reps {
            assert!((rep.amplitude - 0.15).abs() < 0.015, "amplitude {}", rep.amplitude);
        }
    }

    #[test]
    fn test_amplitude_is_loop_radius() {
        let mut detector = CircularDetector::new(params());
        let reps = detect(&mut detector, &loops(3.0, 0.05, 60, 0.0));
        assert_eq!(reps.len(), 3);
        assert!(reps.iter().all(|r| (r.amplitude - 0.05).abs() < 0.01));
        assert_eq!(reps[1].start, reps[0].end);
    }

    #[test]
    fn test_rotation_detector_integrates_gyro() {
        let mut detector = RotationDetector::new(params(), 0.5, 5);
        // One turn per second about z
        let rate = Vector3::new(0.05, -0.02, 2.0 * PI);
        let reps = (0..=200)
            .filter_map(|i| detector.update(rate, Mark::new(i, i as f64 / 60.0)))
            .filter(|d| matches!(d, Detection::Accepted(_)))
            .count();
        assert_eq!(reps, 3);
    }
}
