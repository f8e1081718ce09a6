//! Range-of-motion calculation.
//!
//! Linear displacement is converted to an angle by treating the arm as a
//! rigid segment of length `L` pivoting at the shoulder:
//!
//! - Pendulum and linear profiles: the longest chord from the start point,
//!   `θ = 2·asin(min(1, d / 2L))`, `[0, 180]`
//! - Circular: the largest radius about a slowly drifting centroid,
//!   `θ = asin(min(1, r / L))`, `[0, 90]`
//! - Joint angle: excursion `max − min` of the measured angle
//! - Inertial: largest swept angle of the integrated rotation rate

use serde::{Deserialize, Serialize};

use motus_core::kinematics::integrate;
use motus_core::{ensure_finite, Error, PlaneProjector, Point2D, Position3D, Result};

use crate::profile::MovementProfile;
use crate::segmentation::{RepSegment, SignalKind};

/// Arm length assumed when no calibration was provided (meters)
pub const DEFAULT_ARM_LENGTH: f64 = 0.6;

/// Circular ROM formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CircularRomFormula {
    /// `asin(r_max / L)`
    #[default]
    MaxRadius,
    /// Path length over `L`, in radians
    ArcLength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomConfig {
    pub fallback_arm_length: f64,
    pub circular_formula: CircularRomFormula,
    /// EMA factor of the circular ROM centroid
    pub centroid_alpha: f64,
}

impl Default for RomConfig {
    fn default() -> Self {
        Self {
            fallback_arm_length: DEFAULT_ARM_LENGTH,
            circular_formula: CircularRomFormula::MaxRadius,
            centroid_alpha: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RomMethod {
    Chord,
    MaxRadius,
    ArcLength,
    JointExcursion,
    SweptAngle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RomResult {
    /// `[0, 180]`, or `[0, 90]` for circular formulas
    pub angle_degrees: f64,
    pub method: RomMethod,
}

/// Chord formula
pub fn try_chord_rom(points: &[Point2D], arm_length: f64) -> Result<f64> {
    let Some((first, rest)) = points.split_first() else {
        return Err(Error::InsufficientData {
            required: 2,
            available: 0,
        });
    };
    if rest.is_empty() {
        return Err(Error::InsufficientData {
            required: 2,
            available: 1,
        });
    }

    let max_chord = rest.iter().map(|p| first.distance_to(p)).fold(0.0, f64::max);
    let ratio = ensure_finite(max_chord / (2.0 * arm_length), "chord ratio")?;
    Ok((2.0 * ratio.min(1.0).asin()).to_degrees().clamp(0.0, 180.0))
}

/// Max-radius circular formula
pub fn try_max_radius_rom(points: &[Point2D], arm_length: f64, centroid_alpha: f64) -> Result<f64> {
    if points.len() < 3 {
        return Err(Error::InsufficientData {
            required: 3,
            available: points.len(),
        });
    }

    let n = points.len() as f64;
    let mut cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mut cy = points.iter().map(|p| p.y).sum::<f64>() / n;

    let mut max_radius: f64 = 0.0;
    for p in points {
        cx += (p.x - cx) * centroid_alpha;
        cy += (p.y - cy) * centroid_alpha;
        max_radius = max_radius.max(p.distance_to(&Point2D::new(cx, cy)));
    }

    let ratio = ensure_finite(max_radius / arm_length, "radius ratio")?;
    Ok(ratio.min(1.0).asin().to_degrees().clamp(0.0, 90.0))
}

/// Arc-length circular formula
pub fn try_arc_length_rom(points: &[Point2D], arm_length: f64) -> Result<f64> {
    if points.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: points.len(),
        });
    }
    let path: f64 = points.windows(2).map(|w| w[0].distance_to(&w[1])).sum();
    let radians = ensure_finite(path / arm_length, "arc angle")?;
    Ok(radians.to_degrees().clamp(0.0, 90.0))
}

/// Angular excursion of a measured joint angle
pub fn try_joint_excursion(angles: &[f64]) -> Result<f64> {
    if angles.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: angles.len(),
        });
    }
    let min = angles.iter().copied().fold(f64::INFINITY, f64::min);
    let max = angles.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(ensure_finite(max - min, "joint excursion")?.clamp(0.0, 180.0))
}

/// Largest |∫ω dt| about the segment's dominant rotation axis (degrees)
pub fn try_swept_angle(times: &[f64], rates: &[Position3D]) -> Result<f64> {
    if rates.len() < 2 || times.len() != rates.len() {
        return Err(Error::InsufficientData {
            required: 2,
            available: rates.len().min(times.len()),
        });
    }

    let totals = rates
        .iter()
        .fold(nalgebra::Vector3::<f64>::zeros(), |acc, r| acc + r.to_vector().abs());
    let axis = totals.iamax();
    let series: Vec<f64> = rates.iter().map(|r| r.to_vector()[axis]).collect();

    let swept = integrate(times, &series)
        .into_iter()
        .map(f64::abs)
        .fold(0.0, f64::max);
    Ok(ensure_finite(swept.to_degrees(), "swept angle")?.clamp(0.0, 180.0))
}

/// Resolve the arm length, falling back when uncalibrated or invalid
pub fn effective_arm_length(arm_length: Option<f64>, fallback: f64) -> f64 {
    match arm_length {
        Some(l) if l.is_finite() && l > 0.0 => l,
        Some(l) => {
            tracing::debug!(arm_length = l, "invalid arm length, using fallback");
            fallback
        }
        None => fallback,
    }
}

/// Segment → degrees
#[derive(Debug, Clone, Default)]
pub struct RomCalculator {
    config: RomConfig,
}

impl RomCalculator {
    pub fn new(config: RomConfig) -> Self {
        Self { config }
    }

    pub fn method_for(&self, profile: MovementProfile, signal: SignalKind) -> RomMethod {
        match signal {
            SignalKind::JointAngle => RomMethod::JointExcursion,
            SignalKind::Swing | SignalKind::Rotation => RomMethod::SweptAngle,
            _ if profile.is_circular() => match self.config.circular_formula {
                CircularRomFormula::MaxRadius => RomMethod::MaxRadius,
                CircularRomFormula::ArcLength => RomMethod::ArcLength,
            },
            _ => RomMethod::Chord,
        }
    }

    pub fn try_segment_rom(
        &self,
        segment: &RepSegment,
        profile: MovementProfile,
        arm_length: Option<f64>,
    ) -> Result<RomResult> {
        let method = self.method_for(profile, segment.signal);
        let arm = effective_arm_length(arm_length, self.config.fallback_arm_length);

        let angle_degrees = match method {
            RomMethod::JointExcursion => try_joint_excursion(&segment.joint_angles)?,
            RomMethod::SweptAngle => {
                let (times, rates) = segment.rotation_rates();
                try_swept_angle(&times, &rates)?
            }
            RomMethod::Chord | RomMethod::MaxRadius | RomMethod::ArcLength => {
                let planar = PlaneProjector::project(&segment.positions).points;
                match method {
                    RomMethod::MaxRadius => try_max_radius_rom(&planar, arm, self.config.centroid_alpha)?,
                    RomMethod::ArcLength => try_arc_length_rom(&planar, arm)?,
                    _ => try_chord_rom(&planar, arm)?,
                }
            }
        };

        Ok(RomResult {
            angle_degrees,
            method,
        })
    }

    /// ROM in degrees, 0 when it cannot be computed
    pub fn segment_rom(&self, segment: &RepSegment, profile: MovementProfile, arm_length: Option<f64>) -> f64 {
        match self.try_segment_rom(segment, profile, arm_length) {
            Ok(result) => result.angle_degrees,
            Err(e) => {
                tracing::debug!(rep = segment.rep_number, "ROM fell back to 0: {}", e);
                0.0
            }
        }
    }
}
