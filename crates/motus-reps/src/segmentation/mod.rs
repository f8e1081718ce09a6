//! Repetition segmentation.
//!
//! One [`Segmenter`] per session. It turns each incoming sample into the
//! scalar or vector the session's profile cares about and drives exactly one
//! of three state machines:
//!
//! | Profile / input                  | Signal              | Detector          |
//! |----------------------------------|---------------------|-------------------|
//! | Circular, positional             | radial vector       | circular          |
//! | Circular, inertial               | dominant-axis rate  | rotation          |
//! | Vertical / Horizontal            | up / lateral axis   | peak-valley       |
//! | Pendulum / Mixed, positional     | reach from anchor   | peak-valley       |
//! | any non-circular, pose frames    | joint angle         | peak-valley       |
//! | any non-circular, inertial       | dominant-axis rate  | direction reversal|

pub mod circular;
pub mod peak_valley;
pub mod reversal;

pub use circular::*;
pub use peak_valley::*;
pub use reversal::*;

use serde::{Deserialize, Serialize};

use motus_core::{
    JointAngleEstimator, Modality, MotionSample, Position3D, SampleValue, Side, TrackedJoint,
};

use crate::profile::{MovementProfile, ProfileTuning};

/// Position of a sample in the session stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// Session-wide monotonic sample sequence number
    pub seq: u64,
    pub time: f64,
}

impl Mark {
    pub fn new(seq: u64, time: f64) -> Self {
        Self { seq, time }
    }
}

/// A completed movement that passed the detector's own checks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepCandidate {
    /// Size of the movement in the detector's signal units
    pub amplitude: f64,
    pub start: Mark,
    pub end: Mark,
}

impl RepCandidate {
    pub fn new(amplitude: f64, start: Mark, end: Mark) -> Self {
        Self { amplitude, start, end }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end.time - self.start.time).max(0.0)
    }
}

/// Detector verdict on a completed movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    Accepted(RepCandidate),
    /// Amplitude fell below the adaptive threshold
    Rejected { amplitude: f64 },
}

/// The quantity a detector segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// Up axis (world `y`, or `-y` in image space)
    Height,
    /// Horizontal `x` axis
    Lateral,
    /// Distance from the rest anchor
    Reach,
    /// Tracked joint angle (degrees)
    JointAngle,
    /// Loop radius about the mean of the rep's positions
    Orbit,
    /// Swept angle of an inertial half swing (degrees)
    Swing,
    /// Swept angle of an inertial loop (degrees)
    Rotation,
}

impl SignalKind {
    pub fn is_angular(&self) -> bool {
        matches!(self, SignalKind::JointAngle | SignalKind::Swing | SignalKind::Rotation)
    }
}

/// How camera samples are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraInput {
    /// One tracked keypoint per sample
    Keypoint,
    /// Full pose frames; the tracked joint's angle is segmented
    Pose { side: Side, tracked: TrackedJoint },
}

impl Default for CameraInput {
    fn default() -> Self {
        CameraInput::Pose {
            side: Side::default(),
            tracked: TrackedJoint::default(),
        }
    }
}

/// One repetition, with owned copies of its samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepSegment {
    /// 1-based, strictly increasing within a session
    pub rep_number: u32,
    pub start_index: u64,
    pub end_index: u64,
    pub start_time: f64,
    pub end_time: f64,
    pub amplitude: f64,
    pub signal: SignalKind,
    pub points: Vec<MotionSample>,
    /// Tracked position per point (device, keypoint or wrist)
    pub positions: Vec<Position3D>,
    /// Joint angle per point in joint-angle mode
    pub joint_angles: Vec<f64>,
}

impl RepSegment {
    /// `(timestamp, rotation rate)` of the inertial points
    pub fn rotation_rates(&self) -> (Vec<f64>, Vec<Position3D>) {
        self.points
            .iter()
            .filter_map(|s| match &s.value {
                SampleValue::Inertial(r) => Some((s.timestamp, r.rotation_rate)),
                _ => None,
            })
            .unzip()
    }
}

/// What the segmenter extracted from one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStep {
    pub tracked_position: Option<Position3D>,
    pub joint_angle: Option<f64>,
    pub detection: Option<Detection>,
}

#[derive(Debug, Clone)]
enum Detector {
    PeakValley(PeakValleyDetector),
    Circular(CircularDetector),
    Rotation(RotationDetector),
    Reversal(ReversalDetector),
}

/// Profile-driven segmentation front end
#[derive(Debug, Clone)]
pub struct Segmenter {
    modality: Modality,
    camera: CameraInput,
    signal: SignalKind,
    base_threshold: f64,
    detector: Detector,
    estimator: Option<JointAngleEstimator>,
    anchor: Option<Position3D>,
}

impl Segmenter {
    pub fn new(
        profile: MovementProfile,
        modality: Modality,
        camera: CameraInput,
        tuning: &ProfileTuning,
        min_confidence: f32,
    ) -> Self {
        let signal = select_signal(profile, modality, camera);

        let detector = match signal {
            SignalKind::Orbit => Detector::Circular(CircularDetector::new(circular_params(tuning))),
            SignalKind::Rotation => Detector::Rotation(RotationDetector::new(
                circular_params(tuning),
                tuning.smoothing_alpha,
                tuning.axis_warmup_samples,
            )),
            SignalKind::Swing => Detector::Reversal(ReversalDetector::new(ReversalParams {
                smoothing_alpha: tuning.smoothing_alpha,
                min_velocity: tuning.min_velocity,
                min_displacement_deg: tuning.min_displacement_deg,
                significance_deg: tuning.angle_significance,
                cooldown_secs: tuning.cooldown_secs,
                directionality: tuning.directionality,
                axis_warmup: tuning.axis_warmup_samples,
            })),
            SignalKind::JointAngle => Detector::PeakValley(PeakValleyDetector::new(PeakValleyParams {
                smoothing_alpha: tuning.smoothing_alpha,
                delta_threshold: tuning.angle_delta_threshold,
                peak_drop_fraction: tuning.peak_drop_fraction,
                cooldown_secs: tuning.cooldown_secs,
                significance: tuning.angle_significance,
                directionality: tuning.directionality,
            })),
            SignalKind::Height | SignalKind::Lateral | SignalKind::Reach => {
                Detector::PeakValley(PeakValleyDetector::new(PeakValleyParams {
                    smoothing_alpha: tuning.smoothing_alpha,
                    delta_threshold: tuning.delta_threshold,
                    peak_drop_fraction: tuning.peak_drop_fraction,
                    cooldown_secs: tuning.cooldown_secs,
                    significance: tuning.movement_significance,
                    directionality: tuning.directionality,
                }))
            }
        };

        let estimator = match (modality, camera) {
            (Modality::CameraKeypoint, CameraInput::Pose { side, tracked }) => {
                Some(JointAngleEstimator::new(side, tracked, min_confidence))
            }
            _ => None,
        };

        let base_threshold = if signal.is_angular() {
            tuning.angle_base_threshold
        } else {
            tuning.base_threshold
        };

        Self {
            modality,
            camera,
            signal,
            base_threshold,
            detector,
            estimator,
            anchor: None,
        }
    }

    pub fn signal(&self) -> SignalKind {
        self.signal
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Base amplitude threshold in this segmenter's signal units
    pub fn base_threshold(&self) -> f64 {
        self.base_threshold
    }

    /// Rest position reach distances are measured from
    pub fn anchor(&self) -> Option<Position3D> {
        self.anchor
    }

    /// Calibrated shoulder–wrist length in image units for pose frames
    pub fn set_limb_length(&mut self, length: f64) {
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.set_limb_length(length);
        }
    }

    /// Move the rest anchor used by reach signals
    pub fn reseat_anchor(&mut self, position: Position3D) {
        if self.signal == SignalKind::Reach {
            self.anchor = Some(position);
        }
    }

    /// Feed one sample. Returns `None` when the sample carries nothing this
    /// segmenter can use (other modality, wrong payload, unusable pose).
    pub fn process(&mut self, sample: &MotionSample, mark: Mark, threshold: f64) -> Option<SegmentStep> {
        if sample.modality != self.modality {
            return None;
        }

        match (&sample.value, self.camera) {
            (SampleValue::Inertial(reading), _) => {
                let rate = reading.rotation_rate.to_vector();
                let detection = match &mut self.detector {
                    Detector::Rotation(d) => d.update(rate, mark),
                    Detector::Reversal(d) => d.update(rate, mark, threshold),
                    _ => None,
                };
                Some(SegmentStep {
                    tracked_position: None,
                    joint_angle: None,
                    detection,
                })
            }
            (SampleValue::Position(position), _) => Some(self.process_position(*position, false, mark, threshold)),
            (SampleValue::Keypoint(point), CameraInput::Keypoint) => {
                Some(self.process_position(point.to_position(), true, mark, threshold))
            }
            (SampleValue::Pose(frame), CameraInput::Pose { .. }) => {
                let estimator = self.estimator.as_mut()?;
                let wrist = estimator.wrist(frame).map(|w| w.to_position());

                if self.signal == SignalKind::Orbit {
                    let wrist = wrist?;
                    return Some(self.process_position(wrist, true, mark, threshold));
                }

                let reading = estimator.measure(frame)?;
                let detection = match &mut self.detector {
                    Detector::PeakValley(d) => d.update(reading.degrees, mark, threshold),
                    _ => None,
                };
                Some(SegmentStep {
                    tracked_position: wrist,
                    joint_angle: Some(reading.degrees),
                    detection,
                })
            }
            _ => None,
        }
    }

    fn process_position(&mut self, position: Position3D, image_space: bool, mark: Mark, threshold: f64) -> SegmentStep {
        let detection = match &mut self.detector {
            Detector::Circular(d) => d.update(position.to_vector(), mark),
            Detector::PeakValley(d) => {
                let value = match self.signal {
                    SignalKind::Height if image_space => -position.y,
                    SignalKind::Height => position.y,
                    SignalKind::Lateral => position.x,
                    _ => {
                        let anchor = *self.anchor.get_or_insert(position);
                        position.distance_to(&anchor)
                    }
                };
                d.update(value, mark, threshold)
            }
            _ => None,
        };

        SegmentStep {
            tracked_position: Some(position),
            joint_angle: None,
            detection,
        }
    }

    pub fn reset(&mut self) {
        match &mut self.detector {
            Detector::PeakValley(d) => d.reset(),
            Detector::Circular(d) => d.reset(),
            Detector::Rotation(d) => d.reset(),
            Detector::Reversal(d) => d.reset(),
        }
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.reset();
        }
        self.anchor = None;
    }
}

fn select_signal(profile: MovementProfile, modality: Modality, camera: CameraInput) -> SignalKind {
    let pose_frames = modality == Modality::CameraKeypoint && matches!(camera, CameraInput::Pose { .. });
    match (profile, modality) {
        (MovementProfile::Circular, Modality::Inertial) => SignalKind::Rotation,
        (MovementProfile::Circular, _) => SignalKind::Orbit,
        (_, Modality::Inertial) => SignalKind::Swing,
        _ if pose_frames => SignalKind::JointAngle,
        (MovementProfile::Vertical, _) => SignalKind::Height,
        (MovementProfile::Horizontal, _) => SignalKind::Lateral,
        (MovementProfile::Pendulum | MovementProfile::Mixed, _) => SignalKind::Reach,
    }
}

fn circular_params(tuning: &ProfileTuning) -> CircularParams {
    CircularParams {
        rotation_for_rep_deg: tuning.rotation_for_rep_deg,
        cooldown_secs: tuning.cooldown_secs,
        significance: tuning.movement_significance,
        centroid_alpha: tuning.centroid_alpha,
        normal_blend: tuning.normal_blend,
    }
}
