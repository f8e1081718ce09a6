//! Camera pose keypoints and the joint-availability gate.
//!
//! Pose-model inference happens outside this crate; frames arrive as a
//! fixed set of optional joint observations. Formulas never touch a joint
//! directly: they go through [`PoseQuality`] and [`JointAngleEstimator`],
//! which decide whether an angle can be measured, inferred or must be
//! skipped.

use serde::{Deserialize, Serialize};

use crate::geometry::{infer_elbow, three_point_angle};
use crate::types::Point2D;

/// Upper-body joints used by the rehabilitation exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Joint {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftElbow = 3,
    RightElbow = 4,
    LeftWrist = 5,
    RightWrist = 6,
    LeftHip = 7,
    RightHip = 8,
}

impl Joint {
    pub const COUNT: usize = 9;

}

/// Body side being exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Side {
    Left,
    #[default]
    Right,
}

impl Side {
    pub fn shoulder(&self) -> Joint {
        match self {
            Side::Left => Joint::LeftShoulder,
            Side::Right => Joint::RightShoulder,
        }
    }

    pub fn elbow(&self) -> Joint {
        match self {
            Side::Left => Joint::LeftElbow,
            Side::Right => Joint::RightElbow,
        }
    }

    pub fn wrist(&self) -> Joint {
        match self {
            Side::Left => Joint::LeftWrist,
            Side::Right => Joint::RightWrist,
        }
    }

    pub fn hip(&self) -> Joint {
        match self {
            Side::Left => Joint::LeftHip,
            Side::Right => Joint::RightHip,
        }
    }
}

/// Joint whose angle is measured in camera mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackedJoint {
    /// Arm elevation: hip–shoulder–elbow
    #[default]
    Shoulder,
    /// Elbow flexion: shoulder–elbow–wrist
    Elbow,
}

/// A single detected joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointObservation {
    pub position: Point2D,
    pub confidence: f32,
}

/// One camera frame of joint detections
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseFrame {
    pub joints: [Option<JointObservation>; Joint::COUNT],
}

impl PoseFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_joint(mut self, joint: Joint, position: Point2D, confidence: f32) -> Self {
        self.set(joint, position, confidence);
        self
    }

    pub fn set(&mut self, joint: Joint, position: Point2D, confidence: f32) {
        self.joints[joint as usize] = Some(JointObservation {
            position,
            confidence,
        });
    }

    pub fn get(&self, joint: Joint) -> Option<&JointObservation> {
        self.joints[joint as usize].as_ref()
    }

    /// Position of a joint detected with at least `min_confidence`
    pub fn confident(&self, joint: Joint, min_confidence: f32) -> Option<Point2D> {
        self.get(joint)
            .filter(|obs| obs.confidence >= min_confidence)
            .map(|obs| obs.position)
    }

    pub fn is_finite(&self) -> bool {
        self.joints
            .iter()
            .flatten()
            .all(|obs| obs.position.is_finite() && obs.confidence.is_finite())
    }
}

/// Whether a frame supports an angle measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseQuality {
    /// Every required joint detected confidently
    Good,
    /// Elbow missing but inferable from shoulder and wrist
    Partial,
    /// Angle cannot be measured
    Poor,
}

impl PoseQuality {
    pub fn assess(frame: &PoseFrame, side: Side, tracked: TrackedJoint, min_confidence: f32) -> Self {
        let has = |joint: Joint| frame.confident(joint, min_confidence).is_some();

        let shoulder = has(side.shoulder());
        let elbow = has(side.elbow());
        let wrist = has(side.wrist());
        let hip = has(side.hip());

        let anchor = match tracked {
            TrackedJoint::Shoulder => shoulder && hip,
            TrackedJoint::Elbow => shoulder && wrist,
        };

        if !anchor {
            PoseQuality::Poor
        } else if elbow {
            PoseQuality::Good
        } else if shoulder && wrist {
            PoseQuality::Partial
        } else {
            PoseQuality::Poor
        }
    }

    pub fn is_usable(&self) -> bool {
        !matches!(self, PoseQuality::Poor)
    }
}

/// A measured joint angle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointAngleReading {
    /// Shoulder elevation or elbow flexion in degrees, `[0, 180]`
    pub degrees: f64,
    pub quality: PoseQuality,
}

/// Upper-arm share of the shoulder–wrist reach used for elbow inference
const UPPER_ARM_FRACTION: f64 = 0.55;

/// Measures the tracked joint angle frame by frame.
///
/// Elbow inference splits a limb length in image units into upper arm and
/// forearm. A calibrated length is used when one was given; otherwise the
/// longest shoulder–wrist reach seen so far stands in for it.
#[derive(Debug, Clone)]
pub struct JointAngleEstimator {
    side: Side,
    tracked: TrackedJoint,
    min_confidence: f32,
    max_reach: f64,
    calibrated_length: Option<f64>,
}

impl JointAngleEstimator {
    pub fn new(side: Side, tracked: TrackedJoint, min_confidence: f32) -> Self {
        Self {
            side,
            tracked,
            min_confidence,
            max_reach: 0.0,
            calibrated_length: None,
        }
    }

    /// Use a calibrated shoulder–wrist length (image units) for elbow
    /// inference. Non-positive or non-finite lengths are ignored.
    pub fn set_limb_length(&mut self, length: f64) {
        if length.is_finite() && length > 0.0 {
            self.calibrated_length = Some(length);
        } else {
            tracing::debug!(length, "ignoring invalid limb length");
        }
    }

    fn limb_length(&self) -> f64 {
        self.calibrated_length.unwrap_or(self.max_reach)
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn tracked(&self) -> TrackedJoint {
        self.tracked
    }

    pub fn wrist(&self, frame: &PoseFrame) -> Option<Point2D> {
        frame.confident(self.side.wrist(), self.min_confidence)
    }

    pub fn measure(&mut self, frame: &PoseFrame) -> Option<JointAngleReading> {
        let quality = PoseQuality::assess(frame, self.side, self.tracked, self.min_confidence);
        if !quality.is_usable() {
            return None;
        }

        let shoulder = frame.confident(self.side.shoulder(), self.min_confidence)?;
        let wrist = frame.confident(self.side.wrist(), self.min_confidence);

        if let Some(wrist) = wrist {
            self.max_reach = self.max_reach.max(shoulder.distance_to(&wrist));
        }

        let elbow = match frame.confident(self.side.elbow(), self.min_confidence) {
            Some(elbow) => elbow,
            None => {
                let wrist = wrist?;
                let limb = self.limb_length();
                let upper = limb * UPPER_ARM_FRACTION;
                let fore = limb * (1.0 - UPPER_ARM_FRACTION);
                infer_elbow(&shoulder, &wrist, upper, fore)
            }
        };

        let degrees = match self.tracked {
            TrackedJoint::Shoulder => {
                let hip = frame.confident(self.side.hip(), self.min_confidence)?;
                three_point_angle(&hip, &shoulder, &elbow).ok()?
            }
            TrackedJoint::Elbow => {
                let wrist = wrist?;
                180.0 - three_point_angle(&shoulder, &elbow, &wrist).ok()?
            }
        };

        Some(JointAngleReading {
            degrees: degrees.clamp(0.0, 180.0),
            quality,
        })
    }

    pub fn reset(&mut self) {
        self.max_reach = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm_frame(elbow: Option<Point2D>, wrist: Point2D) -> PoseFrame {
        let mut frame = PoseFrame::new()
            .with_joint(Joint::RightShoulder, Point2D::new(0.5, 0.3), 0.9)
            .with_joint(Joint::RightHip, Point2D::new(0.5, 0.7), 0.9)
            .with_joint(Joint::RightWrist, wrist, 0.9);
        if let Some(elbow) = elbow {
            frame.set(Joint::RightElbow, elbow, 0.9);
        }
        frame
    }

    #[test]
    fn test_quality_gate() {
        let good = arm_frame(Some(Point2D::new(0.7, 0.3)), Point2D::new(0.9, 0.3));
        assert_eq!(
            PoseQuality::assess(&good, Side::Right, TrackedJoint::Shoulder, 0.5),
            PoseQuality::Good
        );

        let partial = arm_frame(None, Point2D::new(0.9, 0.3));
        assert_eq!(
            PoseQuality::assess(&partial, Side::Right, TrackedJoint::Shoulder, 0.5),
            PoseQuality::Partial
        );

        let poor = PoseFrame::new().with_joint(Joint::RightShoulder, Point2D::new(0.5, 0.3), 0.9);
        assert_eq!(
            PoseQuality::assess(&poor, Side::Right, TrackedJoint::Shoulder, 0.5),
            PoseQuality::Poor
        );
    }

    #[test]
    fn test_low_confidence_joint_is_missing() {
        let frame = PoseFrame::new().with_joint(Joint::LeftWrist, Point2D::new(0.1, 0.1), 0.2);
        assert!(frame.confident(Joint::LeftWrist, 0.5).is_none());
        assert!(frame.confident(Joint::LeftWrist, 0.1).is_some());
    }

    #[test]
    fn test_shoulder_angle_horizontal_arm() {
        let mut estimator = JointAngleEstimator::new(Side::Right, TrackedJoint::Shoulder, 0.5);
        let frame = arm_frame(Some(Point2D::new(0.7, 0.3)), Point2D::new(0.9, 0.3));
        let reading = estimator.measure(&frame).unwrap();
        assert!((reading.degrees - 90.0).abs() < 1e-6);
        assert_eq!(reading.quality, PoseQuality::Good);
    }

    #[test]
    fn test_elbow_flexion_straight_arm() {
        let mut estimator = JointAngleEstimator::new(Side::Right, TrackedJoint::Elbow, 0.5);
        let frame = arm_frame(Some(Point2D::new(0.7, 0.3)), Point2D::new(0.9, 0.3));
        let reading = estimator.measure(&frame).unwrap();
        assert!(reading.degrees.abs() < 1e-6);
    }

    #[test]
    fn test_calibrated_limb_length_bends_inferred_elbow() {
        let frame = arm_frame(None, Point2D::new(0.8, 0.3));

        let mut reach_only = JointAngleEstimator::new(Side::Right, TrackedJoint::Shoulder, 0.5);
        let straight = reach_only.measure(&frame).unwrap();
        assert!((straight.degrees - 90.0).abs() < 1e-6);

        // Wrist at 0.3 of a 0.5 arm: the elbow must sit off the shoulder–wrist line
        let mut calibrated = JointAngleEstimator::new(Side::Right, TrackedJoint::Shoulder, 0.5);
        calibrated.set_limb_length(0.5);
        let bent = calibrated.measure(&frame).unwrap();
        assert!((bent.degrees - 90.0).abs() > 40.0, "{}", bent.degrees);

        calibrated.reset();
        assert_eq!(calibrated.measure(&frame).unwrap(), bent);

        let mut ignored = JointAngleEstimator::new(Side::Right, TrackedJoint::Shoulder, 0.5);
        ignored.set_limb_length(-1.0);
        assert!((ignored.measure(&frame).unwrap().degrees - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_inferred_elbow_straight_arm() {
        let mut estimator = JointAngleEstimator::new(Side::Right, TrackedJoint::Shoulder, 0.5);
        // First frame establishes the reach, elbow inferred on the line
        let frame = arm_frame(None, Point2D::new(0.9, 0.3));
        let reading = estimator.measure(&frame).unwrap();
        assert_eq!(reading.quality, PoseQuality::Partial);
        assert!((reading.degrees - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_poor_frame_yields_nothing() {
        let mut estimator = JointAngleEstimator::new(Side::Left, TrackedJoint::Elbow, 0.5);
        let frame = arm_frame(Some(Point2D::new(0.7, 0.3)), Point2D::new(0.9, 0.3));
        assert!(estimator.measure(&frame).is_none());
    }
}
