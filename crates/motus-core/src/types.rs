//! Fundamental types for the Motus engine.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pose::PoseFrame;

/// Identifier of one exercise attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensing modality a sample was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// Accelerometer + gyroscope
    Inertial,
    /// World-tracked 3D device pose
    WorldPose,
    /// Camera-derived 2D body keypoints
    CameraKeypoint,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Inertial, Modality::WorldPose, Modality::CameraKeypoint];

    pub fn index(&self) -> usize {
        match self {
            Modality::Inertial => 0,
            Modality::WorldPose => 1,
            Modality::CameraKeypoint => 2,
        }
    }
}

/// 3D position in the world frame (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn origin() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 2D point, either a projected trajectory point or a normalized image
/// coordinate (x right, y down, both in `[0, 1]` for on-screen joints)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Lift into 3D on the `z = 0` plane
    pub fn to_position(&self) -> Position3D {
        Position3D::new(self.x, self.y, 0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One inertial measurement (device frame)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InertialReading {
    /// User acceleration (m/s², gravity removed)
    pub acceleration: Position3D,
    /// Rotation rate (rad/s)
    pub rotation_rate: Position3D,
}

impl InertialReading {
    pub fn new(acceleration: Position3D, rotation_rate: Position3D) -> Self {
        Self {
            acceleration,
            rotation_rate,
        }
    }

    /// Angular speed magnitude (rad/s)
    pub fn angular_speed(&self) -> f64 {
        self.rotation_rate.to_vector().norm()
    }

    pub fn is_finite(&self) -> bool {
        self.acceleration.is_finite() && self.rotation_rate.is_finite()
    }
}

/// Payload of a motion sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleValue {
    /// World-frame device position
    Position(Position3D),
    /// Single tracked keypoint in normalized image space
    Keypoint(Point2D),
    /// Full camera skeleton
    Pose(PoseFrame),
    /// Accelerometer + gyroscope reading
    Inertial(InertialReading),
}

impl SampleValue {
    pub fn is_finite(&self) -> bool {
        match self {
            SampleValue::Position(p) => p.is_finite(),
            SampleValue::Keypoint(p) => p.is_finite(),
            SampleValue::Pose(frame) => frame.is_finite(),
            SampleValue::Inertial(r) => r.is_finite(),
        }
    }

    fn accepted_by(&self, modality: Modality) -> bool {
        matches!(
            (modality, self),
            (Modality::WorldPose, SampleValue::Position(_))
                | (Modality::CameraKeypoint, SampleValue::Keypoint(_))
                | (Modality::CameraKeypoint, SampleValue::Pose(_))
                | (Modality::Inertial, SampleValue::Inertial(_))
        )
    }
}

/// One instantaneous, immutable observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub modality: Modality,
    pub value: SampleValue,
    /// Monotonic time in seconds
    pub timestamp: f64,
}

impl MotionSample {
    /// Build a sample, rejecting payloads that do not belong to the modality
    /// and non-finite values
    pub fn new(modality: Modality, value: SampleValue, timestamp: f64) -> Result<Self> {
        if !value.accepted_by(modality) {
            return Err(Error::InvalidInput(format!(
                "{modality:?} samples cannot carry this payload"
            )));
        }
        if !timestamp.is_finite() || !value.is_finite() {
            return Err(Error::InvalidInput("non-finite sample".into()));
        }
        Ok(Self {
            modality,
            value,
            timestamp,
        })
    }

    pub fn position(position: Position3D, timestamp: f64) -> Result<Self> {
        Self::new(Modality::WorldPose, SampleValue::Position(position), timestamp)
    }

    pub fn keypoint(point: Point2D, timestamp: f64) -> Result<Self> {
        Self::new(Modality::CameraKeypoint, SampleValue::Keypoint(point), timestamp)
    }

    pub fn pose(frame: PoseFrame, timestamp: f64) -> Result<Self> {
        Self::new(Modality::CameraKeypoint, SampleValue::Pose(frame), timestamp)
    }

    pub fn inertial(reading: InertialReading, timestamp: f64) -> Result<Self> {
        Self::new(Modality::Inertial, SampleValue::Inertial(reading), timestamp)
    }
}
