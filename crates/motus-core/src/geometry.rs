//! Geometric utilities: best-fit axis plane projection and joint angles.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Point2D, Position3D};

/// Ranges below this are treated as "no motion" along an axis (meters)
const DEGENERATE_RANGE: f64 = 1e-9;

/// Axis-aligned plane a trajectory is projected onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Plane {
    #[default]
    XY,
    XZ,
    YZ,
}

impl Plane {
    pub fn project(&self, p: &Position3D) -> Point2D {
        match self {
            Plane::XY => Point2D::new(p.x, p.y),
            Plane::XZ => Point2D::new(p.x, p.z),
            Plane::YZ => Point2D::new(p.y, p.z),
        }
    }
}

/// Axis-aligned bounding box in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3D {
    pub min: Position3D,
    pub max: Position3D,
}

impl BoundingBox3D {
    pub fn from_points(points: &[Position3D]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut min = Position3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Position3D::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);

        for p in points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some(Self { min, max })
    }

    /// Per-axis extent `(x, y, z)`
    pub fn ranges(&self) -> (f64, f64, f64) {
        (
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }
}

/// A trajectory flattened onto its most informative plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedTrajectory {
    pub plane: Plane,
    pub points: Vec<Point2D>,
}

/// Chooses the plane spanned by the two axes with the largest range and
/// drops the least-informative (smallest range) axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneProjector;

impl PlaneProjector {
    pub fn best_plane(points: &[Position3D]) -> Plane {
        if points.len() < 2 {
            return Plane::XY;
        }

        let Some(bbox) = BoundingBox3D::from_points(points) else {
            return Plane::XY;
        };
        let (rx, ry, rz) = bbox.ranges();

        if !(rx.is_finite() && ry.is_finite() && rz.is_finite())
            || rx.max(ry).max(rz) < DEGENERATE_RANGE
        {
            return Plane::XY;
        }

        // Drop the smallest-range axis; ties keep XY, then XZ.
        if rz <= rx && rz <= ry {
            Plane::XY
        } else if ry <= rx && ry <= rz {
            Plane::XZ
        } else {
            Plane::YZ
        }
    }

    pub fn project(points: &[Position3D]) -> ProjectedTrajectory {
        let plane = Self::best_plane(points);
        ProjectedTrajectory {
            plane,
            points: points.iter().map(|p| plane.project(p)).collect(),
        }
    }
}

/// Interior angle at `vertex` of the triangle `a, vertex, c` in degrees,
/// by the law of cosines
pub fn three_point_angle(a: &Point2D, vertex: &Point2D, c: &Point2D) -> Result<f64> {
    let p = vertex.distance_to(a);
    let q = vertex.distance_to(c);
    let r = a.distance_to(c);

    if p < 1e-10 || q < 1e-10 {
        return Err(Error::DegenerateGeometry("zero-length body segment".into()));
    }

    let cos = ((p * p + q * q - r * r) / (2.0 * p * q)).clamp(-1.0, 1.0);
    let degrees = cos.acos().to_degrees();
    if degrees.is_finite() {
        Ok(degrees)
    } else {
        Err(Error::NumericInstability("joint angle".into()))
    }
}

/// Locate the elbow from shoulder, wrist and segment lengths by intersecting
/// the two circles centred on shoulder and wrist.
///
/// Of the two solutions the lower one on screen (larger image `y`) is used.
pub fn try_infer_elbow(shoulder: &Point2D, wrist: &Point2D, upper: f64, fore: f64) -> Result<Point2D> {
    let d = shoulder.distance_to(wrist);
    if d < 1e-10 || upper <= 0.0 || fore <= 0.0 {
        return Err(Error::DegenerateGeometry("cannot infer elbow from zero lengths".into()));
    }

    let tolerance = 1e-9 * (upper + fore);
    if d > upper + fore + tolerance || d < (upper - fore).abs() - tolerance {
        return Err(Error::DegenerateGeometry(format!(
            "shoulder-wrist distance {d:.4} outside [{:.4}, {:.4}]",
            (upper - fore).abs(),
            upper + fore
        )));
    }

    let along = (d * d + upper * upper - fore * fore) / (2.0 * d);
    let h = (upper * upper - along * along).max(0.0).sqrt();

    let ux = (wrist.x - shoulder.x) / d;
    let uy = (wrist.y - shoulder.y) / d;
    let base = Point2D::new(shoulder.x + along * ux, shoulder.y + along * uy);

    let first = Point2D::new(base.x - h * uy, base.y + h * ux);
    let second = Point2D::new(base.x + h * uy, base.y - h * ux);
    Ok(if first.y >= second.y { first } else { second })
}

/// Elbow inference that falls back to the shoulder–wrist midpoint when the
/// segment lengths cannot form a triangle
pub fn infer_elbow(shoulder: &Point2D, wrist: &Point2D, upper: f64, fore: f64) -> Point2D {
    match try_infer_elbow(shoulder, wrist, upper, fore) {
        Ok(elbow) => elbow,
        Err(e) => {
            tracing::debug!("elbow inference fell back to midpoint: {}", e);
            shoulder.midpoint(wrist)
        }
    }
}
