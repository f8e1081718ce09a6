//! Movement profiles and their per-profile tuning.
//!
//! A profile decides which ROM formula and which segmentation state machine
//! a session uses. Every per-exercise difference is plain data in
//! [`ProfileTuning`]; there is one detector per state machine, not one per
//! exercise.

use serde::{Deserialize, Serialize};

/// Shape of the prescribed movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementProfile {
    /// Arm swings out and back about the shoulder
    Pendulum,
    /// Hand traces a loop
    Circular,
    /// Raise and lower
    Vertical,
    /// Side to side
    Horizontal,
    /// Free-form reach
    Mixed,
}

impl MovementProfile {
    pub const ALL: [MovementProfile; 5] = [
        MovementProfile::Pendulum,
        MovementProfile::Circular,
        MovementProfile::Vertical,
        MovementProfile::Horizontal,
        MovementProfile::Mixed,
    ];

    pub fn is_circular(&self) -> bool {
        matches!(self, MovementProfile::Circular)
    }
}

/// Which turning points of a cycle count as a repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directionality {
    /// One rep per out-and-back, counted at the far turning point
    Unidirectional,
    /// Each half of the cycle is its own rep
    Bidirectional,
    /// One rep per full cycle, counted when it closes
    Cyclical,
}

/// Detector constants for one profile.
///
/// Positional quantities are in meters for world-pose input and normalized
/// image units for keypoints; angular quantities are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTuning {
    /// EMA factor for the segmented scalar
    pub smoothing_alpha: f64,
    /// Minimum rise/fall of a positional signal between turning points
    pub delta_threshold: f64,
    /// Minimum rise/fall of an angle signal between turning points
    pub angle_delta_threshold: f64,
    /// Fraction of the current swing the signal must fall back from its peak
    pub peak_drop_fraction: f64,
    /// Minimum time between two counted reps (seconds)
    pub cooldown_secs: f64,
    pub directionality: Directionality,
    /// Base amplitude threshold for positional signals
    pub base_threshold: f64,
    /// Base amplitude threshold for angle signals
    pub angle_base_threshold: f64,
    /// Per-sample positional displacement below which a sample is ignored
    pub movement_significance: f64,
    /// Per-sample angular displacement below which a sample is ignored
    pub angle_significance: f64,
    /// Accumulated rotation that completes one circular rep
    pub rotation_for_rep_deg: f64,
    /// EMA factor pulling the circular centroid toward each position
    pub centroid_alpha: f64,
    /// EMA factor re-orienting the circular plane normal
    pub normal_blend: f64,
    /// Peak rotation rate a swing must reach to count (rad/s)
    pub min_velocity: f64,
    /// Angle a swing must sweep to count (degrees)
    pub min_displacement_deg: f64,
    /// Inertial samples used to pick the dominant gyro axis
    pub axis_warmup_samples: usize,
}

impl Default for ProfileTuning {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.2,
            delta_threshold: 0.01,
            angle_delta_threshold: 3.0,
            peak_drop_fraction: 0.2,
            cooldown_secs: 0.4,
            directionality: Directionality::Unidirectional,
            base_threshold: 0.05,
            angle_base_threshold: 15.0,
            movement_significance: 0.002,
            angle_significance: 0.2,
            rotation_for_rep_deg: 340.0,
            centroid_alpha: 0.1,
            normal_blend: 0.1,
            min_velocity: 0.5,
            min_displacement_deg: 10.0,
            axis_warmup_samples: 10,
        }
    }
}

/// Tuning table, one entry per profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub pendulum: ProfileTuning,
    pub circular: ProfileTuning,
    pub vertical: ProfileTuning,
    pub horizontal: ProfileTuning,
    pub mixed: ProfileTuning,
}

impl SegmentationConfig {
    pub fn tuning(&self, profile: MovementProfile) -> &ProfileTuning {
        match profile {
            MovementProfile::Pendulum => &self.pendulum,
            MovementProfile::Circular => &self.circular,
            MovementProfile::Vertical => &self.vertical,
            MovementProfile::Horizontal => &self.horizontal,
            MovementProfile::Mixed => &self.mixed,
        }
    }

    pub fn tuning_mut(&mut self, profile: MovementProfile) -> &mut ProfileTuning {
        match profile {
            MovementProfile::Pendulum => &mut self.pendulum,
            MovementProfile::Circular => &mut self.circular,
            MovementProfile::Vertical => &mut self.vertical,
            MovementProfile::Horizontal => &mut self.horizontal,
            MovementProfile::Mixed => &mut self.mixed,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        let base = ProfileTuning::default();
        Self {
            pendulum: ProfileTuning {
                cooldown_secs: 0.5,
                ..base.clone()
            },
            circular: ProfileTuning {
                cooldown_secs: 0.3,
                directionality: Directionality::Cyclical,
                ..base.clone()
            },
            vertical: base.clone(),
            horizontal: ProfileTuning {
                directionality: Directionality::Bidirectional,
                cooldown_secs: 0.3,
                ..base.clone()
            },
            mixed: ProfileTuning {
                directionality: Directionality::Cyclical,
                ..base
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_profile_has_tuning() {
        let config = SegmentationConfig::default();
        for profile in MovementProfile::ALL {
            let tuning = config.tuning(profile);
            assert!(tuning.smoothing_alpha > 0.0 && tuning.smoothing_alpha <= 1.0);
            assert!(tuning.cooldown_secs >= 0.0);
        }
        assert_eq!(config.horizontal.directionality, Directionality::Bidirectional);
        assert_eq!(config.circular.rotation_for_rep_deg, 340.0);
    }

    #[test]
    fn test_tuning_mut_targets_profile() {
        let mut config = SegmentationConfig::default();
        config.tuning_mut(MovementProfile::Vertical).base_threshold = 0.2;
        assert_eq!(config.vertical.base_threshold, 0.2);
        assert_eq!(config.pendulum.base_threshold, 0.05);
    }
}
