//! Engine configuration.

use serde::{Deserialize, Serialize};

use motus_core::{Error, Modality, Result, DEFAULT_BUFFER_CAPACITY};
use motus_reps::{CameraInput, QualityConfig, RomConfig, SegmentationConfig, ThresholdConfig};
use motus_signal::SparcConfig;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-modality sample buffers
    pub buffer: BufferConfig,

    /// Detector tuning, one table per movement profile
    pub segmentation: SegmentationConfig,

    /// Adaptive rep threshold
    pub threshold: ThresholdConfig,

    /// Per-rep quality weights
    pub quality: QualityConfig,

    /// Smoothness analysis
    pub sparc: SparcConfig,

    /// Range-of-motion formulas
    pub rom: RomConfig,

    /// Session defaults
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Samples kept per modality; the oldest is dropped on overflow
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Modality a session segments when none is given
    pub default_modality: Modality,

    /// How camera samples are interpreted
    pub camera: CameraInput,

    /// Joint confidence below which a keypoint counts as missing
    pub min_pose_confidence: f32,

    /// Samples retained for building the current rep's segment
    pub history_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_modality: Modality::WorldPose,
            camera: CameraInput::default(),
            min_pose_confidence: 0.5,
            history_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, with `MOTUS_` environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MOTUS").separator("__").try_parsing(true))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.try_deserialize().map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("MOTUS").separator("__").try_parsing(true))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.try_deserialize().map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer.capacity == 0 {
            return Err(Error::Config("buffer.capacity must be positive".into()));
        }
        if self.session.history_capacity == 0 {
            return Err(Error::Config("session.history_capacity must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.session.min_pose_confidence) {
            return Err(Error::Config("session.min_pose_confidence must be within [0, 1]".into()));
        }
        let q = &self.quality;
        let weights = q.amplitude_weight + q.consistency_weight + q.timing_weight;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(Error::Config(format!("quality weights sum to {weights}, expected 1")));
        }
        if self.rom.fallback_arm_length <= 0.0 || !self.rom.fallback_arm_length.is_finite() {
            return Err(Error::Config("rom.fallback_arm_length must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer.capacity, 4_000);
        assert_eq!(config.session.default_modality, Modality::WorldPose);
        assert_eq!(config.threshold.capacity, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_weights() {
        let mut config = EngineConfig::default();
        config.quality.timing_weight = 0.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file_overrides_sections() {
        let path = std::env::temp_dir().join(format!("motus-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[buffer]\ncapacity = 1200\n\n[sparc]\nmin_samples = 64").unwrap();
        drop(file);

        let config = EngineConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.buffer.capacity, 1200);
        assert_eq!(config.sparc.min_samples, 64);
        // Untouched sections keep their defaults
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = EngineConfig::from_file("/nonexistent/motus-config");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
