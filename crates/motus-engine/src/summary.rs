//! Session outputs: live rep events and the end-of-session summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use motus_core::SessionId;
use motus_reps::{MovementProfile, QualityScore, RepSegment, Trend};
use motus_signal::SparcResult;

/// Published once per accepted repetition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepEvent {
    pub session_id: SessionId,
    pub rep_number: u32,
    /// `None` when ROM is deferred to session end (world-tracked pose)
    pub rom_degrees: Option<f64>,
    /// Detector amplitude in the segmented signal's units
    pub amplitude: f64,
    pub quality: QualityScore,
    /// Sample time of the rep's closing sample (seconds)
    pub timestamp: f64,
}

/// Everything a finished session produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub profile: MovementProfile,
    pub rep_count: usize,
    /// One entry per rep, in rep-number order
    pub rom_per_rep: Vec<f64>,
    pub max_rom: f64,
    pub average_rom: f64,
    pub sparc: SparcResult,
    /// One entry per rep, in rep-number order
    pub quality_scores: Vec<QualityScore>,
    /// Whether ROM used a caller-supplied arm length rather than the fallback
    pub is_calibrated: bool,
    /// Final amplitude trend of the adaptive threshold
    pub trend: Trend,
    pub segments: Vec<RepSegment>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Session-level ROM aggregates: `(max, average)`, both 0 without reps
    pub fn rom_aggregates(rom_per_rep: &[f64]) -> (f64, f64) {
        if rom_per_rep.is_empty() {
            return (0.0, 0.0);
        }
        let max = rom_per_rep.iter().copied().fold(0.0, f64::max);
        let average = rom_per_rep.iter().sum::<f64>() / rom_per_rep.len() as f64;
        (max, average)
    }

    pub fn duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn mean_quality(&self) -> f64 {
        if self.quality_scores.is_empty() {
            return 0.0;
        }
        self.quality_scores.iter().map(|q| q.composite).sum::<f64>() / self.quality_scores.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rom_aggregates() {
        assert_eq!(SessionSummary::rom_aggregates(&[]), (0.0, 0.0));
        let (max, average) = SessionSummary::rom_aggregates(&[20.0, 40.0, 30.0]);
        assert_eq!(max, 40.0);
        assert!((average - 30.0).abs() < 1e-12);
    }
}
