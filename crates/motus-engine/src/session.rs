//! Single-threaded session core.
//!
//! A [`MotionSession`] wires the sample buffers, the profile segmenter, the
//! adaptive threshold, the quality scorer, ROM and SPARC together. Samples go
//! in one at a time; an accepted repetition comes back as a [`RepEvent`].
//! [`crate::MotionEngine`] owns one of these inside its worker task.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use motus_core::{
    Error, JointAngleEstimator, Modality, ModalityBuffers, MotionSample, Position3D, Result, SampleValue, SessionId,
    Trajectory2D,
};
use motus_reps::{
    AdaptiveThreshold, CameraInput, Detection, Mark, MovementProfile, QualityScore, QualityScorer, RepCandidate,
    RepSegment, RomCalculator, Segmenter,
};
use motus_signal::{RepPartition, SparcAnalyzer, SparcResult};

use crate::config::EngineConfig;
use crate::summary::{RepEvent, SessionSummary};

/// Per-session choices made by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub profile: MovementProfile,
    /// Calibrated arm length (meters); `None` uses the configured fallback
    pub arm_length: Option<f64>,
    /// Overrides `session.default_modality`
    pub modality: Option<Modality>,
    /// Overrides `session.camera`
    pub camera: Option<CameraInput>,
    /// Calibrated shoulder–wrist length in normalized image units, used to
    /// infer a hidden elbow from pose frames
    pub image_arm_length: Option<f64>,
}

impl SessionOptions {
    pub fn new(profile: MovementProfile) -> Self {
        Self {
            profile,
            arm_length: None,
            modality: None,
            camera: None,
            image_arm_length: None,
        }
    }

    pub fn with_arm_length(mut self, arm_length: f64) -> Self {
        self.arm_length = Some(arm_length);
        self
    }

    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = Some(modality);
        self
    }

    pub fn with_camera(mut self, camera: CameraInput) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_image_arm_length(mut self, length: f64) -> Self {
        self.image_arm_length = Some(length);
        self
    }
}

/// A segmented sample kept until the rep it belongs to closes
#[derive(Debug, Clone)]
struct HistoryEntry {
    mark: Mark,
    sample: MotionSample,
    position: Option<Position3D>,
    joint_angle: Option<f64>,
}

struct ActiveSession {
    id: SessionId,
    options: SessionOptions,
    modality: Modality,
    camera: CameraInput,
    segmenter: Segmenter,
    threshold: AdaptiveThreshold,
    quality: QualityScorer,
    history: VecDeque<HistoryEntry>,
    segments: Vec<RepSegment>,
    quality_scores: Vec<QualityScore>,
    next_seq: u64,
    last_time: Option<f64>,
    started_at: DateTime<Utc>,
}

impl ActiveSession {
    fn new(id: SessionId, options: SessionOptions, config: &EngineConfig) -> Self {
        let modality = options.modality.unwrap_or(config.session.default_modality);
        let camera = options.camera.unwrap_or(config.session.camera);
        let mut segmenter = Segmenter::new(
            options.profile,
            modality,
            camera,
            config.segmentation.tuning(options.profile),
            config.session.min_pose_confidence,
        );
        if let Some(length) = options.image_arm_length {
            segmenter.set_limb_length(length);
        }
        let threshold = AdaptiveThreshold::new(segmenter.base_threshold(), config.threshold.clone());

        Self {
            id,
            options,
            modality,
            camera,
            segmenter,
            threshold,
            quality: QualityScorer::new(config.quality.clone()),
            history: VecDeque::new(),
            segments: Vec::new(),
            quality_scores: Vec::new(),
            next_seq: 0,
            last_time: None,
            started_at: Utc::now(),
        }
    }

    fn remember(&mut self, entry: HistoryEntry, capacity: usize) {
        if self.history.len() >= capacity.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }

    fn build_segment(&self, candidate: &RepCandidate) -> RepSegment {
        let entries: Vec<&HistoryEntry> = self
            .history
            .iter()
            .filter(|e| e.mark.seq >= candidate.start.seq && e.mark.seq <= candidate.end.seq)
            .collect();

        RepSegment {
            rep_number: self.segments.len() as u32 + 1,
            start_index: candidate.start.seq,
            end_index: candidate.end.seq,
            start_time: candidate.start.time,
            end_time: candidate.end.time,
            amplitude: candidate.amplitude,
            signal: self.segmenter.signal(),
            points: entries.iter().map(|e| e.sample.clone()).collect(),
            positions: entries.iter().filter_map(|e| e.position).collect(),
            joint_angles: entries.iter().filter_map(|e| e.joint_angle).collect(),
        }
    }

    fn accept(&mut self, candidate: &RepCandidate, threshold: f64, rom: &RomCalculator) -> RepEvent {
        let segment = self.build_segment(candidate);
        // Later candidates never start before this one
        self.history.retain(|e| e.mark.seq >= candidate.start.seq);

        let quality = self
            .quality
            .score(candidate.amplitude, threshold, candidate.duration_secs());
        self.threshold.record_accepted(candidate.amplitude);

        // Follow the rest position: the rep's closest approach to the anchor
        if let Some(anchor) = self.segmenter.anchor() {
            let rest = segment
                .positions
                .iter()
                .min_by(|a, b| a.distance_to(&anchor).total_cmp(&b.distance_to(&anchor)));
            if let Some(rest) = rest {
                self.segmenter.reseat_anchor(*rest);
            }
        }

        // World-pose ROM needs the full 3D segment and is computed at session end
        let rom_degrees = match self.modality {
            Modality::WorldPose => None,
            _ => Some(rom.segment_rom(&segment, self.options.profile, self.options.arm_length)),
        };

        tracing::debug!(
            session = %self.id,
            rep = segment.rep_number,
            amplitude = candidate.amplitude,
            threshold = self.threshold.current(),
            "rep accepted"
        );

        let event = RepEvent {
            session_id: self.id,
            rep_number: segment.rep_number,
            rom_degrees,
            amplitude: candidate.amplitude,
            quality,
            timestamp: candidate.end.time,
        };
        self.segments.push(segment);
        self.quality_scores.push(quality);
        event
    }
}

/// Synchronous motion analysis session
pub struct MotionSession {
    config: EngineConfig,
    buffers: Arc<ModalityBuffers>,
    rom: RomCalculator,
    sparc: SparcAnalyzer,
    active: Option<ActiveSession>,
}

impl MotionSession {
    pub fn new(config: EngineConfig) -> Self {
        let buffers = Arc::new(ModalityBuffers::new(config.buffer.capacity));
        Self::with_buffers(config, buffers)
    }

    /// Build a session over buffers shared with the sample producers
    pub fn with_buffers(config: EngineConfig, buffers: Arc<ModalityBuffers>) -> Self {
        Self {
            rom: RomCalculator::new(config.rom.clone()),
            sparc: SparcAnalyzer::new(config.sparc.clone()),
            config,
            buffers,
            active: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &Arc<ModalityBuffers> {
        &self.buffers
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|s| s.id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn rep_count(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.segments.len())
    }

    /// Amplitude a candidate must reach to count, in the segmented signal's units
    pub fn current_threshold(&self) -> Option<f64> {
        self.active.as_ref().map(|s| s.threshold.current())
    }

    /// Begin a new session, discarding buffered samples and any session in
    /// progress
    pub fn start_session(&mut self, options: SessionOptions) -> SessionId {
        self.buffers.clear();
        let session = ActiveSession::new(SessionId::new(), options, &self.config);
        tracing::info!(
            session = %session.id,
            profile = ?session.options.profile,
            modality = ?session.modality,
            signal = ?session.segmenter.signal(),
            "session started"
        );
        let id = session.id;
        self.active = Some(session);
        id
    }

    /// Buffer a sample, then segment it
    pub fn ingest(&mut self, sample: MotionSample) -> Option<RepEvent> {
        self.buffers.push(sample.clone());
        self.process(&sample)
    }

    /// Segment a sample that is already buffered.
    ///
    /// Samples of other modalities, samples outside a session and pose frames
    /// too poor to measure leave every piece of session state untouched.
    pub fn process(&mut self, sample: &MotionSample) -> Option<RepEvent> {
        let capacity = self.config.session.history_capacity;
        let rom = &self.rom;
        let session = self.active.as_mut()?;
        if sample.modality != session.modality {
            return None;
        }

        let mark = Mark::new(session.next_seq, sample.timestamp);
        session.next_seq += 1;
        session.last_time = Some(sample.timestamp);

        let threshold = session.threshold.current();
        let step = session.segmenter.process(sample, mark, threshold)?;
        session.remember(
            HistoryEntry {
                mark,
                sample: sample.clone(),
                position: step.tracked_position,
                joint_angle: step.joint_angle,
            },
            capacity,
        );

        match step.detection? {
            Detection::Rejected { amplitude } => {
                tracing::debug!(amplitude, threshold, "rep candidate below threshold");
                session.threshold.record_rejection();
                None
            }
            Detection::Accepted(candidate) => Some(session.accept(&candidate, threshold, rom)),
        }
    }

    /// Close the session and compute everything deferred to its end
    pub fn end_session(&mut self) -> Result<SessionSummary> {
        let session = self.active.take().ok_or(Error::SessionNotActive)?;
        let profile = session.options.profile;
        let arm_length = session.options.arm_length;

        let rom_per_rep: Vec<f64> = session
            .segments
            .iter()
            .map(|segment| self.rom.segment_rom(segment, profile, arm_length))
            .collect();
        let (max_rom, average_rom) = SessionSummary::rom_aggregates(&rom_per_rep);
        let sparc = self.session_sparc(&session);
        let is_calibrated = arm_length.is_some_and(|l| l.is_finite() && l > 0.0);

        let summary = SessionSummary {
            session_id: session.id,
            profile,
            rep_count: session.segments.len(),
            rom_per_rep,
            max_rom,
            average_rom,
            sparc,
            quality_scores: session.quality_scores,
            is_calibrated,
            trend: session.threshold.trend(),
            segments: session.segments,
            started_at: session.started_at,
            ended_at: Utc::now(),
        };

        tracing::info!(
            session = %summary.session_id,
            reps = summary.rep_count,
            max_rom = summary.max_rom,
            smoothness = summary.sparc.overall_score,
            quality = summary.mean_quality(),
            duration_secs = summary.duration_secs(),
            "session ended"
        );
        Ok(summary)
    }

    /// Discard buffered samples and all per-session state. An active session
    /// restarts from scratch with the same options.
    pub fn reset(&mut self) {
        self.buffers.clear();
        if let Some(session) = self.active.as_mut() {
            tracing::debug!(session = %session.id, "session reset");
            *session = ActiveSession::new(session.id, session.options.clone(), &self.config);
        }
    }

    fn session_sparc(&mut self, session: &ActiveSession) -> SparcResult {
        let bounds: Vec<(f64, f64)> = session.segments.iter().map(|s| (s.start_time, s.end_time)).collect();
        let reps = RepPartition::Bounds(&bounds);

        // Samples buffered after the last segmented one arrived past the barrier
        let Some(last_time) = session.last_time else {
            return SparcResult::neutral(bounds.len());
        };

        match (session.modality, session.camera) {
            (Modality::Inertial, _) => {
                let (times, speeds): (Vec<f64>, Vec<f64>) = self
                    .buffers
                    .snapshot(Modality::Inertial)
                    .iter()
                    .filter(|s| s.timestamp <= last_time)
                    .filter_map(|s| match &s.value {
                        SampleValue::Inertial(reading) => Some((s.timestamp, reading.angular_speed())),
                        _ => None,
                    })
                    .unzip();
                self.sparc.analyze_angular_speed(&times, &speeds, reps)
            }
            (Modality::CameraKeypoint, CameraInput::Pose { side, tracked }) => {
                let estimator = JointAngleEstimator::new(side, tracked, self.config.session.min_pose_confidence);
                let (positions, times): (Vec<Position3D>, Vec<f64>) = self
                    .buffers
                    .snapshot(Modality::CameraKeypoint)
                    .iter()
                    .filter(|s| s.timestamp <= last_time)
                    .filter_map(|s| match &s.value {
                        SampleValue::Pose(frame) => estimator.wrist(frame).map(|w| (w.to_position(), s.timestamp)),
                        _ => None,
                    })
                    .unzip();
                self.sparc
                    .analyze_trajectory(&Trajectory2D::from_positions(times, &positions), reps)
            }
            (modality, _) => {
                let (mut positions, mut times) = self.buffers.get(modality).snapshot_positions();
                let keep = times.partition_point(|t| *t <= last_time);
                positions.truncate(keep);
                times.truncate(keep);
                self.sparc
                    .analyze_trajectory(&Trajectory2D::from_positions(times, &positions), reps)
            }
        }
    }
}

impl Default for MotionSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motus_core::{InertialReading, Joint, Point2D, PoseFrame};
    use std::f64::consts::PI;

    /// Spiral from 0.05 m to 0.3 m radius over three turns at 60 Hz
    fn spiral(per_turn: usize) -> Vec<MotionSample> {
        let n = 3 * per_turn;
        (0..=n)
            .map(|i| {
                let f = i as f64 / n as f64;
                let r = 0.05 + 0.25 * f;
                let a = 2.0 * PI * 3.0 * f;
                MotionSample::position(Position3D::new(r * a.cos(), r * a.sin(), 0.0), i as f64 / 60.0).unwrap()
            })
            .collect()
    }

    /// Three 0.3 m raises then one 0.06 m raise, 1.5 s each, then rest
    fn raises() -> Vec<MotionSample> {
        let per = 90;
        let mut heights = Vec::new();
        for h in [0.3, 0.3, 0.3, 0.06] {
            for i in 0..per {
                heights.push(h * 0.5 * (1.0 - (2.0 * PI * i as f64 / per as f64).cos()));
            }
        }
        heights.extend(std::iter::repeat(0.0).take(31));
        heights
            .iter()
            .enumerate()
            .map(|(i, y)| MotionSample::position(Position3D::new(0.1, *y, -0.4), i as f64 / 60.0).unwrap())
            .collect()
    }

    fn run(session: &mut MotionSession, samples: &[MotionSample]) -> Vec<RepEvent> {
        samples.iter().filter_map(|s| session.ingest(s.clone())).collect()
    }

    #[test]
    fn test_growing_circles_rom() {
        let mut session = MotionSession::default();
        session.start_session(SessionOptions::new(MovementProfile::Circular).with_arm_length(0.6));

        let events = run(&mut session, &spiral(60));
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.rom_degrees.is_none()));
        assert_eq!(events.iter().map(|e| e.rep_number).collect::<Vec<_>>(), vec![1, 2, 3]);

        let summary = session.end_session().unwrap();
        assert_eq!(summary.rep_count, 3);
        assert!(summary.is_calibrated);
        assert!(summary.rom_per_rep.windows(2).all(|w| w[1] > w[0]), "{:?}", summary.rom_per_rep);
        let last = summary.rom_per_rep[2];
        assert!((last - 30.0).abs() < 3.0, "final ROM {last}");
        assert_eq!(summary.max_rom, last);
    }

    #[test]
    fn test_slow_circles_still_count() {
        for per_turn in [180, 240, 360] {
            let mut session = MotionSession::default();
            session.start_session(SessionOptions::new(MovementProfile::Circular).with_arm_length(0.6));

            let events = run(&mut session, &spiral(per_turn));
            assert_eq!(events.len(), 3, "{per_turn} samples per turn");

            let summary = session.end_session().unwrap();
            assert!(summary.rom_per_rep.windows(2).all(|w| w[1] > w[0]), "{:?}", summary.rom_per_rep);
            let last = summary.rom_per_rep[2];
            assert!((last - 30.0).abs() < 3.0, "final ROM {last} at {per_turn} samples per turn");
        }
    }

    #[test]
    fn test_stationary_session_is_neutral() {
        let mut session = MotionSession::default();
        session.start_session(SessionOptions::new(MovementProfile::Pendulum));
        let samples: Vec<MotionSample> = (0..40)
            .map(|i| MotionSample::position(Position3D::new(0.2, 1.1, -0.3), i as f64 / 60.0).unwrap())
            .collect();
        assert!(run(&mut session, &samples).is_empty());

        let summary = session.end_session().unwrap();
        assert_eq!(summary.rep_count, 0);
        assert_eq!(summary.sparc.overall_score, 50.0);
        assert!(!summary.is_calibrated);
        assert_eq!((summary.max_rom, summary.average_rom), (0.0, 0.0));
    }

    #[test]
    fn test_small_rep_after_learning_rejected() {
        let mut session = MotionSession::default();
        session.start_session(SessionOptions::new(MovementProfile::Vertical));

        let events = run(&mut session, &raises());
        assert_eq!(events.len(), 3);
        assert!(session.current_threshold().unwrap() > 0.2);

        let summary = session.end_session().unwrap();
        assert_eq!(summary.rep_count, 3);
        assert_eq!(summary.rom_per_rep.len(), 3);
        assert_eq!(summary.quality_scores.len(), 3);
        assert_eq!(summary.segments.len(), 3);
        assert_eq!(summary.sparc.per_rep_scores.len(), 3);
        assert!(summary.rom_per_rep.iter().all(|r| (0.0..=180.0).contains(r)));
    }

    #[test]
    fn test_replay_after_reset_is_identical() {
        let samples = raises();

        let mut fresh = MotionSession::default();
        fresh.start_session(SessionOptions::new(MovementProfile::Vertical));
        run(&mut fresh, &samples);
        let expected = fresh.end_session().unwrap();

        let mut replayed = MotionSession::default();
        replayed.start_session(SessionOptions::new(MovementProfile::Vertical));
        run(&mut replayed, &samples[..200]);
        replayed.reset();
        assert_eq!(replayed.rep_count(), 0);
        run(&mut replayed, &samples);
        let actual = replayed.end_session().unwrap();

        assert_eq!(actual.rep_count, expected.rep_count);
        assert_eq!(actual.rom_per_rep, expected.rom_per_rep);
        assert_eq!(actual.quality_scores, expected.quality_scores);
        assert_eq!(actual.segments, expected.segments);
        assert_eq!(actual.sparc, expected.sparc);
    }

    #[test]
    fn test_segments_are_contiguous_and_numbered() {
        let mut session = MotionSession::default();
        session.start_session(SessionOptions::new(MovementProfile::Circular).with_arm_length(0.6));
        run(&mut session, &spiral(60));
        let summary = session.end_session().unwrap();

        for (i, segment) in summary.segments.iter().enumerate() {
            assert_eq!(segment.rep_number, i as u32 + 1);
            assert!(segment.start_index <= segment.end_index);
            assert_eq!(segment.points.len() as u64, segment.end_index - segment.start_index + 1);
            assert_eq!(segment.positions.len(), segment.points.len());
        }
        assert!(summary.segments.windows(2).all(|w| w[1].start_index == w[0].end_index));
    }

    #[test]
    fn test_end_without_session() {
        let mut session = MotionSession::default();
        assert_eq!(session.end_session().unwrap_err(), Error::SessionNotActive);
    }

    #[test]
    fn test_samples_outside_session_ignored() {
        let mut session = MotionSession::default();
        let sample = MotionSample::position(Position3D::new(0.0, 0.0, 0.0), 0.0).unwrap();
        assert!(session.ingest(sample.clone()).is_none());

        session.start_session(SessionOptions::new(MovementProfile::Vertical));
        let gyro = MotionSample::inertial(
            InertialReading::new(Position3D::new(0.0, 9.8, 0.0), Position3D::new(0.0, 0.0, 3.0)),
            0.1,
        )
        .unwrap();
        assert!(session.ingest(gyro).is_none());
        assert_eq!(session.buffers().get(Modality::Inertial).len(), 1);

        session.end_session().unwrap();
        assert!(session.ingest(sample).is_none());
        assert!(!session.is_active());
    }

    fn arm_frame(elevation_deg: f64) -> PoseFrame {
        let (s, c) = elevation_deg.to_radians().sin_cos();
        let shoulder = Point2D::new(0.5, 0.3);
        PoseFrame::new()
            .with_joint(Joint::RightShoulder, shoulder, 0.9)
            .with_joint(Joint::RightHip, Point2D::new(0.5, 0.7), 0.9)
            .with_joint(Joint::RightElbow, Point2D::new(0.5 + 0.15 * s, 0.3 + 0.15 * c), 0.9)
            .with_joint(Joint::RightWrist, Point2D::new(0.5 + 0.3 * s, 0.3 + 0.3 * c), 0.9)
    }

    #[test]
    fn test_camera_pose_session_reports_live_rom() {
        let mut session = MotionSession::default();
        session.start_session(
            SessionOptions::new(MovementProfile::Vertical)
                .with_modality(Modality::CameraKeypoint)
                .with_camera(CameraInput::default()),
        );

        let per = 90;
        let mut samples = Vec::new();
        for i in 0..(3 * per + 30) {
            let phase = 2.0 * PI * (i % per) as f64 / per as f64;
            let elevation = if i < 3 * per { 45.0 * (1.0 - phase.cos()) } else { 0.0 };
            samples.push(MotionSample::pose(arm_frame(elevation), i as f64 / 60.0).unwrap());
        }

        let events = run(&mut session, &samples);
        assert_eq!(events.len(), 3);
        for event in &events {
            let rom = event.rom_degrees.unwrap();
            assert!(rom > 75.0 && rom <= 90.5, "live ROM {rom}");
        }

        let summary = session.end_session().unwrap();
        assert_eq!(summary.rom_per_rep.len(), 3);
        assert!((0.0..=100.0).contains(&summary.sparc.overall_score));
    }
}
