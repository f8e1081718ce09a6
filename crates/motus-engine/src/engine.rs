//! Real-time engine.
//!
//! Producers push samples from any thread through a [`SampleSink`]: the
//! sample lands in its modality's ring buffer and is forwarded over an
//! unbounded channel without ever awaiting. One worker task owns the
//! [`MotionSession`], drains the channel in order and publishes a
//! [`RepEvent`] for every accepted repetition, both on a broadcast channel and
//! to registered observers.
//!
//! Each forwarded sample carries the buffer generation it was written under.
//! A reset or session start processed between the write and the send clears
//! the buffer, so the worker skips samples from an older generation and
//! segmentation never sees a sample the buffer no longer holds.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use motus_core::{Error, Modality, ModalityBuffers, MotionSample, Result, SampleValue, SessionId};
use motus_reps::MovementProfile;

use crate::config::EngineConfig;
use crate::session::{MotionSession, SessionOptions};
use crate::source::MotionSource;
use crate::summary::{RepEvent, SessionSummary};

/// Rep events a slow subscriber may fall behind by before it lags
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type RepObserver = Box<dyn Fn(&RepEvent) + Send + Sync>;

enum WorkerMessage {
    Sample(MotionSample, u64),
    Start(SessionOptions, oneshot::Sender<SessionId>),
    End(oneshot::Sender<Result<SessionSummary>>),
    Reset(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable producer handle
#[derive(Clone)]
pub struct SampleSink {
    buffers: Arc<ModalityBuffers>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl SampleSink {
    /// Record one observation. Non-finite samples are dropped; a payload
    /// that does not belong to `modality` is an error.
    pub fn push_sample(&self, modality: Modality, value: SampleValue, timestamp: f64) -> Result<()> {
        if !timestamp.is_finite() || !value.is_finite() {
            tracing::debug!(?modality, timestamp, "dropping non-finite sample");
            return Ok(());
        }
        self.push(MotionSample::new(modality, value, timestamp)?)
    }

    pub fn push(&self, sample: MotionSample) -> Result<()> {
        if self.tx.is_closed() {
            return Err(Error::EngineStopped);
        }
        let generation = self.buffers.push(sample.clone());
        self.tx
            .send(WorkerMessage::Sample(sample, generation))
            .map_err(|_| Error::EngineStopped)
    }
}

/// Owns the analysis worker for one engine instance
pub struct MotionEngine {
    sink: SampleSink,
    events: broadcast::Sender<RepEvent>,
    observers: Arc<RwLock<Vec<RepObserver>>>,
    worker: JoinHandle<()>,
}

impl MotionEngine {
    /// Spawn the worker on the current tokio runtime
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let buffers = Arc::new(ModalityBuffers::new(config.buffer.capacity));
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let observers: Arc<RwLock<Vec<RepObserver>>> = Arc::new(RwLock::new(Vec::new()));

        let session = MotionSession::with_buffers(config, buffers.clone());
        let worker = tokio::spawn(run_worker(session, rx, events.clone(), observers.clone()));

        Ok(Self {
            sink: SampleSink { buffers, tx },
            events,
            observers,
            worker,
        })
    }

    pub fn sink(&self) -> SampleSink {
        self.sink.clone()
    }

    pub fn buffers(&self) -> &Arc<ModalityBuffers> {
        &self.sink.buffers
    }

    /// Point-in-time copy of one modality's buffer
    pub fn snapshot(&self, modality: Modality) -> Vec<MotionSample> {
        self.sink.buffers.snapshot(modality)
    }

    pub async fn start_session(&self, profile: MovementProfile, arm_length: Option<f64>) -> Result<SessionId> {
        let mut options = SessionOptions::new(profile);
        options.arm_length = arm_length;
        self.start_session_with(options).await
    }

    /// Start a session with explicit modality or camera overrides. Resolves
    /// once the worker has cleared the buffers and reset its state.
    pub async fn start_session_with(&self, options: SessionOptions) -> Result<SessionId> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerMessage::Start(options, reply))?;
        response.await.map_err(|_| Error::EngineStopped)
    }

    /// Non-blocking; see [`SampleSink::push_sample`]
    pub fn push_sample(&self, modality: Modality, value: SampleValue, timestamp: f64) -> Result<()> {
        self.sink.push_sample(modality, value, timestamp)
    }

    /// Close the session after every sample pushed before this call
    pub async fn end_session(&self) -> Result<SessionSummary> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerMessage::End(reply))?;
        response.await.map_err(|_| Error::EngineStopped)?
    }

    pub async fn reset(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerMessage::Reset(reply))?;
        response.await.map_err(|_| Error::EngineStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepEvent> {
        self.events.subscribe()
    }

    /// Register a callback run on the worker task for every accepted rep
    pub fn on_rep<F>(&self, observer: F)
    where
        F: Fn(&RepEvent) + Send + Sync + 'static,
    {
        self.observers.write().push(Box::new(observer));
    }

    /// Pump a source into this engine until it is exhausted, fails or the
    /// engine stops. The task yields the number of samples forwarded.
    pub fn attach_source<S>(&self, mut source: S) -> JoinHandle<u64>
    where
        S: MotionSource + 'static,
    {
        let sink = self.sink();
        tokio::spawn(async move {
            let mut forwarded = 0u64;
            if let Err(e) = source.start().await {
                tracing::warn!(source = source.name(), "motion source failed to start: {}", e);
                return forwarded;
            }

            loop {
                match source.next_sample().await {
                    Ok(Some(sample)) => match sink.push(sample) {
                        Ok(()) => forwarded += 1,
                        Err(Error::EngineStopped) => break,
                        Err(e) => tracing::warn!(source = source.name(), "rejected sample: {}", e),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(source = source.name(), "motion source error: {}", e);
                        break;
                    }
                }
            }

            if let Err(e) = source.stop().await {
                tracing::warn!(source = source.name(), "motion source failed to stop: {}", e);
            }
            forwarded
        })
    }

    /// Stop the worker once it has drained everything queued before this call
    pub async fn shutdown(self) {
        if self.sink.tx.send(WorkerMessage::Shutdown).is_ok() {
            let _ = self.worker.await;
        }
    }

    fn send(&self, message: WorkerMessage) -> Result<()> {
        self.sink.tx.send(message).map_err(|_| Error::EngineStopped)
    }
}

async fn run_worker(
    mut session: MotionSession,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    events: broadcast::Sender<RepEvent>,
    observers: Arc<RwLock<Vec<RepObserver>>>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Sample(sample, generation) => {
                if session.buffers().get(sample.modality).generation() != generation {
                    tracing::debug!(modality = ?sample.modality, "skipping sample written before a reset");
                    continue;
                }
                if let Some(event) = session.process(&sample) {
                    // No subscribers is not an error
                    let _ = events.send(event.clone());
                    for observer in observers.read().iter() {
                        observer(&event);
                    }
                }
            }
            WorkerMessage::Start(options, reply) => {
                let _ = reply.send(session.start_session(options));
            }
            WorkerMessage::End(reply) => {
                let _ = reply.send(session.end_session());
            }
            WorkerMessage::Reset(reply) => {
                session.reset();
                let _ = reply.send(());
            }
            WorkerMessage::Shutdown => break,
        }
    }
    tracing::debug!("engine worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReplaySource;
    use motus_core::Position3D;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Three turns of a widening spiral at 60 Hz
    fn spiral(per_turn: usize) -> Vec<MotionSample> {
        let n = 3 * per_turn;
        (0..=n)
            .map(|i| {
                let f = i as f64 / n as f64;
                let r = 0.05 + 0.25 * f;
                let a = 6.0 * PI * f;
                MotionSample::position(Position3D::new(r * a.cos(), r * a.sin(), 0.0), i as f64 / 60.0).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_engine_publishes_reps() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        let mut events = engine.subscribe();
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        engine.on_rep(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let id = engine.start_session(MovementProfile::Circular, Some(0.6)).await.unwrap();
        for sample in spiral(60) {
            engine.push_sample(sample.modality, sample.value, sample.timestamp).unwrap();
        }
        let summary = engine.end_session().await.unwrap();

        assert_eq!(summary.session_id, id);
        assert_eq!(summary.rep_count, 3);
        assert_eq!(observed.load(Ordering::SeqCst), 3);
        for expected in 1..=3 {
            let event = events.recv().await.unwrap();
            assert_eq!(event.rep_number, expected);
            assert_eq!(event.session_id, id);
            assert_eq!(event.rom_degrees, None);
        }
        assert_eq!(engine.snapshot(Modality::WorldPose).len(), 181);
    }

    #[tokio::test]
    async fn test_end_without_session() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.end_session().await.unwrap_err(), Error::SessionNotActive);
    }

    #[tokio::test]
    async fn test_non_finite_dropped_and_mismatch_rejected() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        engine.start_session(MovementProfile::Vertical, None).await.unwrap();

        let nan = SampleValue::Position(Position3D::new(f64::NAN, 0.0, 0.0));
        assert!(engine.push_sample(Modality::WorldPose, nan, 0.0).is_ok());
        let valid = SampleValue::Position(Position3D::new(0.0, 0.0, 0.0));
        assert!(engine.push_sample(Modality::WorldPose, valid.clone(), f64::INFINITY).is_ok());
        assert!(engine.buffers().get(Modality::WorldPose).is_empty());

        let result = engine.push_sample(Modality::Inertial, valid, 0.0);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reset_clears_buffers() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        engine.start_session(MovementProfile::Circular, None).await.unwrap();
        for sample in spiral(60).into_iter().take(50) {
            engine.sink().push(sample).unwrap();
        }
        engine.reset().await.unwrap();
        assert!(engine.buffers().get(Modality::WorldPose).is_empty());

        let summary = engine.end_session().await.unwrap();
        assert_eq!(summary.rep_count, 0);
    }

    #[tokio::test]
    async fn test_attached_replay_source() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        engine.start_session(MovementProfile::Circular, Some(0.6)).await.unwrap();

        // Four seconds per turn
        let source = ReplaySource::new("spiral", Modality::WorldPose, spiral(240)).unwrap();
        let forwarded = engine.attach_source(source).await.unwrap();
        assert_eq!(forwarded, 721);

        let summary = engine.end_session().await.unwrap();
        assert_eq!(summary.rep_count, 3);
    }

    #[tokio::test]
    async fn test_samples_written_before_reset_are_skipped() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        engine.start_session(MovementProfile::Circular, Some(0.6)).await.unwrap();

        // Buffer writes that a reset overtakes before they are forwarded
        let stale: Vec<(MotionSample, u64)> = spiral(60)
            .into_iter()
            .map(|sample| {
                let generation = engine.buffers().push(sample.clone());
                (sample, generation)
            })
            .collect();
        engine.reset().await.unwrap();
        for (sample, generation) in stale {
            engine.sink.tx.send(WorkerMessage::Sample(sample, generation)).unwrap();
        }

        let summary = engine.end_session().await.unwrap();
        assert_eq!(summary.rep_count, 0);
        assert!(engine.buffers().get(Modality::WorldPose).is_empty());
    }

    #[tokio::test]
    async fn test_stopped_engine() {
        let engine = MotionEngine::new(EngineConfig::default()).unwrap();
        let sink = engine.sink();
        engine.shutdown().await;

        let sample = MotionSample::position(Position3D::new(0.0, 0.0, 0.0), 0.0).unwrap();
        assert_eq!(sink.push(sample), Err(Error::EngineStopped));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.buffer.capacity = 0;
        assert!(matches!(MotionEngine::new(config), Err(Error::Config(_))));
    }
}
