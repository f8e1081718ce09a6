//! Motion source interfaces.
//!
//! A [`MotionSource`] is the seam where platform sensors plug in: an inertial
//! unit, a world-tracking session or a pose-detection pipeline. The engine
//! only sees a stream of [`MotionSample`]s.
//!
//! - [`ReplaySource`] replays a recorded session, optionally in real time
//! - [`ChannelSource`] adapts a callback-driven producer through an mpsc
//!   channel

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

use motus_core::{Error, Modality, MotionSample, Result};

/// Trait for motion sample producers
#[async_trait]
pub trait MotionSource: Send + Sync {
    /// Human-readable name used in logs
    fn name(&self) -> &str;

    /// Modality every produced sample carries
    fn modality(&self) -> Modality;

    /// Start producing samples
    async fn start(&mut self) -> Result<()>;

    /// Stop producing samples
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is producing
    fn is_running(&self) -> bool;

    /// Next sample, `Ok(None)` once the source is exhausted
    async fn next_sample(&mut self) -> Result<Option<MotionSample>>;
}

/// Replays recorded samples
pub struct ReplaySource {
    name: String,
    modality: Modality,
    samples: VecDeque<MotionSample>,
    /// Playback speed multiplier; `None` replays as fast as possible
    speed: Option<f64>,
    last_timestamp: Option<f64>,
    is_running: bool,
}

impl ReplaySource {
    pub fn new(name: &str, modality: Modality, samples: Vec<MotionSample>) -> Result<Self> {
        if let Some(foreign) = samples.iter().find(|s| s.modality != modality) {
            return Err(Error::InvalidInput(format!(
                "replay of {modality:?} contains a {:?} sample",
                foreign.modality
            )));
        }
        Ok(Self {
            name: name.to_string(),
            modality,
            samples: samples.into(),
            speed: None,
            last_timestamp: None,
            is_running: false,
        })
    }

    /// Sleep between samples so playback follows the recorded timestamps
    pub fn with_realtime(mut self, speed: f64) -> Self {
        self.speed = (speed.is_finite() && speed > 0.0).then_some(speed);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

#[async_trait]
impl MotionSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    async fn start(&mut self) -> Result<()> {
        self.is_running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running
    }

    async fn next_sample(&mut self) -> Result<Option<MotionSample>> {
        if !self.is_running {
            return Err(Error::Source(format!("{} not started", self.name)));
        }
        let Some(sample) = self.samples.pop_front() else {
            return Ok(None);
        };

        if let (Some(speed), Some(last)) = (self.speed, self.last_timestamp) {
            let gap = (sample.timestamp - last) / speed;
            if gap > 0.0 {
                match Duration::try_from_secs_f64(gap) {
                    Ok(pause) => tokio::time::sleep(pause).await,
                    Err(e) => tracing::debug!(source = %self.name, gap, "not pacing replay: {}", e),
                }
            }
        }
        self.last_timestamp = Some(sample.timestamp);
        Ok(Some(sample))
    }
}

/// Receives samples pushed by a platform callback
pub struct ChannelSource {
    name: String,
    modality: Modality,
    rx: mpsc::Receiver<MotionSample>,
    is_running: bool,
}

impl ChannelSource {
    /// Returns the source and the sender the platform callback feeds
    pub fn new(name: &str, modality: Modality, capacity: usize) -> (Self, mpsc::Sender<MotionSample>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = Self {
            name: name.to_string(),
            modality,
            rx,
            is_running: false,
        };
        (source, tx)
    }
}

#[async_trait]
impl MotionSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    async fn start(&mut self) -> Result<()> {
        self.is_running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_running = false;
        self.rx.close();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running
    }

    async fn next_sample(&mut self) -> Result<Option<MotionSample>> {
        if !self.is_running {
            return Err(Error::Source(format!("{} not started", self.name)));
        }
        loop {
            // Closed and drained once every sender is gone
            let Some(sample) = self.rx.recv().await else {
                return Ok(None);
            };
            if sample.modality == self.modality {
                return Ok(Some(sample));
            }
            tracing::debug!(source = %self.name, modality = ?sample.modality, "skipping foreign sample");
        }
    }
}
