//! Bounded per-modality motion sample buffers.
//!
//! Each modality has its own ring buffer behind its own lock, so the three
//! sensor producers never contend with each other. Samples are stored in
//! fixed-size chunks; full chunks are frozen behind an `Arc` and shared with
//! readers. A snapshot takes the lock only to clone those handles and the
//! partly filled tail chunk, then copies the samples out after releasing
//! it, so a producer never waits on a full copy. Overflow drops the oldest
//! sample, never the newest.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::types::{Modality, MotionSample, Position3D, SampleValue};

/// Default capacity: a little over a minute at 60 Hz
pub const DEFAULT_BUFFER_CAPACITY: usize = 4_000;

/// Samples per frozen chunk
const CHUNK_LEN: usize = 64;

struct RingState {
    /// Full chunks, oldest first
    frozen: VecDeque<Arc<Vec<MotionSample>>>,
    /// Samples already evicted from the oldest frozen chunk
    head: usize,
    /// Chunk currently being filled
    tail: Vec<MotionSample>,
    len: usize,
    overflow: u64,
    generation: u64,
}

impl RingState {
    fn new() -> Self {
        Self {
            frozen: VecDeque::new(),
            head: 0,
            tail: Vec::with_capacity(CHUNK_LEN),
            len: 0,
            overflow: 0,
            generation: 0,
        }
    }

    fn evict_oldest(&mut self) {
        match self.frozen.front() {
            Some(oldest) => {
                self.head += 1;
                if self.head == oldest.len() {
                    self.frozen.pop_front();
                    self.head = 0;
                }
            }
            // Capacity below one chunk: everything lives in the tail
            None => {
                if !self.tail.is_empty() {
                    self.tail.remove(0);
                }
            }
        }
        self.len = self.len.saturating_sub(1);
        self.overflow += 1;
    }
}

/// Samples captured by a snapshot, copied out once the lock is released
struct Captured {
    frozen: Vec<Arc<Vec<MotionSample>>>,
    head: usize,
    tail: Vec<MotionSample>,
}

impl Captured {
    fn iter(&self) -> impl Iterator<Item = &MotionSample> {
        self.frozen
            .iter()
            .flat_map(|chunk| chunk.iter())
            .skip(self.head)
            .chain(self.tail.iter())
    }
}

/// Single-modality ring buffer
pub struct SampleBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(RingState::new()),
        }
    }

    /// Append a sample, evicting the oldest when full. Returns the buffer
    /// generation the sample was written under.
    pub fn push(&self, sample: MotionSample) -> u64 {
        let mut state = self.state.lock();
        if state.len == self.capacity {
            state.evict_oldest();
        }
        state.tail.push(sample);
        state.len += 1;
        if state.tail.len() == CHUNK_LEN {
            let full = std::mem::replace(&mut state.tail, Vec::with_capacity(CHUNK_LEN));
            state.frozen.push_back(Arc::new(full));
        }
        state.generation
    }

    fn capture(&self) -> Captured {
        let state = self.state.lock();
        Captured {
            frozen: state.frozen.iter().cloned().collect(),
            head: state.head,
            tail: state.tail.clone(),
        }
    }

    /// Point-in-time copy of every buffered sample, oldest first
    pub fn snapshot(&self) -> Vec<MotionSample> {
        self.capture().iter().cloned().collect()
    }

    /// Point-in-time copy of the positional samples and their timestamps.
    ///
    /// Keypoints are lifted onto `z = 0`; pose frames and inertial readings
    /// carry no single position and are skipped.
    pub fn snapshot_positions(&self) -> (Vec<Position3D>, Vec<f64>) {
        self.capture()
            .iter()
            .filter_map(|s| match &s.value {
                SampleValue::Position(p) => Some((*p, s.timestamp)),
                SampleValue::Keypoint(k) => Some((k.to_position(), s.timestamp)),
                _ => None,
            })
            .unzip()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples evicted since the last clear
    pub fn overflow_count(&self) -> u64 {
        self.state.lock().overflow
    }

    /// Bumped by every clear. A sample tagged with an older generation was
    /// written before the clear and is no longer buffered.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        *state = RingState::new();
        state.generation = generation;
    }
}

/// One ring buffer per modality
pub struct ModalityBuffers {
    buffers: [SampleBuffer; 3],
}

impl ModalityBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: [
                SampleBuffer::new(capacity),
                SampleBuffer::new(capacity),
                SampleBuffer::new(capacity),
            ],
        }
    }

    /// Route a sample to its modality's buffer; returns the write generation
    pub fn push(&self, sample: MotionSample) -> u64 {
        self.buffers[sample.modality.index()].push(sample)
    }

    pub fn get(&self, modality: Modality) -> &SampleBuffer {
        &self.buffers[modality.index()]
    }

    pub fn snapshot(&self, modality: Modality) -> Vec<MotionSample> {
        self.get(modality).snapshot()
    }

    pub fn clear(&self) {
        for buffer in &self.buffers {
            buffer.clear();
        }
    }
}

impl Default for ModalityBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InertialReading, Point2D};
    use std::sync::Arc;

    fn position_sample(i: usize) -> MotionSample {
        MotionSample::position(Position3D::new(i as f64, 0.0, 0.0), i as f64 * 0.01).unwrap()
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let buffer = SampleBuffer::new(3);
        for i in 0..5 {
            buffer.push(position_sample(i));
        }

        let (positions, timestamps) = buffer.snapshot_positions();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.overflow_count(), 2);
        assert_eq!(positions[0].x, 2.0);
        assert_eq!(positions[2].x, 4.0);
        assert!((timestamps[2] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_is_stable_copy() {
        let buffer = SampleBuffer::new(10);
        buffer.push(position_sample(0));
        let snapshot = buffer.snapshot();
        buffer.push(position_sample(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_eviction_across_chunks() {
        let buffer = SampleBuffer::new(100);
        for i in 0..250 {
            buffer.push(position_sample(i));
        }
        let (positions, _) = buffer.snapshot_positions();
        assert_eq!(positions.len(), 100);
        assert_eq!(buffer.overflow_count(), 150);
        assert!(positions.iter().enumerate().all(|(k, p)| p.x == (150 + k) as f64));
    }

    #[test]
    fn test_clear_bumps_generation() {
        let buffer = SampleBuffer::new(8);
        assert_eq!(buffer.push(position_sample(0)), 0);
        buffer.clear();
        assert_eq!(buffer.generation(), 1);
        assert_eq!(buffer.overflow_count(), 0);
        assert_eq!(buffer.push(position_sample(1)), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_snapshots_stay_ordered_under_concurrent_pushes() {
        let buffer = Arc::new(SampleBuffer::new(300));
        let producer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..20_000 {
                    buffer.push(position_sample(i));
                }
            })
        };

        for _ in 0..200 {
            let (positions, _) = buffer.snapshot_positions();
            assert!(positions.len() <= 300);
            assert!(positions.windows(2).all(|w| w[1].x == w[0].x + 1.0));
        }
        producer.join().unwrap();
        assert_eq!(buffer.snapshot().len(), 300);
    }

    #[test]
    fn test_routing_by_modality() {
        let buffers = ModalityBuffers::new(16);
        buffers.push(position_sample(0));
        buffers.push(MotionSample::keypoint(Point2D::new(0.2, 0.4), 0.0).unwrap());
        buffers.push(MotionSample::inertial(InertialReading::default(), 0.0).unwrap());
        buffers.push(MotionSample::inertial(InertialReading::default(), 0.1).unwrap());

        assert_eq!(buffers.get(Modality::WorldPose).len(), 1);
        assert_eq!(buffers.get(Modality::CameraKeypoint).len(), 1);
        assert_eq!(buffers.get(Modality::Inertial).len(), 2);

        let (keypoints, _) = buffers.get(Modality::CameraKeypoint).snapshot_positions();
        assert_eq!(keypoints[0], Position3D::new(0.2, 0.4, 0.0));

        buffers.clear();
        assert!(buffers.get(Modality::Inertial).is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let buffers = Arc::new(ModalityBuffers::new(500));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let buffers = buffers.clone();
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        buffers.push(position_sample(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let world = buffers.get(Modality::WorldPose);
        assert_eq!(world.len(), 500);
        assert_eq!(world.overflow_count(), 2_500);
    }
}
