//! # Motus-Reps
//!
//! Repetition analysis for rehabilitation exercises.
//!
//! ## Per-sample path
//!
//! 1. **Segmentation**: one profile-driven state machine turns the sample
//!    stream into rep candidates (peak-valley, circular accumulation or
//!    direction reversal)
//! 2. **Adaptive threshold**: candidates smaller than what the session has
//!    learned to expect are rejected
//! 3. **Quality**: accepted reps are scored on amplitude, consistency and
//!    timing
//!
//! ## Per-segment path
//!
//! **ROM** converts each segment to an angle. For world-tracked device pose
//! this runs once at session end over the stored segments.

pub mod profile;
pub mod quality;
pub mod rom;
pub mod segmentation;
pub mod threshold;

pub use profile::*;
pub use quality::*;
pub use rom::*;
pub use segmentation::*;
pub use threshold::*;
