//! # Motus-Core
//!
//! Core types and utilities for the Motus rehabilitation movement analysis
//! engine: motion samples from the three sensing modalities, camera pose
//! keypoints, geometric helpers and the bounded per-modality sample buffers
//! that every downstream analysis reads from.

pub mod buffer;
pub mod error;
pub mod geometry;
pub mod kinematics;
pub mod pose;
pub mod types;

pub use buffer::*;
pub use error::{ensure_finite, Error, Result};
pub use geometry::*;
pub use kinematics::*;
pub use pose::*;
pub use types::*;
