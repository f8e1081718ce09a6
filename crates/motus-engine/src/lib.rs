//! # Motus-Engine
//!
//! Session orchestration for the Motus movement analysis engine.
//!
//! ## Layers
//!
//! - [`MotionSession`]: synchronous core. Feed samples, get [`RepEvent`]s,
//!   close with a [`SessionSummary`]
//! - [`MotionEngine`]: owns a session on a tokio worker task. Producers push
//!   without blocking; rep events fan out over a broadcast channel and to
//!   registered observers
//! - [`MotionSource`]: sensor integration seam, with a replay implementation
//!
//! ## Example
//!
//! ```no_run
//! use motus_engine::{EngineConfig, MotionEngine};
//! use motus_reps::MovementProfile;
//!
//! # async fn run() -> motus_core::Result<()> {
//! let engine = MotionEngine::new(EngineConfig::default())?;
//! engine.start_session(MovementProfile::Circular, Some(0.62)).await?;
//! // ... producers call engine.push_sample(..) ...
//! let summary = engine.end_session().await?;
//! println!("{} reps, max ROM {:.1}°", summary.rep_count, summary.max_rom);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod session;
pub mod source;
pub mod summary;

pub use config::*;
pub use engine::*;
pub use session::*;
pub use source::*;
pub use summary::*;
