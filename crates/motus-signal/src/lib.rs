//! # Motus-Signal
//!
//! Signal processing for movement quality analysis.
//!
//! ## Stages
//!
//! 1. **Filtering**: exponential smoothing of scalar and vector signals used by
//!    the live repetition detectors
//! 2. **Spectral**: FFT power spectra and spectral purity of a speed profile
//! 3. **Smoothness**: the SPARC-style 0–100 score, its per-repetition split and
//!    the windowed jerk timeline used for visualization
//!
//! Smoothness is a batch computation. It runs once over a finished session,
//! never per sample.

pub mod filtering;
pub mod smoothness;
pub mod spectral;

pub use filtering::*;
pub use smoothness::*;
pub use spectral::*;
