//! FFT power spectra and spectral purity.
//!
//! A smooth, rhythmic movement concentrates the energy of its speed profile
//! in one dominant frequency. Spectral purity is the share of the total
//! (non-DC) power that falls in the strongest bin:
//!
//! purity = P(f_dominant) / Σ P(f)
//!
//! The speed series is mean-removed before the transform so a steady drift
//! does not masquerade as a perfectly pure DC component.

use num_complex::Complex;
use rustfft::FftPlanner;

use motus_core::{ensure_finite, Error, Result};

/// Below this total power the spectrum is considered empty
const MIN_TOTAL_POWER: f64 = 1e-12;

/// One-sided power spectrum of a real signal
#[derive(Debug, Clone)]
pub struct PowerSpectrum {
    /// Power per bin, index 0 is DC, up to and including Nyquist
    pub power: Vec<f64>,
    /// Padded FFT length
    pub fft_size: usize,
    /// Strongest non-DC bin
    pub dominant_bin: usize,
    /// Power of the dominant bin
    pub dominant_power: f64,
    /// Sum of non-DC power
    pub total_power: f64,
}

impl PowerSpectrum {
    /// Share of the non-DC power in the dominant bin, `[0, 1]`
    pub fn purity(&self) -> Result<f64> {
        if !(self.total_power > MIN_TOTAL_POWER) {
            return Err(Error::NumericInstability(format!(
                "total spectral power {:e}",
                self.total_power
            )));
        }
        ensure_finite(self.dominant_power / self.total_power, "spectral purity")
            .map(|p| p.clamp(0.0, 1.0))
    }
}

/// FFT front end. The planner caches plans by size, so repeated spectra of
/// the same padded length reuse one plan.
pub struct SpectralAnalyzer {
    planner: FftPlanner<f64>,
}

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Mean-removed, zero-padded power spectrum of `signal`
    pub fn power_spectrum(&mut self, signal: &[f64]) -> Result<PowerSpectrum> {
        if signal.len() < 2 {
            return Err(Error::InsufficientData {
                required: 2,
                available: signal.len(),
            });
        }

        let mean = signal.iter().sum::<f64>() / signal.len() as f64;
        ensure_finite(mean, "signal mean")?;

        let fft_size = signal.len().next_power_of_two();
        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .map(|&x| Complex::new(x - mean, 0.0))
            .collect();
        buffer.resize(fft_size, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        let half = fft_size / 2;
        let power: Vec<f64> = buffer[..=half]
            .iter()
            .map(|c| c.norm_sqr() / fft_size as f64)
            .collect();

        let (dominant_bin, dominant_power) = power
            .iter()
            .enumerate()
            .skip(1)
            .fold((0, 0.0), |best, (i, &p)| if p > best.1 { (i, p) } else { best });

        let total_power = ensure_finite(power.iter().skip(1).sum::<f64>(), "total spectral power")?;

        Ok(PowerSpectrum {
            power,
            fft_size,
            dominant_bin,
            dominant_power,
            total_power,
        })
    }

    pub fn spectral_purity(&mut self, signal: &[f64]) -> Result<f64> {
        self.power_spectrum(signal)?.purity()
    }
}

impl Default for SpectralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
