//! Exponential smoothing filters for live sensor signals.

use nalgebra::Vector3;

/// Exponential moving average (EMA) filter
#[derive(Debug, Clone)]
pub struct ExponentialFilter {
    alpha: f64,
    state: Option<f64>,
}

impl ExponentialFilter {
    /// Create new EMA filter
    ///
    /// # Arguments
    /// * `alpha` - Smoothing factor (0-1). Higher = less smoothing
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn filter(&mut self, x: f64) -> f64 {
        match self.state {
            Some(prev) => {
                let y = self.alpha * x + (1.0 - self.alpha) * prev;
                self.state = Some(y);
                y
            }
            None => {
                self.state = Some(x);
                x
            }
        }
    }

    pub fn state(&self) -> Option<f64> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// EMA over 3D vectors, seeded by the first value
#[derive(Debug, Clone)]
pub struct VectorExponentialFilter {
    alpha: f64,
    state: Option<Vector3<f64>>,
}

impl VectorExponentialFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }

    pub fn filter(&mut self, x: Vector3<f64>) -> Vector3<f64> {
        let y = match self.state {
            Some(prev) => prev + (x - prev) * self.alpha,
            None => x,
        };
        self.state = Some(y);
        y
    }

    pub fn state(&self) -> Option<Vector3<f64>> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
