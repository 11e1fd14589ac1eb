//! Trigonometric lookup tables for one field revolution
//!
//! The X and Y coil currents for a field vector at angle θ are
//! `I·cos θ` and `I·sin θ`. Rotating gestures step through θ in `N` equal
//! increments per revolution, so both tables are precomputed once per
//! session and indexed by step.

use std::f64::consts::PI;

use thiserror::Error;

/// Steps per revolution used by the bench.
pub const DEFAULT_STEPS: usize = 48;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LutError {
    /// Quarter-turn hop offsets need the step count divisible by 4.
    #[error("Steps per revolution must be a positive multiple of 4, got {0}")]
    InvalidSteps(usize),
}

/// Cosine and sine tables scaled to a current magnitude.
///
/// Invariant: `cos[i] = magnitude * cos(2πi/N)` and
/// `sin[i] = magnitude * sin(2πi/N)` for `i` in `0..N`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrigLut {
    magnitude: f64,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl TrigLut {
    /// Build tables of `steps` samples scaled by `magnitude` amperes.
    ///
    /// # Example
    ///
    /// ```
    /// use magnet_control::lut::TrigLut;
    ///
    /// let lut = TrigLut::new(2.0, 48).unwrap();
    /// assert_eq!(lut.cos()[0], 2.0);
    /// assert!((lut.sin()[12] - 2.0).abs() < 1e-12);
    /// ```
    pub fn new(magnitude: f64, steps: usize) -> Result<Self, LutError> {
        if steps == 0 || steps % 4 != 0 {
            return Err(LutError::InvalidSteps(steps));
        }
        let mut lut = Self {
            magnitude,
            cos: vec![0.0; steps],
            sin: vec![0.0; steps],
        };
        lut.fill();
        Ok(lut)
    }

    fn fill(&mut self) {
        let steps = self.cos.len() as f64;
        for (i, (c, s)) in self.cos.iter_mut().zip(self.sin.iter_mut()).enumerate() {
            let angle = 2.0 * PI * i as f64 / steps;
            *c = self.magnitude * angle.cos();
            *s = self.magnitude * angle.sin();
        }
    }

    /// Regenerate both tables for a new magnitude.
    pub fn rescale(&mut self, magnitude: f64) {
        if magnitude != self.magnitude {
            self.magnitude = magnitude;
            self.fill();
        }
    }

    pub fn steps(&self) -> usize {
        self.cos.len()
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// X-axis table.
    pub fn cos(&self) -> &[f64] {
        &self.cos
    }

    /// Y-axis table.
    pub fn sin(&self) -> &[f64] {
        &self.sin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tables_lie_on_circle() {
        for &steps in &[4usize, 8, 48, 96] {
            for &magnitude in &[0.0, 0.5, 1.0, 3.7, -2.0] {
                let lut = TrigLut::new(magnitude, steps).unwrap();
                assert_eq!(lut.cos().len(), steps);
                assert_eq!(lut.sin().len(), steps);
                for i in 0..steps {
                    let r2 = lut.cos()[i].powi(2) + lut.sin()[i].powi(2);
                    assert_relative_eq!(r2, magnitude * magnitude, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_cardinal_angles() {
        let lut = TrigLut::new(1.0, DEFAULT_STEPS).unwrap();
        assert_relative_eq!(lut.cos()[0], 1.0);
        assert_relative_eq!(lut.sin()[0], 0.0);
        assert_relative_eq!(lut.sin()[12], 1.0, epsilon = 1e-12);
        assert_relative_eq!(lut.cos()[24], -1.0, epsilon = 1e-12);
        assert_relative_eq!(lut.sin()[36], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_steps() {
        assert_eq!(TrigLut::new(1.0, 0), Err(LutError::InvalidSteps(0)));
        assert_eq!(TrigLut::new(1.0, 50), Err(LutError::InvalidSteps(50)));
    }

    #[test]
    fn test_rescale_regenerates() {
        let mut lut = TrigLut::new(1.0, 8).unwrap();
        lut.rescale(2.5);
        assert_eq!(lut.magnitude(), 2.5);
        assert_eq!(lut, TrigLut::new(2.5, 8).unwrap());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            TrigLut::new(1.25, 48).unwrap(),
            TrigLut::new(1.25, 48).unwrap()
        );
    }
}
