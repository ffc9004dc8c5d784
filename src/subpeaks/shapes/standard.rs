#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::Region;

use super::super::utils::span_to_region;
use super::{CandidateGaussian, FitConfig, GaussianShape};

/// Symmetric Gaussian sub-peak
///
/// ```math
/// y = \frac{a^2}{\sigma}\exp\left(-\frac{(x - \mu)^2}{2\sigma^2}\right)
/// ```
///
/// The amplitude is stored as a square root so the height can never turn negative
/// during optimization.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StandardGaussian {
    pub amplitude: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl StandardGaussian {
    pub fn new(amplitude: f64, mean: f64, std_dev: f64) -> Self {
        Self {
            amplitude,
            mean,
            std_dev,
        }
    }

    /// The curve's maximum value
    pub fn height(&self) -> f64 {
        self.amplitude.powi(2) / self.std_dev
    }
}

impl GaussianShape for StandardGaussian {
    const N_PARAMS: usize = 3;

    const INITIAL_STEP_BOUND: f64 = 0.05;

    fn from_region(region: &Region) -> Self {
        let mean = (region.start + region.end) as f64 / 2.0;
        let std_dev = ((region.end - region.start) as f64 / 2.0).max(0.5);
        Self::new(1e-4, mean, std_dev)
    }

    fn to_region(&self) -> Region {
        span_to_region(self.mean - self.std_dev, self.mean + self.std_dev)
    }

    fn amplitude(&self) -> f64 {
        self.amplitude
    }

    fn set_amplitude(&mut self, amplitude: f64) {
        self.amplitude = amplitude;
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn std_dev(&self) -> f64 {
        self.std_dev
    }

    fn translate(&mut self, offset: f64) {
        self.mean += offset;
    }

    #[inline]
    fn density(&self, x: f64) -> f64 {
        let dm = x - self.mean;
        self.amplitude.powi(2) / self.std_dev * (-dm.powi(2) / (2.0 * self.std_dev.powi(2))).exp()
    }

    #[inline]
    fn gradient(&self, x: f64, out: &mut [f64]) {
        let a = self.amplitude;
        let u = self.std_dev;
        let dm = x - self.mean;
        let a2 = a.powi(2);
        let e = (-dm.powi(2) / (2.0 * u.powi(2))).exp();

        out[0] = 2.0 * a * e / u;
        out[1] = a2 * dm * e / u.powi(3);
        out[2] = a2 * e * (dm.powi(2) - u.powi(2)) / u.powi(4);
    }

    fn pack(&self, out: &mut [f64]) {
        out[0] = self.amplitude;
        out[1] = self.mean;
        out[2] = self.std_dev;
    }

    fn unpack(values: &[f64]) -> Self {
        Self::new(values[0], values[1], values[2])
    }

    fn validate(&mut self, candidate: &CandidateGaussian<Self>, config: &FitConfig) {
        let init = &candidate.parameters;
        if self.amplitude.is_nan() || self.amplitude <= 0.0 {
            self.amplitude = init.amplitude.abs();
        }
        let lo = candidate.region.start as f64;
        let hi = candidate.region.end as f64;
        if self.mean.is_nan() || self.mean < lo || self.mean > hi {
            self.mean = init.mean;
        }
        if self.std_dev.is_nan() || self.std_dev <= 0.0 || self.std_dev > config.max_std_dev {
            self.std_dev = init.std_dev;
        }
    }
}
