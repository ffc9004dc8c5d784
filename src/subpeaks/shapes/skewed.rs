use std::f64::consts::{FRAC_PI_2, SQRT_2};

use libm::erf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::gaussian::skew_normal_mode;
use crate::region::Region;

use super::super::utils::span_to_region;
use super::{CandidateGaussian, FitConfig, GaussianShape};

/// Skewed Gaussian sub-peak
///
/// ```math
/// y = \frac{a^2}{\sigma}\exp\left(-\frac{(x - \mu)^2}{2\sigma^2}\right)\left(1 + \text{erf}\left(\frac{\lambda(x - \mu)}{\sigma\sqrt{2}}\right)\right)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkewGaussian {
    pub amplitude: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub shape: f64,
}

impl SkewGaussian {
    pub fn new(amplitude: f64, mean: f64, std_dev: f64, shape: f64) -> Self {
        Self {
            amplitude,
            mean,
            std_dev,
            shape,
        }
    }

    /// The position of the curve's maximum
    pub fn mode(&self) -> f64 {
        skew_normal_mode(self.mean, self.std_dev, self.shape)
    }
}

impl GaussianShape for SkewGaussian {
    const N_PARAMS: usize = 4;

    const INITIAL_STEP_BOUND: f64 = 0.1;

    fn from_region(region: &Region) -> Self {
        let mean = (region.start + region.end) as f64 / 2.0;
        let std_dev = ((region.end - region.start) as f64 / 2.0).max(0.5);
        Self::new(1e-4, mean, std_dev, 0.0)
    }

    /// Centered on the mode rather than the mean
    fn to_region(&self) -> Region {
        let mode = self.mode();
        span_to_region(mode - self.std_dev, mode + self.std_dev)
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
        let u = self.std_dev;
        let dm = x - self.mean;
        let e = (-dm.powi(2) / (2.0 * u.powi(2))).exp();
        self.amplitude.powi(2) / u * e * (1.0 + erf(self.shape * dm / (u * SQRT_2)))
    }

    #[inline]
    fn gradient(&self, x: f64, out: &mut [f64]) {
        let a = self.amplitude;
        let u = self.std_dev;
        let s = self.shape;
        let dm = x - self.mean;
        let a2 = a.powi(2);
        let u2 = u.powi(2);
        let sqrt_pi_over_2 = FRAC_PI_2.sqrt();

        let e = (-dm.powi(2) / (2.0 * u2)).exp();
        let expx = (-s.powi(2) * dm.powi(2) / (2.0 * u2) - dm.powi(2) / (2.0 * u2)).exp();
        let erfc = 1.0 + erf(s * dm / (u * SQRT_2));

        out[0] = 2.0 * a * e * erfc / u;
        out[1] = a2 * dm * e * erfc / u.powi(3) - expx * a2 * s / (u2 * sqrt_pi_over_2);
        out[2] = a2 * dm.powi(2) * e * erfc / u.powi(4)
            - expx * a2 * s * dm / (sqrt_pi_over_2 * u.powi(3))
            - a2 * e * erfc / u2;
        out[3] = expx * a2 * dm / (sqrt_pi_over_2 * u2);
    }

    fn pack(&self, out: &mut [f64]) {
        out[0] = self.amplitude;
        out[1] = self.mean;
        out[2] = self.std_dev;
        out[3] = self.shape;
    }

    fn unpack(values: &[f64]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    fn validate(&mut self, candidate: &CandidateGaussian<Self>, config: &FitConfig) {
        let init = &candidate.parameters;
        if self.amplitude.is_nan() || self.amplitude <= 0.0 {
            self.amplitude = init.amplitude.abs();
        }
        if self.std_dev.is_nan() || self.std_dev <= 0.0 || self.std_dev > config.max_std_dev {
            self.std_dev = init.std_dev;
        }
        if self.shape.is_nan() || self.shape.abs() > config.max_shape {
            self.shape = 0.0;
        }
        let mode = self.mode();
        let lo = candidate.region.start as f64;
        let hi = candidate.region.end as f64;
        if mode.is_nan() || mode < lo || mode > hi {
            self.mean = init.mean;
            self.std_dev = init.std_dev;
            self.shape = init.shape;
        }
    }
}
