//! Gaussian curve evaluation, sampled kernel tables and 1-D convolution.
//!
//! Everything here is a pure function. A non-positive standard deviation is a
//! programming error and is rejected with an assertion.
use std::f64::consts::{PI, SQRT_2};

use libm::erf;

/// `√(2π)`
pub const SQRT_2PI: f64 = 2.5066282746310002;

/// The height of a unit-area Gaussian with standard deviation `std_dev`
#[inline]
pub fn normal_height(std_dev: f64) -> f64 {
    1.0 / (std_dev * SQRT_2PI)
}

/// Evaluate a Gaussian with height `a`
///
/// ```math
/// y = a\exp\left(-\frac{(x - \mu)^2}{2\sigma^2}\right)
/// ```
#[inline]
pub fn gaussian_value(a: f64, x: f64, mean: f64, std_dev: f64) -> f64 {
    a * (-(x - mean).powi(2) / (2.0 * std_dev.powi(2))).exp()
}

/// Evaluate a skewed Gaussian with height scale `a` and shape `shape`
///
/// ```math
/// y = a\exp\left(-\frac{(x - \mu)^2}{2\sigma^2}\right)\left(1 + \text{erf}\left(\frac{\lambda (x - \mu)}{\sigma\sqrt{2}}\right)\right)
/// ```
#[inline]
pub fn skew_gaussian_value(a: f64, x: f64, mean: f64, std_dev: f64, shape: f64) -> f64 {
    let dm = x - mean;
    gaussian_value(a, x, mean, std_dev) * (1.0 + erf(shape * dm / (std_dev * SQRT_2)))
}

/// Tabulate one half of a Gaussian with height `a` at integer offsets `0..=half_width`
pub fn gaussian_distribution(a: f64, std_dev: f64, half_width: usize) -> Vec<f64> {
    assert!(std_dev > 0.0, "standard deviation must be positive, got {std_dev}");
    (0..=half_width)
        .map(|i| gaussian_value(a, i as f64, 0.0, std_dev))
        .collect()
}

/// Build the symmetric second derivative of a Gaussian sampled at integer offsets
/// `-half_width..=half_width`.
///
/// The table is shifted so it sums to zero, which makes straight line segments of a
/// signal blur to zero rather than to a slope-dependent bias. Positions where the
/// blurred signal is negative are locally concave.
pub fn sampled_kernel(std_dev: f64, half_width: usize) -> Vec<f64> {
    assert!(std_dev > 0.0, "standard deviation must be positive, got {std_dev}");
    let a = normal_height(std_dev);
    let var = std_dev.powi(2);
    let var2 = var.powi(2);
    let h = half_width as isize;
    let mut kernel: Vec<f64> = (-h..=h)
        .map(|i| {
            let i2 = (i * i) as f64;
            a * (-i2 / (2.0 * var)).exp() * (i2 - var) / var2
        })
        .collect();
    let bias = kernel.iter().sum::<f64>() / kernel.len() as f64;
    kernel.iter_mut().for_each(|k| *k -= bias);
    kernel
}

/// Centered convolution of `signal` with an odd-length `kernel`.
///
/// The output has the same length as `signal`. Kernel taps that fall outside the
/// signal are dropped rather than padded.
pub fn convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let h = kernel.len() / 2;
    (0..n)
        .map(|i| {
            let lo = h.saturating_sub(i);
            let hi = kernel.len().min(n + h - i);
            (lo..hi)
                .map(|j| kernel[j] * signal[i + j - h])
                .sum::<f64>()
        })
        .collect()
}

/// Blur `signal` with the second-derivative kernel at `scale`, truncating the
/// kernel at five standard deviations.
pub fn scale_space_smooth(signal: &[f64], scale: f64) -> Vec<f64> {
    let half_width = ((scale * 5.0).ceil() as usize).min(signal.len().max(1));
    let kernel = sampled_kernel(scale, half_width);
    convolve(signal, &kernel)
}

/// Approximate the mode of a skew-normal distribution
pub fn skew_normal_mode(mean: f64, std_dev: f64, shape: f64) -> f64 {
    let delta = shape / (1.0 + shape.powi(2)).sqrt();
    let two_over_pi = 2.0 / PI;
    let uz = two_over_pi.sqrt() * delta;
    let oz = (1.0 - uz.powi(2)).sqrt();
    let skewness = ((4.0 - PI) / 2.0) * (two_over_pi.sqrt() * delta).powi(3)
        / (1.0 - two_over_pi * delta.powi(2)).powf(1.5);
    let correction = if shape == 0.0 {
        0.0
    } else {
        shape.signum() / 2.0 * (-2.0 * PI / shape.abs()).exp()
    };
    (uz - skewness * oz / 2.0 - correction) * std_dev + mean
}
