//! Synthetic tracks shared by unit tests
use crate::coverage::Coverage;
use crate::gaussian::gaussian_value;

/// A Gaussian bump of height `height` sampled at `0..len`
pub fn gaussian_curve(len: usize, height: f64, mean: f64, std_dev: f64) -> Vec<f64> {
    (0..len)
        .map(|x| gaussian_value(height, x as f64, mean, std_dev))
        .collect()
}

/// Unit coverage at each of `positions`
pub fn point_coverage(len: usize, positions: &[usize]) -> Coverage {
    let mut values = vec![0.0f32; len];
    for p in positions {
        values[*p] += 1.0;
    }
    Coverage::new("chr1", values)
}

/// A triangle of height `height` at `center`, reaching zero `half_width` positions away
pub fn triangle_coverage(len: usize, center: usize, height: f32, half_width: usize) -> Coverage {
    let values = (0..len)
        .map(|i| {
            let d = i.abs_diff(center) as f32;
            (height * (1.0 - d / half_width as f32)).max(0.0)
        })
        .collect();
    Coverage::new("chr1", values)
}

/// Two well separated bumps of equal height on a 10,000 position curve
pub fn two_bump_curve() -> Vec<f64> {
    let a = gaussian_curve(10_000, 100.0, 2500.0, 300.0);
    let b = gaussian_curve(10_000, 100.0, 7500.0, 300.0);
    a.into_iter().zip(b).map(|(x, y)| x + y).collect()
}
