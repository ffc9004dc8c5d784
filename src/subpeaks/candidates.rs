//! Scale-space detection of candidate components and their linear amplitude estimates.
//!
//! The curve is blurred with the second derivative of a Gaussian at a sequence of
//! decreasing scales. Wherever the blurred curve is negative the signal is locally
//! concave, so each run of negative values bounded by a falling and a rising zero
//! crossing marks one bump. Intervals found at a coarse scale are carried down and
//! re-centred on the nearest interval found at each finer scale, while intervals
//! with no coarse counterpart are added as new candidates.
use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::gaussian::{gaussian_value, scale_space_smooth};
use crate::region::Region;

use super::{CandidateGaussian, GaussianShape, SubPeakError};

/// Magnitudes at or below this fraction of the largest blurred value carry no sign
const SIGN_TOLERANCE: f64 = 1e-9;

/// A change of sign in a blurred curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroCrossing {
    /// The first position taking the new sign
    pub index: usize,
    /// Whether the curve goes from negative to positive
    pub rising: bool,
}

/// Locate sign changes in `blurred`.
///
/// Values too close to zero inherit no sign, and a crossing across such a dead band is
/// placed at its midpoint.
pub fn zero_crossings(blurred: &[f64]) -> Vec<ZeroCrossing> {
    let max_abs = blurred.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if max_abs == 0.0 || !max_abs.is_finite() {
        return Vec::new();
    }
    let tolerance = max_abs * SIGN_TOLERANCE;
    let mut crossings = Vec::new();
    let mut last: Option<(usize, bool)> = None;
    for (i, v) in blurred.iter().enumerate() {
        if v.abs() <= tolerance {
            continue;
        }
        let positive = *v > 0.0;
        if let Some((j, was_positive)) = last {
            if was_positive != positive {
                crossings.push(ZeroCrossing {
                    index: (j + i + 1) / 2,
                    rising: positive,
                });
            }
        }
        last = Some((i, positive));
    }
    crossings
}

/// Pair the zero crossings of `blurred` into concave intervals of `values`.
///
/// An odd crossing count means a bump was cut by one of the region's ends, so the
/// crossing nearest the higher of the two end values is dropped. If the curve is
/// concave at both ends, both outermost crossings are dropped.
pub fn concave_intervals(blurred: &[f64], values: &[f64]) -> Vec<Region> {
    let mut crossings = zero_crossings(blurred);
    if crossings.len() % 2 == 1 {
        let first = values.first().copied().unwrap_or_default();
        let last = values.last().copied().unwrap_or_default();
        if first > last {
            crossings.remove(0);
        } else {
            crossings.pop();
        }
    }
    if crossings.len() >= 2 && crossings[0].rising {
        crossings.remove(0);
        crossings.pop();
    }
    crossings
        .chunks_exact(2)
        .filter(|pair| !pair[0].rising && pair[1].rising)
        .map(|pair| Region::new(pair[0].index, pair[1].index.saturating_sub(1).max(pair[0].index)))
        .collect()
}

/// Track concave intervals from the coarsest scale, `floor(√n · 1.1)`, down to 2
pub fn find_candidate_regions(values: &[f64]) -> Vec<Region> {
    let n = values.len();
    if n < 3 {
        return Vec::new();
    }
    let max_scale = (((n as f64).sqrt() * 1.1).floor() as usize).max(2);
    let mut tracked: Vec<Region> = Vec::new();

    for scale in (2..=max_scale).rev() {
        let blurred = scale_space_smooth(values, scale as f64);
        let intervals = concave_intervals(&blurred, values);

        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (i, interval) in intervals.iter().enumerate() {
            for (j, current) in tracked.iter().enumerate() {
                let distance = (interval.center() - current.center()).abs();
                if distance <= current.len() as f64 {
                    pairs.push((distance, i, j));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut interval_used = vec![false; intervals.len()];
        let mut tracked_used = vec![false; tracked.len()];
        for (_, i, j) in pairs {
            if interval_used[i] || tracked_used[j] {
                continue;
            }
            tracked[j] = intervals[i];
            interval_used[i] = true;
            tracked_used[j] = true;
        }
        for (interval, used) in intervals.into_iter().zip(interval_used) {
            if !used {
                tracked.push(interval);
            }
        }
        trace!("Scale {scale}: {} tracked intervals", tracked.len());
    }
    tracked.sort();
    tracked.dedup();
    tracked
}

/// Estimate each candidate's height by linear least squares over unit-height
/// Gaussians, returning candidates sorted by descending energy.
pub fn initial_candidates<T: GaussianShape>(
    values: &[f64],
    regions: &[Region],
) -> Result<Vec<CandidateGaussian<T>>, SubPeakError> {
    if regions.is_empty() {
        return Ok(Vec::new());
    }
    let mut candidates: Vec<CandidateGaussian<T>> = regions
        .iter()
        .map(|r| CandidateGaussian::new(*r, T::from_region(r)))
        .collect();

    let k = candidates.len();
    let n = values.len();
    let basis = DMatrix::from_fn(n, k, |x, j| {
        let p = &candidates[j].parameters;
        gaussian_value(1.0, x as f64, p.mean(), p.std_dev())
    });
    let gram = basis.tr_mul(&basis);
    let target = basis.tr_mul(&DVector::from_column_slice(values));

    let coefficients = gram
        .lu()
        .solve(&target)
        .filter(|c| c.iter().all(|v| v.is_finite()))
        .ok_or(SubPeakError::SingularSystem(k))?;

    for (candidate, coef) in candidates.iter_mut().zip(coefficients.iter()) {
        let std_dev = candidate.parameters.std_dev();
        let amplitude = (coef.abs() * std_dev).sqrt() * coef.signum();
        candidate.parameters.set_amplitude(amplitude);
    }
    candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
    Ok(candidates)
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::subpeaks::StandardGaussian;
    use crate::test_data::gaussian_curve;

    #[test]
    fn test_zero_crossings_with_dead_band() {
        let blurred = [1.0, 0.5, 0.0, 0.0, 0.0, -0.5, -1.0, 0.0, 2.0];
        let crossings = zero_crossings(&blurred);
        assert_eq!(
            crossings,
            vec![
                ZeroCrossing { index: 3, rising: false },
                ZeroCrossing { index: 7, rising: true },
            ]
        );
    }

    #[test]
    fn test_concave_interval_of_bump() {
        let values = gaussian_curve(201, 10.0, 100.0, 12.0);
        let blurred = scale_space_smooth(&values, 2.0);
        let intervals = concave_intervals(&blurred, &values);
        assert_eq!(intervals.len(), 1);
        let interval = intervals[0];
        assert!((interval.center() - 100.0).abs() <= 1.0, "{interval:?}");
        let half_width = (interval.end - interval.start) as f64 / 2.0;
        assert!((half_width - 12.0).abs() < 2.0, "{interval:?}");
    }

    #[test]
    fn test_cut_bump_drops_edge_crossing() {
        // The bump's apex lies beyond the right end
        let values = gaussian_curve(120, 10.0, 130.0, 15.0);
        let blurred = scale_space_smooth(&values, 2.0);
        assert!(concave_intervals(&blurred, &values).is_empty());
    }

    #[test]
    fn test_candidate_regions_separate_bumps() {
        let a = gaussian_curve(400, 10.0, 120.0, 15.0);
        let b = gaussian_curve(400, 6.0, 280.0, 20.0);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        let regions = find_candidate_regions(&values);
        assert!(regions.iter().any(|r| r.contains(120)));
        assert!(regions.iter().any(|r| r.contains(280)));
        assert!(!regions.iter().any(|r| r.contains(120) && r.contains(280)));
    }

    #[test]
    fn test_initial_amplitudes() {
        let a = gaussian_curve(300, 8.0, 100.0, 10.0);
        let b = gaussian_curve(300, 4.0, 200.0, 20.0);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        let regions = vec![Region::new(180, 220), Region::new(90, 110)];
        let candidates = initial_candidates::<StandardGaussian>(&values, &regions).unwrap();
        assert_eq!(candidates.len(), 2);
        let first = candidates[0].parameters;
        assert_eq!(first.mean, 100.0);
        let height = first.amplitude.powi(2) / first.std_dev;
        assert!((height - 8.0).abs() < 1e-6, "{height}");
        let second = candidates[1].parameters;
        assert!((second.amplitude.powi(2) / second.std_dev - 4.0).abs() < 1e-6);
    }
}
