//! Decomposition of a peak's density curve into additive Gaussian components.
//!
//! Two component families are supported:
//! - [`StandardGaussian`]
//! - [`SkewGaussian`]
//!
//! and [`GaussianParameters`] holds either one once a fit is reported.
//!
//! # Procedure
//!
//! [`SubPeakFitter`] removes the baseline from a peak, splits overly long peaks at deep
//! interior minima and scales each remaining stretch to unit mean. Candidate components
//! are found by tracking the concave intervals of the curve through a scale-space of
//! second-derivative blurs (see [`find_candidate_regions`]). Their heights are estimated
//! jointly by linear least squares, and growing subsets of them, ordered by energy, are
//! refined by Levenberg-Marquardt. The subset with the lowest RMS error is kept.
//!
//! Amplitudes are stored as square roots of `height × std_dev`, so a component's height
//! is `amplitude² / std_dev` and can never become negative during optimization.
//!
//! # Example
//!
//! ```rust
//! use zpeaks::subpeaks::{FitConfig, GaussianFamily, SubPeakFitter};
//!
//! let values: Vec<f64> = (0..200)
//!     .map(|x| 20.0 * (-((x as f64 - 100.0).powi(2)) / (2.0 * 15.0f64.powi(2))).exp())
//!     .collect();
//! let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Standard));
//! let fits = fitter.fit(&values, 5_000).unwrap();
//! let sub_peak = &fits[0].sub_peaks[0];
//! assert!((sub_peak.parameters.mean() - 5_100.0).abs() < 2.0);
//! ```

mod candidates;
mod data;
mod fitter;
mod optimizer;
mod replicated;
mod shapes;
mod utils;

pub use candidates::{
    concave_intervals, find_candidate_regions, initial_candidates, zero_crossings, ZeroCrossing,
};
pub use data::{CandidateGaussian, Fit, OptimizeResult, SubPeak};
pub use fitter::SubPeakFitter;
pub use optimizer::{model_curve, optimize};
pub use replicated::{replication_score, ReplicatedSubPeak};
pub use shapes::{GaussianParameters, SkewGaussian, StandardGaussian};
pub use utils::{
    BackgroundMode, FitConfig, GaussianFamily, GaussianShape, LevenbergMarquardtConfig,
    SubPeakError,
};

#[cfg(test)]
mod test {
    use super::*;

    use crate::test_data::{gaussian_curve, triangle_coverage, two_bump_curve};

    macro_rules! assert_is_close {
        ($t1:expr, $t2:expr, $tol:expr, $label:literal) => {
            assert!(
                ($t1 - $t2).abs() < $tol,
                "Observed {} {}, expected {}, difference {}",
                $label,
                $t1,
                $t2,
                $t1 - $t2,
            );
        };
        ($t1:expr, $t2:expr, $tol:expr, $label:literal, $obj:ident) => {
            assert!(
                ($t1 - $t2).abs() < $tol,
                "Observed {} {}, expected {}, difference {} from {:?}",
                $label,
                $t1,
                $t2,
                $t1 - $t2,
                $obj
            );
        };
    }

    #[rstest::fixture]
    fn single_bump() -> Vec<f64> {
        gaussian_curve(400, 50.0, 200.0, 30.0)
            .into_iter()
            .map(|v| v + 1.0)
            .collect()
    }

    fn sub_peaks_of(fits: &[Fit]) -> Vec<SubPeak> {
        fits.iter().flat_map(|f| f.sub_peaks.iter().copied()).collect()
    }

    #[rstest::rstest]
    #[case::standard(GaussianFamily::Standard)]
    #[case::skew(GaussianFamily::Skew)]
    #[test_log::test]
    fn test_single_gaussian(single_bump: Vec<f64>, #[case] family: GaussianFamily) {
        let fitter = SubPeakFitter::new(FitConfig::default().family(family));
        let fits = fitter.fit(&single_bump, 1000).unwrap();
        let sub_peaks = sub_peaks_of(&fits);
        assert_eq!(sub_peaks.len(), 1, "{sub_peaks:?}");
        let peak = sub_peaks[0];
        assert_is_close!(peak.parameters.mean(), 1200.0, 2.0, "mean", peak);
        assert_is_close!(peak.parameters.std_dev(), 30.0, 3.0, "std_dev", peak);
        assert_eq!(peak.parameters.family(), family);
        assert!(peak.region.contains(1200));
        assert!(peak.score > 0.0);
    }

    #[test_log::test]
    fn test_height_is_restored() {
        let values = gaussian_curve(300, 40.0, 150.0, 20.0);
        let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Standard));
        let fits = fitter.fit(&values, 0).unwrap();
        let peak = sub_peaks_of(&fits)[0];
        let height = peak.parameters.density(peak.parameters.mean()) + fits[0].background;
        assert_is_close!(height, 40.0, 0.5, "height");
    }

    #[test]
    fn test_split_at_midpoint() {
        let values = two_bump_curve();
        let fitter = SubPeakFitter::default();
        let background = fitter.background_level(&values);
        let without: Vec<f64> = values.iter().map(|v| v - background).collect();
        let index = fitter.split_index(&without).unwrap();
        assert!(index.abs_diff(5000) <= 5, "split at {index}");
    }

    #[test]
    fn test_no_split_below_soft_max() {
        let fitter = SubPeakFitter::default();
        let values = gaussian_curve(2000, 10.0, 1000.0, 300.0);
        assert_eq!(fitter.split_index(&values), None);
    }

    #[test]
    fn test_shallow_valley_is_not_split() {
        let fitter = SubPeakFitter::default();
        let a = gaussian_curve(3000, 10.0, 1200.0, 300.0);
        let b = gaussian_curve(3000, 10.0, 1800.0, 300.0);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        assert_eq!(fitter.split_index(&values), None);

        let a = gaussian_curve(3000, 10.0, 600.0, 150.0);
        let b = gaussian_curve(3000, 10.0, 2400.0, 150.0);
        let values: Vec<f64> = a.iter().zip(b.iter()).map(|(x, y)| x + y).collect();
        let index = fitter.split_index(&values).unwrap();
        assert!(index.abs_diff(1500) <= 1);
    }

    #[test_log::test]
    fn test_two_bumps_fit_independently() {
        let values = two_bump_curve();
        let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Standard));
        let fits = fitter.fit(&values, 0).unwrap();
        let sub_peaks = sub_peaks_of(&fits);
        assert_eq!(sub_peaks.len(), 2, "{sub_peaks:?}");
        assert_is_close!(sub_peaks[0].parameters.mean(), 2500.0, 5.0, "first mean");
        assert_is_close!(sub_peaks[1].parameters.mean(), 7500.0, 5.0, "second mean");
        assert!(fits.iter().all(|f| f.region.len() <= 2000 + 1));
    }

    #[test_log::test]
    fn test_triangle_is_near_symmetric() {
        let values: Vec<f64> = triangle_coverage(50, 25, 10.0, 10)
            .values
            .iter()
            .map(|v| *v as f64)
            .collect();
        let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Skew));
        let fits = fitter.fit(&values, 0).unwrap();
        let sub_peaks = sub_peaks_of(&fits);
        assert_eq!(sub_peaks.len(), 1, "{sub_peaks:?}");
        let shape = sub_peaks[0].parameters.shape().unwrap();
        assert!(shape.abs() < 1.0, "shape {shape}");
        assert_is_close!(sub_peaks[0].parameters.mean(), 25.0, 1.0, "mean");
    }

    #[test]
    fn test_degenerate_inputs() {
        let fitter = SubPeakFitter::default();
        assert!(fitter.fit(&[], 0).unwrap().is_empty());
        assert!(fitter.fit(&[3.0, 3.0], 0).unwrap().is_empty());
        assert!(sub_peaks_of(&fitter.fit(&[5.0; 50], 0).unwrap()).is_empty());
    }

    #[test_log::test]
    fn test_replicated_scores() {
        let a = gaussian_curve(300, 30.0, 150.0, 20.0);
        let b: Vec<f64> = gaussian_curve(300, 26.0, 152.0, 21.0);
        let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Standard));
        let scored = fitter.fit_replicated(&[&a, &b], 100).unwrap();
        assert_eq!(scored.len(), 1);
        assert!(scored[0].replication_score > 0.0, "{scored:?}");
        assert_is_close!(scored[0].sub_peak.parameters.mean(), 251.0, 2.0, "mean");

        let short = vec![1.0; 10];
        assert_eq!(
            fitter.fit_replicated(&[&a, &short], 0),
            Err(SubPeakError::MismatchedReplicates(300, 10))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_fit() {
        let fitter = SubPeakFitter::new(FitConfig::default().family(GaussianFamily::Skew));
        let fits = fitter.fit(&gaussian_curve(120, 10.0, 60.0, 10.0), 0).unwrap();
        let text = serde_json::to_string(&fits).unwrap();
        let back: Vec<Fit> = serde_json::from_str(&text).unwrap();
        assert_eq!(back.len(), fits.len());
        assert_eq!(back[0].sub_peaks.len(), fits[0].sub_peaks.len());
    }
}
