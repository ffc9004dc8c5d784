use std::fmt::Debug;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::Region;

use super::{CandidateGaussian, GaussianParameters};

/// The Gaussian family sub-peaks are decomposed into
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GaussianFamily {
    Standard,
    #[default]
    Skew,
}

/// How the baseline is removed from a region before fitting
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BackgroundMode {
    /// Subtract the smallest value in the region
    Minimum,
    /// Subtract the larger of the two end values and trim the region to where the
    /// signal is still at or above it
    #[default]
    Tails,
}

/// Errors that end the decomposition of a single peak
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubPeakError {
    #[error("Cannot fit {0} values, at least {1} are required")]
    TooFewValues(usize, usize),
    #[error("The candidate amplitude system is singular for {0} candidates")]
    SingularSystem(usize),
    #[error("Optimization produced non-finite parameters after {0} iterations")]
    NonFiniteParameters(usize),
    #[error("Replicate curves differ in length: {0} and {1}")]
    MismatchedReplicates(usize, usize),
    #[error("No candidate subset could be optimized")]
    OptimizerDiverged,
}

/// Levenberg-Marquardt settings. Tolerances are relative to the mean value of the
/// curve being fit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevenbergMarquardtConfig {
    pub max_iterations: usize,
    pub max_evaluations: usize,
    /// Overrides the family's own initial step bound. Smaller values damp the
    /// first steps harder.
    pub initial_step_bound: Option<f64>,
    pub cost_tolerance: f64,
    pub parameter_tolerance: f64,
    pub orthogonality_tolerance: f64,
}

impl LevenbergMarquardtConfig {
    pub fn max_iterations(mut self, value: usize) -> Self {
        self.max_iterations = value;
        self
    }

    pub fn max_evaluations(mut self, value: usize) -> Self {
        self.max_evaluations = value;
        self
    }

    pub fn initial_step_bound(mut self, value: Option<f64>) -> Self {
        self.initial_step_bound = value;
        self
    }

    pub fn cost_tolerance(mut self, value: f64) -> Self {
        self.cost_tolerance = value;
        self
    }

    pub fn parameter_tolerance(mut self, value: f64) -> Self {
        self.parameter_tolerance = value;
        self
    }

    pub fn orthogonality_tolerance(mut self, value: f64) -> Self {
        self.orthogonality_tolerance = value;
        self
    }
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            max_evaluations: 1000,
            initial_step_bound: None,
            cost_tolerance: 1e-4,
            parameter_tolerance: 1e-8,
            orthogonality_tolerance: 1e-3,
        }
    }
}

/// Hyperparameters for decomposing a peak into sub-peaks
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitConfig {
    pub family: GaussianFamily,
    pub background: BackgroundMode,
    /// Regions longer than this are split at a deep interior minimum
    pub soft_max_length: usize,
    /// Regions longer than this are always split
    pub hard_max_length: usize,
    /// Fraction of the region at either end excluded from the split search
    pub split_margin: f64,
    /// The interior min/max ratio at or below which a long region is split
    pub split_ratio: f64,
    pub max_std_dev: f64,
    pub max_shape: f64,
    /// Stop growing the candidate subset once the relative RMS error reaches this
    pub acceptable_error: Option<f64>,
    /// Regions with fewer values are not fit
    pub min_values: usize,
    pub optimizer: LevenbergMarquardtConfig,
}

impl FitConfig {
    pub fn family(mut self, family: GaussianFamily) -> Self {
        self.family = family;
        self
    }

    pub fn background(mut self, background: BackgroundMode) -> Self {
        self.background = background;
        self
    }

    pub fn soft_max_length(mut self, value: usize) -> Self {
        self.soft_max_length = value;
        self
    }

    pub fn hard_max_length(mut self, value: usize) -> Self {
        self.hard_max_length = value;
        self
    }

    pub fn split_margin(mut self, value: f64) -> Self {
        self.split_margin = value;
        self
    }

    pub fn split_ratio(mut self, value: f64) -> Self {
        self.split_ratio = value;
        self
    }

    pub fn max_std_dev(mut self, value: f64) -> Self {
        self.max_std_dev = value;
        self
    }

    pub fn max_shape(mut self, value: f64) -> Self {
        self.max_shape = value;
        self
    }

    pub fn acceptable_error(mut self, value: Option<f64>) -> Self {
        self.acceptable_error = value;
        self
    }

    pub fn min_values(mut self, value: usize) -> Self {
        self.min_values = value;
        self
    }

    pub fn optimizer(mut self, value: LevenbergMarquardtConfig) -> Self {
        self.optimizer = value;
        self
    }
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            family: GaussianFamily::default(),
            background: BackgroundMode::default(),
            soft_max_length: 2000,
            hard_max_length: 5000,
            split_margin: 0.2,
            split_ratio: 0.05,
            max_std_dev: 400.0,
            max_shape: 10.0,
            acceptable_error: Some(0.05),
            min_values: 5,
            optimizer: LevenbergMarquardtConfig::default(),
        }
    }
}

/// A Gaussian family the optimizer can refine.
///
/// Implementors describe one additive component: how it is initialised from an
/// interval, evaluated, differentiated, packed into the flat parameter vector and
/// pulled back into physical bounds after every optimizer step.
pub trait GaussianShape: Debug + Clone + Copy + PartialEq + Send + Sync + Into<GaussianParameters> {
    /// Number of parameters per component
    const N_PARAMS: usize;

    /// The family's default initial step bound for Levenberg-Marquardt
    const INITIAL_STEP_BOUND: f64;

    /// Initial parameters for a candidate spanning `region`
    fn from_region(region: &Region) -> Self;

    /// The interval a fitted component is reported as
    fn to_region(&self) -> Region;

    fn amplitude(&self) -> f64;

    fn set_amplitude(&mut self, amplitude: f64);

    fn mean(&self) -> f64;

    fn std_dev(&self) -> f64;

    /// Move the component by `offset` positions
    fn translate(&mut self, offset: f64);

    /// Compute the curve value at `x`
    fn density(&self, x: f64) -> f64;

    /// Write the partial derivatives at `x` with respect to each packed parameter
    fn gradient(&self, x: f64, out: &mut [f64]);

    fn pack(&self, out: &mut [f64]);

    fn unpack(values: &[f64]) -> Self;

    /// Reset any parameter that left its physical bounds to the candidate's value
    fn validate(&mut self, candidate: &CandidateGaussian<Self>, config: &FitConfig);

    /// The component's energy, `amplitude² / std_dev`
    fn score(&self) -> f64 {
        self.amplitude().powi(2) / self.std_dev()
    }

    fn is_finite(&self) -> bool {
        let mut buf = [0.0; 8];
        self.pack(&mut buf[..Self::N_PARAMS]);
        buf[..Self::N_PARAMS].iter().all(|v| v.is_finite())
    }
}

/// Convert a fractional interval into positions, clamping at zero
pub(crate) fn span_to_region(low: f64, high: f64) -> Region {
    let start = low.round().max(0.0) as usize;
    let end = (high.round().max(0.0) as usize).max(start);
    Region::new(start, end)
}
