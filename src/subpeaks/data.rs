#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::Region;

use super::{GaussianParameters, GaussianShape};

/// A proposed component before refinement, with the interval it was detected on
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateGaussian<T: GaussianShape> {
    pub region: Region,
    pub parameters: T,
}

impl<T: GaussianShape> CandidateGaussian<T> {
    pub fn new(region: Region, parameters: T) -> Self {
        Self { region, parameters }
    }

    /// Energy estimate used to rank candidates
    pub fn score(&self) -> f64 {
        self.parameters.score()
    }
}

/// One fitted component of a peak, in absolute coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubPeak {
    pub region: Region,
    pub score: f64,
    pub parameters: GaussianParameters,
}

impl SubPeak {
    pub fn new(region: Region, score: f64, parameters: GaussianParameters) -> Self {
        Self {
            region,
            score,
            parameters,
        }
    }

    /// Report a fitted component with its own region and energy
    pub fn from_parameters<T: GaussianShape>(value: T) -> Self {
        Self::new(value.to_region(), value.score(), value.into())
    }
}

/// Describe a Levenberg-Marquardt run
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OptimizeResult {
    pub iterations: usize,
    pub evaluations: usize,
    /// Whether a tolerance was met before the iteration or evaluation budget ran out
    pub converged: bool,
    /// Root mean squared residual
    pub rms: f64,
}

/// The decomposition of one contiguous stretch of a peak
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fit {
    /// The stretch of positions that was fit
    pub region: Region,
    /// Components sorted by mean
    pub sub_peaks: Vec<SubPeak>,
    /// The baseline subtracted before fitting
    pub background: f64,
    /// RMS residual relative to the stretch's mean value
    pub error: f64,
    pub optimization: Option<OptimizeResult>,
}

impl Fit {
    /// Evaluate the fitted composite, baseline included, at `x`
    pub fn composite(&self, x: f64) -> f64 {
        self.background
            + self
                .sub_peaks
                .iter()
                .map(|s| s.parameters.density(x))
                .sum::<f64>()
    }
}
