#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::Region;

use super::{CandidateGaussian, FitConfig, GaussianFamily, GaussianShape};

mod skewed;
mod standard;

pub use skewed::SkewGaussian;
pub use standard::StandardGaussian;

/// Fitted parameters of either Gaussian family
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GaussianParameters {
    Standard(StandardGaussian),
    Skew(SkewGaussian),
}

macro_rules! dispatch_gaussian {
    ($d:ident, $r:ident, $e:expr) => {
        match $d {
            GaussianParameters::Standard($r) => $e,
            GaussianParameters::Skew($r) => $e,
        }
    };
}

impl From<StandardGaussian> for GaussianParameters {
    fn from(value: StandardGaussian) -> Self {
        Self::Standard(value)
    }
}

impl From<SkewGaussian> for GaussianParameters {
    fn from(value: SkewGaussian) -> Self {
        Self::Skew(value)
    }
}

impl GaussianParameters {
    pub fn family(&self) -> GaussianFamily {
        match self {
            Self::Standard(_) => GaussianFamily::Standard,
            Self::Skew(_) => GaussianFamily::Skew,
        }
    }

    pub fn amplitude(&self) -> f64 {
        dispatch_gaussian!(self, p, p.amplitude())
    }

    pub fn mean(&self) -> f64 {
        dispatch_gaussian!(self, p, p.mean())
    }

    pub fn std_dev(&self) -> f64 {
        dispatch_gaussian!(self, p, p.std_dev())
    }

    /// The skew shape, if any
    pub fn shape(&self) -> Option<f64> {
        match self {
            Self::Standard(_) => None,
            Self::Skew(p) => Some(p.shape),
        }
    }

    pub fn density(&self, x: f64) -> f64 {
        dispatch_gaussian!(self, p, p.density(x))
    }

    pub fn to_region(&self) -> Region {
        dispatch_gaussian!(self, p, p.to_region())
    }

    pub fn score(&self) -> f64 {
        dispatch_gaussian!(self, p, p.score())
    }
}
