//! `zpeaks` calls enriched regions in genomic coverage tracks and decomposes each
//! region into additive Gaussian sub-peaks.
//!
//! A coverage track is smoothed by scattering every covered position through a Gaussian
//! kernel ([`Pdf`]). The background of the smoothed track is estimated by Monte-Carlo
//! simulation of the same coverage spread uniformly over the covered span, and every
//! run of positions sufficiently many standard deviations above it becomes a [`Peak`]
//! (see [`call_peaks`]). Peaks from independent callers are combined with
//! [`merge_peaks`].
//!
//! Each peak's density curve can then be decomposed by [`SubPeakFitter`] into
//! [`StandardGaussian`] or [`SkewGaussian`] components, refined by
//! Levenberg-Marquardt.
//!
//! Whole runs over several inputs and chromosomes are driven by [`runner::Runner`].
//!
//! # Usage
//! ```
//! use zpeaks::{call_peaks, Coverage, Pdf, PdfConfig, SubPeakFitter};
//!
//! let mut values = vec![0.0f32; 2000];
//! for (i, v) in values.iter_mut().enumerate() {
//!     if i % 40 == 0 {
//!         *v = 1.0;
//!     }
//! }
//! for v in values[990..1010].iter_mut() {
//!     *v = 8.0;
//! }
//! let coverage = Coverage::new("chr1", values);
//!
//! let pdf = Pdf::build(&coverage, &PdfConfig::default().bandwidth(5.0).seed(Some(1)));
//! let peaks = call_peaks(&pdf, 6.0);
//! assert_eq!(peaks.len(), 1);
//! assert!(peaks[0].region.contains(1000));
//!
//! let sub_peaks = SubPeakFitter::default().fit_peaks(&pdf, &peaks);
//! for sub_peak in sub_peaks.iter() {
//!     println!("{} {:?}", sub_peak.region, sub_peak.parameters);
//! }
//! ```
//!
//! ## Features
//! - `parallelism` (default) scatters coverage and fits peaks on a `rayon` pool.
//! - `serde` derives `Serialize` and `Deserialize` for value and configuration types.
pub mod arrayops;
pub mod atomic;
pub mod coverage;
pub mod gaussian;
pub mod pdf;
pub mod peaks;
pub mod prelude;
pub mod region;
pub mod runner;
pub mod signal;
pub mod subpeaks;
pub mod text;

#[cfg(test)]
mod test_data;

pub use crate::coverage::Coverage;
pub use crate::pdf::{Background, Pdf, PdfConfig};
pub use crate::peaks::{call_peaks, merge_peaks, merge_replicated_peaks};
pub use crate::region::{Peak, Region, ReplicatedRegion};
pub use crate::runner::{ChromosomeResult, RunConfig, RunError, Runner, Strategy};
pub use crate::subpeaks::{
    FitConfig, GaussianFamily, SkewGaussian, StandardGaussian, SubPeak, SubPeakError,
    SubPeakFitter,
};
