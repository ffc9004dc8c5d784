use log::{debug, error};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::arrayops::{argmin_within, mean, minmax};
use crate::pdf::Pdf;
use crate::region::{Peak, Region};

use super::candidates::{find_candidate_regions, initial_candidates};
use super::optimizer::optimize;
use super::{
    BackgroundMode, Fit, FitConfig, GaussianFamily, GaussianShape, OptimizeResult, SkewGaussian,
    StandardGaussian, SubPeak, SubPeakError,
};

/// Decompose peak density curves into additive Gaussian components.
///
/// Long regions are first split at deep interior minima, using an explicit stack
/// of pending stretches. Each remaining stretch has its baseline removed, is scaled to
/// unit mean, searched for candidate components and refined by a greedy series of
/// Levenberg-Marquardt fits over growing candidate subsets.
#[derive(Debug, Clone, Default)]
pub struct SubPeakFitter {
    pub config: FitConfig,
}

impl SubPeakFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Fit `values`, whose first entry lies at absolute position `offset`, with the
    /// configured family
    pub fn fit(&self, values: &[f64], offset: usize) -> Result<Vec<Fit>, SubPeakError> {
        match self.config.family {
            GaussianFamily::Standard => self.fit_with::<StandardGaussian>(values, offset),
            GaussianFamily::Skew => self.fit_with::<SkewGaussian>(values, offset),
        }
    }

    /// Fit `values` with the Gaussian family `T`, returning one [`Fit`] per stretch
    /// the region was split into, ordered by position
    pub fn fit_with<T: GaussianShape>(
        &self,
        values: &[f64],
        offset: usize,
    ) -> Result<Vec<Fit>, SubPeakError> {
        let mut pending = vec![(0, values.len())];
        let mut fits = Vec::new();

        while let Some((start, end)) = pending.pop() {
            let stretch = &values[start..end];
            let background = self.background_level(stretch);
            let without: Vec<f64> = stretch.iter().map(|v| v - background).collect();

            if let Some(split) = self.split_index(&without) {
                debug!(
                    "Splitting {}-{} at {}",
                    offset + start,
                    offset + end - 1,
                    offset + start + split
                );
                pending.push((start + split, end));
                pending.push((start, start + split));
                continue;
            }

            if let Some(fit) = self.fit_stretch::<T>(stretch, background, offset + start)? {
                fits.push(fit);
            }
        }
        fits.sort_by_key(|f| f.region.start);
        Ok(fits)
    }

    pub fn background_level(&self, values: &[f64]) -> f64 {
        match self.config.background {
            BackgroundMode::Minimum => minmax(values).0,
            BackgroundMode::Tails => {
                let first = values.first().copied().unwrap_or_default();
                let last = values.last().copied().unwrap_or_default();
                first.max(last)
            }
        }
    }

    /// Find where to split a stretch with its baseline removed, if it should be split.
    ///
    /// Stretches over the hard maximum length are always split at their interior
    /// minimum. Those over the soft maximum are split only when that minimum is a deep
    /// valley relative to the stretch's maximum.
    pub fn split_index(&self, values: &[f64]) -> Option<usize> {
        let n = values.len();
        if n <= self.config.soft_max_length {
            return None;
        }
        let margin = ((n as f64 * self.config.split_margin) as usize).max(1);
        let index = argmin_within(values, margin..n.saturating_sub(margin))?;
        if n > self.config.hard_max_length {
            return Some(index);
        }
        let (_, max) = minmax(values);
        if max <= 0.0 {
            return None;
        }
        (values[index] / max <= self.config.split_ratio).then_some(index)
    }

    /// The positions of `values` to fit, inclusive
    fn fit_window(&self, values: &[f64], background: f64) -> Option<(usize, usize)> {
        match self.config.background {
            BackgroundMode::Minimum => (!values.is_empty()).then(|| (0, values.len() - 1)),
            BackgroundMode::Tails => {
                let first = values.iter().position(|v| *v >= background)?;
                let last = values.iter().rposition(|v| *v >= background)?;
                Some((first, last))
            }
        }
    }

    fn fit_stretch<T: GaussianShape>(
        &self,
        stretch: &[f64],
        background: f64,
        offset: usize,
    ) -> Result<Option<Fit>, SubPeakError> {
        let Some((lo, hi)) = self.fit_window(stretch, background) else {
            return Ok(None);
        };
        let curve: Vec<f64> = stretch[lo..=hi].iter().map(|v| v - background).collect();
        let origin = offset + lo;
        if curve.len() < self.config.min_values {
            debug!("Skipping {} values at {origin}", curve.len());
            return Ok(None);
        }
        let average = mean(&curve);
        if average <= 0.0 || !average.is_finite() {
            return Ok(None);
        }
        let scaled: Vec<f64> = curve.iter().map(|v| v / average).collect();
        let region = Region::new(origin, origin + curve.len() - 1);

        let candidate_regions = find_candidate_regions(&scaled);
        let candidates = initial_candidates::<T>(&scaled, &candidate_regions)?;
        debug!("{} candidates in {region}", candidates.len());
        if candidates.is_empty() {
            let rms = (scaled.iter().map(|v| v * v).sum::<f64>() / scaled.len() as f64).sqrt();
            return Ok(Some(Fit {
                region,
                sub_peaks: Vec::new(),
                background,
                error: rms,
                optimization: None,
            }));
        }

        let scale = mean(&scaled);
        let mut best: Option<(Vec<T>, OptimizeResult)> = None;
        for j in candidates.len() / 2..candidates.len() {
            match optimize(&scaled, &candidates[..=j], &self.config, scale) {
                Ok((components, result)) => {
                    if best.as_ref().map_or(true, |(_, b)| result.rms < b.rms) {
                        best = Some((components, result));
                    }
                }
                Err(err) => debug!("Subset of {} candidates in {region} failed: {err}", j + 1),
            }
            let good_enough = match (&best, self.config.acceptable_error) {
                (Some((_, b)), Some(limit)) => b.rms <= limit,
                _ => false,
            };
            if good_enough {
                break;
            }
        }
        let (components, result) = best.ok_or(SubPeakError::OptimizerDiverged)?;
        debug!(
            "Accepted {} components in {region} with error {:0.4}",
            components.len(),
            result.rms
        );

        let amplitude_scale = average.sqrt();
        let mut sub_peaks: Vec<SubPeak> = components
            .into_iter()
            .map(|mut c| {
                c.set_amplitude(c.amplitude() * amplitude_scale);
                c.translate(origin as f64);
                SubPeak::from_parameters(c)
            })
            .collect();
        sub_peaks.sort_by(|a, b| a.parameters.mean().total_cmp(&b.parameters.mean()));

        Ok(Some(Fit {
            region,
            sub_peaks,
            background,
            error: result.rms,
            optimization: Some(result),
        }))
    }

    /// Decompose every peak called on `pdf`.
    ///
    /// Peaks are dispatched widest first. A peak whose decomposition fails is
    /// logged and contributes no sub-peaks.
    pub fn fit_peaks(&self, pdf: &Pdf, peaks: &[Peak]) -> Vec<SubPeak> {
        let mut regions: Vec<Region> = peaks.iter().map(|p| p.region).collect();
        regions.sort_by_key(|r| std::cmp::Reverse(r.len()));

        let mut sub_peaks = map_regions(&regions, |region| {
            match self.fit(pdf.on_region(region), region.start) {
                Ok(fits) => fits.into_iter().flat_map(|f| f.sub_peaks).collect(),
                Err(err) => {
                    error!("Failed to fit sub-peaks in {}:{region}: {err}", pdf.chromosome);
                    Vec::new()
                }
            }
        });
        sub_peaks.sort_by(|a, b| a.parameters.mean().total_cmp(&b.parameters.mean()));
        sub_peaks
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallelism")] {
        pub(crate) fn map_regions<T, F>(regions: &[Region], f: F) -> Vec<T>
        where
            T: Send,
            F: Fn(&Region) -> Vec<T> + Sync + Send,
        {
            regions.par_iter().flat_map_iter(f).collect()
        }
    } else {
        pub(crate) fn map_regions<T, F>(regions: &[Region], f: F) -> Vec<T>
        where
            F: Fn(&Region) -> Vec<T>,
        {
            regions.iter().flat_map(f).collect()
        }
    }
}
