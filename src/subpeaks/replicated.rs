//! Sub-peak decomposition across replicates, scoring each component by how much of
//! every replicate's signal it explains.
use log::error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pdf::Pdf;
use crate::region::Region;

use super::fitter::map_regions;
use super::{Fit, SubPeak, SubPeakError, SubPeakFitter};

/// A sub-peak fit on the replicate average, with its replication score
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicatedSubPeak {
    pub sub_peak: SubPeak,
    /// Mean increase in a replicate's squared error when this component is removed
    /// from the fitted composite. Larger is better supported.
    pub replication_score: f64,
}

/// Compute how much worse each replicate is described once component `index` of `fit`
/// is removed, averaged over replicates.
///
/// Each replicate curve's first entry lies at absolute position `offset`.
pub fn replication_score(fit: &Fit, index: usize, replicates: &[&[f64]], offset: usize) -> f64 {
    if replicates.is_empty() {
        return 0.0;
    }
    let component = &fit.sub_peaks[index].parameters;
    let total: f64 = replicates
        .iter()
        .map(|replicate| {
            fit.region
                .range()
                .filter_map(|x| {
                    let y = *replicate.get(x.checked_sub(offset)?)?;
                    let composite = fit.composite(x as f64);
                    let without = composite - component.density(x as f64);
                    Some((y - without).powi(2) - (y - composite).powi(2))
                })
                .sum::<f64>()
        })
        .sum();
    total / replicates.len() as f64
}

impl SubPeakFitter {
    /// Fit the average of several equal-length replicate curves and score every
    /// component against each replicate
    pub fn fit_replicated(
        &self,
        replicates: &[&[f64]],
        offset: usize,
    ) -> Result<Vec<ReplicatedSubPeak>, SubPeakError> {
        let Some(first) = replicates.first() else {
            return Ok(Vec::new());
        };
        let n = first.len();
        if let Some(bad) = replicates.iter().find(|r| r.len() != n) {
            return Err(SubPeakError::MismatchedReplicates(n, bad.len()));
        }
        let average: Vec<f64> = (0..n)
            .map(|i| replicates.iter().map(|r| r[i]).sum::<f64>() / replicates.len() as f64)
            .collect();

        let fits = self.fit(&average, offset)?;
        let mut scored = Vec::new();
        for fit in fits.iter() {
            for (i, sub_peak) in fit.sub_peaks.iter().enumerate() {
                scored.push(ReplicatedSubPeak {
                    sub_peak: *sub_peak,
                    replication_score: replication_score(fit, i, replicates, offset),
                });
            }
        }
        Ok(scored)
    }

    /// Decompose consensus `regions` over replicate densities of the same chromosome.
    ///
    /// Regions shorter than the minimum fit length are skipped and failures are logged.
    pub fn fit_replicated_peaks(&self, pdfs: &[Pdf], regions: &[Region]) -> Vec<ReplicatedSubPeak> {
        let mut regions: Vec<Region> = regions
            .iter()
            .filter(|r| r.len() >= self.config.min_values)
            .copied()
            .collect();
        regions.sort_by_key(|r| std::cmp::Reverse(r.len()));

        let mut sub_peaks = map_regions(&regions, |region| {
            let curves: Vec<&[f64]> = pdfs.iter().map(|p| p.on_region(region)).collect();
            match self.fit_replicated(&curves, region.start) {
                Ok(found) => found,
                Err(err) => {
                    let chromosome = pdfs.first().map(|p| p.chromosome.as_str()).unwrap_or_default();
                    error!("Failed to fit replicated sub-peaks in {chromosome}:{region}: {err}");
                    Vec::new()
                }
            }
        });
        sub_peaks.sort_by(|a, b| {
            a.sub_peak
                .parameters
                .mean()
                .total_cmp(&b.sub_peak.parameters.mean())
        });
        sub_peaks
    }
}
