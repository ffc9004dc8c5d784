//! Dense per-position coverage tracks and the ways several tracks are combined
//! before smoothing.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops;
use crate::region::{Peak, Region};

/// Read coverage for one chromosome, one value per base pair.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coverage {
    pub chromosome: String,
    pub values: Vec<f32>,
}

impl Coverage {
    pub fn new(chromosome: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            chromosome: chromosome.into(),
            values,
        }
    }

    pub fn zeros(chromosome: impl Into<String>, len: usize) -> Self {
        Self::new(chromosome, vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total coverage across the whole track
    pub fn sum(&self) -> f64 {
        arrayops::sum(&self.values)
    }

    /// Total coverage across `region` only
    pub fn sum_within(&self, region: &Region) -> f64 {
        let end = (region.end + 1).min(self.len());
        let start = region.start.min(end);
        arrayops::sum(&self.values[start..end])
    }

    /// The span from the first to the last covered position
    pub fn active_range(&self) -> Option<Region> {
        arrayops::nonzero_span(&self.values).map(Region::from)
    }

    /// Zero every position outside of `region`
    pub fn restricted_to(&self, region: &Region) -> Self {
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| if region.contains(i) { *v } else { 0.0 })
            .collect();
        Self::new(self.chromosome.clone(), values)
    }

    /// Sum several tracks of the same chromosome position by position.
    ///
    /// Tracks of differing length are padded with zeros to the longest.
    pub fn sum_of(tracks: &[Coverage]) -> Option<Coverage> {
        let first = tracks.first()?;
        let len = tracks.iter().map(|t| t.len()).max().unwrap_or_default();
        let mut values = vec![0.0f32; len];
        for track in tracks {
            for (acc, v) in values.iter_mut().zip(track.values.iter()) {
                *acc += *v;
            }
        }
        Some(Coverage::new(first.chromosome.clone(), values))
    }

    /// Average several replicate tracks position by position
    pub fn mean_of(tracks: &[Coverage]) -> Option<Coverage> {
        let mut total = Self::sum_of(tracks)?;
        let n = tracks.len() as f32;
        total.values.iter_mut().for_each(|v| *v /= n);
        Some(total)
    }

    /// Build a track holding each input's coverage inside that input's own peaks,
    /// averaged over the number of inputs that called a peak at each position.
    pub fn peaks_only(tracks: &[Coverage], peaks: &[Vec<Peak>]) -> Option<Coverage> {
        let first = tracks.first()?;
        let len = tracks.iter().map(|t| t.len()).max().unwrap_or_default();
        let mut values = vec![0.0f32; len];
        let mut sources = vec![0u32; len];
        for (track, track_peaks) in tracks.iter().zip(peaks.iter()) {
            for peak in track_peaks {
                for bp in peak.region.range() {
                    if let Some(v) = track.values.get(bp) {
                        values[bp] += *v;
                        sources[bp] += 1;
                    }
                }
            }
        }
        for (v, n) in values.iter_mut().zip(sources) {
            if n > 1 {
                *v /= n as f32;
            }
        }
        Some(Coverage::new(first.chromosome.clone(), values))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sum_of_pads_to_longest() {
        let a = Coverage::new("chr1", vec![1.0, 2.0]);
        let b = Coverage::new("chr1", vec![0.5, 0.5, 3.0]);
        let total = Coverage::sum_of(&[a, b]).unwrap();
        assert_eq!(total.values, vec![1.5, 2.5, 3.0]);
        assert_eq!(total.sum(), 7.0);
        assert!(Coverage::sum_of(&[]).is_none());
    }

    #[test]
    fn test_peaks_only_averages_sources() {
        let a = Coverage::new("chr1", vec![2.0; 6]);
        let b = Coverage::new("chr1", vec![4.0; 6]);
        let peaks = vec![
            vec![Peak::new(Region::new(0, 2), 1.0)],
            vec![Peak::new(Region::new(2, 3), 1.0)],
        ];
        let agg = Coverage::peaks_only(&[a, b], &peaks).unwrap();
        assert_eq!(agg.values, vec![2.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_active_range() {
        let a = Coverage::new("chr1", vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(a.active_range(), Some(Region::new(2, 4)));
        assert_eq!(a.restricted_to(&Region::new(3, 5)).values, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(Coverage::zeros("chr1", 3).active_range(), None);
    }
}
