//! Threshold peak calling against a [`Background`] and merging of region lists
//! from independent callers.
//!
//! All regions produced here are inclusive at both ends.
use log::debug;

use crate::pdf::{Background, Pdf};
use crate::region::{Peak, Region, ReplicatedRegion};

/// Call peaks on a smoothed track, keeping every run of positions whose density is more
/// than `threshold` standard deviations above the background.
pub fn call_peaks(pdf: &Pdf, threshold: f64) -> Vec<Peak> {
    let peaks = call_peaks_on(&pdf.values, &pdf.background, threshold);
    debug!(
        "Called {} peaks on {} at threshold {threshold}",
        peaks.len(),
        pdf.chromosome
    );
    peaks
}

/// Call peaks on raw density values.
///
/// A region opens at the first position whose z-score exceeds `threshold` and closes at
/// the position before the z-score falls back to or below it. A region still open at
/// the end of `values` closes at the last position. Each peak is scored by the
/// maximum density it contains.
pub fn call_peaks_on(values: &[f64], background: &Background, threshold: f64) -> Vec<Peak> {
    let mut peaks = Vec::new();
    let mut current: Option<(usize, f64)> = None;
    for (i, v) in values.iter().copied().enumerate() {
        let above = background.z_score(v) > threshold;
        current = match (current, above) {
            (None, true) => Some((i, v)),
            (Some((start, best)), true) => Some((start, best.max(v))),
            (Some((start, best)), false) => {
                peaks.push(Peak::new(Region::new(start, i - 1), best));
                None
            }
            (None, false) => None,
        };
    }
    if let Some((start, best)) = current {
        peaks.push(Peak::new(Region::new(start, values.len() - 1), best));
    }
    peaks
}

/// Merge several region lists into one sorted, non-overlapping list.
///
/// Each list is sorted by start. The lowest-start unconsumed region across all lists
/// becomes the merge candidate. Every list is then scanned repeatedly and any region
/// starting at or before the candidate's end is absorbed, until no list offers a
/// continuation.
pub fn merge_peaks<L: AsRef<[Region]>>(lists: &[L]) -> Vec<Region> {
    let lists: Vec<Vec<Region>> = lists
        .iter()
        .map(|l| {
            let mut l = l.as_ref().to_vec();
            l.sort();
            l
        })
        .collect();
    let mut cursors = vec![0usize; lists.len()];
    let mut merged = Vec::new();

    loop {
        let next = (0..lists.len())
            .filter(|i| cursors[*i] < lists[*i].len())
            .min_by_key(|i| lists[*i][cursors[*i]].start);
        let Some(i) = next else {
            break;
        };
        let mut current = lists[i][cursors[i]];
        cursors[i] += 1;

        let mut absorbed = true;
        while absorbed {
            absorbed = false;
            for (list, cursor) in lists.iter().zip(cursors.iter_mut()) {
                while let Some(region) = list.get(*cursor) {
                    if region.start > current.end {
                        break;
                    }
                    current.end = current.end.max(region.end);
                    *cursor += 1;
                    absorbed = true;
                }
            }
        }
        merged.push(current);
    }
    merged
}

/// Merge replicate region lists, keeping only merged regions that every replicate
/// contributed to.
///
/// Regions supported by only some replicates are dropped.
pub fn merge_replicated_peaks<L: AsRef<[Region]>>(lists: &[L]) -> Vec<ReplicatedRegion> {
    let n_replicates = lists.len();
    let mut tagged: Vec<(Region, usize)> = lists
        .iter()
        .enumerate()
        .flat_map(|(i, l)| l.as_ref().iter().map(move |r| (*r, i)))
        .collect();
    tagged.sort();

    let mut consensus = Vec::new();
    let mut current: Option<ReplicatedRegion> = None;
    for (region, replicate) in tagged {
        match current.as_mut() {
            Some(cur) if region.start <= cur.region.end => cur.absorb(&region, replicate),
            _ => {
                if let Some(done) = current.take().filter(|c| c.is_unanimous(n_replicates)) {
                    consensus.push(done);
                }
                current = Some(ReplicatedRegion::new(region, replicate));
            }
        }
    }
    if let Some(done) = current.filter(|c| c.is_unanimous(n_replicates)) {
        consensus.push(done);
    }
    debug!(
        "{} consensus regions across {n_replicates} replicates",
        consensus.len()
    );
    consensus
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::pdf::PdfConfig;
    use crate::test_data::{gaussian_curve, triangle_coverage};

    fn regions(pairs: &[(usize, usize)]) -> Vec<Region> {
        pairs.iter().copied().map(Region::from).collect()
    }

    #[rstest::fixture]
    fn density() -> Vec<f64> {
        let mut values = vec![1.0; 600];
        for (mean, height, width) in [(100.0, 20.0, 10.0), (300.0, 8.0, 25.0), (480.0, 40.0, 5.0)] {
            for (v, g) in values.iter_mut().zip(gaussian_curve(600, height, mean, width)) {
                *v += g;
            }
        }
        values
    }

    #[test]
    fn test_call_peaks_regions_and_scores() {
        let values = vec![0.0, 0.0, 5.0, 7.0, 6.0, 0.0, 0.0, 9.0, 9.5];
        let peaks = call_peaks_on(&values, &Background::new(1.0, 1.0), 3.0);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].region, Region::new(2, 4));
        assert_eq!(peaks[0].score, 7.0);
        // Still open at the end of the scan
        assert_eq!(peaks[1].region, Region::new(7, 8));
        assert_eq!(peaks[1].score, 9.5);
    }

    #[test]
    fn test_triangle_gives_one_peak() {
        let coverage = triangle_coverage(50, 25, 10.0, 10);
        let pdf = Pdf::build(&coverage, &PdfConfig::default().bandwidth(2.0).seed(Some(42)));
        let peaks = call_peaks(&pdf, 6.0);
        assert_eq!(peaks.len(), 1, "{peaks:?} against {:?}", pdf.background);
        assert!(peaks[0].region.contains(25), "{:?}", peaks[0]);
        assert!(peaks[0].region.len() < 20, "{:?}", peaks[0]);
    }

    #[rstest::rstest]
    #[case(1.0, 2.0)]
    #[case(2.0, 6.0)]
    #[case(0.5, 10.0)]
    fn test_lower_threshold_covers_higher(density: Vec<f64>, #[case] t1: f64, #[case] t2: f64) {
        let background = Background::new(1.0, 1.0);
        let loose = call_peaks_on(&density, &background, t1);
        let strict = call_peaks_on(&density, &background, t2);
        assert!(!strict.is_empty());
        for peak in strict.iter() {
            assert!(
                loose.iter().any(|p| p.region.encloses(&peak.region)),
                "{:?} not covered by {:?}",
                peak,
                loose
            );
        }
    }

    #[test]
    fn test_merge_peaks() {
        let lists = vec![
            regions(&[(2, 4), (5, 6), (8, 10), (100, 110)]),
            regions(&[(1, 3), (5, 10), (21, 22), (25, 50)]),
            regions(&[(30, 40), (35, 60), (65, 70), (100, 105)]),
        ];
        let merged = merge_peaks(&lists);
        assert_eq!(
            merged,
            regions(&[(1, 4), (5, 10), (21, 22), (25, 60), (65, 70), (100, 110)])
        );
    }

    #[test]
    fn test_merge_peaks_idempotent() {
        let a = regions(&[(0, 5), (10, 20), (30, 31), (40, 80)]);
        assert_eq!(merge_peaks(&[a.clone()]), a);
        assert_eq!(merge_peaks(&[a.clone(), a.clone()]), a);
        let merged = merge_peaks(&[a.clone(), regions(&[(4, 12), (79, 90)])]);
        assert_eq!(merge_peaks(&[merged.clone(), merged.clone()]), merged);
    }

    #[test]
    fn test_merge_peaks_unsorted_input() {
        let merged = merge_peaks(&[regions(&[(50, 60), (1, 2)]), regions(&[])]);
        assert_eq!(merged, regions(&[(1, 2), (50, 60)]));
        assert!(merge_peaks::<Vec<Region>>(&[]).is_empty());
    }

    #[test]
    fn test_replicated_merge_requires_all_replicates() {
        let lists = vec![
            regions(&[(0, 10), (50, 60), (200, 210)]),
            regions(&[(5, 15), (100, 110), (205, 220)]),
        ];
        let merged = merge_replicated_peaks(&lists);
        let found: Vec<Region> = merged.iter().map(|r| r.region).collect();
        assert_eq!(found, regions(&[(0, 15), (200, 220)]));
        assert!(merged.iter().all(|r| r.is_unanimous(2)));
    }
}
