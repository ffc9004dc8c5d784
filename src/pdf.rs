//! Kernel density smoothing of raw coverage and the Monte-Carlo background model
//! used as the significance reference when calling peaks.
//!
//! The density at each position is the sum of every covered position's value
//! weighted by a Gaussian of the configured bandwidth. Contributions are truncated at
//! the radius where a unit Gaussian underflows (see [`window_size`]), so the cost
//! is proportional to the number of covered positions times the window width.
//!
//! The background is estimated by simulating how much density a position would
//! receive if the same total coverage were spread uniformly over the active span of
//! the chromosome.
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops;
use crate::atomic::AtomicF64Array;
use crate::coverage::Coverage;
use crate::gaussian::{gaussian_distribution, normal_height, SQRT_2PI};
use crate::region::Region;

/// The number of simulated windows drawn when estimating the background
pub const BACKGROUND_LIMIT: usize = 1000;

/// The distribution of density values expected from unstructured coverage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Background {
    pub average: f64,
    pub std_dev: f64,
}

impl Background {
    pub fn new(average: f64, std_dev: f64) -> Self {
        Self { average, std_dev }
    }

    /// A zero mean or standard deviation means the input was empty or degenerate
    /// and nothing should be called against it.
    pub fn is_usable(&self) -> bool {
        self.average > 0.0 && self.std_dev > 0.0
    }

    /// Standard deviations above background for `value`
    #[inline]
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.average) / self.std_dev
    }
}

/// The radius in positions beyond which a Gaussian with standard deviation `bandwidth`
/// contributes less than the smallest normal `f64`
pub fn window_size(bandwidth: f64) -> usize {
    let radius = (-2.0 * (f64::MIN_POSITIVE * SQRT_2PI).ln()).sqrt();
    (radius * bandwidth).floor() as usize
}

/// Tabulate kernel weights for offsets `0..=window`.
///
/// With `normalize_height` the kernel has unit area. When `total` is given the
/// weights are further divided by it so the whole density sums to one.
pub fn lookup_table(
    bandwidth: f64,
    window: usize,
    normalize_height: bool,
    total: Option<f64>,
) -> Vec<f64> {
    let a = if normalize_height {
        normal_height(bandwidth)
    } else {
        1.0
    };
    let mut table = gaussian_distribution(a, bandwidth, window);
    if let Some(total) = total.filter(|t| *t > 0.0) {
        table.iter_mut().for_each(|v| *v /= total);
    }
    table
}

/// Parameters controlling how a [`Pdf`] is built
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PdfConfig {
    /// The kernel standard deviation in base pairs
    pub bandwidth: f64,
    /// Scale the kernel to unit area
    pub normalize_height: bool,
    /// Divide the density by the total coverage
    pub normalize_sum: bool,
    /// Only scatter coverage from within this region
    pub range: Option<Region>,
    /// Use this span in place of the observed first-to-last covered span
    pub active_length: Option<usize>,
    /// The number of Monte-Carlo trials for the background
    pub trials: usize,
    /// Seed for the background sampler. Without one the sampler is seeded from the OS.
    pub seed: Option<u64>,
}

impl PdfConfig {
    pub fn bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn normalize(mut self, value: bool) -> Self {
        self.normalize_height = value;
        self.normalize_sum = value;
        self
    }

    pub fn normalize_height(mut self, value: bool) -> Self {
        self.normalize_height = value;
        self
    }

    pub fn normalize_sum(mut self, value: bool) -> Self {
        self.normalize_sum = value;
        self
    }

    pub fn range(mut self, range: Option<Region>) -> Self {
        self.range = range;
        self
    }

    pub fn active_length(mut self, active_length: Option<usize>) -> Self {
        self.active_length = active_length;
        self
    }

    pub fn trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            bandwidth: 50.0,
            normalize_height: false,
            normalize_sum: false,
            range: None,
            active_length: None,
            trials: BACKGROUND_LIMIT,
            seed: None,
        }
    }
}

/// A smoothed coverage track and its background model
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pdf {
    pub chromosome: String,
    pub values: Vec<f64>,
    pub background: Background,
    /// The region coverage was scattered from
    pub range: Region,
}

impl Pdf {
    /// Smooth `coverage` and estimate its background
    pub fn build(coverage: &Coverage, config: &PdfConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::build_with_rng(coverage, config, &mut rng)
    }

    /// As [`Pdf::build`] but drawing background samples from `rng`
    pub fn build_with_rng<R: Rng + ?Sized>(
        coverage: &Coverage,
        config: &PdfConfig,
        rng: &mut R,
    ) -> Self {
        let n = coverage.len();
        let range = config
            .range
            .map(|r| Region::new(r.start.min(n.saturating_sub(1)), r.end.min(n.saturating_sub(1))))
            .unwrap_or_else(|| Region::new(0, n.saturating_sub(1)));

        let total = if n == 0 { 0.0 } else { coverage.sum_within(&range) };
        let window = window_size(config.bandwidth);
        let table = lookup_table(
            config.bandwidth,
            window,
            config.normalize_height,
            config.normalize_sum.then_some(total),
        );
        debug!(
            "Smoothing {} ({n} bp) with bandwidth {} over a {window} bp window",
            coverage.chromosome, config.bandwidth
        );

        let values = if n == 0 {
            Vec::new()
        } else {
            scatter_density(&coverage.values, &range, &table)
        };

        let active_length = config.active_length.unwrap_or_else(|| {
            arrayops::nonzero_span(&values)
                .map(|(first, last)| last - first + 1)
                .unwrap_or_default()
        });
        let background = estimate_background(&table, total, active_length, config.trials, rng);
        debug!("{} background: {background:?}", coverage.chromosome);

        Self {
            chromosome: coverage.chromosome.clone(),
            values,
            background,
            range,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The density values covered by `region`, clipped to the track
    pub fn on_region(&self, region: &Region) -> &[f64] {
        let end = (region.end + 1).min(self.len());
        let start = region.start.min(end);
        &self.values[start..end]
    }
}

fn scatter_from(values: &[f32], table: &[f64], acc: &AtomicF64Array, pos: usize) {
    let v = values[pos] as f64;
    if v == 0.0 {
        return;
    }
    let n = acc.len();
    acc.add(pos, v * table[0]);
    for (offset, k) in table.iter().enumerate().skip(1) {
        let contrib = v * k;
        if pos + offset < n {
            acc.add(pos + offset, contrib);
        }
        if offset <= pos {
            acc.add(pos - offset, contrib);
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn scatter_density(values: &[f32], range: &Region, table: &[f64]) -> Vec<f64> {
            let acc = AtomicF64Array::zeros(values.len());
            range.range().into_par_iter().for_each(|pos| scatter_from(values, table, &acc, pos));
            acc.into_vec()
        }
    } else {
        fn scatter_density(values: &[f32], range: &Region, table: &[f64]) -> Vec<f64> {
            let acc = AtomicF64Array::zeros(values.len());
            range.range().for_each(|pos| scatter_from(values, table, &acc, pos));
            acc.into_vec()
        }
    }
}

/// Simulate the density a position would receive from `total` coverage spread
/// uniformly over `active_length` positions.
///
/// When more than one covered position is expected per window, every trial sums
/// that many kernel weights at random offsets. Otherwise each trial includes a single
/// random weight with the expected probability. Both branches sample offsets from the
/// inner half of the window.
pub fn estimate_background<R: Rng + ?Sized>(
    table: &[f64],
    total: f64,
    active_length: usize,
    trials: usize,
    rng: &mut R,
) -> Background {
    if active_length == 0 || total <= 0.0 || table.len() < 2 || trials == 0 {
        return Background::default();
    }
    let window = table.len() - 1;
    let span = (window / 2).max(1);
    let average_n = total * window as f64 / active_length as f64;

    let sums: Vec<f64> = if average_n > 1.0 {
        let draws = average_n.floor() as usize;
        (0..trials)
            .map(|_| (0..draws).map(|_| table[rng.gen_range(0..span)]).sum())
            .collect()
    } else {
        (0..trials)
            .map(|_| {
                if rng.gen_bool(average_n) {
                    table[rng.gen_range(0..span)]
                } else {
                    0.0
                }
            })
            .collect()
    };

    let average = arrayops::mean(&sums);
    let variance = sums.iter().map(|s| (s - average).powi(2)).sum::<f64>() / trials as f64;
    trace!("Background from {trials} trials with {average_n:0.4} expected events: {average} {variance}");

    if variance > 0.0 {
        return Background::new(average, variance.sqrt());
    }

    // Too few simulated events to observe any spread
    let k1 = arrayops::mean(&table[..span]);
    let k2 = table[..span].iter().map(|k| k * k).sum::<f64>() / span as f64;
    let (average, variance) = if average_n > 1.0 {
        let n = average_n.floor();
        (n * k1, n * (k2 - k1 * k1))
    } else {
        (average_n * k1, average_n * k2 - (average_n * k1).powi(2))
    };
    Background::new(average.max(0.0), variance.max(0.0).sqrt())
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::test_data::{point_coverage, triangle_coverage};

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
    }

    #[test]
    fn test_window_size() {
        assert_eq!(window_size(1.0), 37);
        assert_eq!(window_size(2.0), 75);
        assert_eq!(window_size(50.0), 1880);
    }

    #[test]
    fn test_single_read_kernel() {
        let coverage = point_coverage(100, &[40]);
        let pdf = Pdf::build(&coverage, &PdfConfig::default().bandwidth(1.0).seed(Some(1)));
        assert_eq!(pdf.len(), 100);
        assert_is_close!(pdf.values[40], 1.0, 1e-12, "center");
        assert_is_close!(pdf.values[41], (-0.5f64).exp(), 1e-12, "right");
        assert_is_close!(pdf.values[39], (-0.5f64).exp(), 1e-12, "left");
        assert_eq!(pdf.values[40 - 38], 0.0);
        assert!(pdf.values[40 - 37] > 0.0);
    }

    #[test]
    fn test_scatter_reaches_position_zero() {
        let coverage = point_coverage(20, &[3]);
        let pdf = Pdf::build(&coverage, &PdfConfig::default().bandwidth(1.0).seed(Some(1)));
        assert_is_close!(pdf.values[0], (-4.5f64).exp(), 1e-12, "edge");
    }

    #[test]
    fn test_normalized_density_sums_to_one() {
        let coverage = point_coverage(400, &[150, 200, 201, 260]);
        let config = PdfConfig::default().bandwidth(5.0).normalize(true).seed(Some(7));
        let pdf = Pdf::build(&coverage, &config);
        let total: f64 = pdf.values.iter().sum();
        assert_is_close!(total, 1.0, 1e-3, "density mass");
    }

    #[test]
    fn test_range_limits_sources() {
        let coverage = point_coverage(300, &[50, 250]);
        let config = PdfConfig::default()
            .bandwidth(1.0)
            .range(Some(Region::new(0, 100)))
            .seed(Some(3));
        let pdf = Pdf::build(&coverage, &config);
        assert_eq!(pdf.values[250], 0.0);
        assert_is_close!(pdf.values[50], 1.0, 1e-12, "in range");
    }

    #[test]
    fn test_empty_track_has_degenerate_background() {
        let coverage = Coverage::zeros("chr1", 500);
        let pdf = Pdf::build(&coverage, &PdfConfig::default().seed(Some(1)));
        assert_eq!(pdf.background, Background::default());
        assert!(!pdf.background.is_usable());

        let empty = Coverage::zeros("chr1", 0);
        let pdf = Pdf::build(&empty, &PdfConfig::default());
        assert!(pdf.is_empty());
        assert!(!pdf.background.is_usable());
    }

    #[rstest::rstest]
    #[case::dense(point_coverage(2_000, &(500..1500).step_by(3).collect::<Vec<_>>()))]
    #[case::sparse(point_coverage(1_000_000, &[1_000, 900_000]))]
    #[case::triangle(triangle_coverage(50, 25, 10.0, 10))]
    fn test_background_is_positive(#[case] coverage: Coverage) {
        let mut rng = StdRng::seed_from_u64(42);
        let pdf = Pdf::build_with_rng(&coverage, &PdfConfig::default().bandwidth(2.0), &mut rng);
        assert!(pdf.background.average >= 0.0);
        assert!(pdf.background.std_dev > 0.0, "{:?}", pdf.background);
    }

    #[test]
    fn test_dense_background_matches_expectation() {
        let table = lookup_table(2.0, window_size(2.0), false, None);
        let span = (table.len() - 1) / 2;
        let k1 = table[..span].iter().sum::<f64>() / span as f64;
        let mut rng = StdRng::seed_from_u64(11);
        // 100 coverage over 75 positions with a 75 bp window, 100 draws per trial
        let bg = estimate_background(&table, 100.0, 75, BACKGROUND_LIMIT, &mut rng);
        let expected = 100.0 * k1;
        assert!((bg.average - expected).abs() / expected < 0.05, "{bg:?} vs {expected}");
    }
}
