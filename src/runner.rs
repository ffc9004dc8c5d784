//! Whole-run orchestration: which coverage tracks are combined, how, and in what order
//! per-chromosome work is dispatched.
//!
//! A [`Runner`] reads tracks from one or more [`CoverageSource`]s and, per chromosome,
//! applies one of four [`Strategy`] variants before smoothing, peak calling and sub-peak
//! decomposition. Chromosomes are independent units of work. A chromosome whose
//! background cannot be estimated is skipped with a warning and never aborts the run.
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::io::prelude::*;

use log::{info, warn};
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coverage::Coverage;
use crate::pdf::{Background, Pdf, PdfConfig};
use crate::peaks::{call_peaks, merge_peaks, merge_replicated_peaks};
use crate::region::{Peak, Region};
use crate::signal::{step_sections, SignalSection};
use crate::subpeaks::{FitConfig, SubPeak, SubPeakFitter};
use crate::text::{write_peaks_bed, write_step_sections, write_sub_peaks_bed, ChromosomeFilter};

/// How several input tracks are combined for each chromosome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    /// Exactly one input track
    #[default]
    SingleFile,
    /// Sum all tracks, then smooth and call peaks once
    BottomUp,
    /// Call peaks per track, merge them and decompose the peaks-only aggregate
    TopDown,
    /// Call peaks per replicate, keep unanimous regions and score sub-peaks by
    /// replicate support
    Replicated,
}

/// Which dense track to export as a step signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SignalKind {
    /// The combined coverage before smoothing
    Raw,
    /// The smoothed density
    Smoothed,
}

/// The products a run should compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutputTargets {
    pub peaks: bool,
    pub sub_peaks: bool,
    pub signal: Option<SignalKind>,
}

impl OutputTargets {
    pub fn peaks(mut self, value: bool) -> Self {
        self.peaks = value;
        self
    }

    pub fn sub_peaks(mut self, value: bool) -> Self {
        self.sub_peaks = value;
        self
    }

    pub fn signal(mut self, kind: Option<SignalKind>) -> Self {
        self.signal = kind;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.peaks && !self.sub_peaks && self.signal.is_none()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("No output was requested")]
    NoOutputConfigured,
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),
    #[cfg(feature = "parallelism")]
    #[error("Failed to build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Settings for a whole run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    pub strategy: Strategy,
    pub pdf: PdfConfig,
    /// Peaks are positions more than this many background standard deviations above
    /// the background mean
    pub threshold: f64,
    pub fit: FitConfig,
    /// Worker count. `None` uses the available hardware parallelism.
    pub parallelism: Option<usize>,
    pub chromosome_filter: Option<ChromosomeFilter>,
    pub outputs: OutputTargets,
    /// Makes background estimation reproducible. Each track of each chromosome
    /// receives its own seed derived from this one.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            pdf: PdfConfig::default(),
            threshold: 6.0,
            fit: FitConfig::default(),
            parallelism: None,
            chromosome_filter: None,
            outputs: OutputTargets::default(),
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn pdf(mut self, pdf: PdfConfig) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn fit(mut self, fit: FitConfig) -> Self {
        self.fit = fit;
        self
    }

    pub fn parallelism(mut self, parallelism: Option<usize>) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn chromosome_filter(mut self, filter: Option<ChromosomeFilter>) -> Self {
        self.chromosome_filter = filter;
        self
    }

    pub fn outputs(mut self, outputs: OutputTargets) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Reject configurations that cannot produce anything, before any work starts
    pub fn validate(&self, n_sources: usize) -> Result<(), RunError> {
        if self.outputs.is_empty() {
            return Err(RunError::NoOutputConfigured);
        }
        if n_sources == 0 {
            return Err(RunError::InvalidConfig("no coverage inputs".to_string()));
        }
        match self.strategy {
            Strategy::SingleFile if n_sources != 1 => {
                return Err(RunError::InvalidConfig(format!(
                    "single-file runs take one input, found {n_sources}"
                )))
            }
            Strategy::Replicated if n_sources < 2 => {
                return Err(RunError::InvalidConfig(format!(
                    "replicated runs need at least two inputs, found {n_sources}"
                )))
            }
            _ => {}
        }
        if !(self.pdf.bandwidth.is_finite() && self.pdf.bandwidth > 0.0) {
            return Err(RunError::InvalidConfig(format!(
                "bandwidth must be positive, found {}",
                self.pdf.bandwidth
            )));
        }
        if !self.threshold.is_finite() {
            return Err(RunError::InvalidConfig(format!(
                "threshold must be finite, found {}",
                self.threshold
            )));
        }
        if self.parallelism == Some(0) {
            return Err(RunError::InvalidConfig(
                "parallelism must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}

/// A provider of per-chromosome coverage, such as one alignment file
pub trait CoverageSource {
    /// The chromosomes this source has coverage for
    fn chromosomes(&self) -> Vec<String>;

    /// The coverage of `chromosome`, if this source has any
    fn coverage(&self, chromosome: &str) -> Option<Coverage>;
}

/// Coverage tracks held in memory, keyed by chromosome
#[derive(Debug, Clone, Default)]
pub struct InMemoryCoverage {
    tracks: BTreeMap<String, Coverage>,
}

impl InMemoryCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coverage: Coverage) {
        self.tracks.insert(coverage.chromosome.clone(), coverage);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl FromIterator<Coverage> for InMemoryCoverage {
    fn from_iter<T: IntoIterator<Item = Coverage>>(iter: T) -> Self {
        let mut source = Self::new();
        for coverage in iter {
            source.insert(coverage);
        }
        source
    }
}

impl CoverageSource for InMemoryCoverage {
    fn chromosomes(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    fn coverage(&self, chromosome: &str) -> Option<Coverage> {
        self.tracks.get(chromosome).cloned()
    }
}

/// Everything a run produced for one chromosome
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChromosomeResult {
    pub chromosome: String,
    pub background: Background,
    pub peaks: Vec<Peak>,
    pub sub_peaks: Vec<SubPeak>,
    /// One score per sub-peak, present for replicated runs
    pub replication_scores: Option<Vec<f64>>,
    pub signal: Option<Vec<SignalSection>>,
}

impl ChromosomeResult {
    pub fn write_peaks<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_peaks_bed(writer, &self.chromosome, &self.peaks)
    }

    pub fn write_sub_peaks<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_sub_peaks_bed(writer, &self.chromosome, &self.sub_peaks)
    }

    pub fn write_signal<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self.signal.as_deref() {
            Some(sections) => write_step_sections(writer, &self.chromosome, sections),
            None => Ok(()),
        }
    }
}

/// The combined track a strategy hands to smoothing, with the regions to decompose
/// when they were decided before smoothing
struct Combined {
    pdf: Pdf,
    raw: Coverage,
    regions: Option<Vec<Region>>,
    replicates: Vec<Pdf>,
}

/// Executes a [`RunConfig`] over a set of coverage sources
#[derive(Debug, Clone, Default)]
pub struct Runner {
    pub config: RunConfig,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Process every selected chromosome, returning results in chromosome order.
    ///
    /// Configuration errors are reported before any coverage is read.
    pub fn run<S: CoverageSource + Sync>(
        &self,
        sources: &[S],
    ) -> Result<Vec<ChromosomeResult>, RunError> {
        self.config.validate(sources.len())?;
        let chromosomes = self.chromosomes(sources);
        info!(
            "Running {:?} over {} inputs and {} chromosomes",
            self.config.strategy,
            sources.len(),
            chromosomes.len()
        );
        let results = self.dispatch(sources, &chromosomes)?;
        info!("Finished {} chromosomes", results.len());
        Ok(results)
    }

    /// The union of the sources' chromosomes that pass the filter, sorted
    pub fn chromosomes<S: CoverageSource>(&self, sources: &[S]) -> Vec<String> {
        let names: BTreeSet<String> = sources.iter().flat_map(|s| s.chromosomes()).collect();
        names
            .into_iter()
            .filter(|name| {
                self.config
                    .chromosome_filter
                    .as_ref()
                    .map_or(true, |f| f.contains(name))
            })
            .collect()
    }

    /// Process one chromosome. `None` when no source covers it or its background is
    /// unusable. Replicated runs also skip chromosomes that any replicate lacks, since
    /// consensus requires every replicate.
    pub fn run_chromosome<S: CoverageSource>(
        &self,
        sources: &[S],
        index: usize,
        chromosome: &str,
    ) -> Option<ChromosomeResult> {
        let tracks: Vec<Option<Coverage>> =
            sources.iter().map(|s| s.coverage(chromosome)).collect();
        let missing = tracks.iter().filter(|t| t.is_none()).count();
        if self.config.strategy == Strategy::Replicated && missing > 0 {
            warn!("{chromosome} is missing from {missing} of {} replicates, skipping", tracks.len());
            return None;
        }
        let tracks: Vec<Coverage> = tracks.into_iter().flatten().collect();
        if tracks.is_empty() {
            warn!("No coverage for {chromosome}, skipping");
            return None;
        }
        info!("Processing {chromosome} from {} tracks", tracks.len());

        let combined = match self.config.strategy {
            Strategy::SingleFile => self.single_file(&tracks, index),
            Strategy::BottomUp => self.bottom_up(&tracks, index),
            Strategy::TopDown => self.top_down(&tracks, index),
            Strategy::Replicated => self.replicated(&tracks, index),
        }?;
        let Combined {
            pdf,
            raw,
            regions,
            replicates,
        } = combined;

        let peaks = match regions {
            Some(regions) => regions
                .into_iter()
                .map(|r| Peak::new(r, max_on(&pdf, &r)))
                .collect(),
            None => call_peaks(&pdf, self.config.threshold),
        };
        info!("{} peaks on {chromosome}", peaks.len());

        let fitter = SubPeakFitter::new(self.config.fit.clone());
        let (sub_peaks, replication_scores) = if !self.config.outputs.sub_peaks {
            (Vec::new(), None)
        } else if replicates.is_empty() {
            (fitter.fit_peaks(&pdf, &peaks), None)
        } else {
            let regions: Vec<Region> = peaks.iter().map(|p| p.region).collect();
            let scored = fitter.fit_replicated_peaks(&replicates, &regions);
            let scores = scored.iter().map(|s| s.replication_score).collect();
            (scored.into_iter().map(|s| s.sub_peak).collect(), Some(scores))
        };

        let signal = self.config.outputs.signal.map(|kind| match kind {
            SignalKind::Raw => match self.filter_range(chromosome) {
                Some(range) => step_sections(&raw.restricted_to(&range).values),
                None => step_sections(&raw.values),
            },
            SignalKind::Smoothed => step_sections(&pdf.values),
        });

        Some(ChromosomeResult {
            chromosome: chromosome.to_string(),
            background: pdf.background,
            peaks: if self.config.outputs.peaks || self.config.outputs.sub_peaks {
                peaks
            } else {
                Vec::new()
            },
            sub_peaks,
            replication_scores,
            signal,
        })
    }

    fn filter_range(&self, chromosome: &str) -> Option<Region> {
        self.config
            .chromosome_filter
            .as_ref()
            .and_then(|f| f.range_of(chromosome))
    }

    fn pdf_config(&self, chromosome: &str, index: usize, track: usize) -> PdfConfig {
        let range = self.filter_range(chromosome).or(self.config.pdf.range);
        let seed = self
            .config
            .seed
            .map(|s| s.wrapping_add(((index as u64) << 16) | track as u64))
            .or(self.config.pdf.seed);
        self.config.pdf.clone().range(range).seed(seed)
    }

    /// Build a density for `coverage`, or `None` when its background is unusable
    fn usable_pdf(&self, coverage: &Coverage, index: usize, track: usize) -> Option<Pdf> {
        let pdf = Pdf::build(coverage, &self.pdf_config(&coverage.chromosome, index, track));
        if pdf.background.is_usable() {
            Some(pdf)
        } else {
            warn!(
                "Background of {} track {track} is degenerate ({:?}), skipping",
                coverage.chromosome, pdf.background
            );
            None
        }
    }

    fn single_file(&self, tracks: &[Coverage], index: usize) -> Option<Combined> {
        let raw = tracks.first()?.clone();
        let pdf = self.usable_pdf(&raw, index, 0)?;
        Some(Combined {
            pdf,
            raw,
            regions: None,
            replicates: Vec::new(),
        })
    }

    fn bottom_up(&self, tracks: &[Coverage], index: usize) -> Option<Combined> {
        let raw = Coverage::sum_of(tracks)?;
        let pdf = self.usable_pdf(&raw, index, 0)?;
        Some(Combined {
            pdf,
            raw,
            regions: None,
            replicates: Vec::new(),
        })
    }

    /// Smooth and call peaks on each track separately. Tracks with an unusable
    /// background yield `None`.
    fn per_track_peaks(&self, tracks: &[Coverage], index: usize) -> Vec<Option<(Pdf, Vec<Peak>)>> {
        tracks
            .iter()
            .enumerate()
            .map(|(i, track)| {
                let pdf = self.usable_pdf(track, index, i + 1)?;
                let peaks = call_peaks(&pdf, self.config.threshold);
                Some((pdf, peaks))
            })
            .collect()
    }

    fn top_down(&self, tracks: &[Coverage], index: usize) -> Option<Combined> {
        let peaks: Vec<Vec<Peak>> = self
            .per_track_peaks(tracks, index)
            .into_iter()
            .map(|called| called.map(|(_, peaks)| peaks).unwrap_or_default())
            .collect();
        let region_lists: Vec<Vec<Region>> = peaks
            .iter()
            .map(|p| p.iter().map(|p| p.region).collect())
            .collect();
        let merged = merge_peaks(&region_lists);

        let raw = Coverage::peaks_only(tracks, &peaks)?;
        let pdf = self.usable_pdf(&raw, index, 0)?;
        Some(Combined {
            pdf,
            raw,
            regions: Some(merged),
            replicates: Vec::new(),
        })
    }

    fn replicated(&self, tracks: &[Coverage], index: usize) -> Option<Combined> {
        let called: Vec<(Pdf, Vec<Peak>)> = self
            .per_track_peaks(tracks, index)
            .into_iter()
            .collect::<Option<_>>()?;
        let region_lists: Vec<Vec<Region>> = called
            .iter()
            .map(|(_, p)| p.iter().map(|p| p.region).collect())
            .collect();
        let consensus: Vec<Region> = merge_replicated_peaks(&region_lists)
            .into_iter()
            .map(|r| r.region)
            .collect();

        let raw = Coverage::mean_of(tracks)?;
        let pdf = self.usable_pdf(&raw, index, 0)?;
        Some(Combined {
            pdf,
            raw,
            regions: Some(consensus),
            replicates: called.into_iter().map(|(pdf, _)| pdf).collect(),
        })
    }
}

fn max_on(pdf: &Pdf, region: &Region) -> f64 {
    pdf.on_region(region)
        .iter()
        .copied()
        .fold(0.0f64, f64::max)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "parallelism")] {
        impl Runner {
            fn dispatch<S: CoverageSource + Sync>(
                &self,
                sources: &[S],
                chromosomes: &[String],
            ) -> Result<Vec<ChromosomeResult>, RunError> {
                let mut builder = rayon::ThreadPoolBuilder::new();
                if let Some(threads) = self.config.parallelism {
                    builder = builder.num_threads(threads);
                }
                let pool = builder.build()?;
                info!("Using {} worker threads", pool.current_num_threads());
                Ok(pool.install(|| {
                    chromosomes
                        .par_iter()
                        .enumerate()
                        .filter_map(|(i, chromosome)| self.run_chromosome(sources, i, chromosome))
                        .collect()
                }))
            }
        }
    } else {
        impl Runner {
            fn dispatch<S: CoverageSource + Sync>(
                &self,
                sources: &[S],
                chromosomes: &[String],
            ) -> Result<Vec<ChromosomeResult>, RunError> {
                Ok(chromosomes
                    .iter()
                    .enumerate()
                    .filter_map(|(i, chromosome)| self.run_chromosome(sources, i, chromosome))
                    .collect())
            }
        }
    }
}
