//! Plain text records for peaks, sub-peaks and step signal tracks, and parsing of
//! chromosome filter lists.
//!
//! Coordinates are written the way BED and bedGraph expect them: zero-based, with an
//! exclusive end.
use std::collections::BTreeMap;
use std::io;
use std::io::prelude::*;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::region::{Peak, Region};
use crate::signal::{step_sections, SignalSection};
use crate::subpeaks::{GaussianParameters, SubPeak};

/// A short, stable name for `region` on `chromosome`.
///
/// The start and end are packed as big-endian 32-bit integers and encoded as URL-safe
/// base64 without padding, so distinct regions always receive distinct names.
pub fn peak_name(chromosome: &str, region: &Region) -> String {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&(region.start as u32).to_be_bytes());
    bytes[4..].copy_from_slice(&(region.end as u32).to_be_bytes());
    format!("{chromosome}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Write one BED6 record per peak
pub fn write_peaks_bed<W: Write>(
    writer: &mut W,
    chromosome: &str,
    peaks: &[Peak],
) -> io::Result<()> {
    for peak in peaks {
        writeln!(
            writer,
            "{chromosome}\t{}\t{}\t{}\t{}\t.",
            peak.region.start,
            peak.region.end + 1,
            peak_name(chromosome, &peak.region),
            peak.score
        )?;
    }
    Ok(())
}

/// Write one BED record per sub-peak followed by its Gaussian parameters.
///
/// The trailing columns are `amplitude mean std_dev`, plus `shape` for skewed
/// components.
pub fn write_sub_peaks_bed<W: Write>(
    writer: &mut W,
    chromosome: &str,
    sub_peaks: &[SubPeak],
) -> io::Result<()> {
    for sub_peak in sub_peaks {
        write!(
            writer,
            "{chromosome}\t{}\t{}\t{}\t{}\t.\t{}\t{}\t{}",
            sub_peak.region.start,
            sub_peak.region.end + 1,
            peak_name(chromosome, &sub_peak.region),
            sub_peak.score,
            sub_peak.parameters.amplitude(),
            sub_peak.parameters.mean(),
            sub_peak.parameters.std_dev(),
        )?;
        if let GaussianParameters::Skew(skew) = &sub_peak.parameters {
            write!(writer, "\t{}", skew.shape)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write `values` as a bedGraph step track. Zero runs are left out.
pub fn write_bedgraph<W: Write, T: Into<f64> + Copy>(
    writer: &mut W,
    chromosome: &str,
    values: &[T],
) -> io::Result<()> {
    write_step_sections(writer, chromosome, &step_sections(values))
}

/// Write already collapsed sections as bedGraph records
pub fn write_step_sections<W: Write>(
    writer: &mut W,
    chromosome: &str,
    sections: &[SignalSection],
) -> io::Result<()> {
    for section in sections {
        writeln!(
            writer,
            "{chromosome}\t{}\t{}\t{}",
            section.start,
            section.end(),
            section.value
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("Line {0}: expected `chromosome` or `chromosome start-end`, found {1:?}")]
    Malformed(usize, String),
    #[error("Line {0}: {1:?} is not a valid position")]
    InvalidPosition(usize, String),
    #[error("Line {0}: range start {1} is after end {2}")]
    InvertedRange(usize, usize, usize),
}

/// Which chromosomes to process, optionally restricted to a sub-range each.
///
/// Parsed from lines of the form `chr` or `chr start-end`. Blank lines and lines
/// starting with `#` are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChromosomeFilter {
    entries: BTreeMap<String, Option<Region>>,
}

impl ChromosomeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `chromosome`, restricted to `range` when given
    pub fn with(mut self, chromosome: impl Into<String>, range: Option<Region>) -> Self {
        self.entries.insert(chromosome.into(), range);
        self
    }

    pub fn parse(text: &str) -> Result<Self, FilterParseError> {
        let mut filter = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let (Some(chromosome), range, None) = (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(FilterParseError::Malformed(line_number, line.to_string()));
            };
            let range = range
                .map(|token| parse_range(token, line_number))
                .transpose()?;
            filter.entries.insert(chromosome.to_string(), range);
        }
        Ok(filter)
    }

    pub fn contains(&self, chromosome: &str) -> bool {
        self.entries.contains_key(chromosome)
    }

    /// The sub-range `chromosome` is restricted to, if any
    pub fn range_of(&self, chromosome: &str) -> Option<Region> {
        self.entries.get(chromosome).copied().flatten()
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_range(token: &str, line_number: usize) -> Result<Region, FilterParseError> {
    let (start, end) = token
        .split_once('-')
        .ok_or_else(|| FilterParseError::Malformed(line_number, token.to_string()))?;
    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| FilterParseError::InvalidPosition(line_number, s.to_string()))
    };
    let (start, end) = (parse(start)?, parse(end)?);
    if start > end {
        return Err(FilterParseError::InvertedRange(line_number, start, end));
    }
    Ok(Region::new(start, end))
}

impl FromStr for ChromosomeFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::subpeaks::{SkewGaussian, StandardGaussian};

    #[test]
    fn test_peak_names_are_distinct() {
        let a = peak_name("chr1", &Region::new(100, 200));
        let b = peak_name("chr1", &Region::new(100, 201));
        let c = peak_name("chr2", &Region::new(100, 200));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, peak_name("chr1", &Region::new(100, 200)));
        assert!(a.starts_with("chr1"));
        // Eight bytes encode to eleven characters without padding
        assert_eq!(a.len(), "chr1".len() + 11);
        assert!(!a.contains('=') && !a.contains('/') && !a.contains('+'));
    }

    #[test]
    fn test_write_peaks() {
        let peaks = vec![Peak::new(Region::new(10, 19), 7.5)];
        let mut buffer = Vec::new();
        write_peaks_bed(&mut buffer, "chr3", &peaks).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let fields: Vec<&str> = text.trim_end().split('\t').collect();
        assert_eq!(fields.len(), 6);
        assert_eq!(&fields[..3], &["chr3", "10", "20"]);
        assert_eq!(fields[3], peak_name("chr3", &Region::new(10, 19)));
        assert_eq!(fields[4], "7.5");
    }

    #[test]
    fn test_write_sub_peaks() {
        let sub_peaks = vec![
            SubPeak::from_parameters(StandardGaussian::new(2.0, 50.0, 4.0)),
            SubPeak::from_parameters(SkewGaussian::new(2.0, 80.0, 4.0, 1.5)),
        ];
        let mut buffer = Vec::new();
        write_sub_peaks_bed(&mut buffer, "chrX", &sub_peaks).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 9);
        assert_eq!(lines[1].len(), 10);
        assert_eq!(lines[0][7], "50");
        assert_eq!(lines[1][9], "1.5");
    }

    #[test]
    fn test_write_bedgraph() {
        let values = [0.0f32, 0.0, 1.5, 1.5, 1.5, 0.0, 2.0];
        let mut buffer = Vec::new();
        write_bedgraph(&mut buffer, "chr1", &values).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "chr1\t2\t5\t1.5\nchr1\t6\t7\t2\n");
    }

    #[test]
    fn test_parse_filter() {
        let text = "# chromosomes to keep\nchr1\n\n  chr2 100-2000\n";
        let filter: ChromosomeFilter = text.parse().unwrap();
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("chr1"));
        assert!(!filter.contains("chr3"));
        assert_eq!(filter.range_of("chr1"), None);
        assert_eq!(filter.range_of("chr2"), Some(Region::new(100, 2000)));
        assert_eq!(filter.chromosomes().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
    }

    #[test]
    fn test_parse_filter_errors() {
        assert_eq!(
            ChromosomeFilter::parse("chr1 1-2 extra"),
            Err(FilterParseError::Malformed(1, "chr1 1-2 extra".to_string()))
        );
        assert_eq!(
            ChromosomeFilter::parse("chr1\nchr2 a-10"),
            Err(FilterParseError::InvalidPosition(2, "a".to_string()))
        );
        assert_eq!(
            ChromosomeFilter::parse("chr1 50-10"),
            Err(FilterParseError::InvertedRange(1, 50, 10))
        );
        assert!(ChromosomeFilter::parse("# nothing\n\n").unwrap().is_empty());
    }
}
