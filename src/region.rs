//! Interval value types shared by the peak caller, the merger and the decomposer.
use std::collections::BTreeSet;
use std::fmt::Display;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An interval of positions on a chromosome.
///
/// Peak calling and merging treat both ends as inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "region start {start} after end {end}");
        Self { start, end }
    }

    /// Number of positions covered, counting both ends
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }

    /// Whether `other` lies entirely within this region
    pub fn encloses(&self, other: &Region) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn center(&self) -> f64 {
        (self.start + self.end) as f64 / 2.0
    }

    /// The half-open index range for slicing dense arrays
    pub fn range(&self) -> Range<usize> {
        self.start..self.end + 1
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl From<(usize, usize)> for Region {
    fn from(value: (usize, usize)) -> Self {
        Self::new(value.0, value.1)
    }
}

/// A called peak, scored by the highest density value it contains
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Peak {
    pub region: Region,
    pub score: f64,
}

impl Peak {
    pub fn new(region: Region, score: f64) -> Self {
        Self { region, score }
    }
}

/// A region tagged with the indices of the replicates that called it
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicatedRegion {
    pub region: Region,
    pub replicates: BTreeSet<usize>,
}

impl ReplicatedRegion {
    pub fn new(region: Region, replicate: usize) -> Self {
        Self {
            region,
            replicates: BTreeSet::from([replicate]),
        }
    }

    /// Absorb an overlapping region called by `replicate`
    pub fn absorb(&mut self, region: &Region, replicate: usize) {
        self.region.end = self.region.end.max(region.end);
        self.replicates.insert(replicate);
    }

    /// Whether every one of `n_replicates` sources contributed
    pub fn is_unanimous(&self, n_replicates: usize) -> bool {
        self.replicates.len() == n_replicates
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_region_geometry() {
        let a = Region::new(10, 19);
        assert_eq!(a.len(), 10);
        assert_eq!(a.range(), 10..20);
        assert_eq!(a.center(), 14.5);
        assert!(a.contains(10) && a.contains(19) && !a.contains(20));
        assert!(a.overlaps(&Region::new(19, 30)));
        assert!(!a.overlaps(&Region::new(20, 30)));
        assert!(a.encloses(&Region::new(12, 15)));
        assert_eq!(a.to_string(), "10-19");
    }

    #[test]
    fn test_replicated_region() {
        let mut r = ReplicatedRegion::new(Region::new(0, 10), 1);
        r.absorb(&Region::new(5, 20), 0);
        r.absorb(&Region::new(8, 12), 1);
        assert_eq!(r.region, Region::new(0, 20));
        assert!(r.is_unanimous(2));
        assert!(!r.is_unanimous(3));
    }
}
