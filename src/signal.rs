//! Run-length step encoding of dense tracks for step-function signal export.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A run of `length` positions starting at `start` that all share `value`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalSection {
    pub start: usize,
    pub length: usize,
    pub value: f64,
}

impl SignalSection {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Collapse runs of equal values into sections, in order.
///
/// Zero-valued runs are omitted since step tracks leave them implicit.
pub fn step_sections<T: Into<f64> + Copy>(values: &[T]) -> Vec<SignalSection> {
    let mut sections = Vec::new();
    let mut current: Option<SignalSection> = None;
    for (i, v) in values.iter().copied().map(Into::into).enumerate() {
        match current.as_mut() {
            Some(section) if section.value == v => section.length += 1,
            _ => {
                if let Some(done) = current.take().filter(|s| s.value != 0.0) {
                    sections.push(done);
                }
                current = Some(SignalSection {
                    start: i,
                    length: 1,
                    value: v,
                });
            }
        }
    }
    if let Some(done) = current.filter(|s| s.value != 0.0) {
        sections.push(done);
    }
    sections
}

/// Expand sections back into a dense track of `len` positions
pub fn expand_sections(sections: &[SignalSection], len: usize) -> Vec<f64> {
    let mut values = vec![0.0; len];
    for section in sections {
        let end = section.end().min(len);
        let start = section.start.min(end);
        values[start..end].iter_mut().for_each(|v| *v = section.value);
    }
    values
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_step_sections() {
        let values = [0.0f32, 0.0, 2.0, 2.0, 2.0, 1.5, 0.0, 1.5, 1.5];
        let sections = step_sections(&values);
        assert_eq!(
            sections,
            vec![
                SignalSection { start: 2, length: 3, value: 2.0 },
                SignalSection { start: 5, length: 1, value: 1.5 },
                SignalSection { start: 7, length: 2, value: 1.5 },
            ]
        );
        let dense = expand_sections(&sections, values.len());
        assert_eq!(dense, values.iter().map(|v| *v as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_and_zero_tracks() {
        assert!(step_sections::<f64>(&[]).is_empty());
        assert!(step_sections(&[0.0f64; 10]).is_empty());
    }
}
