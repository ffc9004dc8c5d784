//! Small numeric helpers over dense signal arrays.
use std::ops::Range;

use num_traits::Float;

/// Find the minimum and maximum values of `values` in a single pass.
///
/// An empty slice yields `(inf, -inf)`.
pub fn minmax<T: Float>(values: &[T]) -> (T, T) {
    let mut max = -T::infinity();
    let mut min = T::infinity();

    for v in values.iter() {
        if *v > max {
            max = *v;
        }
        if *v < min {
            min = *v
        }
    }
    (min, max)
}

/// Sum a slice in `f64` regardless of the storage type
pub fn sum<T: Float>(values: &[T]) -> f64 {
    values.iter().map(|v| v.to_f64().unwrap_or_default()).sum()
}

/// The arithmetic mean of `values`, or zero for an empty slice
pub fn mean<T: Float>(values: &[T]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    sum(values) / values.len() as f64
}

/// The index of the smallest value inside `window`, clipped to the slice bounds.
///
/// Ties resolve to the left-most index.
pub fn argmin_within<T: Float>(values: &[T], window: Range<usize>) -> Option<usize> {
    let end = window.end.min(values.len());
    let start = window.start.min(end);
    values[start..end]
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, T)>, (i, v)| match best {
            Some((_, b)) if *v >= b => best,
            _ => Some((i + start, *v)),
        })
        .map(|(i, _)| i)
}

/// The inclusive span between the first and the last non-zero entries
pub fn nonzero_span<T: Float>(values: &[T]) -> Option<(usize, usize)> {
    let first = values.iter().position(|v| !v.is_zero())?;
    let last = values.iter().rposition(|v| !v.is_zero())?;
    Some((first, last))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_minmax() {
        let (lo, hi) = minmax(&[3.0f32, -1.0, 7.5, 2.0]);
        assert_eq!(lo, -1.0);
        assert_eq!(hi, 7.5);
    }

    #[test]
    fn test_argmin_within_clips_window() {
        let values = [0.0, 5.0, 2.0, 1.0, 4.0, 0.0];
        assert_eq!(argmin_within(&values, 1..5), Some(3));
        assert_eq!(argmin_within(&values, 4..100), Some(5));
        assert_eq!(argmin_within(&values, 6..10), None);
    }

    #[test]
    fn test_nonzero_span() {
        assert_eq!(nonzero_span(&[0.0f32, 0.0, 1.0, 0.0, 2.0, 0.0]), Some((2, 4)));
        assert_eq!(nonzero_span(&[0.0f64; 4]), None);
    }
}
