//! A fixed-length array of `f64` cells supporting lock-free accumulation.
//!
//! Each cell stores the bit pattern of an `f64` inside an [`AtomicU64`] and
//! additions retry a compare-and-swap until they land.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct AtomicF64Array {
    cells: Vec<AtomicU64>,
}

impl AtomicF64Array {
    pub fn zeros(len: usize) -> Self {
        let cells = (0..len).map(|_| AtomicU64::new(0f64.to_bits())).collect();
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        f64::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    /// Add `delta` to the cell at `index`, safe to call from many threads at once
    pub fn add(&self, index: usize, delta: f64) {
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Consume the array, yielding the accumulated values
    pub fn into_vec(self) -> Vec<f64> {
        self.cells
            .into_iter()
            .map(|c| f64::from_bits(c.into_inner()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_accumulate() {
        let arr = AtomicF64Array::zeros(3);
        arr.add(1, 0.5);
        arr.add(1, 1.25);
        assert_eq!(arr.get(1), 1.75);
        assert_eq!(arr.into_vec(), vec![0.0, 1.75, 0.0]);
    }

    #[cfg(feature = "parallelism")]
    #[test]
    fn test_concurrent_accumulate() {
        use rayon::prelude::*;
        let arr = AtomicF64Array::zeros(4);
        (0..10_000usize).into_par_iter().for_each(|i| arr.add(i % 4, 1.0));
        for i in 0..4 {
            assert_eq!(arr.get(i), 2500.0);
        }
    }
}
