use rand::seq::SliceRandom;
use rand::Rng;

use crate::math::Matrix;

/// Mini-batch iterator over in-memory samples.
///
/// Batches are taken in sample order unless [`DataLoader::shuffled`] is used.
/// The last batch holds the remainder when the sample count is not a multiple
/// of `batch_size`.
pub struct DataLoader<'a> {
    data: &'a [Vec<f32>],
    order: Vec<usize>,
    batch_size: usize,
    index: usize,
}

impl<'a> DataLoader<'a> {
    pub fn new(data: &'a [Vec<f32>], batch_size: usize) -> Self {
        Self {
            data,
            order: (0..data.len()).collect(),
            batch_size: batch_size.max(1),
            index: 0,
        }
    }

    /// Randomly permute the visiting order.
    pub fn shuffled<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        self.order.shuffle(rng);
        self
    }

    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }
}

impl Iterator for DataLoader<'_> {
    type Item = Matrix;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.order.len() {
            return None;
        }
        let end = (self.index + self.batch_size).min(self.order.len());
        let cols = self.data[self.order[self.index]].len();
        let mut data = Vec::with_capacity((end - self.index) * cols);
        for &i in &self.order[self.index..end] {
            assert_eq!(self.data[i].len(), cols, "samples must share one width");
            data.extend_from_slice(&self.data[i]);
        }
        let rows = end - self.index;
        self.index = end;
        Some(Matrix::from_vec(rows, cols, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::rng_from_seed;

    fn samples(n: usize) -> Vec<Vec<f32>> {
        (0..n).map(|i| vec![i as f32; 3]).collect()
    }

    #[test]
    fn sequential_batches_keep_order() {
        let data = samples(5);
        let batches: Vec<Matrix> = DataLoader::new(&data, 2).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].shape(), (2, 3));
        assert_eq!(batches[0].get(1, 0), 1.0);
        assert_eq!(batches[2].shape(), (1, 3));
        assert_eq!(batches[2].get(0, 0), 4.0);
    }

    #[test]
    fn num_batches_rounds_up() {
        let data = samples(7);
        assert_eq!(DataLoader::new(&data, 3).num_batches(), 3);
        assert_eq!(DataLoader::new(&data, 7).num_batches(), 1);
    }

    #[test]
    fn shuffle_visits_every_sample_once() {
        let data = samples(10);
        let mut rng = rng_from_seed(5);
        let mut seen: Vec<f32> = DataLoader::new(&data, 4)
            .shuffled(&mut rng)
            .flat_map(|m| (0..m.rows).map(move |r| m.get(r, 0)).collect::<Vec<_>>())
            .collect();
        seen.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(seen, (0..10).map(|v| v as f32).collect::<Vec<_>>());
    }
}
