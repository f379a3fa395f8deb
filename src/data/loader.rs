use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::sentiment::SentimentDatum;

/// Trait for data loading
pub trait DataLoader {
    /// Get the next batch of data
    fn next_batch(&mut self) -> Option<&[SentimentDatum]>;

    /// Reset the data loader to the beginning
    fn reset(&mut self);

    /// Get the total number of batches (if known)
    fn num_batches(&self) -> Option<usize>;
}

/// Batches over an in-memory dataset. With a seed, the order is reshuffled
/// on every reset.
pub struct SentimentDataLoader {
    data: Vec<SentimentDatum>,
    batch_size: usize,
    current_pos: usize,
    rng: Option<StdRng>,
}

impl SentimentDataLoader {
    pub fn new(data: Vec<SentimentDatum>, batch_size: usize) -> Self {
        Self {
            data,
            batch_size: batch_size.max(1),
            current_pos: 0,
            rng: None,
        }
    }

    pub fn shuffled(data: Vec<SentimentDatum>, batch_size: usize, seed: u64) -> Self {
        let mut loader = Self {
            rng: Some(StdRng::seed_from_u64(seed)),
            ..Self::new(data, batch_size)
        };
        loader.shuffle();
        loader
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn shuffle(&mut self) {
        if let Some(rng) = self.rng.as_mut() {
            self.data.shuffle(rng);
        }
    }
}

impl DataLoader for SentimentDataLoader {
    fn next_batch(&mut self) -> Option<&[SentimentDatum]> {
        if self.current_pos >= self.data.len() {
            return None;
        }
        let start = self.current_pos;
        let end = (start + self.batch_size).min(self.data.len());
        self.current_pos = end;
        Some(&self.data[start..end])
    }

    fn reset(&mut self) {
        self.current_pos = 0;
        self.shuffle();
    }

    fn num_batches(&self) -> Option<usize> {
        Some(self.data.len().div_ceil(self.batch_size))
    }
}
