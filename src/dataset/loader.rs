//! Restartable batch index loader
//!
//! Training loops consume datasets through index batches produced here.
//! A loader is a finite sequence of shuffled batches that can be restarted
//! from the beginning an unbounded number of times; the student loops drive
//! the unlabeled stream through [`DataLoader::next_cyclic`], which makes the
//! restart an explicit operation rather than caught-exhaustion control flow.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Shuffled, restartable index batch producer over a dataset of known size.
#[derive(Debug, Clone)]
pub struct DataLoader {
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
    restarts: usize,
}

impl DataLoader {
    /// Create a loader over `num_samples` indices.
    ///
    /// When `shuffle` is set, the order is re-drawn at creation and at every
    /// restart from the seeded stream.
    pub fn new(num_samples: usize, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        let mut loader = Self {
            indices: (0..num_samples).collect(),
            batch_size: batch_size.max(1),
            cursor: 0,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
            restarts: 0,
        };
        if loader.shuffle {
            loader.indices.shuffle(&mut loader.rng);
        }
        loader
    }

    /// Next batch of indices, or `None` once the sequence is exhausted.
    /// The final batch may be smaller than `batch_size`.
    pub fn next_batch(&mut self) -> Option<Vec<usize>> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch = self.indices[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }

    /// Restart from the beginning, reshuffling if configured.
    ///
    /// Used at epoch boundaries; does not count as a mid-sequence restart.
    pub fn reset(&mut self) {
        self.cursor = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Next batch from an endless cyclic view of the sequence: on
    /// exhaustion the loader restarts from the beginning and serves the
    /// first batch of the fresh pass.
    ///
    /// Panics only if the loader holds zero samples, which configuration
    /// validation rules out before any loop runs.
    pub fn next_cyclic(&mut self) -> Vec<usize> {
        if let Some(batch) = self.next_batch() {
            return batch;
        }
        self.restarts += 1;
        self.reset();
        self.next_batch()
            .expect("cyclic loader over an empty dataset")
    }

    /// How many times `next_cyclic` wrapped around so far
    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Number of batches in one full pass
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }

    /// Number of samples in one full pass
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the loader holds no samples
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
