//! Behavioral novelty: test-outcome descriptors and a bounded archive.
//!
//! A descriptor has one bit per test in the global test ordering, set when the
//! test passed. Distance is the normalized Hamming distance, and a
//! candidate's novelty is the mean distance to its k nearest archived
//! descriptors.

use std::collections::BTreeSet;

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoveltyError {
    #[error("Descriptor length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Empty behavior descriptor")]
    EmptyDescriptor,
}

/// Pass/fail bitset over the ordered test suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BehaviorDescriptor {
    bits: Vec<u64>,
    len: usize,
}

impl BehaviorDescriptor {
    /// Tests absent from `failed` count as passed, including tests the
    /// evaluation did not run.
    pub fn from_outcomes(ordered_tests: &[String], failed: &BTreeSet<String>) -> Self {
        Self::from_passed(ordered_tests.iter().map(|t| !failed.contains(t)))
    }

    pub fn from_passed<I: IntoIterator<Item = bool>>(passed: I) -> Self {
        let mut bits = Vec::new();
        let mut len = 0;
        for (i, p) in passed.into_iter().enumerate() {
            if i % 64 == 0 {
                bits.push(0u64);
            }
            if p {
                bits[i / 64] |= 1u64 << (i % 64);
            }
            len = i + 1;
        }
        Self { bits, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn passed(&self, i: usize) -> bool {
        i < self.len && self.bits[i / 64] & (1u64 << (i % 64)) != 0
    }

    /// Hamming distance divided by the test count, in [0, 1].
    pub fn distance(&self, other: &Self) -> Result<f64, NoveltyError> {
        if self.len != other.len {
            return Err(NoveltyError::LengthMismatch {
                expected: self.len,
                found: other.len,
            });
        }
        if self.len == 0 {
            return Err(NoveltyError::EmptyDescriptor);
        }
        let hamming: u32 = self
            .bits
            .iter()
            .zip(&other.bits)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        Ok(hamming as f64 / self.len as f64)
    }
}

/// Bounded descriptor archive with random-slot eviction.
#[derive(Debug, Clone)]
pub struct BehaviorArchive {
    entries: Vec<BehaviorDescriptor>,
    capacity: usize,
}

impl BehaviorArchive {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[BehaviorDescriptor] {
        &self.entries
    }

    /// Append while under capacity, otherwise overwrite one uniformly random slot.
    pub fn insert<R: Rng + ?Sized>(&mut self, descriptor: BehaviorDescriptor, rng: &mut R) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() < self.capacity {
            self.entries.push(descriptor);
        } else {
            let slot = rng.gen_range(0..self.entries.len());
            self.entries[slot] = descriptor;
        }
    }

    /// Mean distance to the `k` nearest archived descriptors.
    ///
    /// An empty archive scores 1.0. `k` is clamped to the archive size.
    pub fn novelty_score(&self, descriptor: &BehaviorDescriptor, k: usize) -> Result<f64, NoveltyError> {
        if descriptor.is_empty() {
            return Err(NoveltyError::EmptyDescriptor);
        }
        if self.entries.is_empty() {
            return Ok(1.0);
        }
        let mut distances = self
            .entries
            .iter()
            .map(|archived| descriptor.distance(archived))
            .collect::<Result<Vec<f64>, _>>()?;
        distances.sort_by(|a, b| a.total_cmp(b));

        let k = k.clamp(1, distances.len());
        Ok(distances[..k].iter().sum::<f64>() / k as f64)
    }
}
