//! Uniform random sampler drawing samples without replacement.

use rand::prelude::*;

use crate::core::Sampler;
use crate::utils::seeded_rng;

/// Partial Fisher–Yates shuffle: O(k) per sample, independent of N.
pub struct UniformRandomSampler {
    rng: StdRng,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomSampler {
    /// Construct a new sampler with a random seed.
    pub fn new() -> Self {
        Self {
            rng: seeded_rng(None),
        }
    }

    /// Construct a sampler from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: seeded_rng(Some(seed)),
        }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, indices: &mut [usize], sample_size: usize) -> bool {
        let n = indices.len();
        if sample_size == 0 || sample_size > n {
            return false;
        }

        for i in 0..sample_size {
            let j = self.rng.gen_range(i..n);
            indices.swap(i, j);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_unique_and_in_range() {
        let mut sampler = UniformRandomSampler::from_seed(1234);
        let mut indices: Vec<usize> = (0..20).collect();

        for _ in 0..100 {
            assert!(sampler.sample(&mut indices, 8));
            let drawn = &indices[..8];
            assert!(drawn.iter().all(|&i| i < 20));
            for a in 0..drawn.len() {
                for b in (a + 1)..drawn.len() {
                    assert_ne!(drawn[a], drawn[b]);
                }
            }
        }

        // Still a permutation after many draws.
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn deterministic_with_same_seed() {
        let mut s1 = UniformRandomSampler::from_seed(42);
        let mut s2 = UniformRandomSampler::from_seed(42);
        let mut a: Vec<usize> = (0..50).collect();
        let mut b: Vec<usize> = (0..50).collect();

        for _ in 0..10 {
            assert!(s1.sample(&mut a, 4));
            assert!(s2.sample(&mut b, 4));
            assert_eq!(a[..4], b[..4]);
        }
    }

    #[test]
    fn oversized_or_empty_samples_fail() {
        let mut sampler = UniformRandomSampler::from_seed(0);
        let mut indices: Vec<usize> = (0..3).collect();
        assert!(!sampler.sample(&mut indices, 4));
        assert!(!sampler.sample(&mut indices, 0));
        assert!(sampler.sample(&mut indices, 3));
    }

    #[test]
    fn every_index_gets_drawn() {
        let mut sampler = UniformRandomSampler::from_seed(7);
        let mut indices: Vec<usize> = (0..10).collect();
        let mut seen = [false; 10];
        for _ in 0..200 {
            sampler.sample(&mut indices, 2);
            seen[indices[0]] = true;
            seen[indices[1]] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
