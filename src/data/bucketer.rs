// ============================================================
// Layer 4 — Bucket Sampler
// ============================================================
// Picks the bucket for the next training batch so that, over
// many steps, bucket i is chosen with probability
//
//     size(bucket_i) / total_size
//
// The scale vector holds the cumulative fractions:
//
//   sizes  = [ 2,   0,   6  ]
//   scale  = [0.25, 0.25, 1.0]
//
// A uniform draw r in [0, 1) selects the smallest i with
// scale[i] > r. An empty bucket repeats the previous entry, so
// the strict comparison never selects it.
//
// Reference: inverse-CDF sampling over a discrete distribution

use rand::Rng;

use crate::domain::error::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct BucketScale {
    scale: Vec<f64>,
}

impl BucketScale {
    /// Fails when every bucket is empty: there is nothing to sample.
    pub fn new(bucket_sizes: &[usize], split: &str) -> Result<Self, DataError> {
        let total: usize = bucket_sizes.iter().sum();
        if total == 0 {
            return Err(DataError::EmptyDataset { split: split.to_string() });
        }
        let total = total as f64;

        let mut running = 0usize;
        let scale = bucket_sizes
            .iter()
            .map(|&size| {
                running += size;
                running as f64 / total
            })
            .collect();

        Ok(Self { scale })
    }

    #[cfg(test)]
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Smallest bucket index whose cumulative scale exceeds `draw`.
    pub fn select(&self, draw: f64) -> Option<usize> {
        self.scale.iter().position(|&s| s > draw)
    }

    /// Draw from `rng` and select. The last scale entry is exactly
    /// 1.0, so every draw in [0, 1) maps to a bucket.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw: f64 = rng.gen();
        self.select(draw).unwrap_or(self.scale.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_scale_is_cumulative() {
        let scale = BucketScale::new(&[2, 0, 6], "train").unwrap();
        assert_eq!(scale.scale(), &[0.25, 0.25, 1.0]);
    }

    #[test]
    fn test_ties_pick_smallest_index() {
        let scale = BucketScale::new(&[2, 0, 6], "train").unwrap();
        assert_eq!(scale.select(0.0), Some(0));
        assert_eq!(scale.select(0.2499), Some(0));
        // 0.25 is not strictly below scale[1] either, so bucket 1 is skipped.
        assert_eq!(scale.select(0.25), Some(2));
        assert_eq!(scale.select(0.9999), Some(2));
    }

    #[test]
    fn test_empty_bucket_is_unreachable() {
        let scale = BucketScale::new(&[3, 0, 5], "train").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            assert_ne!(scale.sample(&mut rng), 1);
        }
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        assert!(matches!(
            BucketScale::new(&[0, 0], "train"),
            Err(DataError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_sampling_matches_bucket_proportions() {
        for sizes in [vec![1usize, 1], vec![10, 30, 60], vec![5, 0, 15, 80]] {
            let scale = BucketScale::new(&sizes, "train").unwrap();
            let mut rng = StdRng::seed_from_u64(273);
            let draws = 100_000;
            let mut counts = vec![0usize; sizes.len()];
            for _ in 0..draws {
                counts[scale.sample(&mut rng)] += 1;
            }

            let total: usize = sizes.iter().sum();
            for (i, &size) in sizes.iter().enumerate() {
                let expected = size as f64 / total as f64;
                let observed = counts[i] as f64 / draws as f64;
                assert!(
                    (expected - observed).abs() < 0.01,
                    "bucket {i}: expected {expected:.3}, observed {observed:.3}"
                );
            }
        }
    }
}
