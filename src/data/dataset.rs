use crate::domain::sequence::{assign_bucket, Bucket, SequencePair};

/// Sequence pairs grouped by length bucket.
///
/// Built once at load time; training and evaluation only read it.
#[derive(Debug, Clone)]
pub struct BucketedDataset {
    buckets: Vec<Bucket>,
    pairs:   Vec<Vec<SequencePair>>,
    dropped: usize,
}

impl BucketedDataset {
    pub fn new(buckets: &[Bucket]) -> Self {
        Self {
            buckets: buckets.to_vec(),
            pairs:   vec![Vec::new(); buckets.len()],
            dropped: 0,
        }
    }

    /// Place a pair in the first bucket that fits it.
    /// Pairs that fit nowhere are counted and dropped.
    pub fn insert(&mut self, pair: SequencePair) -> Option<usize> {
        match assign_bucket(&self.buckets, pair.source.len(), pair.target.len()) {
            Some(bucket_id) => {
                self.pairs[bucket_id].push(pair);
                Some(bucket_id)
            }
            None => {
                self.dropped += 1;
                None
            }
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, bucket_id: usize) -> &[SequencePair] {
        &self.pairs[bucket_id]
    }

    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.pairs.iter().map(Vec::len).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pairs that were too long for every bucket.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Extend<SequencePair> for BucketedDataset {
    fn extend<I: IntoIterator<Item = SequencePair>>(&mut self, iter: I) {
        for pair in iter {
            self.insert(pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_land_in_first_fitting_bucket() {
        let mut ds = BucketedDataset::new(&[Bucket::new(3, 3), Bucket::new(6, 6)]);
        ds.extend([
            SequencePair::new(vec![4, 4], vec![5, 2], 0),
            SequencePair::new(vec![4, 4, 4], vec![5, 2], 1),
            SequencePair::new(vec![4; 10], vec![2], 2),
        ]);
        assert_eq!(ds.bucket_sizes(), vec![1, 1]);
        assert_eq!(ds.bucket(1)[0].line, 1);
        assert_eq!(ds.dropped(), 1);
        assert_eq!(ds.len(), 2);
    }
}
