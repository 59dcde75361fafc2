// ============================================================
// Layer 3 — Sequence Pairs and Buckets
// ============================================================
// A bucket is a length-capacity class: every pair placed in it
// has a source strictly shorter than `source_len` and a target
// strictly shorter than `target_len`. Padding a batch up to the
// bucket's capacity is therefore always possible and leaves room
// for the GO marker in front of the decoder input.

use serde::{Deserialize, Serialize};

/// Capacity of one length bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub source_len: usize,
    pub target_len: usize,
}

impl Bucket {
    pub const fn new(source_len: usize, target_len: usize) -> Self {
        Self { source_len, target_len }
    }

    pub fn fits(&self, source_len: usize, target_len: usize) -> bool {
        source_len < self.source_len && target_len < self.target_len
    }
}

/// The single bucket the denoiser ships with.
pub const DEFAULT_BUCKETS: [Bucket; 1] = [Bucket::new(150, 100)];

/// Index of the first bucket that fits, or None when the pair
/// is too long for every bucket (such pairs are dropped).
pub fn assign_bucket(buckets: &[Bucket], source_len: usize, target_len: usize) -> Option<usize> {
    buckets.iter().position(|b| b.fits(source_len, target_len))
}

/// One training example as token ids.
///
/// `line` is the zero-based line the pair was read from. It ties
/// the pair to its tokenized reference no matter which bucket the
/// pair ends up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePair {
    pub source: Vec<u32>,
    pub target: Vec<u32>,
    pub line:   usize,
}

impl SequencePair {
    pub fn new(source: Vec<u32>, target: Vec<u32>, line: usize) -> Self {
        Self { source, target, line }
    }
}
