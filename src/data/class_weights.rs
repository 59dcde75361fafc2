// ============================================================
// Layer 4 — Class Weights for Tagging
// ============================================================
// Disfluency labels are heavily skewed: almost every token is
// fluent. Each real label position is weighted so that every
// label present in the training split carries the same total
// weight:
//
//   weight[c] = n / (k * count[c])
//
//   n = label positions in the split (padding excluded)
//   k = distinct labels seen
//
// Padding is always weighted 0. Labels that never occur in the
// training split keep weight 1.0.
//
// Reference: King & Zeng (2001) Logistic Regression in Rare Events Data

use serde::{Deserialize, Serialize};

use crate::data::dataset::BucketedDataset;
use crate::domain::vocabulary::PAD_ID;

/// Per-label loss weights, indexed by label id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassWeights(Vec<f32>);

impl ClassWeights {
    /// Balanced weights over the targets of `dataset`.
    pub fn balanced(dataset: &BucketedDataset, label_count: usize) -> Self {
        let mut counts = vec![0usize; label_count];
        for bucket_id in 0..dataset.buckets().len() {
            for pair in dataset.bucket(bucket_id) {
                for &label in &pair.target {
                    if label != PAD_ID {
                        if let Some(count) = counts.get_mut(label as usize) {
                            *count += 1;
                        }
                    }
                }
            }
        }

        let total: usize = counts.iter().sum();
        let seen = counts.iter().filter(|&&c| c > 0).count();
        let weights = counts
            .iter()
            .enumerate()
            .map(|(label, &count)| match count {
                _ if label == PAD_ID as usize => 0.0,
                0 => 1.0,
                count => total as f32 / (seen * count) as f32,
            })
            .collect();

        tracing::info!("Class weights over {total} labels ({seen} distinct): {weights:?}");
        Self(weights)
    }

    pub fn weight(&self, label: u32) -> f32 {
        if label == PAD_ID {
            return 0.0;
        }
        self.0.get(label as usize).copied().unwrap_or(1.0)
    }
}
