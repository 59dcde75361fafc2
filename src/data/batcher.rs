// ============================================================
// Layer 4 — Batch Assembler
// ============================================================
// Turns a bucket's raw id sequences into the padded matrices a
// `Seq2SeqModel` consumes.
//
// For a bucket (source_len = S, target_len = T) and a pair
// (source, target) the rows are:
//
//   encoder_input   source + PAD...                    length S
//                   (reversed when the model asks for it)
//   decoder_input   GO + target + PAD...               length T
//   decoder_target  target + PAD...                    length T
//   target_weight   1.0 for each target token, else 0  length T
//
// A denoising target already ends with EOS, so the weight row
// charges loss up to and including EOS and nothing after it.
// With class weights (tagging) each real position is charged its
// label's weight instead of 1.0.
//
// Two ways to pick the pairs:
//   - start_index = Some(i): the slice [i, i + batch_size),
//     clipped to the bucket (evaluation walks the bucket this way)
//   - start_index = None: batch_size draws with replacement
//     (stochastic training)
//
// Reference: Sutskever et al. (2014) Sequence to Sequence Learning

use anyhow::{ensure, Result};
use rand::Rng;

use crate::data::class_weights::ClassWeights;
use crate::data::dataset::BucketedDataset;
use crate::domain::sequence::{Bucket, SequencePair};
use crate::domain::traits::Batch;
use crate::domain::vocabulary::{GO_ID, PAD_ID, UNK_ID};

#[derive(Debug, Clone)]
pub struct BatchAssembler {
    reverse_encoder: bool,
    class_weights:   Option<ClassWeights>,
}

impl BatchAssembler {
    pub fn new(reverse_encoder: bool) -> Self {
        Self { reverse_encoder, class_weights: None }
    }

    pub fn with_class_weights(mut self, weights: ClassWeights) -> Self {
        self.class_weights = Some(weights);
        self
    }

    /// Pick pairs from a bucket and assemble them.
    pub fn assemble<R: Rng + ?Sized>(
        &self,
        dataset:           &BucketedDataset,
        bucket_id:         usize,
        batch_size:        usize,
        start_index:       Option<usize>,
        word_dropout_prob: f64,
        rng:               &mut R,
    ) -> Result<Batch> {
        let pairs = dataset.bucket(bucket_id);
        ensure!(!pairs.is_empty(), "bucket {bucket_id} has no examples");

        let chosen: Vec<&SequencePair> = match start_index {
            Some(start) => {
                ensure!(
                    start < pairs.len(),
                    "start index {start} is past the end of bucket {bucket_id} ({} examples)",
                    pairs.len()
                );
                let end = (start + batch_size).min(pairs.len());
                pairs[start..end].iter().collect()
            }
            None => (0..batch_size)
                .map(|_| &pairs[rng.gen_range(0..pairs.len())])
                .collect(),
        };

        let bucket = dataset.buckets()[bucket_id];
        self.build(bucket, &chosen, word_dropout_prob, rng)
    }

    /// Assemble already chosen pairs for `bucket`.
    pub fn build<R: Rng + ?Sized>(
        &self,
        bucket:            Bucket,
        pairs:             &[&SequencePair],
        word_dropout_prob: f64,
        rng:               &mut R,
    ) -> Result<Batch> {
        let mut batch = Batch {
            encoder_inputs:  Vec::with_capacity(pairs.len()),
            decoder_inputs:  Vec::with_capacity(pairs.len()),
            decoder_targets: Vec::with_capacity(pairs.len()),
            target_weights:  Vec::with_capacity(pairs.len()),
        };

        for pair in pairs {
            ensure!(
                bucket.fits(pair.source.len(), pair.target.len()),
                "pair from line {} ({} -> {} tokens) does not fit bucket {:?}",
                pair.line,
                pair.source.len(),
                pair.target.len(),
                bucket
            );

            // ── Encoder row ───────────────────────────────────────────────────
            let mut source = pair.source.clone();
            apply_word_dropout(&mut source, word_dropout_prob, rng);
            let mut encoder_row = pad_to(source, bucket.source_len);
            if self.reverse_encoder {
                encoder_row.reverse();
            }

            // ── Decoder rows ──────────────────────────────────────────────────
            let mut decoder_row = Vec::with_capacity(bucket.target_len);
            decoder_row.push(GO_ID);
            decoder_row.extend_from_slice(&pair.target);
            let decoder_row = pad_to(decoder_row, bucket.target_len);

            let target_row = pad_to(pair.target.clone(), bucket.target_len);

            let weight_row = (0..bucket.target_len)
                .map(|t| match (pair.target.get(t), &self.class_weights) {
                    (None, _) => 0.0,
                    (Some(_), None) => 1.0,
                    (Some(&label), Some(weights)) => weights.weight(label),
                })
                .collect();

            batch.encoder_inputs.push(encoder_row);
            batch.decoder_inputs.push(decoder_row);
            batch.decoder_targets.push(target_row);
            batch.target_weights.push(weight_row);
        }

        Ok(batch)
    }
}

fn pad_to(mut ids: Vec<u32>, len: usize) -> Vec<u32> {
    ids.resize(len, PAD_ID);
    ids
}

/// Replace each non-pad id with UNK independently with probability `prob`.
///
/// A zero probability returns without touching `ids` or drawing
/// from `rng`, so the random stream is identical to a run without
/// dropout.
pub fn apply_word_dropout<R: Rng + ?Sized>(ids: &mut [u32], prob: f64, rng: &mut R) {
    if prob <= 0.0 {
        return;
    }
    for id in ids.iter_mut().filter(|id| **id != PAD_ID) {
        if rng.gen_bool(prob.min(1.0)) {
            *id = UNK_ID;
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocabulary::EOS_ID;
    use rand::{rngs::StdRng, SeedableRng};

    fn dataset() -> BucketedDataset {
        let mut ds = BucketedDataset::new(&[Bucket::new(4, 4)]);
        ds.extend([
            SequencePair::new(vec![5, 6], vec![7, EOS_ID], 0),
            SequencePair::new(vec![8], vec![EOS_ID], 1),
            SequencePair::new(vec![9, 10, 11], vec![12, 13, EOS_ID], 2),
        ]);
        ds
    }

    #[test]
    fn test_rows_are_padded_and_prefixed() {
        let mut rng = StdRng::seed_from_u64(0);
        let batch = BatchAssembler::new(false)
            .assemble(&dataset(), 0, 2, Some(0), 0.0, &mut rng)
            .unwrap();

        assert_eq!(batch.encoder_inputs, vec![vec![5, 6, 0, 0], vec![8, 0, 0, 0]]);
        assert_eq!(batch.decoder_inputs, vec![vec![GO_ID, 7, EOS_ID, 0], vec![GO_ID, EOS_ID, 0, 0]]);
        assert_eq!(batch.decoder_targets, vec![vec![7, EOS_ID, 0, 0], vec![EOS_ID, 0, 0, 0]]);
        assert_eq!(
            batch.target_weights,
            vec![vec![1.0, 1.0, 0.0, 0.0], vec![1.0, 0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn test_reversed_encoder_rows() {
        let mut rng = StdRng::seed_from_u64(0);
        let batch = BatchAssembler::new(true)
            .assemble(&dataset(), 0, 1, Some(0), 0.0, &mut rng)
            .unwrap();
        assert_eq!(batch.encoder_inputs, vec![vec![0, 0, 6, 5]]);
    }

    #[test]
    fn test_contiguous_slice_is_clipped_to_bucket() {
        let mut rng = StdRng::seed_from_u64(0);
        let batch = BatchAssembler::new(false)
            .assemble(&dataset(), 0, 64, Some(2), 0.0, &mut rng)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.encoder_inputs[0], vec![9, 10, 11, 0]);
    }

    #[test]
    fn test_random_draw_is_seeded() {
        let assembler = BatchAssembler::new(false);
        let ds = dataset();
        let a = assembler
            .assemble(&ds, 0, 8, None, 0.0, &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = assembler
            .assemble(&ds, 0, 8, None, 0.0, &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_dropout_is_identity() {
        let original: Vec<u32> = (0..200).map(|i| i % 17).collect();
        let mut ids = original.clone();
        let mut rng = StdRng::seed_from_u64(1);
        apply_word_dropout(&mut ids, 0.0, &mut rng);
        assert_eq!(ids, original);

        // The stream was not advanced either.
        let mut fresh = StdRng::seed_from_u64(1);
        assert_eq!(rng.gen::<u64>(), fresh.gen::<u64>());
    }

    #[test]
    fn test_full_dropout_keeps_padding() {
        let mut ids = vec![5, 6, PAD_ID, PAD_ID];
        apply_word_dropout(&mut ids, 1.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(ids, vec![UNK_ID, UNK_ID, PAD_ID, PAD_ID]);
    }

    #[test]
    fn test_class_weights_replace_unit_weights() {
        let mut tagged = BucketedDataset::new(&[Bucket::new(4, 4)]);
        tagged.extend([
            SequencePair::new(vec![5, 6, 7], vec![4, 4, 5], 0),
            SequencePair::new(vec![8], vec![4], 1),
        ]);
        let weights = ClassWeights::balanced(&tagged, 6);
        let batch = BatchAssembler::new(false)
            .with_class_weights(weights.clone())
            .assemble(&tagged, 0, 2, Some(0), 0.0, &mut StdRng::seed_from_u64(0))
            .unwrap();

        let (w4, w5) = (weights.weight(4), weights.weight(5));
        assert_eq!(batch.target_weights, vec![vec![w4, w4, w5, 0.0], vec![w4, 0.0, 0.0, 0.0]]);
        assert_eq!(batch.decoder_targets[0], vec![4, 4, 5, PAD_ID]);
    }

    #[test]
    fn test_start_past_end_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(BatchAssembler::new(false)
            .assemble(&dataset(), 0, 2, Some(3), 0.0, &mut rng)
            .is_err());
    }
}
