// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Forward-only pass over a whole split:
//
//   for each bucket
//     for each contiguous slice of `eval_batch_size` pairs
//       forward pass           → loss, logits
//       greedy decode          → raw ids per example
//       copy-resolve + EOS cut → hypothesis tokens
//       compare to gold        → exact match or not
//
// A tagging evaluator skips resolution and compares the argmax
// labels over the input length with the gold label ids.
//
// No sampling: every pair is scored exactly once.
//
// Reported numbers:
//   loss        mean of the per-slice losses
//   perplexity  exp(loss), +inf once loss passes the overflow guard
//   accuracy    exact matches / examples
//
// The model's batch size is switched to the evaluation size for
// the duration of the pass and switched back when the guard
// drops, including on early returns through `?`.

use anyhow::{bail, Result};
use std::ops::{Deref, DerefMut};

use crate::data::batcher::BatchAssembler;
use crate::data::loader::{Reference, Split};
use crate::domain::error::DataError;
use crate::domain::sequence::SequencePair;
use crate::domain::traits::{Seq2SeqModel, StepMode};
use crate::domain::vocabulary::{Vocabulary, PAD};
use crate::ml::decoder::{greedy_decode, resolve, tags_match};

/// Losses above this are reported with infinite perplexity.
pub const PERPLEXITY_OVERFLOW_LOSS: f64 = 300.0;

pub const DEFAULT_EVAL_BATCH_SIZE: usize = 64;

pub fn perplexity(loss: f64) -> f64 {
    if loss <= PERPLEXITY_OVERFLOW_LOSS {
        loss.exp()
    } else {
        f64::INFINITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    pub loss:       f64,
    pub perplexity: f64,
    pub accuracy:   f64,
    pub examples:   usize,
}

// ─── Batch size guard ─────────────────────────────────────────────────────────
/// Holds the model at a temporary batch size until dropped.
pub struct BatchSizeGuard<'a, M: Seq2SeqModel + ?Sized> {
    model:    &'a mut M,
    original: usize,
}

impl<'a, M: Seq2SeqModel + ?Sized> BatchSizeGuard<'a, M> {
    pub fn new(model: &'a mut M, batch_size: usize) -> Self {
        let original = model.batch_size();
        model.set_batch_size(batch_size);
        Self { model, original }
    }
}

impl<M: Seq2SeqModel + ?Sized> Deref for BatchSizeGuard<'_, M> {
    type Target = M;
    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: Seq2SeqModel + ?Sized> DerefMut for BatchSizeGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.model
    }
}

impl<M: Seq2SeqModel + ?Sized> Drop for BatchSizeGuard<'_, M> {
    fn drop(&mut self) {
        self.model.set_batch_size(self.original);
    }
}

// ─── Evaluator ────────────────────────────────────────────────────────────────
/// How a hypothesis is judged against its example.
#[derive(Debug, Clone, Copy)]
enum Scoring<'v> {
    /// Copy-resolve, then compare with the tokenized reference.
    Denoise { target_vocab: &'v Vocabulary },
    /// Compare per-token labels with the pair's gold label ids.
    Tags,
}

pub struct Evaluator<'v> {
    assembler:       BatchAssembler,
    scoring:         Scoring<'v>,
    eval_batch_size: usize,
}

impl<'v> Evaluator<'v> {
    pub fn new(assembler: BatchAssembler, target_vocab: &'v Vocabulary, eval_batch_size: usize) -> Self {
        Self {
            assembler,
            scoring: Scoring::Denoise { target_vocab },
            eval_batch_size: eval_batch_size.max(1),
        }
    }

    pub fn for_tagging(assembler: BatchAssembler, eval_batch_size: usize) -> Self {
        Self { assembler, scoring: Scoring::Tags, eval_batch_size: eval_batch_size.max(1) }
    }

    /// The assembler training batches are built with as well, so
    /// train and eval losses are weighted the same way.
    pub fn assembler(&self) -> &BatchAssembler {
        &self.assembler
    }

    pub fn evaluate<M: Seq2SeqModel + ?Sized>(&self, model: &mut M, split: &Split) -> Result<EvalReport> {
        let dataset = &split.dataset;
        if dataset.is_empty() {
            return Err(DataError::EmptyDataset { split: split.name.clone() }.into());
        }

        let mut model = BatchSizeGuard::new(model, self.eval_batch_size);
        let batch_size = model.batch_size();

        // Assembly here never draws: slices are contiguous and dropout is off.
        let mut no_draws = rand::rngs::mock::StepRng::new(0, 0);

        let mut losses  = Vec::new();
        let mut matches = 0usize;
        let mut total   = 0usize;

        for (bucket_id, bucket) in dataset.buckets().iter().enumerate() {
            let pairs = dataset.bucket(bucket_id);
            for start in (0..pairs.len()).step_by(batch_size) {
                let batch = self.assembler.assemble(
                    dataset, bucket_id, batch_size, Some(start), 0.0, &mut no_draws,
                )?;
                let output = model.step(&batch, bucket_id, StepMode::ForwardOnly)?;
                losses.push(output.loss);

                let hypotheses = greedy_decode(&output.logits);
                if hypotheses.len() != batch.len() {
                    bail!(
                        "model returned {} hypotheses for a batch of {}",
                        hypotheses.len(),
                        batch.len()
                    );
                }

                for (raw, pair) in hypotheses.iter().zip(&pairs[start..start + batch.len()]) {
                    if self.is_exact_match(raw, pair, split, bucket.source_len)? {
                        matches += 1;
                    }
                    total += 1;
                }
            }
        }

        let loss = losses.iter().sum::<f64>() / losses.len() as f64;
        Ok(EvalReport {
            loss,
            perplexity: perplexity(loss),
            accuracy: matches as f64 / total as f64,
            examples: total,
        })
    }

    fn is_exact_match(
        &self,
        raw:        &[u32],
        pair:       &SequencePair,
        split:      &Split,
        source_len: usize,
    ) -> Result<bool, DataError> {
        match self.scoring {
            Scoring::Tags => Ok(tags_match(raw, &pair.target)),
            Scoring::Denoise { target_vocab } => {
                let reference = split.references.get(pair.line).ok_or(DataError::MissingReference {
                    line:      pair.line,
                    available: split.references.len(),
                })?;
                Ok(resolves_to_reference(raw, target_vocab, reference, source_len))
            }
        }
    }
}

/// Copy positions past the utterance resolve to the pad token,
/// which never matches gold text. Ids past the encoder length
/// are unresolvable and count as a miss.
fn resolves_to_reference(raw: &[u32], target_vocab: &Vocabulary, reference: &Reference, source_len: usize) -> bool {
    let mut source: Vec<&str> = reference.source.iter().map(String::as_str).collect();
    if source.len() < source_len {
        source.resize(source_len, PAD);
    }

    match resolve(raw, target_vocab.tokens(), &source) {
        Ok(hypothesis) => hypothesis == reference.target,
        Err(e) => {
            tracing::debug!("Unresolvable hypothesis: {e}");
            false
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::BucketedDataset;
    use crate::domain::sequence::{Bucket, SequencePair};
    use crate::domain::vocabulary::EOS_ID;
    use crate::ml::testing::ScriptedModel;

    fn vocab() -> Vocabulary {
        Vocabulary::with_words(["a", "b", "c"]).unwrap()
    }

    fn reference(source: &[&str], target: &[&str]) -> Reference {
        Reference {
            source: source.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn split() -> Split {
        let mut dataset = BucketedDataset::new(&[Bucket::new(3, 4), Bucket::new(6, 6)]);
        dataset.extend([
            SequencePair::new(vec![4, 5], vec![4, EOS_ID], 0),
            SequencePair::new(vec![3], vec![7, EOS_ID], 1),
            SequencePair::new(vec![4, 4, 4, 4], vec![6, EOS_ID], 2),
        ]);
        Split {
            name: "dev".into(),
            dataset,
            references: vec![
                reference(&["a", "b"], &["a"]),
                reference(&["zed"], &["zed"]),
                reference(&["a", "a", "a", "a"], &["b"]),
            ],
        }
    }

    #[test]
    fn test_perplexity_guard() {
        assert!(perplexity(300.0).is_finite());
        assert_eq!(perplexity(301.0), f64::INFINITY);
        assert!((perplexity(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_match_accuracy_and_batch_size_restored() {
        let vocab = vocab();
        // Hypotheses are read per example from the scripted model:
        //   line 0 → "a"          match
        //   line 1 → copy of "zed" match
        //   line 2 → "c"          mismatch (gold is "b")
        let mut model = ScriptedModel::new(16)
            .with_eval_losses(&[1.0, 3.0])
            .with_outputs(vec![
                vec![vec![4, EOS_ID, 0, 0], vec![7, EOS_ID, 0, 0]],
                vec![vec![6, EOS_ID, 0, 0, 0, 0]],
            ]);

        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 64);
        let report = evaluator.evaluate(&mut model, &split()).unwrap();

        assert_eq!(report.examples, 3);
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.loss - 2.0).abs() < 1e-12);
        assert_eq!(model.batch_size(), 16);
        assert_eq!(model.batch_sizes_seen(), &[64, 64]);
        assert!(model.forward_only_calls() == 2 && model.train_calls() == 0);
    }

    #[test]
    fn test_slices_cover_every_example_once() {
        let vocab = vocab();
        let mut model = ScriptedModel::new(4);
        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 1);
        let report = evaluator.evaluate(&mut model, &split()).unwrap();
        assert_eq!(report.examples, 3);
        assert_eq!(model.forward_only_calls(), 3);
    }

    #[test]
    fn test_length_mismatch_is_a_miss() {
        let vocab = vocab();
        let mut model = ScriptedModel::new(4).with_outputs(vec![
            vec![vec![4, 4, EOS_ID, 0], vec![7, 7, EOS_ID, 0]],
            vec![vec![5, 5, EOS_ID, 0, 0, 0]],
        ]);
        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 64);
        let report = evaluator.evaluate(&mut model, &split()).unwrap();
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn test_unresolvable_output_counts_as_miss() {
        let vocab = vocab();
        // 7 + 3 = 10 is past the encoder length of bucket 0.
        let mut model = ScriptedModel::new(4).with_outputs(vec![
            vec![vec![10, EOS_ID, 0, 0], vec![7, EOS_ID, 0, 0]],
            vec![vec![5, EOS_ID, 0, 0, 0, 0]],
        ]);
        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 64);
        let report = evaluator.evaluate(&mut model, &split()).unwrap();
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_tag_sequences_scored_without_references() {
        let mut dataset = BucketedDataset::new(&[Bucket::new(3, 3)]);
        dataset.extend([
            SequencePair::new(vec![6, 7], vec![4, 5], 0),
            SequencePair::new(vec![6], vec![5], 1),
        ]);
        let split = Split { name: "dev".into(), dataset, references: Vec::new() };

        // Labels past the input length are ignored; the second
        // example tags its only token wrongly.
        let mut model = ScriptedModel::new(4).with_outputs(vec![vec![vec![4, 5, 6], vec![4, 0, 0]]]);
        let evaluator = Evaluator::for_tagging(BatchAssembler::new(false), 64);
        let report = evaluator.evaluate(&mut model, &split).unwrap();

        assert_eq!(report.examples, 2);
        assert!((report.accuracy - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_split_is_fatal() {
        let vocab = vocab();
        let mut model = ScriptedModel::new(4);
        let empty = Split {
            name:       "test".into(),
            dataset:    BucketedDataset::new(&[Bucket::new(3, 3)]),
            references: Vec::new(),
        };
        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 64);
        let err = evaluator.evaluate(&mut model, &empty).unwrap_err();
        assert!(matches!(err.downcast_ref::<DataError>(), Some(DataError::EmptyDataset { .. })));
    }

    #[test]
    fn test_batch_size_restored_on_error() {
        let vocab = vocab();
        let mut model = ScriptedModel::new(8).failing_after(0);
        let evaluator = Evaluator::new(BatchAssembler::new(false), &vocab, 64);
        assert!(evaluator.evaluate(&mut model, &split()).is_err());
        assert_eq!(model.batch_size(), 8);
    }
}
