// ============================================================
// Layer 2 — Self Test
// ============================================================
// Smoke test of the wiring between the batch assembler and the
// network, with no data files involved:
//
//   buckets  (3, 3) and (6, 6)
//   dataset  five hand-written pairs across both buckets
//   steps    a few training steps, each on a random bucket
//
// Every step must produce a finite loss.

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::{batcher::BatchAssembler, dataset::BucketedDataset};
use crate::domain::sequence::{Bucket, SequencePair};
use crate::domain::traits::{Seq2SeqModel, StepMode};
use crate::ml::{
    model::CopyNetConfig,
    seq2seq::{default_device, BurnSeq2Seq, TrainBackend},
};

pub const SELF_TEST_BUCKETS: [Bucket; 2] = [Bucket::new(3, 3), Bucket::new(6, 6)];

const SELF_TEST_VOCAB: usize = 10;
const SELF_TEST_BATCH: usize = 32;
const SELF_TEST_LEARNING_RATE: f64 = 0.01;

pub fn fake_dataset() -> BucketedDataset {
    let pairs = [
        (vec![1, 1], vec![2, 2]),
        (vec![3, 3], vec![4]),
        (vec![5], vec![6]),
        (vec![1, 1, 1, 1, 1], vec![2, 2, 2, 2, 2]),
        (vec![3, 3, 3], vec![5, 6]),
    ];
    let mut dataset = BucketedDataset::new(&SELF_TEST_BUCKETS);
    dataset.extend(
        pairs
            .into_iter()
            .enumerate()
            .map(|(line, (source, target))| SequencePair::new(source, target, line)),
    );
    dataset
}

pub struct SelfTestUseCase {
    steps: usize,
    seed:  u64,
}

impl SelfTestUseCase {
    pub fn new(steps: usize, seed: u64) -> Self {
        Self { steps, seed }
    }

    /// Build a tiny network and train it on the fake dataset.
    pub fn execute(&self) -> Result<Vec<f64>> {
        let config = CopyNetConfig::new(
            SELF_TEST_VOCAB,
            SELF_TEST_VOCAB,
            SELF_TEST_BUCKETS[1].source_len,
            SELF_TEST_BUCKETS[1].target_len,
            32,
            2,
            1,
        );
        let mut model: BurnSeq2Seq<TrainBackend> =
            BurnSeq2Seq::new(config, 5.0, SELF_TEST_BATCH, default_device());
        run_steps(&mut model, &fake_dataset(), self.steps, &mut StdRng::seed_from_u64(self.seed))
    }
}

/// Train `steps` times on random buckets, returning each step's loss.
pub fn run_steps<M: Seq2SeqModel + ?Sized, R: Rng>(
    model:   &mut M,
    dataset: &BucketedDataset,
    steps:   usize,
    rng:     &mut R,
) -> Result<Vec<f64>> {
    let assembler = BatchAssembler::new(model.reverse_encoder_input());
    let mut losses = Vec::with_capacity(steps);

    for step in 0..steps {
        let bucket_id = rng.gen_range(0..dataset.buckets().len());
        let batch = assembler.assemble(dataset, bucket_id, model.batch_size(), None, 0.0, rng)?;
        let output = model.step(&batch, bucket_id, StepMode::Train { learning_rate: SELF_TEST_LEARNING_RATE })?;
        ensure!(output.loss.is_finite(), "step {step} produced a non-finite loss");
        tracing::info!("self-test step {} bucket {} loss {:.4}", step + 1, bucket_id, output.loss);
        losses.push(output.loss);
    }
    Ok(losses)
}
