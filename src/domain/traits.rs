// ============================================================
// Layer 3 — Model Collaborator Seam
// ============================================================
// The orchestration layer (bucketing, batching, training
// control, evaluation, decoding) never touches the network.
// It talks to whatever implements `Seq2SeqModel`:
//
//   - BurnSeq2Seq   → the shipped networks, copy-augmented or
//                     per-token tagger (ml::seq2seq)
//   - ScriptedModel → deterministic test double (ml::testing)
//
// Everything that crosses the seam is plain Rust data:
// a `Batch` goes in, a `StepOutput` comes back.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};

// ─── Batch ────────────────────────────────────────────────────────────────────
/// Padded, weight-masked inputs for one forward/backward pass.
///
/// All matrices are batch-major: row `i` belongs to example `i`.
///   encoder_inputs:  [batch, bucket.source_len]
///   decoder_inputs:  [batch, bucket.target_len]   GO + target + PAD...
///   decoder_targets: [batch, bucket.target_len]   target + PAD...
///   target_weights:  [batch, bucket.target_len]   1.0 real, 0.0 padding
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub encoder_inputs:  Vec<Vec<u32>>,
    pub decoder_inputs:  Vec<Vec<u32>>,
    pub decoder_targets: Vec<Vec<u32>>,
    pub target_weights:  Vec<Vec<f32>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.encoder_inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder_inputs.is_empty()
    }

    pub fn encoder_len(&self) -> usize {
        self.encoder_inputs.first().map_or(0, Vec::len)
    }

    pub fn decoder_len(&self) -> usize {
        self.decoder_inputs.first().map_or(0, Vec::len)
    }
}

// ─── Step I/O ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepMode {
    /// Forward, backward and one optimiser update at this rate.
    Train { learning_rate: f64 },
    /// Forward pass only; parameters are left untouched.
    ForwardOnly,
}

/// Dense `[batch, steps, classes]` scores from one forward pass.
///
/// For denoising, `classes` covers the output vocabulary followed
/// by one slot per encoder position (the copy range). A tagger
/// scores labels only.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    batch:   usize,
    steps:   usize,
    classes: usize,
    values:  Vec<f32>,
}

impl Logits {
    pub fn new(batch: usize, steps: usize, classes: usize, values: Vec<f32>) -> Result<Self> {
        ensure!(
            values.len() == batch * steps * classes,
            "logits hold {} values, expected {batch}x{steps}x{classes}",
            values.len()
        );
        Ok(Self { batch, steps, classes, values })
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    #[cfg(test)]
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Scores of every class at one decoder position.
    pub fn scores(&self, example: usize, step: usize) -> &[f32] {
        let start = (example * self.steps + step) * self.classes;
        &self.values[start..start + self.classes]
    }
}

#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Present only for training steps on collaborators that report it.
    pub gradient_norm: Option<f64>,
    /// Mean weighted cross-entropy over the batch.
    pub loss:          f64,
    pub logits:        Logits,
}

// ─── Seq2SeqModel ─────────────────────────────────────────────────────────────
/// A trainable sequence model: copy-extended denoiser or tagger.
pub trait Seq2SeqModel {
    /// Batch size the model currently expects.
    fn batch_size(&self) -> usize;

    fn set_batch_size(&mut self, batch_size: usize);

    /// Whether encoder rows should be fed back-to-front.
    fn reverse_encoder_input(&self) -> bool {
        false
    }

    fn step(&mut self, batch: &Batch, bucket_id: usize, mode: StepMode) -> Result<StepOutput>;

    /// Persist parameters under `prefix`, tagged with `global_step`.
    /// Returns the path `restore` accepts.
    fn save(&self, prefix: &Path, global_step: u64) -> Result<PathBuf>;

    fn restore(&mut self, path: &Path) -> Result<()>;
}

/// Lets the task-dependent network travel as `Box<dyn Seq2SeqModel>`.
impl<M: Seq2SeqModel + ?Sized> Seq2SeqModel for Box<M> {
    fn batch_size(&self) -> usize {
        (**self).batch_size()
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        (**self).set_batch_size(batch_size)
    }

    fn reverse_encoder_input(&self) -> bool {
        (**self).reverse_encoder_input()
    }

    fn step(&mut self, batch: &Batch, bucket_id: usize, mode: StepMode) -> Result<StepOutput> {
        (**self).step(batch, bucket_id, mode)
    }

    fn save(&self, prefix: &Path, global_step: u64) -> Result<PathBuf> {
        (**self).save(prefix, global_step)
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        (**self).restore(path)
    }
}
