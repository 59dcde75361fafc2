//! Deterministic `Seq2SeqModel` for exercising the orchestration
//! layer without a network.

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::traits::{Batch, Logits, Seq2SeqModel, StepMode, StepOutput};
use crate::domain::vocabulary::EOS_ID;

/// Replays scripted losses and greedy outputs.
///
/// Training steps pop from the train-loss queue, forward-only
/// steps pop from the eval-loss queue; an exhausted queue keeps
/// returning its last value (1.0 if it never had one). Each
/// forward-only step pops one scripted output (rows of ids, one per
/// example) and turns it into one-hot logits; without a script
/// every position predicts EOS.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    batch_size:      usize,
    train_losses:    VecDeque<f64>,
    eval_losses:     VecDeque<f64>,
    last_train_loss: Option<f64>,
    last_eval_loss:  Option<f64>,
    outputs:         VecDeque<Vec<Vec<u32>>>,
    fail_after:      Option<usize>,
    fail_saves:      bool,

    calls:            usize,
    train_calls:      usize,
    forward_calls:    usize,
    batch_sizes_seen: Vec<usize>,
    learning_rates:   Vec<f64>,
    saved_steps:      RefCell<Vec<u64>>,
    restored:         Option<(PathBuf, u64)>,
}

impl ScriptedModel {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size, ..Self::default() }
    }

    pub fn with_train_losses(mut self, losses: &[f64]) -> Self {
        self.train_losses = losses.iter().copied().collect();
        self
    }

    pub fn with_eval_losses(mut self, losses: &[f64]) -> Self {
        self.eval_losses = losses.iter().copied().collect();
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Vec<Vec<u32>>>) -> Self {
        self.outputs = outputs.into();
        self
    }

    /// Every step after the first `calls` returns an error.
    pub fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Every `save` returns an error without writing anything.
    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn train_calls(&self) -> usize {
        self.train_calls
    }

    pub fn forward_only_calls(&self) -> usize {
        self.forward_calls
    }

    pub fn batch_sizes_seen(&self) -> &[usize] {
        &self.batch_sizes_seen
    }

    pub fn learning_rates(&self) -> &[f64] {
        &self.learning_rates
    }

    pub fn saved_steps(&self) -> Vec<u64> {
        self.saved_steps.borrow().clone()
    }

    /// Path and step of the last successful restore.
    pub fn restored(&self) -> Option<(&Path, u64)> {
        self.restored.as_ref().map(|(p, s)| (p.as_path(), *s))
    }

    fn next_loss(queue: &mut VecDeque<f64>, last: &mut Option<f64>) -> f64 {
        let loss = queue.pop_front().or(*last).unwrap_or(1.0);
        *last = Some(loss);
        loss
    }

    fn one_hot(&mut self, batch: &Batch) -> Result<Logits> {
        let steps = batch.decoder_len();
        let rows = match self.outputs.pop_front() {
            Some(rows) => rows,
            None => vec![vec![EOS_ID; steps]; batch.len()],
        };
        if rows.len() != batch.len() {
            bail!("scripted {} rows for a batch of {}", rows.len(), batch.len());
        }

        let classes = rows.iter().flatten().copied().max().unwrap_or(0) as usize + 1;
        let mut values = vec![0.0f32; batch.len() * steps * classes];
        for (example, row) in rows.iter().enumerate() {
            for (step, &id) in row.iter().take(steps).enumerate() {
                values[(example * steps + step) * classes + id as usize] = 1.0;
            }
        }
        Logits::new(batch.len(), steps, classes, values)
    }
}

impl Seq2SeqModel for ScriptedModel {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    fn step(&mut self, batch: &Batch, _bucket_id: usize, mode: StepMode) -> Result<StepOutput> {
        if self.fail_after.is_some_and(|n| self.calls >= n) {
            bail!("scripted failure");
        }
        self.calls += 1;
        self.batch_sizes_seen.push(self.batch_size);

        match mode {
            StepMode::Train { learning_rate } => {
                self.train_calls += 1;
                self.learning_rates.push(learning_rate);
                let loss = Self::next_loss(&mut self.train_losses, &mut self.last_train_loss);
                let logits = Logits::new(batch.len(), batch.decoder_len(), 0, Vec::new())?;
                Ok(StepOutput { gradient_norm: Some(1.0), loss, logits })
            }
            StepMode::ForwardOnly => {
                self.forward_calls += 1;
                let loss = Self::next_loss(&mut self.eval_losses, &mut self.last_eval_loss);
                let logits = self.one_hot(batch)?;
                Ok(StepOutput { gradient_norm: None, loss, logits })
            }
        }
    }

    fn save(&self, prefix: &Path, global_step: u64) -> Result<PathBuf> {
        if self.fail_saves {
            bail!("scripted save failure at step {global_step}");
        }
        let path = PathBuf::from(format!("{}-{global_step}", prefix.display()));
        fs::write(&path, global_step.to_string())?;
        self.saved_steps.borrow_mut().push(global_step);
        Ok(path)
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        let step: u64 = fs::read_to_string(path)?.trim().parse()?;
        self.restored = Some((path.to_path_buf(), step));
        Ok(())
    }
}
