// ============================================================
// Layer 5 — Training Controller
// ============================================================
// Drives the train / evaluate / checkpoint cycle as a small
// state machine:
//
//        ┌──────────┐ steps_per_checkpoint ┌─────────────────┐
//   ───► │ Running  │ ───────────────────► │ CheckpointEval  │
//        └──────────┘                      └─────────────────┘
//             ▲          improved or              │
//             └─────── still within patience ─────┤
//                                                 │ patience exhausted
//                                                 ▼
//                                           ┌───────────┐
//                                           │ Stopped   │
//                                           └───────────┘
//
// Running: sample a bucket, assemble a batch, one optimiser step,
//          accumulate loss / steps_per_checkpoint.
//
// CheckpointEval:
//   1. report the interval loss and its perplexity
//   2. decay the learning rate if the interval loss is worse than
//      all of the last three interval losses
//   3. evaluate train, dev and test
//   4. dev improved by more than `early_stopping_threshold`
//      (relative)  → reset patience, record bests, save checkpoint
//      otherwise   → patience += 1, stop once it reaches the limit
//
// All mutable training state lives in `TrainingState`, owned by
// the controller and persisted alongside each checkpoint.
//
// Reference: Prechelt (1998) Early Stopping — But When?

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::BatchAssembler;
use crate::data::bucketer::BucketScale;
use crate::data::loader::Split;
use crate::domain::traits::{Seq2SeqModel, StepMode};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{CheckpointMetrics, MetricsLogger};
use crate::ml::evaluator::{perplexity, EvalReport, Evaluator};

/// Interval losses the decay rule looks back over.
pub const LOSS_WINDOW: usize = 3;

/// Keeps the relative improvement defined when the best loss is 0.
pub const RELATIVE_EPSILON: f64 = 1e-12;

// ─── Training state ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestMetrics {
    pub train_loss: f64,
    pub dev_loss:   f64,
    pub test_loss:  f64,
    pub step:       u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Improved,
    Stagnated { suboptimal_checkpoints: usize },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub global_step:            u64,
    pub learning_rate:          f64,
    pub loss_window:            VecDeque<f64>,
    pub best:                   Option<BestMetrics>,
    pub suboptimal_checkpoints: usize,
}

impl TrainingState {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            global_step: 0,
            learning_rate,
            loss_window: VecDeque::with_capacity(LOSS_WINDOW),
            best: None,
            suboptimal_checkpoints: 0,
        }
    }

    /// Record the loss of a finished interval. Returns true when the
    /// learning rate was decayed because the loss is above every
    /// loss in a full window.
    pub fn record_interval_loss(&mut self, loss: f64, decay_factor: f64) -> bool {
        let worse_than_window = self.loss_window.len() == LOSS_WINDOW
            && self.loss_window.iter().all(|&previous| loss > previous);
        if worse_than_window {
            self.learning_rate *= decay_factor;
        }

        self.loss_window.push_back(loss);
        if self.loss_window.len() > LOSS_WINDOW {
            self.loss_window.pop_front();
        }
        worse_than_window
    }

    /// Judge a checkpoint's evaluation against the best dev loss so far.
    pub fn judge(
        &mut self,
        train_loss: f64,
        dev_loss:   f64,
        test_loss:  f64,
        threshold:  f64,
        patience:   usize,
    ) -> Verdict {
        let improved = match self.best {
            None => true,
            Some(best) => (best.dev_loss - dev_loss) / (best.dev_loss + RELATIVE_EPSILON) > threshold,
        };

        if improved {
            self.suboptimal_checkpoints = 0;
            self.best = Some(BestMetrics {
                train_loss,
                dev_loss,
                test_loss,
                step: self.global_step,
            });
            return Verdict::Improved;
        }

        self.suboptimal_checkpoints += 1;
        if self.suboptimal_checkpoints >= patience {
            Verdict::Stop
        } else {
            Verdict::Stagnated { suboptimal_checkpoints: self.suboptimal_checkpoints }
        }
    }
}

// ─── Controller ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    CheckpointEval,
    Stopped,
}

pub struct Splits {
    pub train: Split,
    pub dev:   Split,
    pub test:  Split,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub best:        Option<BestMetrics>,
    pub global_step: u64,
    pub checkpoints: usize,
}

pub struct TrainingController<'a, M: Seq2SeqModel, R: Rng> {
    cfg:         &'a TrainConfig,
    model:       &'a mut M,
    splits:      &'a Splits,
    evaluator:   Evaluator<'a>,
    checkpoints: &'a CheckpointManager,
    metrics:     &'a MetricsLogger,
    rng:         R,

    assembler:     BatchAssembler,
    scale:         BucketScale,
    state:         TrainingState,
    interval_loss: f64,
    evaluations:   usize,
}

impl<'a, M: Seq2SeqModel, R: Rng> TrainingController<'a, M, R> {
    /// Fails when the training split is empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg:         &'a TrainConfig,
        model:       &'a mut M,
        splits:      &'a Splits,
        evaluator:   Evaluator<'a>,
        checkpoints: &'a CheckpointManager,
        metrics:     &'a MetricsLogger,
        state:       TrainingState,
        rng:         R,
    ) -> Result<Self> {
        let scale = BucketScale::new(&splits.train.dataset.bucket_sizes(), &splits.train.name)?;
        // Training batches are weighted exactly like evaluation batches.
        let assembler = evaluator.assembler().clone();
        model.set_batch_size(cfg.batch_size);

        Ok(Self {
            cfg,
            model,
            splits,
            evaluator,
            checkpoints,
            metrics,
            rng,
            assembler,
            scale,
            state,
            interval_loss: 0.0,
            evaluations: 0,
        })
    }

    /// Train until early stopping.
    pub fn run(mut self) -> Result<TrainingSummary> {
        let mut phase = Phase::Running;
        while phase != Phase::Stopped {
            phase = match phase {
                Phase::Running => self.train_interval()?,
                Phase::CheckpointEval => self.checkpoint()?,
                Phase::Stopped => Phase::Stopped,
            };
        }

        Ok(TrainingSummary {
            best:        self.state.best,
            global_step: self.state.global_step,
            checkpoints: self.evaluations,
        })
    }

    fn train_interval(&mut self) -> Result<Phase> {
        let steps = self.cfg.steps_per_checkpoint.max(1);
        for _ in 0..steps {
            let bucket_id = self.scale.sample(&mut self.rng);
            let batch = self.assembler.assemble(
                &self.splits.train.dataset,
                bucket_id,
                self.model.batch_size(),
                None,
                self.cfg.word_dropout_prob,
                &mut self.rng,
            )?;

            let mode = StepMode::Train { learning_rate: self.state.learning_rate };
            let output = self.model.step(&batch, bucket_id, mode)?;
            if let Some(norm) = output.gradient_norm {
                tracing::debug!("step {} bucket {bucket_id} gradient norm {norm:.3}", self.state.global_step + 1);
            }

            self.interval_loss += output.loss / steps as f64;
            self.state.global_step += 1;
        }
        Ok(Phase::CheckpointEval)
    }

    fn checkpoint(&mut self) -> Result<Phase> {
        let loss = std::mem::take(&mut self.interval_loss);
        tracing::info!(
            "global step {} learning rate {:.4} loss {:.2} perplexity {:.2}",
            self.state.global_step,
            self.state.learning_rate,
            loss,
            perplexity(loss)
        );

        if self.state.record_interval_loss(loss, self.cfg.learning_rate_decay_factor) {
            tracing::info!("Loss stagnated, learning rate decayed to {:.6}", self.state.learning_rate);
        }

        let splits = self.splits;
        let train = self.evaluate(&splits.train)?;
        let dev   = self.evaluate(&splits.dev)?;
        let test  = self.evaluate(&splits.test)?;
        self.evaluations += 1;

        self.metrics.log(&CheckpointMetrics {
            global_step:   self.state.global_step,
            learning_rate: self.state.learning_rate,
            train:         train.into(),
            dev:           dev.into(),
            test:          test.into(),
        })?;

        let verdict = self.state.judge(
            train.loss,
            dev.loss,
            test.loss,
            self.cfg.early_stopping_threshold,
            self.cfg.early_stopping_checkpoints,
        );

        match verdict {
            Verdict::Improved => {
                self.checkpoints.save(&*self.model, &self.state)?;
                Ok(Phase::Running)
            }
            Verdict::Stagnated { suboptimal_checkpoints } => {
                tracing::info!(
                    "No dev improvement ({suboptimal_checkpoints}/{} checkpoints)",
                    self.cfg.early_stopping_checkpoints
                );
                Ok(Phase::Running)
            }
            Verdict::Stop => {
                tracing::info!(
                    "Early stopping after {} checkpoints without improvement",
                    self.cfg.early_stopping_checkpoints
                );
                Ok(Phase::Stopped)
            }
        }
    }

    fn evaluate(&mut self, split: &Split) -> Result<EvalReport> {
        let report = self.evaluator.evaluate(&mut *self.model, split)?;
        tracing::info!(
            "  {}: loss {:.2} perplexity {:.2} per-utterance accuracy {:.2}",
            split.name,
            report.loss,
            report.perplexity,
            report.accuracy
        );
        Ok(report)
    }
}
