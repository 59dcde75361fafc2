// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Prepare the training directory  (Layer 6 - infra)
//   Step 2: Load both vocabularies          (Layer 6 - infra)
//   Step 3: Load train / dev / test splits  (Layer 4 - data)
//   Step 4: Class weights (tagging), save   (Layer 4 / 6)
//   Step 5: Build model, restore or fresh   (Layer 5 - ml)
//   Step 6: Run the training controller     (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    batcher::BatchAssembler,
    class_weights::ClassWeights,
    loader::{DatasetLoader, SplitFiles},
};
use crate::domain::sequence::{Bucket, DEFAULT_BUCKETS};
use crate::domain::task::Task;
use crate::domain::traits::Seq2SeqModel;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::{
    checkpoint::{CheckpointManager, Restored},
    metrics::MetricsLogger,
    vocab_store::VocabStore,
};
use crate::ml::{
    evaluator::{Evaluator, DEFAULT_EVAL_BATCH_SIZE},
    model::CopyNetConfig,
    seq2seq::{default_device, BurnSeq2Seq, TrainBackend},
    tagger::TaggerNetConfig,
    trainer::{Splits, TrainingController, TrainingState, TrainingSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as train_config.json so decode and evaluate can rebuild
// the same network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    #[serde(default)]
    pub task:                       Task,
    pub data_dir:                   String,
    pub train_dir:                  String,
    pub buckets:                    Vec<Bucket>,
    pub learning_rate:              f64,
    pub learning_rate_decay_factor: f64,
    pub max_gradient_norm:          f32,
    pub word_dropout_prob:          f64,
    pub early_stopping_threshold:   f64,
    pub early_stopping_checkpoints: usize,
    pub batch_size:                 usize,
    pub eval_batch_size:            usize,
    pub size:                       usize,
    pub num_heads:                  usize,
    pub num_layers:                 usize,
    pub dropout:                    f64,
    pub steps_per_checkpoint:       usize,
    pub max_train_data_size:        usize,
    pub force_fresh:                bool,
    pub seed:                       u64,
    /// Filled in from the vocabulary files when training starts.
    /// For tagging the target vocabulary is the label vocabulary.
    pub source_vocab_size:          usize,
    pub target_vocab_size:          usize,
    /// Balanced label weights from the training split (tagging only).
    #[serde(default)]
    pub class_weights:              Option<ClassWeights>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            task:                       Task::Denoise,
            data_dir:                   "data".to_string(),
            train_dir:                  "train".to_string(),
            buckets:                    DEFAULT_BUCKETS.to_vec(),
            learning_rate:              0.001,
            learning_rate_decay_factor: 0.99,
            max_gradient_norm:          5.0,
            word_dropout_prob:          0.0,
            early_stopping_threshold:   0.01,
            early_stopping_checkpoints: 10,
            batch_size:                 16,
            eval_batch_size:            DEFAULT_EVAL_BATCH_SIZE,
            size:                       64,
            num_heads:                  4,
            num_layers:                 1,
            dropout:                    0.1,
            steps_per_checkpoint:       200,
            max_train_data_size:        0,
            force_fresh:                false,
            seed:                       42,
            source_vocab_size:          0,
            target_vocab_size:          0,
            class_weights:              None,
        }
    }
}

impl TrainConfig {
    /// Network shape implied by the vocabularies and the buckets.
    pub fn network(&self) -> CopyNetConfig {
        let max_source_len = self.buckets.iter().map(|b| b.source_len).max().unwrap_or(1);
        let max_target_len = self.buckets.iter().map(|b| b.target_len).max().unwrap_or(1);
        CopyNetConfig::new(
            self.source_vocab_size,
            self.target_vocab_size,
            max_source_len,
            max_target_len,
            self.size,
            self.num_heads,
            self.num_layers,
        )
        .with_dropout(self.dropout)
    }

    /// Tagging network over the same buckets; labels come from the
    /// target vocabulary size.
    pub fn tagger_network(&self) -> TaggerNetConfig {
        let max_source_len = self.buckets.iter().map(|b| b.source_len).max().unwrap_or(1);
        TaggerNetConfig::new(
            self.source_vocab_size,
            self.target_vocab_size,
            max_source_len,
            self.size,
            self.num_heads,
            self.num_layers,
        )
        .with_dropout(self.dropout)
    }

    pub fn build_model(&self) -> Box<dyn Seq2SeqModel> {
        match self.task {
            Task::Denoise => Box::new(BurnSeq2Seq::<TrainBackend>::new(
                self.network(),
                self.max_gradient_norm,
                self.batch_size,
                default_device(),
            )),
            Task::Tag => Box::new(BurnSeq2Seq::<TrainBackend, _>::tagger(
                self.tagger_network(),
                self.max_gradient_norm,
                self.batch_size,
                default_device(),
            )),
        }
    }

    pub fn loader(&self) -> DatasetLoader {
        DatasetLoader::for_task(self.task, &self.buckets, self.target_vocab_size)
    }

    pub fn split_files(&self, split: &str) -> SplitFiles {
        SplitFiles::for_task(self.task, Path::new(&self.data_dir), split)
    }

    /// Tagging batches carry the stored class weights.
    pub fn assembler(&self, reverse_encoder: bool) -> BatchAssembler {
        let assembler = BatchAssembler::new(reverse_encoder);
        match (self.task, &self.class_weights) {
            (Task::Tag, Some(weights)) => assembler.with_class_weights(weights.clone()),
            _ => assembler,
        }
    }

    pub fn build_evaluator<'v>(&self, reverse_encoder: bool, target_vocab: &'v Vocabulary) -> Evaluator<'v> {
        let assembler = self.assembler(reverse_encoder);
        match self.task {
            Task::Denoise => Evaluator::new(assembler, target_vocab, self.eval_batch_size),
            Task::Tag => Evaluator::for_tagging(assembler, self.eval_batch_size),
        }
    }

    /// Tags are read at source positions, so no bucket may have
    /// more target than source positions.
    fn check_buckets(&self) -> Result<()> {
        ensure!(!self.buckets.is_empty(), "at least one bucket is required");
        if self.task == Task::Tag {
            for b in &self.buckets {
                ensure!(
                    b.target_len <= b.source_len,
                    "tagging bucket ({}, {}) has more target than source positions",
                    b.source_len,
                    b.target_len
                );
            }
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train until early stopping and return the best checkpoint's numbers.
    pub fn execute(&mut self) -> Result<TrainingSummary> {
        self.config.check_buckets()?;

        // ── Step 1: Training directory ───────────────────────────────────────
        let checkpoints = CheckpointManager::new(&self.config.train_dir)?;
        if self.config.force_fresh {
            checkpoints.reset()?;
        }

        // ── Step 2: Vocabularies ─────────────────────────────────────────────
        let data_dir = Path::new(&self.config.data_dir);
        let vocab_store  = VocabStore::new(data_dir);
        let source_vocab = vocab_store.load_source()?;
        let target_vocab = vocab_store.load_output(self.config.task)?;
        self.config.source_vocab_size = source_vocab.len();
        self.config.target_vocab_size = target_vocab.len();

        // ── Step 3: Splits ───────────────────────────────────────────────────
        let loader = self.config.loader();
        let splits = Splits {
            train: loader.load_split(
                "train",
                &self.config.split_files("train"),
                self.config.max_train_data_size,
            )?,
            dev:  loader.load_split("dev", &self.config.split_files("dev"), 0)?,
            test: loader.load_split("test", &self.config.split_files("test"), 0)?,
        };

        // ── Step 4: Class weights, then save config for decode / evaluate ───
        if self.config.task == Task::Tag {
            self.config.class_weights = Some(ClassWeights::balanced(&splits.train.dataset, target_vocab.len()));
        }
        let cfg = &self.config;
        checkpoints.save_config(cfg)?;

        // ── Step 5: Model ────────────────────────────────────────────────────
        let mut model = cfg.build_model();
        let state = match checkpoints.restore(model.as_mut()) {
            Restored::Resumed(state) => state,
            Restored::Fresh => TrainingState::new(cfg.learning_rate),
        };

        // ── Step 6: Training controller (Layer 5) ────────────────────────────
        let metrics = MetricsLogger::new(checkpoints.dir())?;
        let evaluator = cfg.build_evaluator(model.reverse_encoder_input(), &target_vocab);
        let controller = TrainingController::new(
            cfg,
            &mut model,
            &splits,
            evaluator,
            &checkpoints,
            &metrics,
            state,
            StdRng::seed_from_u64(cfg.seed),
        )?;
        controller.run()
    }
}
