// ============================================================
// Layer 2 — Trained Model Loading
// ============================================================
// Shared by `decode` and `evaluate`:
//
//   train_config.json → rebuild the network with the same shape
//   vocab.from/.to    → must match the sizes it was trained with
//   (vocab.tags replaces vocab.to for a tagging model)
//   checkpoint.json   → restore the latest parameters
//
// Unlike training, a missing or unusable checkpoint is an error
// here: decoding with fresh parameters is never what was meant.

use anyhow::{bail, ensure, Result};
use std::path::Path;

use crate::application::train_use_case::TrainConfig;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::{
    checkpoint::{CheckpointManager, Restored},
    vocab_store::VocabStore,
};
use crate::domain::traits::Seq2SeqModel;

pub struct TrainedModel {
    pub config:       TrainConfig,
    pub model:        Box<dyn Seq2SeqModel>,
    pub source_vocab: Vocabulary,
    /// Target tokens, or labels for a tagging model.
    pub target_vocab: Vocabulary,
}

impl TrainedModel {
    /// `data_dir` overrides the data directory recorded at training time.
    pub fn load(train_dir: &str, data_dir: Option<&str>) -> Result<Self> {
        let checkpoints = CheckpointManager::new(train_dir)?;
        let mut config = checkpoints.load_config()?;
        if let Some(dir) = data_dir {
            config.data_dir = dir.to_string();
        }

        let store = VocabStore::new(Path::new(&config.data_dir));
        let source_vocab = store.load_source()?;
        let target_vocab = store.load_output(config.task)?;
        ensure!(
            source_vocab.len() == config.source_vocab_size && target_vocab.len() == config.target_vocab_size,
            "vocabularies in '{}' have {} / {} tokens but the model was trained with {} / {}",
            config.data_dir,
            source_vocab.len(),
            target_vocab.len(),
            config.source_vocab_size,
            config.target_vocab_size
        );

        let mut model = config.build_model();
        match checkpoints.restore(model.as_mut()) {
            Restored::Resumed(state) => {
                tracing::info!("Model loaded from step {}", state.global_step);
            }
            Restored::Fresh => {
                bail!("No usable checkpoint in '{train_dir}'. Have you run 'train' first?")
            }
        }

        Ok(Self { config, model, source_vocab, target_vocab })
    }
}
