// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns the training directory layout:
//
//   <train_dir>/
//     denoiser_ckpt-200.mpk.gz   ← weights at global step 200
//     denoiser_ckpt-400.mpk.gz
//     checkpoint.json            ← pointer to the latest weights
//     train_config.json          ← hyperparameters of the run
//     metrics.csv                ← written by MetricsLogger
//
// The weights themselves are written by the model (it knows its
// own record format); this module decides where they go and keeps
// the pointer consistent with them.
//
// Pointer updates are atomic: the new pointer is written to a
// temporary file and renamed over the old one, so a crash during
// save leaves the previous checkpoint loadable.
//
// Restoring never fails a run. A missing pointer, an unreadable
// pointer or weights the model refuses all fall back to fresh
// parameters, and the log says which path was taken.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::traits::Seq2SeqModel;
use crate::ml::trainer::TrainingState;

pub const CHECKPOINT_PREFIX: &str = "denoiser_ckpt";
const POINTER_FILE: &str = "checkpoint.json";
const CONFIG_FILE: &str = "train_config.json";

/// Checkpoints kept on disk; older ones are deleted after a save.
pub const MAX_TO_KEEP: usize = 5;

/// Contents of `checkpoint.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPointer {
    /// Relative to the training directory.
    pub model_path: PathBuf,
    pub state:      TrainingState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Restored {
    Resumed(TrainingState),
    Fresh,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create training directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete everything in the training directory.
    pub fn reset(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Cannot clear '{}'", self.dir.display()))?;
        }
        fs::create_dir_all(&self.dir)?;
        tracing::info!("Cleared training directory '{}'", self.dir.display());
        Ok(())
    }

    // ─── Weights ──────────────────────────────────────────────────────────────
    pub fn save<M: Seq2SeqModel + ?Sized>(&self, model: &M, state: &TrainingState) -> Result<PathBuf> {
        let prefix = self.dir.join(CHECKPOINT_PREFIX);
        let written = model.save(&prefix, state.global_step)?;

        let model_path = written
            .strip_prefix(&self.dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| written.clone());
        self.write_pointer(&CheckpointPointer { model_path, state: state.clone() })?;
        self.prune(state.global_step)?;

        tracing::info!("Saved checkpoint at step {} to '{}'", state.global_step, written.display());
        Ok(written)
    }

    /// The pointer, or `None` when nothing has been saved yet.
    pub fn latest(&self) -> Result<Option<CheckpointPointer>> {
        let path = self.dir.join(POINTER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let pointer = serde_json::from_str(&json)
            .with_context(|| format!("Malformed checkpoint pointer '{}'", path.display()))?;
        Ok(Some(pointer))
    }

    /// Load the latest checkpoint into `model` if there is a usable one.
    pub fn restore<M: Seq2SeqModel + ?Sized>(&self, model: &mut M) -> Restored {
        let pointer = match self.latest() {
            Ok(Some(pointer)) => pointer,
            Ok(None) => {
                tracing::info!("Created model with fresh parameters.");
                return Restored::Fresh;
            }
            Err(e) => {
                tracing::warn!("{e:#}; starting from fresh parameters");
                return Restored::Fresh;
            }
        };

        let path = self.dir.join(&pointer.model_path);
        match model.restore(&path) {
            Ok(()) => {
                tracing::info!(
                    "Reading model parameters from '{}' (step {})",
                    path.display(),
                    pointer.state.global_step
                );
                Restored::Resumed(pointer.state)
            }
            Err(e) => {
                tracing::warn!("Cannot restore '{}': {e:#}; starting from fresh parameters", path.display());
                Restored::Fresh
            }
        }
    }

    fn write_pointer(&self, pointer: &CheckpointPointer) -> Result<()> {
        let path = self.dir.join(POINTER_FILE);
        let tmp = self.dir.join(format!("{POINTER_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_string_pretty(pointer)?)
            .with_context(|| format!("Cannot write '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Cannot move pointer into place at '{}'", path.display()))?;
        Ok(())
    }

    /// Remove weight files beyond the newest `MAX_TO_KEEP`. The step
    /// just saved is always kept.
    fn prune(&self, current_step: u64) -> Result<()> {
        let mut saved: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if let Some(step) = path.file_name().and_then(|n| n.to_str()).and_then(checkpoint_step) {
                saved.push((step, path));
            }
        }

        let mut steps: Vec<u64> = saved.iter().map(|(s, _)| *s).collect();
        steps.sort_unstable_by(|a, b| b.cmp(a));
        steps.dedup();
        steps.truncate(MAX_TO_KEEP);

        for (step, path) in saved {
            if step != current_step && !steps.contains(&step) {
                fs::remove_file(&path)
                    .with_context(|| format!("Cannot remove old checkpoint '{}'", path.display()))?;
                tracing::debug!("Removed old checkpoint '{}'", path.display());
            }
        }
        Ok(())
    }

    // ─── Run configuration ────────────────────────────────────────────────────
    /// Decoding and evaluation rebuild the network from this file.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Step number of a weights file named `<prefix>-<step>[.ext]`.
fn checkpoint_step(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(CHECKPOINT_PREFIX)?.strip_prefix('-')?;
    let digits: &str = rest.split('.').next()?;
    digits.parse().ok()
}
