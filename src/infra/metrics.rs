// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per training checkpoint so learning curves
// can be plotted after (or during) a run.
//
// Output file: <train_dir>/metrics.csv
//
//   global_step,learning_rate,train_loss,train_perplexity,train_accuracy,dev_loss,...
//   200,0.001000,4.211000,67.430000,0.000000,4.390000,...
//
// Reading the columns:
//   - dev_loss is what early stopping watches
//   - a falling train_loss with a rising dev_loss means overfitting
//   - *_accuracy is exact per-utterance match after copy resolution
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::ml::evaluator::EvalReport;

const HEADER: &str = "global_step,learning_rate,\
train_loss,train_perplexity,train_accuracy,\
dev_loss,dev_perplexity,dev_accuracy,\
test_loss,test_perplexity,test_accuracy";

/// Everything measured at one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub global_step:   u64,
    pub learning_rate: f64,
    pub train:         SplitMetrics,
    pub dev:           SplitMetrics,
    pub test:          SplitMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub loss:       f64,
    pub perplexity: f64,
    pub accuracy:   f64,
}

impl From<EvalReport> for SplitMetrics {
    fn from(r: EvalReport) -> Self {
        Self { loss: r.loss, perplexity: r.perplexity, accuracy: r.accuracy }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header only when the file is new, so a resumed
    /// run keeps appending to the same log.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &CheckpointMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let split = |s: &SplitMetrics| format!("{:.6},{:.6},{:.6}", s.loss, s.perplexity, s.accuracy);
        writeln!(
            f,
            "{},{:.6},{},{},{}",
            m.global_step,
            m.learning_rate,
            split(&m.train),
            split(&m.dev),
            split(&m.test),
        )?;

        tracing::debug!("Logged metrics for step {}", m.global_step);
        Ok(())
    }

    #[cfg(test)]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
