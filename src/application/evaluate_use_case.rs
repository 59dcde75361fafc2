// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Loads a trained model and scores one split of the data
// directory (train, dev or test) the same way the training
// controller does at every checkpoint.

use anyhow::Result;

use crate::application::trained_model::TrainedModel;
use crate::ml::evaluator::EvalReport;

pub struct EvaluateUseCase {
    train_dir: String,
    data_dir:  Option<String>,
    split:     String,
}

impl EvaluateUseCase {
    pub fn new(train_dir: String, data_dir: Option<String>, split: String) -> Self {
        Self { train_dir, data_dir, split }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let TrainedModel { config, mut model, target_vocab, .. } =
            TrainedModel::load(&self.train_dir, self.data_dir.as_deref())?;

        let split = config.loader().load_split(&self.split, &config.split_files(&self.split), 0)?;

        let evaluator = config.build_evaluator(model.reverse_encoder_input(), &target_vocab);
        let report = evaluator.evaluate(model.as_mut(), &split)?;
        tracing::info!(
            "{}: loss {:.2} perplexity {:.2} per-sequence accuracy {:.2}",
            self.split,
            report.loss,
            report.perplexity,
            report.accuracy
        );
        Ok(report)
    }
}
