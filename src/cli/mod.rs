// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
//   train     — train until early stopping, print the best losses
//   decode    — interactive denoising from stdin
//   evaluate  — loss / perplexity / accuracy on one split
//   self-test — a few steps of a tiny model on built-in data
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, DecodeArgs, EvaluateArgs, SelfTestArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "dialogue-denoiser",
    version = "0.1.0",
    about = "Train a copy-augmented seq2seq model that cleans up noisy dialogue, then decode with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Decode(args)   => run_decode(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::SelfTest(args) => run_self_test(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on data in: {}", args.data_dir);

    let mut use_case = TrainUseCase::new(args.into());
    let summary = use_case.execute()?;

    match summary.best {
        Some(best) => println!(
            "Best loss achieved: {:.2} (train) {:.2} (*dev) {:.2} (test) at step {}",
            best.train_loss, best.dev_loss, best.test_loss, best.step
        ),
        None => println!("Training stopped after {} steps without an evaluation.", summary.global_step),
    }
    Ok(())
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    use crate::application::{decode_use_case::DecodeUseCase, trained_model::TrainedModel};

    let trained = TrainedModel::load(&args.train_dir, args.data_dir.as_deref())?;
    let mut use_case = DecodeUseCase::new(
        trained.model,
        trained.source_vocab,
        trained.target_vocab,
        trained.config.buckets,
        trained.config.task,
    )?;

    let stdin = std::io::stdin();
    let decoded = use_case.run(stdin.lock(), std::io::stdout())?;
    tracing::info!("Decoded {decoded} lines");
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.train_dir, args.data_dir, args.split.clone()).execute()?;
    println!(
        "{}: loss {:.4} perplexity {:.4} per-utterance accuracy {:.4} ({} examples)",
        args.split, report.loss, report.perplexity, report.accuracy, report.examples
    );
    Ok(())
}

fn run_self_test(args: SelfTestArgs) -> Result<()> {
    use crate::application::self_test_use_case::SelfTestUseCase;

    let losses = SelfTestUseCase::new(args.steps, args.seed).execute()?;
    println!("Self-test passed: {} steps, losses {:?}", losses.len(), losses);
    Ok(())
}
