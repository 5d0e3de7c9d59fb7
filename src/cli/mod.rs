// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — fine-tunes the relation classifier
//   2. `evaluate` — scores a saved model on a labelled file
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "re-trainer",
    version,
    about = "Train and evaluate a KLUE-RE relation extraction classifier."
)]
pub struct Cli {
    /// The subcommand to run (train or evaluate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.train_data.display());
    let save_dir = args.save_pretrained.clone();

    let summary = TrainUseCase::new(args.into()).execute()?;

    match summary.best_metric {
        Some(best) => println!(
            "Training complete after {} steps. Best metric {:.4} at step {}. Model saved to '{}'.",
            summary.global_step, best, summary.best_step.unwrap_or_default(), save_dir.display()
        ),
        None => println!(
            "Training complete after {} steps. Model saved to '{}'.",
            summary.global_step, save_dir.display()
        ),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.into()).execute()?;
    println!("examples        : {}", report.examples);
    println!("eval_loss       : {:.4}", report.eval_loss);
    println!("micro f1 score  : {:.2}", report.metrics.micro_f1);
    println!("auprc           : {:.2}", report.metrics.auprc);
    println!("accuracy        : {:.4}", report.metrics.accuracy);
    Ok(())
}
