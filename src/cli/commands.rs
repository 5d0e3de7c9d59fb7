// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for unknown flags or enum values
//   - type conversion (string → usize, f64, enums)
//
// Boolean options take an explicit value (`--fp16 false`), since
// several of them default to true.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    evaluate_use_case::EvaluateConfig,
    train_use_case::TrainConfig,
};
use crate::data::marker::{ClueType, EntityMarking};
use crate::infra::metrics::ReportTarget;
use crate::ml::{
    scheduler::LrDecay,
    trainer::{DeviceKind, EvalStrategy},
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a relation classifier on KLUE-RE style data
    Train(TrainArgs),

    /// Score a saved model on a labelled file
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Random seed for splitting, shuffling and initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Model directory: config.json, encoder.mpk, tokenizer.json
    #[arg(long = "model", default_value = "models/klue-bert-base")]
    pub model_name: PathBuf,

    #[arg(long, default_value = "../dataset/train/train.csv")]
    pub train_data: PathBuf,

    /// Label → index mapping (JSON)
    #[arg(long, default_value = "dict_label_to_num.json")]
    pub label_map: PathBuf,

    #[arg(long, default_value_t = 30)]
    pub num_labels: usize,

    /// Directory which stores checkpoints and the run configuration
    #[arg(long, default_value = "./results")]
    pub output_dir: PathBuf,

    /// Max number of checkpoints kept (0 = keep all)
    #[arg(long, default_value_t = 5)]
    pub save_total_limit: usize,

    /// Optimiser steps between checkpoints
    #[arg(long, default_value_t = 500)]
    pub save_steps: usize,

    #[arg(long, default_value_t = 20)]
    pub num_train_epochs: usize,

    #[arg(long, default_value_t = 5e-5)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 16)]
    pub per_device_train_batch_size: usize,

    #[arg(long, default_value_t = 16)]
    pub per_device_eval_batch_size: usize,

    /// Linear warmup steps; 0 falls back to --warmup-ratio
    #[arg(long, default_value_t = 500)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 0.0)]
    pub warmup_ratio: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Gradient-norm clipping threshold (0 disables)
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    #[arg(long, value_enum, default_value_t = LrDecay::Linear)]
    pub lr_scheduler_type: LrDecay,

    #[arg(long, default_value = "./logs")]
    pub logging_dir: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub logging_steps: usize,

    #[arg(long, value_enum, default_value_t = EvalStrategy::Steps)]
    pub evaluation_strategy: EvalStrategy,

    #[arg(long, default_value_t = 500)]
    pub eval_steps: usize,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub load_best_model_at_end: bool,

    /// "eval_micro f1 score", "eval_auprc", "eval_accuracy" or "eval_loss"
    #[arg(long, default_value = "eval_micro f1 score")]
    pub metric_for_best_model: String,

    #[arg(long, default_value_t = 1)]
    pub gradient_accumulation_steps: usize,

    /// Where the final model is written
    #[arg(long, default_value = "./best_model")]
    pub save_pretrained: PathBuf,

    #[arg(long, default_value = "baseline")]
    pub run_name: String,

    #[arg(long, default_value = "Model_Test")]
    pub project_name: String,

    #[arg(long, default_value = "growing_sesame")]
    pub entity_name: String,

    #[arg(long, value_enum, default_value_t = ReportTarget::Csv)]
    pub report_to: ReportTarget,

    #[arg(long, value_enum, default_value_t = EntityMarking::TypedEntity)]
    pub special_entity_type: EntityMarking,

    /// Clean sentences after marking
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub preprocess: bool,

    #[arg(long, value_enum, default_value_t = ClueType::Question)]
    pub clue_type: ClueType,

    /// Number of stratified shuffles; the last one is used
    #[arg(long, default_value_t = 1)]
    pub n_splits: usize,

    /// Validation fraction
    #[arg(long, default_value_t = 0.1)]
    pub test_size: f64,

    /// How many of the last hidden layers feed the classifier
    #[arg(long, default_value_t = 4)]
    pub hidden_emb_no: usize,

    #[arg(long, default_value_t = 256)]
    pub max_seq_len: usize,

    #[arg(long, default_value = "load_data")]
    pub load_data_filename: String,

    #[arg(long, default_value = "load_data")]
    pub load_data_func_load: String,

    #[arg(long, default_value = "tokenized_dataset")]
    pub load_data_func_tokenized: String,

    #[arg(long, default_value = "RE_Dataset")]
    pub load_data_class: String,

    #[arg(long, default_value_t = 1)]
    pub dataloader_num_workers: usize,

    #[arg(long, value_enum, default_value_t = DeviceKind::Auto)]
    pub device: DeviceKind,

    /// Half-precision training on the GPU backend
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub fp16: bool,

    /// Vocabulary size when a tokenizer has to be built
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,

    /// Hidden dimension when the model directory has no config.json
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            seed:                        a.seed,
            model_name:                  a.model_name,
            train_data:                  a.train_data,
            label_map:                   a.label_map,
            num_labels:                  a.num_labels,
            output_dir:                  a.output_dir,
            save_total_limit:            a.save_total_limit,
            save_steps:                  a.save_steps,
            num_train_epochs:            a.num_train_epochs,
            learning_rate:               a.learning_rate,
            per_device_train_batch_size: a.per_device_train_batch_size,
            per_device_eval_batch_size:  a.per_device_eval_batch_size,
            warmup_steps:                a.warmup_steps,
            warmup_ratio:                a.warmup_ratio,
            weight_decay:                a.weight_decay,
            max_grad_norm:               a.max_grad_norm,
            lr_scheduler_type:           a.lr_scheduler_type,
            logging_dir:                 a.logging_dir,
            logging_steps:               a.logging_steps,
            evaluation_strategy:         a.evaluation_strategy,
            eval_steps:                  a.eval_steps,
            load_best_model_at_end:      a.load_best_model_at_end,
            metric_for_best_model:       a.metric_for_best_model,
            gradient_accumulation_steps: a.gradient_accumulation_steps,
            save_pretrained:             a.save_pretrained,
            run_name:                    a.run_name,
            project_name:                a.project_name,
            entity_name:                 a.entity_name,
            report_to:                   a.report_to,
            special_entity_type:         a.special_entity_type,
            clue_type:                   a.clue_type,
            preprocess:                  a.preprocess,
            n_splits:                    a.n_splits,
            test_size:                   a.test_size,
            hidden_emb_no:               a.hidden_emb_no,
            max_seq_len:                 a.max_seq_len,
            load_data_filename:          a.load_data_filename,
            load_data_func_load:         a.load_data_func_load,
            load_data_func_tokenized:    a.load_data_func_tokenized,
            load_data_class:             a.load_data_class,
            dataloader_num_workers:      a.dataloader_num_workers,
            device:                      a.device,
            fp16:                        a.fp16,
            vocab_size:                  a.vocab_size,
            d_model:                     a.d_model,
            num_heads:                   a.num_heads,
            num_layers:                  a.num_layers,
            d_ff:                        a.d_ff,
            dropout:                     a.dropout,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by `train --save-pretrained`
    #[arg(long, default_value = "./best_model")]
    pub model_dir: PathBuf,

    /// Labelled file in the format the model was trained on
    #[arg(long)]
    pub data: PathBuf,

    /// Write id,pred_label,probs rows here
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, value_enum, default_value_t = DeviceKind::Auto)]
    pub device: DeviceKind,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            model_dir:  a.model_dir,
            data:       a.data,
            output:     a.output,
            batch_size: a.batch_size,
            device:     a.device,
        }
    }
}
