// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Seed every RNG from --seed        (Layer 3 - domain)
//   Step 2: Resolve the data pipeline names   (Layer 4 - data)
//   Step 3: Load records, stratified split    (Layer 4 - data)
//   Step 4: Encode labels                     (Layer 3 - domain)
//   Step 5: Tokenizer + marker tokens         (Layer 6 - infra)
//           and tokenisation                  (Layer 4 - data)
//   Step 6: Build datasets                    (Layer 4 - data)
//   Step 7: Output dirs, config, run log      (Layer 6 - infra)
//   Step 8: Model, trainer, training loop     (Layer 5 - ml)
//   Step 9: save_pretrained the final model   (Layer 6 - infra)
//
// Every name that can be wrong (pipeline module / functions, the
// best-model metric, the label map) is checked before any record
// is read.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    marker::{ClueType, EntityMarking},
    registry::{self, PipelineNames},
    splitter::{partition, StratifiedShuffleSplit},
    tokenize::TokenizeOptions,
};
use crate::domain::{
    label::LabelCodec,
    seed::{streams, SeedContext},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{ReportTarget, RunKey, RunLogger},
    tokenizer_store::{register_special_tokens, TokenizerStore},
};
use crate::ml::{
    metrics::SelectionMetric,
    scheduler::LrDecay,
    trainer::{run_training, DeviceKind, EvalStrategy, TrainInputs, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All options of a training run. Serialisable so it is saved next to the
// checkpoints and inside the pretrained directory, where `evaluate` reads
// the pipeline options back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub seed:                        u64,
    /// Directory with the starting encoder (config.json, encoder.mpk, tokenizer.json)
    pub model_name:                  PathBuf,
    pub train_data:                  PathBuf,
    pub label_map:                   PathBuf,
    pub num_labels:                  usize,
    pub output_dir:                  PathBuf,
    /// 0 keeps every checkpoint
    pub save_total_limit:            usize,
    pub save_steps:                  usize,
    pub num_train_epochs:            usize,
    pub learning_rate:               f64,
    pub per_device_train_batch_size: usize,
    pub per_device_eval_batch_size:  usize,
    pub warmup_steps:                usize,
    pub warmup_ratio:                f64,
    pub weight_decay:                f64,
    pub max_grad_norm:               f64,
    pub lr_scheduler_type:           LrDecay,
    pub logging_dir:                 PathBuf,
    pub logging_steps:               usize,
    pub evaluation_strategy:         EvalStrategy,
    pub eval_steps:                  usize,
    pub load_best_model_at_end:      bool,
    pub metric_for_best_model:       String,
    pub gradient_accumulation_steps: usize,
    pub save_pretrained:             PathBuf,
    pub run_name:                    String,
    pub project_name:                String,
    pub entity_name:                 String,
    pub report_to:                   ReportTarget,
    pub special_entity_type:         EntityMarking,
    pub clue_type:                   ClueType,
    pub preprocess:                  bool,
    pub n_splits:                    usize,
    pub test_size:                   f64,
    pub hidden_emb_no:               usize,
    pub max_seq_len:                 usize,
    pub load_data_filename:          String,
    pub load_data_func_load:         String,
    pub load_data_func_tokenized:    String,
    pub load_data_class:             String,
    pub dataloader_num_workers:      usize,
    pub device:                      DeviceKind,
    pub fp16:                        bool,
    // Used only when the model directory has no encoder config / tokenizer
    pub vocab_size:                  usize,
    pub d_model:                     usize,
    pub num_heads:                   usize,
    pub num_layers:                  usize,
    pub d_ff:                        usize,
    pub dropout:                     f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed:                        42,
            model_name:                  "models/klue-bert-base".into(),
            train_data:                  "../dataset/train/train.csv".into(),
            label_map:                   "dict_label_to_num.json".into(),
            num_labels:                  30,
            output_dir:                  "./results".into(),
            save_total_limit:            5,
            save_steps:                  500,
            num_train_epochs:            20,
            learning_rate:               5e-5,
            per_device_train_batch_size: 16,
            per_device_eval_batch_size:  16,
            warmup_steps:                500,
            warmup_ratio:                0.0,
            weight_decay:                0.01,
            max_grad_norm:               1.0,
            lr_scheduler_type:           LrDecay::Linear,
            logging_dir:                 "./logs".into(),
            logging_steps:               100,
            evaluation_strategy:         EvalStrategy::Steps,
            eval_steps:                  500,
            load_best_model_at_end:      true,
            metric_for_best_model:       "eval_micro f1 score".into(),
            gradient_accumulation_steps: 1,
            save_pretrained:             "./best_model".into(),
            run_name:                    "baseline".into(),
            project_name:                "Model_Test".into(),
            entity_name:                 "growing_sesame".into(),
            report_to:                   ReportTarget::Csv,
            special_entity_type:         EntityMarking::TypedEntity,
            clue_type:                   ClueType::Question,
            preprocess:                  false,
            n_splits:                    1,
            test_size:                   0.1,
            hidden_emb_no:               4,
            max_seq_len:                 256,
            load_data_filename:          "load_data".into(),
            load_data_func_load:         "load_data".into(),
            load_data_func_tokenized:    "tokenized_dataset".into(),
            load_data_class:             "RE_Dataset".into(),
            dataloader_num_workers:      1,
            device:                      DeviceKind::Auto,
            fp16:                        true,
            vocab_size:                  30522,
            d_model:                     256,
            num_heads:                   8,
            num_layers:                  6,
            d_ff:                        1024,
            dropout:                     0.1,
        }
    }
}

impl TrainConfig {
    pub fn pipeline_names(&self) -> PipelineNames {
        PipelineNames {
            module:    self.load_data_filename.clone(),
            loader:    self.load_data_func_load.clone(),
            tokenizer: self.load_data_func_tokenized.clone(),
            dataset:   self.load_data_class.clone(),
        }
    }

    pub fn tokenize_options(&self) -> TokenizeOptions {
        TokenizeOptions {
            marking:     self.special_entity_type,
            clue:        self.clue_type,
            max_seq_len: self.max_seq_len,
            preprocess:  self.preprocess,
        }
    }

    pub fn run_key(&self) -> RunKey {
        RunKey {
            project: self.project_name.clone(),
            entity:  self.entity_name.clone(),
            run:     self.run_name.clone(),
        }
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

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Seeding ──────────────────────────────────────────────────
        let seed = SeedContext::new(cfg.seed);
        tracing::info!("Seed: {}", seed.seed());

        // ── Step 2: Resolve names before touching data ───────────────────────
        let pipeline = registry::resolve(&cfg.pipeline_names())?;
        cfg.metric_for_best_model.parse::<SelectionMetric>()?;
        let codec = LabelCodec::from_file(&cfg.label_map)
            .with_context(|| format!("Cannot load label map '{}'", cfg.label_map.display()))?;
        if codec.len() != cfg.num_labels {
            anyhow::bail!(
                "num_labels is {} but the label map has {} labels",
                cfg.num_labels, codec.len()
            );
        }
        let splitter = StratifiedShuffleSplit::new(cfg.n_splits, cfg.test_size)?;

        // ── Step 3: Load and split ───────────────────────────────────────────
        tracing::info!("Loading records from '{}'", cfg.train_data.display());
        let records = (pipeline.load)(&cfg.train_data)?;
        tracing::info!("Loaded {} records", records.len());

        let split = {
            let keys: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
            splitter.last_split(&keys, &mut seed.rng(streams::SPLIT))?
        };
        let (train_records, valid_records) = partition(records, &split);
        tracing::info!(
            "Split: {} train, {} validation",
            train_records.len(),
            valid_records.len()
        );

        // ── Step 4: Labels → indices ─────────────────────────────────────────
        let train_labels = codec.encode(&train_records.iter().map(|r| r.label.as_str()).collect::<Vec<_>>())?;
        let valid_labels = codec.encode(&valid_records.iter().map(|r| r.label.as_str()).collect::<Vec<_>>())?;

        // ── Step 5: Tokenizer and features ───────────────────────────────────
        // A model directory without tokenizer.json gets a word-level
        // vocabulary built from the training sentences in the output dir.
        let model_store = TokenizerStore::new(cfg.model_name.clone());
        let tok_store = if model_store.exists() {
            model_store
        } else {
            TokenizerStore::new(cfg.output_dir.clone())
        };
        let sentences: Vec<String> = train_records.iter().map(|r| r.sentence.clone()).collect();
        let mut tokenizer = tok_store.load_or_build(&sentences, cfg.vocab_size)?;
        register_special_tokens(&mut tokenizer, &cfg.special_entity_type.special_tokens());

        let opts = cfg.tokenize_options();
        let train_features = (pipeline.tokenize)(&train_records, &tokenizer, &opts)?;
        let valid_features = (pipeline.tokenize)(&valid_records, &tokenizer, &opts)?;
        tracing::info!(
            "Tokenised with {:?} markers, {:?} clue, max_seq_len={}",
            opts.marking, opts.clue, opts.max_seq_len
        );

        // ── Step 6: Burn datasets ────────────────────────────────────────────
        let train = (pipeline.build_dataset)(train_features, train_labels)?;
        let valid = (pipeline.build_dataset)(valid_features, valid_labels)?;

        // ── Step 7: Output dirs, config, run log ─────────────────────────────
        let limit = (cfg.save_total_limit > 0).then_some(cfg.save_total_limit);
        let ckpt_manager = CheckpointManager::new(cfg.output_dir.clone(), limit)?;
        ckpt_manager.save_config(cfg)?;
        let run_log = RunLogger::new(&cfg.logging_dir, cfg.run_key(), cfg.report_to)?;

        // ── Step 8 + 9: Train, then save_pretrained ──────────────────────────
        let inputs = TrainInputs { train, valid, tokenizer, codec, seed };
        let summary = run_training(cfg, inputs, ckpt_manager, run_log)?;

        tracing::info!(
            "Finished after {} steps, best {} = {:?}",
            summary.global_step, cfg.metric_for_best_model, summary.best_metric
        );
        Ok(summary)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "id,sentence,subject_entity,object_entity,label,source";

    fn write_klue_csv(path: &std::path::Path, rows: usize) {
        let mut f = std::fs::File::create(path).unwrap();
        writeln!(f, "{HEADER}").unwrap();
        let labels = ["no_relation", "org:founded_by", "per:employee_of"];
        for i in 0..rows {
            writeln!(
                f,
                "{i},\"alice founded acme {i}\",\"{{'word': 'acme', 'start_idx': 14, 'end_idx': 17, 'type': 'ORG'}}\",\"{{'word': 'alice', 'start_idx': 0, 'end_idx': 4, 'type': 'PER'}}\",{},wikipedia",
                labels[i % 3]
            )
            .unwrap();
        }
    }

    fn tiny_config(root: &std::path::Path) -> TrainConfig {
        TrainConfig {
            model_name:                  root.join("model"),
            train_data:                  root.join("train.csv"),
            label_map:                   PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("dict_label_to_num.json"),
            output_dir:                  root.join("results"),
            logging_dir:                 root.join("logs"),
            save_pretrained:             root.join("best_model"),
            num_train_epochs:            1,
            per_device_train_batch_size: 4,
            per_device_eval_batch_size:  4,
            warmup_steps:                0,
            logging_steps:               1,
            eval_steps:                  2,
            save_steps:                  2,
            test_size:                   0.2,
            max_seq_len:                 32,
            hidden_emb_no:               2,
            vocab_size:                  100,
            d_model:                     8,
            num_heads:                   2,
            num_layers:                  1,
            d_ff:                        16,
            device:                      DeviceKind::Cpu,
            fp16:                        false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_cli_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.metric_for_best_model, "eval_micro f1 score");
        assert_eq!(cfg.special_entity_type, EntityMarking::TypedEntity);
        assert_eq!(cfg.hidden_emb_no, 4);
    }

    #[test]
    fn test_unknown_pipeline_fails_before_reading_data() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(root.path());
        cfg.load_data_func_load = "load_data_v9".into();
        // train.csv does not exist; the registry error must come first
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(err.to_string().contains("load_data_v9"));
    }

    #[test]
    fn test_num_labels_must_match_label_map() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(root.path());
        cfg.num_labels = 10;
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }

    #[test]
    fn test_end_to_end_on_tiny_csv() {
        let root = tempfile::tempdir().unwrap();
        let cfg  = tiny_config(root.path());
        write_klue_csv(&cfg.train_data, 30);

        let summary = TrainUseCase::new(cfg.clone()).execute().unwrap();
        // 24 train rows / batch 4 → 6 steps
        assert_eq!(summary.global_step, 6);
        assert!(cfg.output_dir.join("train_config.json").exists());
        assert!(cfg.output_dir.join("tokenizer.json").exists());
        assert!(cfg.save_pretrained.join("model.mpk").exists());

        // The saved directory reloads and scores the same file
        use crate::application::evaluate_use_case::{EvaluateConfig, EvaluateUseCase};
        let report = EvaluateUseCase::new(EvaluateConfig {
            model_dir:  cfg.save_pretrained.clone(),
            data:       cfg.train_data.clone(),
            output:     Some(root.path().join("pred.csv")),
            batch_size: 8,
            device:     DeviceKind::Cpu,
        })
        .execute()
        .unwrap();
        assert_eq!(report.examples, 30);
        assert!((0.0..=100.0).contains(&report.metrics.micro_f1));
        assert!(root.path().join("pred.csv").exists());
    }
}
