// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + periodic evaluation loop using Burn's DataLoader
// and AdamW.
//
// One optimiser step ("global step") = gradient_accumulation_steps
// micro-batches. Everything periodic is counted in global steps:
//
//   every logging_steps  → mean train loss + LR to the run log
//   every eval_steps     → evaluation (strategy "steps")
//   every epoch end      → evaluation (strategy "epoch")
//   every save_steps     → checkpoint-{step}/ then rotation
//
// Key Burn insight:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - The validation batcher must use B::InnerBackend too
//
// The backend is picked at runtime from --device / --fp16:
//
//   cpu           → Autodiff<NdArray>
//   auto + fp16   → Autodiff<Wgpu<f16, i32>>
//   auto          → Autodiff<Wgpu>
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, NdArray, Wgpu},
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, f16},
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::RelationBatcher, dataset::RelationDataset};
use crate::domain::{label::LabelCodec, seed::SeedContext};
use crate::infra::{
    checkpoint::{CheckpointManager, PretrainedDir, TrainerState},
    metrics::{LogRecord, RunLogger},
    tokenizer_store::vocab_len,
};
use crate::ml::{
    metrics::{compute_metrics, EvalMetrics, SelectionMetric},
    model::{EncoderConfig, ReModel, ReModelConfig},
    predictor::{eval_loader, predict},
    scheduler::LrScheduler,
};

/// When to run an evaluation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EvalStrategy {
    No,
    Steps,
    Epoch,
}

/// Where tensors live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Best available GPU adapter via wgpu
    Auto,
    /// ndarray backend on the host
    Cpu,
}

/// Everything the loop needs besides the configuration.
pub struct TrainInputs {
    pub train:     RelationDataset,
    pub valid:     RelationDataset,
    pub tokenizer: Tokenizer,
    pub codec:     LabelCodec,
    /// Same context the split was drawn from
    pub seed:      SeedContext,
}

/// What a finished run reports back to the orchestrator.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub global_step:     usize,
    pub steps_per_epoch: usize,
    pub best_metric: Option<f64>,
    pub best_step:   Option<usize>,
    pub last_eval:   Option<(f64, EvalMetrics)>,
}

/// Pick the backend from the configuration and train.
pub fn run_training(
    cfg:          &TrainConfig,
    inputs:       TrainInputs,
    ckpt_manager: CheckpointManager,
    run_log:      RunLogger,
) -> Result<TrainSummary> {
    match (cfg.device, cfg.fp16) {
        (DeviceKind::Cpu, fp16) => {
            if fp16 {
                tracing::warn!("fp16 is ignored on the cpu backend");
            }
            let device = burn::backend::ndarray::NdArrayDevice::Cpu;
            tracing::info!("Using NdArray device: {:?}", device);
            train_loop::<Autodiff<NdArray>>(cfg, inputs, ckpt_manager, run_log, device)
        }
        (DeviceKind::Auto, true) => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device (fp16): {:?}", device);
            train_loop::<Autodiff<Wgpu<f16, i32>>>(cfg, inputs, ckpt_manager, run_log, device)
        }
        (DeviceKind::Auto, false) => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<Autodiff<Wgpu>>(cfg, inputs, ckpt_manager, run_log, device)
        }
    }
}

/// Encoder from the model directory, or the configured fallback
/// architecture; grown to the tokenizer's vocabulary; fresh head.
fn build_model<B: Backend>(
    cfg:       &TrainConfig,
    tokenizer: &Tokenizer,
    device:    &B::Device,
) -> Result<(ReModelConfig, ReModel<B>)> {
    let vocab = vocab_len(tokenizer);

    let (mut encoder_cfg, encoder) = match PretrainedDir::new(&cfg.model_name).load_encoder::<B>(device)? {
        Some(found) => found,
        None => {
            tracing::warn!(
                "No encoder config in '{}', using d_model={} layers={}",
                cfg.model_name.display(), cfg.d_model, cfg.num_layers
            );
            let fallback = EncoderConfig::new(
                vocab, cfg.max_seq_len, 2,
                cfg.d_model, cfg.num_heads, cfg.num_layers, cfg.d_ff, cfg.dropout,
            );
            let encoder = fallback.init(device);
            (fallback, encoder)
        }
    };

    if encoder_cfg.max_position < cfg.max_seq_len {
        anyhow::bail!(
            "max_seq_len {} exceeds the encoder's {} position embeddings",
            cfg.max_seq_len, encoder_cfg.max_position
        );
    }

    let encoder = encoder.resize_token_embeddings(vocab);
    encoder_cfg.vocab_size = encoder.vocab_size();

    let model_cfg = ReModelConfig::new(encoder_cfg, cfg.num_labels, cfg.hidden_emb_no);
    let model = model_cfg.init_with_encoder(encoder, device);
    Ok((model_cfg, model))
}

/// One step per full group of `accum` batches, plus one for a trailing
/// partial group.
fn optimizer_steps_per_epoch(samples: usize, batch_size: usize, accum: usize) -> usize {
    samples.div_ceil(batch_size.max(1)).div_ceil(accum.max(1)).max(1)
}

/// Mutable bookkeeping of one run.
struct Progress<B: Backend> {
    state:      TrainerState,
    best_model: Option<ReModel<B>>,
    best_step:  Option<usize>,
    last_eval:  Option<(f64, EvalMetrics)>,
    loss_sum:   f64,
    loss_count: usize,
}

fn train_loop<B: AutodiffBackend>(
    cfg:          &TrainConfig,
    inputs:       TrainInputs,
    ckpt_manager: CheckpointManager,
    mut run_log:  RunLogger,
    device:       B::Device,
) -> Result<TrainSummary> {
    let TrainInputs { train, valid, tokenizer, codec, seed } = inputs;
    B::seed(seed.seed());

    let selection: SelectionMetric = cfg.metric_for_best_model.parse()?;
    let num_classes = codec.len();
    let no_relation = codec.no_relation_index();

    // ── Build model ───────────────────────────────────────────────────────────
    let (model_cfg, mut model) = build_model::<B>(cfg, &tokenizer, &device)?;
    tracing::info!(
        "Model ready: {} layers, d_model={}, hidden_emb_no={}, {} labels",
        model_cfg.encoder.num_layers, model_cfg.encoder.d_model,
        model.hidden_emb_no, model_cfg.num_labels
    );

    // ── AdamW optimiser ───────────────────────────────────────────────────────
    let mut optim_cfg = AdamWConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(cfg.weight_decay as f32);
    if cfg.max_grad_norm > 0.0 {
        optim_cfg = optim_cfg.with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.max_grad_norm as f32)));
    }
    let mut optim = optim_cfg.init::<B, ReModel<B>>();

    // ── Step arithmetic ───────────────────────────────────────────────────────
    let batch_size      = cfg.per_device_train_batch_size.max(1);
    let accum           = cfg.gradient_accumulation_steps.max(1);
    let steps_per_epoch = optimizer_steps_per_epoch(train.sample_count(), batch_size, accum);
    let max_steps       = steps_per_epoch * cfg.num_train_epochs;
    let warmup = LrScheduler::resolve_warmup(cfg.warmup_steps, cfg.warmup_ratio, max_steps);
    let mut scheduler = LrScheduler::new(cfg.learning_rate, warmup, max_steps, cfg.lr_scheduler_type);
    tracing::info!(
        "{} train / {} valid samples, {} steps per epoch, {} total, warmup {}",
        train.sample_count(), valid.sample_count(), steps_per_epoch, max_steps, warmup
    );

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_loader = DataLoaderBuilder::new(RelationBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .shuffle(seed.shuffle_seed())
        .num_workers(cfg.dataloader_num_workers.max(1))
        .build(train);

    // Validation runs on the inner backend — no autodiff overhead
    let valid_loader = eval_loader::<B::InnerBackend>(
        valid,
        cfg.per_device_eval_batch_size.max(1),
        cfg.dataloader_num_workers.max(1),
        device.clone(),
    );

    let mut progress: Progress<B::InnerBackend> = Progress {
        state:      TrainerState::default(),
        best_model: None,
        best_step:  None,
        last_eval:  None,
        loss_sum:   0.0,
        loss_count: 0,
    };

    let saves_at = |step: usize| cfg.save_steps > 0 && step % cfg.save_steps == 0;

    // Evaluate, log, and track the best model.
    let evaluate = |model: &ReModel<B>, progress: &mut Progress<B::InnerBackend>, run_log: &mut RunLogger| -> Result<()> {
        let model_valid = model.valid();
        let preds = predict(&model_valid, &valid_loader, num_classes)?;
        let metrics = compute_metrics(&preds.logits, &preds.labels, num_classes, no_relation)?;

        let step  = progress.state.global_step;
        let epoch = progress.state.epoch;
        let record = LogRecord::eval(step, epoch, preds.loss, &metrics);
        run_log.log(&record)?;
        progress.state.log_history.push(record);

        tracing::info!(
            "eval @ step {} | eval_loss={:.4} | micro_f1={:.2} | auprc={:.2} | accuracy={:.4}",
            step, preds.loss, metrics.micro_f1, metrics.auprc, metrics.accuracy
        );

        let value = selection.value(&metrics, preds.loss);
        if selection.improves(value, progress.state.best_metric) {
            tracing::info!("New best {} = {:.4} at step {}", cfg.metric_for_best_model, value, step);
            progress.state.best_metric = Some(value);
            // Only a step that gets saved has a directory to point at
            progress.state.best_model_checkpoint =
                saves_at(step).then(|| ckpt_manager.checkpoint_dir(step));
            progress.best_step  = Some(step);
            progress.best_model = Some(model_valid);
        }
        progress.last_eval = Some((preds.loss, metrics));
        Ok(())
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.num_train_epochs {
        let mut accumulator = GradientsAccumulator::<ReModel<B>>::new();
        let mut pending     = 0usize;
        let mut epoch_loss  = 0.0f64;
        let mut epoch_batches = 0usize;

        let mut batches = train_loader.iter().peekable();
        while let Some(batch) = batches.next() {
            let (loss, _) = model.forward_loss(
                batch.input_ids,
                batch.token_type_ids,
                batch.attention_mask,
                batch.labels,
            );

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            epoch_loss        += loss_val;
            epoch_batches     += 1;
            progress.loss_sum   += loss_val;
            progress.loss_count += 1;

            let grads = loss.div_scalar(accum as f64).backward();
            accumulator.accumulate(&model, GradientsParams::from_grads(grads, &model));
            pending += 1;

            // A trailing partial group still gets its step at epoch end
            if pending < accum && batches.peek().is_some() {
                continue;
            }
            pending = 0;

            // ── Optimiser step ────────────────────────────────────────────────
            let lr = scheduler.current_lr();
            model = optim.step(lr, model, accumulator.grads());
            scheduler.advance();

            progress.state.global_step += 1;
            let step = progress.state.global_step;
            progress.state.epoch = step as f64 / steps_per_epoch as f64;

            if cfg.logging_steps > 0 && step % cfg.logging_steps == 0 && progress.loss_count > 0 {
                let mean = progress.loss_sum / progress.loss_count as f64;
                let record = LogRecord::train(step, progress.state.epoch, mean, lr);
                run_log.log(&record)?;
                progress.state.log_history.push(record);
                tracing::info!("step {} | loss={:.4} | lr={:.3e}", step, mean, lr);
                progress.loss_sum   = 0.0;
                progress.loss_count = 0;
            }

            if cfg.evaluation_strategy == EvalStrategy::Steps
                && cfg.eval_steps > 0
                && step % cfg.eval_steps == 0
            {
                evaluate(&model, &mut progress, &mut run_log)?;
            }

            if saves_at(step) {
                ckpt_manager.save_checkpoint(&model, &progress.state)?;
                ckpt_manager.rotate(progress.best_step)?;
            }
        }

        if cfg.evaluation_strategy == EvalStrategy::Epoch {
            evaluate(&model, &mut progress, &mut run_log)?;
        }

        let avg_train_loss = if epoch_batches > 0 {
            epoch_loss / epoch_batches as f64
        } else { f64::NAN };

        match progress.last_eval {
            Some((eval_loss, m)) => println!(
                "Epoch {:>3}/{} | step {} | train_loss={:.4} | eval_loss={:.4} | micro_f1={:.2} | auprc={:.2}",
                epoch, cfg.num_train_epochs, progress.state.global_step,
                avg_train_loss, eval_loss, m.micro_f1, m.auprc,
            ),
            None => println!(
                "Epoch {:>3}/{} | step {} | train_loss={:.4}",
                epoch, cfg.num_train_epochs, progress.state.global_step, avg_train_loss,
            ),
        }
    }

    // ── Final model ───────────────────────────────────────────────────────────
    let summary = TrainSummary {
        global_step: progress.state.global_step,
        steps_per_epoch,
        best_metric: progress.state.best_metric,
        best_step:   progress.best_step,
        last_eval:   progress.last_eval,
    };

    let final_model = match progress.best_model {
        Some(best) if cfg.load_best_model_at_end => {
            tracing::info!(
                "Loading best model from step {} ({} = {:.4})",
                progress.best_step.unwrap_or_default(),
                cfg.metric_for_best_model,
                progress.state.best_metric.unwrap_or(f64::NAN)
            );
            best
        }
        _ => model.valid(),
    };

    PretrainedDir::new(&cfg.save_pretrained)
        .save(&final_model, &model_cfg, &tokenizer, &codec, cfg)
        .with_context(|| format!("Cannot save model to '{}'", cfg.save_pretrained.display()))?;

    tracing::info!("Training complete!");
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{dataset::RelationSample, marker::EntityMarking};
    use crate::infra::{
        checkpoint::TRAINER_STATE_FILE,
        metrics::{ReportTarget, RunKey},
        tokenizer_store::TokenizerStore,
    };

    type B = Autodiff<NdArray>;

    fn sample(label: usize) -> RelationSample {
        RelationSample {
            input_ids:      vec![2, 5 + (label % 4) as u32, 3, 0, 0, 0, 0, 0],
            token_type_ids: vec![0; 8],
            attention_mask: vec![1, 1, 1, 0, 0, 0, 0, 0],
            label,
        }
    }

    fn tiny_config(root: &std::path::Path) -> TrainConfig {
        TrainConfig {
            model_name:                  root.join("no_model"),
            output_dir:                  root.join("results"),
            logging_dir:                 root.join("logs"),
            save_pretrained:             root.join("best_model"),
            num_train_epochs:            2,
            per_device_train_batch_size: 2,
            per_device_eval_batch_size:  4,
            gradient_accumulation_steps: 2,
            warmup_steps:                1,
            logging_steps:               1,
            eval_steps:                  2,
            save_steps:                  1,
            save_total_limit:            2,
            max_seq_len:                 8,
            d_model:                     8,
            num_heads:                   2,
            num_layers:                  1,
            d_ff:                        16,
            special_entity_type:         EntityMarking::Baseline,
            device:                      DeviceKind::Cpu,
            fp16:                        false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_train_loop_end_to_end_on_cpu() {
        let root = tempfile::tempdir().unwrap();
        let cfg  = tiny_config(root.path());

        let store = TokenizerStore::new(root.path().join("tok"));
        let tokenizer = store.build_and_save(&["a b c d".to_string()], 50).unwrap();

        // 7 samples, batch 2 → 4 batches → 2 steps per epoch
        let train = RelationDataset::new((0..7).map(sample).collect());
        let valid = RelationDataset::new((0..4).map(sample).collect());
        let inputs = TrainInputs {
            train, valid, tokenizer,
            codec: LabelCodec::klue(),
            seed:  SeedContext::new(cfg.seed),
        };

        let ckpt = CheckpointManager::new(&cfg.output_dir, Some(cfg.save_total_limit)).unwrap();
        let key  = RunKey { project: "p".into(), entity: "e".into(), run: "r".into() };
        let log  = RunLogger::new(&cfg.logging_dir, key, ReportTarget::Csv).unwrap();

        let summary = train_loop::<B>(&cfg, inputs, ckpt, log, Default::default()).unwrap();

        assert_eq!(summary.steps_per_epoch, 2);
        assert_eq!(summary.global_step, 4);
        assert!(summary.best_step.is_some());
        assert!(summary.last_eval.is_some());

        let kept = CheckpointManager::new(&cfg.output_dir, None).unwrap().list_checkpoints().unwrap();
        assert!(kept.len() <= 3);
        assert!(kept.contains(&4));

        for file in ["config.json", "model.json", "model.mpk", "encoder.mpk", "tokenizer.json",
                     "dict_label_to_num.json", "train_config.json"] {
            assert!(cfg.save_pretrained.join(file).exists(), "missing {file}");
        }
        assert!(cfg.logging_dir.join("p/r/metrics.csv").exists());
    }

    #[test]
    fn test_unknown_selection_metric_fails_before_training() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(root.path());
        cfg.metric_for_best_model = "eval_f2".into();

        let store = TokenizerStore::new(root.path().join("tok"));
        let tokenizer = store.build_and_save(&["a".to_string()], 10).unwrap();
        let inputs = TrainInputs {
            train: RelationDataset::new(vec![sample(0)]),
            valid: RelationDataset::new(vec![sample(0)]),
            tokenizer,
            codec: LabelCodec::klue(),
            seed:  SeedContext::new(cfg.seed),
        };
        let ckpt = CheckpointManager::new(&cfg.output_dir, None).unwrap();
        let key  = RunKey { project: "p".into(), entity: "e".into(), run: "r".into() };
        let log  = RunLogger::new(&cfg.logging_dir, key, ReportTarget::None).unwrap();

        assert!(train_loop::<B>(&cfg, inputs, ckpt, log, Default::default()).is_err());
        assert!(!cfg.save_pretrained.exists());
    }

    #[test]
    fn test_steps_per_epoch_counts_partial_group() {
        assert_eq!(optimizer_steps_per_epoch(8, 2, 2), 2);
        assert_eq!(optimizer_steps_per_epoch(9, 2, 2), 3);
        assert_eq!(optimizer_steps_per_epoch(9, 2, 1), 5);
        assert_eq!(optimizer_steps_per_epoch(0, 2, 4), 1);
    }

    #[test]
    fn test_trailing_partial_group_gets_a_step_and_best_path_exists() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(root.path());
        cfg.num_train_epochs = 2;
        cfg.eval_steps       = 1;
        cfg.save_steps       = 2;
        cfg.save_total_limit = 0;

        let store = TokenizerStore::new(root.path().join("tok"));
        let tokenizer = store.build_and_save(&["a b c d".to_string()], 50).unwrap();

        // 9 samples, batch 2 → 5 batches; accumulation 2 → 2 full groups + 1 partial
        let train = RelationDataset::new((0..9).map(sample).collect());
        let valid = RelationDataset::new((0..4).map(sample).collect());
        let inputs = TrainInputs {
            train, valid, tokenizer,
            codec: LabelCodec::klue(),
            seed:  SeedContext::new(cfg.seed),
        };

        let ckpt = CheckpointManager::new(&cfg.output_dir, None).unwrap();
        let key  = RunKey { project: "p".into(), entity: "e".into(), run: "r".into() };
        let log  = RunLogger::new(&cfg.logging_dir, key, ReportTarget::None).unwrap();

        let summary = train_loop::<B>(&cfg, inputs, ckpt, log, Default::default()).unwrap();
        assert_eq!(summary.steps_per_epoch, 3);
        assert_eq!(summary.global_step, 6);

        // Evaluations run on odd steps too; saved state only names saved steps
        let manager = CheckpointManager::new(&cfg.output_dir, None).unwrap();
        let steps   = manager.list_checkpoints().unwrap();
        assert_eq!(steps, vec![2, 4, 6]);
        for step in steps {
            let text  = std::fs::read_to_string(manager.checkpoint_dir(step).join(TRAINER_STATE_FILE)).unwrap();
            let state: TrainerState = serde_json::from_str(&text).unwrap();
            if let Some(best) = state.best_model_checkpoint {
                assert!(best.exists(), "{} does not exist", best.display());
            }
        }
    }
}
