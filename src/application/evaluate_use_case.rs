// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores a saved model on a labelled file:
//
//   1. Read train_config.json, label map and tokenizer from the
//      pretrained directory
//   2. Rebuild the same data pipeline the model was trained with
//   3. Predict every record (one worker, so rows keep file order)
//   4. Compute micro F1 / AUPRC / accuracy
//   5. Optionally write id,pred_label,probs rows to a CSV

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::data::registry;
use crate::domain::{label::LabelCodec, relation::RelationRecord};
use crate::infra::checkpoint::PretrainedDir;
use crate::ml::{
    metrics::{compute_metrics, EvalMetrics},
    predictor::{predict_pretrained, Predictions},
    trainer::DeviceKind,
};

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub model_dir:  PathBuf,
    pub data:       PathBuf,
    pub output:     Option<PathBuf>,
    pub batch_size: usize,
    pub device:     DeviceKind,
}

/// Result of one evaluation run.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub examples:  usize,
    pub eval_loss: f64,
    pub metrics:   EvalMetrics,
}

#[derive(Serialize)]
struct PredictionRow<'a> {
    id:         &'a str,
    pred_label: &'a str,
    probs:      String,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<EvalReport> {
        let cfg = &self.config;
        let pretrained = PretrainedDir::new(cfg.model_dir.clone());

        // ── Step 1: Artefacts of the training run ────────────────────────────
        let train_cfg = pretrained.load_config()?;
        let codec = LabelCodec::from_file(pretrained.label_map_path())
            .with_context(|| format!("Cannot load label map from '{}'", cfg.model_dir.display()))?;
        let tokenizer = pretrained.tokenizer_store().load()?;

        // ── Step 2: Same pipeline as training ────────────────────────────────
        let pipeline = registry::resolve(&train_cfg.pipeline_names())?;
        let records  = (pipeline.load)(&cfg.data)?;
        tracing::info!("Loaded {} records from '{}'", records.len(), cfg.data.display());

        let labels   = codec.encode(&records.iter().map(|r| r.label.as_str()).collect::<Vec<_>>())?;
        let features = (pipeline.tokenize)(&records, &tokenizer, &train_cfg.tokenize_options())?;
        let dataset  = (pipeline.build_dataset)(features, labels)?;

        // ── Step 3: Predict ──────────────────────────────────────────────────
        let preds = predict_pretrained(&pretrained, dataset, cfg.batch_size, 1, cfg.device)?;

        // ── Step 4: Metrics ──────────────────────────────────────────────────
        let metrics = compute_metrics(
            &preds.logits, &preds.labels, codec.len(), codec.no_relation_index(),
        )?;

        // ── Step 5: Prediction file ──────────────────────────────────────────
        if let Some(path) = &cfg.output {
            write_predictions(path, &records, &preds, &codec)?;
            tracing::info!("Wrote {} predictions to '{}'", preds.len(), path.display());
        }

        Ok(EvalReport { examples: preds.len(), eval_loss: preds.loss, metrics })
    }
}

/// `probs` is the softmax row formatted as a bracketed list.
fn write_predictions(
    path:    &Path,
    records: &[RelationRecord],
    preds:   &Predictions,
    codec:   &LabelCodec,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;

    for (i, record) in records.iter().enumerate().take(preds.len()) {
        let row = preds.probs_row(i);
        let best = row
            .iter()
            .enumerate()
            .fold(0, |best, (j, &p)| if p > row[best] { j } else { best });
        let probs = row
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writer.serialize(PredictionRow {
            id:         &record.id,
            pred_label: codec.label_of(best)?,
            probs:      format!("[{probs}]"),
        })?;
    }
    writer.flush()?;
    Ok(())
}
