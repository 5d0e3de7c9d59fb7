// ============================================================
// Layer 5 — Predictor
// ============================================================
// Runs a model over a whole dataset without autodiff and brings
// the results back to the host:
//
//   logits  [N × num_labels] row-major f32  → metric engine
//   probs   [N × num_labels] softmax        → prediction CSV
//   labels  [N]                             → metric engine
//   loss    sample-weighted mean cross-entropy
//
// Shared by the trainer's evaluation cycle and the `evaluate`
// command.

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
    tensor::activation,
};
use std::sync::Arc;

use crate::data::{
    batcher::{RelationBatch, RelationBatcher},
    dataset::RelationDataset,
};
use crate::infra::checkpoint::PretrainedDir;
use crate::ml::{model::ReModel, trainer::DeviceKind};

/// Everything one inference pass produces, index-aligned by example.
#[derive(Debug, Clone, Default)]
pub struct Predictions {
    pub logits:      Vec<f32>,
    pub probs:       Vec<f32>,
    pub labels:      Vec<usize>,
    pub loss:        f64,
    pub num_classes: usize,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Probability row of example `i`.
    pub fn probs_row(&self, i: usize) -> &[f32] {
        &self.probs[i * self.num_classes..(i + 1) * self.num_classes]
    }
}

fn host_f32<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}

/// Build a sequential (unshuffled) loader over `dataset`.
pub fn eval_loader<B: Backend>(
    dataset:     RelationDataset,
    batch_size:  usize,
    num_workers: usize,
    device:      B::Device,
) -> Arc<dyn DataLoader<RelationBatch<B>>> {
    DataLoaderBuilder::new(RelationBatcher::<B>::new(device))
        .batch_size(batch_size)
        .num_workers(num_workers)
        .build(dataset)
}

/// Forward every batch of `loader` through `model`.
pub fn predict<B: Backend>(
    model:       &ReModel<B>,
    loader:      &Arc<dyn DataLoader<RelationBatch<B>>>,
    num_classes: usize,
) -> Result<Predictions> {
    let mut out = Predictions { num_classes, ..Default::default() };
    let mut loss_sum = 0.0f64;

    for batch in loader.iter() {
        let n = batch.label_ids.len();
        let (loss, logits) = model.forward_loss(
            batch.input_ids,
            batch.token_type_ids,
            batch.attention_mask,
            batch.labels,
        );
        loss_sum += loss.into_scalar().elem::<f64>() * n as f64;

        let probs = activation::softmax(logits.clone(), 1);
        out.logits.extend(host_f32(logits)?);
        out.probs.extend(host_f32(probs)?);
        out.labels.extend(batch.label_ids);
    }

    out.loss = if out.is_empty() { f64::NAN } else { loss_sum / out.len() as f64 };
    tracing::debug!("Predicted {} examples, loss={:.4}", out.len(), out.loss);
    Ok(out)
}

/// Load a saved model onto the requested device and predict `dataset`.
pub fn predict_pretrained(
    dir:         &PretrainedDir,
    dataset:     RelationDataset,
    batch_size:  usize,
    num_workers: usize,
    device:      DeviceKind,
) -> Result<Predictions> {
    match device {
        DeviceKind::Cpu => predict_on::<burn::backend::NdArray>(
            dir, dataset, batch_size, num_workers, burn::backend::ndarray::NdArrayDevice::Cpu,
        ),
        DeviceKind::Auto => predict_on::<burn::backend::Wgpu>(
            dir, dataset, batch_size, num_workers, burn::backend::wgpu::WgpuDevice::default(),
        ),
    }
}

fn predict_on<B: Backend>(
    dir:         &PretrainedDir,
    dataset:     RelationDataset,
    batch_size:  usize,
    num_workers: usize,
    device:      B::Device,
) -> Result<Predictions> {
    let (cfg, model) = dir.load_model::<B>(&device)?;
    tracing::info!(
        "Loaded model from '{}' ({} labels)", dir.path().display(), cfg.num_labels
    );
    let loader = eval_loader::<B>(dataset, batch_size.max(1), num_workers.max(1), device);
    predict(&model, &loader, cfg.num_labels)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::RelationSample;
    use crate::ml::model::{EncoderConfig, ReModelConfig};
    use burn::backend::NdArray;

    type B = NdArray;

    fn sample(label: usize) -> RelationSample {
        RelationSample {
            input_ids:      vec![2, 5 + label as u32, 3, 0],
            token_type_ids: vec![0, 0, 0, 0],
            attention_mask: vec![1, 1, 1, 0],
            label,
        }
    }

    #[test]
    fn test_predict_aligns_rows_with_labels() {
        let device = Default::default();
        let model: ReModel<B> =
            ReModelConfig::new(EncoderConfig::new(16, 8, 2, 8, 2, 1, 16, 0.0), 3, 1).init(&device);
        let dataset = RelationDataset::new((0..5).map(|i| sample(i % 3)).collect());
        let loader  = eval_loader::<B>(dataset, 2, 1, device);

        let preds = predict(&model, &loader, 3).unwrap();
        assert_eq!(preds.labels, vec![0, 1, 2, 0, 1]);
        assert_eq!(preds.logits.len(), 15);
        assert!(preds.loss.is_finite());
        let row_sum: f32 = preds.probs_row(4).iter().sum();
        assert!((row_sum - 1.0).abs() < 1e-5);
    }
}
