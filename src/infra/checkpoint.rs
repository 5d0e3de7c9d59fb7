// ============================================================
// Layer 6 — Checkpoints and Pretrained Directories
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// During training, every save_steps optimiser steps:
//
//   results/
//     train_config.json          ← the run's full configuration
//     checkpoint-500/
//       model.mpk                ← all learned parameters
//       trainer_state.json       ← step, epoch, best metric, log history
//     checkpoint-1000/
//     ...
//
// Only the newest save_total_limit checkpoints are kept; the one
// holding the best model is never rotated out.
//
// A pretrained directory is what save_pretrained writes and what
// from_pretrained / evaluate read back:
//
//   best_model/
//     config.json                ← encoder architecture (Burn Config JSON)
//     encoder.mpk                ← encoder weights only
//     model.json                 ← encoder + head architecture
//     model.mpk                  ← full model weights
//     tokenizer.json             ← including registered marker tokens
//     dict_label_to_num.json     ← label map
//     train_config.json          ← pipeline options used at training time
//
// A directory holding only config.json (and optionally encoder.mpk
// and tokenizer.json) is a valid starting encoder for training.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::domain::label::LabelCodec;
use crate::infra::{metrics::LogRecord, tokenizer_store::TokenizerStore};
use crate::ml::model::{Encoder, EncoderConfig, ReModel, ReModelConfig};

pub const TRAIN_CONFIG_FILE:  &str = "train_config.json";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";
pub const LABEL_MAP_FILE:     &str = "dict_label_to_num.json";
const ENCODER_CONFIG_FILE:    &str = "config.json";
const ENCODER_WEIGHTS:        &str = "encoder";
const MODEL_CONFIG_FILE:      &str = "model.json";
const MODEL_WEIGHTS:          &str = "model";
const CHECKPOINT_PREFIX:      &str = "checkpoint-";

/// Progress written next to every checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainerState {
    pub global_step:           usize,
    pub epoch:                 f64,
    pub best_metric:           Option<f64>,
    pub best_model_checkpoint: Option<PathBuf>,
    pub log_history:           Vec<LogRecord>,
}

/// Writes and rotates `checkpoint-{step}` directories under the output dir.
pub struct CheckpointManager {
    dir:              PathBuf,
    save_total_limit: Option<usize>,
}

impl CheckpointManager {
    /// Creates the output directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>, save_total_limit: Option<usize>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output dir '{}'", dir.display()))?;
        Ok(Self { dir, save_total_limit })
    }

    pub fn checkpoint_dir(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Save model weights and trainer state for `state.global_step`.
    pub fn save_checkpoint<B: Backend>(
        &self,
        model: &ReModel<B>,
        state: &TrainerState,
    ) -> Result<PathBuf> {
        let ckpt = self.checkpoint_dir(state.global_step);
        fs::create_dir_all(&ckpt)
            .with_context(|| format!("Cannot create '{}'", ckpt.display()))?;

        // Recorder adds the .mpk extension
        let path = ckpt.join(MODEL_WEIGHTS);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        write_json(&ckpt.join(TRAINER_STATE_FILE), state)?;

        tracing::debug!("Saved checkpoint: step {}", state.global_step);
        Ok(ckpt)
    }

    /// Steps of every checkpoint currently on disk, ascending.
    pub fn list_checkpoints(&self) -> Result<Vec<usize>> {
        let mut steps = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot list '{}'", self.dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(step) = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok())
            {
                steps.push(step);
            }
        }
        steps.sort_unstable();
        Ok(steps)
    }

    /// Delete the oldest checkpoints beyond `save_total_limit`.
    pub fn rotate(&self, best_step: Option<usize>) -> Result<Vec<usize>> {
        let Some(limit) = self.save_total_limit else {
            return Ok(Vec::new());
        };
        let doomed = checkpoints_to_delete(&self.list_checkpoints()?, limit, best_step);
        for &step in &doomed {
            let path = self.checkpoint_dir(step);
            fs::remove_dir_all(&path)
                .with_context(|| format!("Cannot delete '{}'", path.display()))?;
            tracing::info!("Deleted older checkpoint '{}'", path.display());
        }
        Ok(doomed)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        write_json(&path, cfg)?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }
}

/// Which checkpoint steps to delete so at most `limit` remain.
/// The newest and the best checkpoint always survive, so the
/// result can leave `limit + 1` behind.
pub fn checkpoints_to_delete(steps: &[usize], limit: usize, best: Option<usize>) -> Vec<usize> {
    let mut sorted = steps.to_vec();
    sorted.sort_unstable();
    let latest = sorted.last().copied();

    let mut remaining = sorted.len();
    let mut doomed = Vec::new();
    for step in sorted {
        if remaining <= limit.max(1) {
            break;
        }
        if Some(step) == best || Some(step) == latest {
            continue;
        }
        doomed.push(step);
        remaining -= 1;
    }
    doomed
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

/// A model directory in the layout `save_pretrained` produces.
pub struct PretrainedDir {
    dir: PathBuf,
}

impl PretrainedDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn tokenizer_store(&self) -> TokenizerStore {
        TokenizerStore::new(self.dir.clone())
    }

    pub fn label_map_path(&self) -> PathBuf {
        self.dir.join(LABEL_MAP_FILE)
    }

    /// Encoder architecture and weights, if this directory has them.
    /// A config without weights gives a freshly initialised encoder.
    pub fn load_encoder<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<Option<(EncoderConfig, Encoder<B>)>> {
        let cfg_path = self.dir.join(ENCODER_CONFIG_FILE);
        if !cfg_path.exists() {
            return Ok(None);
        }
        let cfg = EncoderConfig::load(&cfg_path)
            .map_err(|e| anyhow::anyhow!("Cannot read '{}': {}", cfg_path.display(), e))?;
        let encoder: Encoder<B> = cfg.init(device);

        let weights = self.dir.join(ENCODER_WEIGHTS);
        if !weights.with_extension("mpk").exists() {
            tracing::warn!(
                "'{}' has no encoder weights, starting from random initialisation",
                self.dir.display()
            );
            return Ok(Some((cfg, encoder)));
        }

        let record = CompactRecorder::new()
            .load(weights.clone(), device)
            .with_context(|| format!("Cannot load encoder weights '{}'", weights.display()))?;
        tracing::info!("Loaded pretrained encoder from '{}'", self.dir.display());
        Ok(Some((cfg, encoder.load_record(record))))
    }

    /// Rebuild a fine-tuned model from `model.json` + `model.mpk`.
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<(ReModelConfig, ReModel<B>)> {
        let cfg_path = self.dir.join(MODEL_CONFIG_FILE);
        let cfg = ReModelConfig::load(&cfg_path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot read '{}': {}. Is this a directory written by 'train'?",
                cfg_path.display(), e
            ))?;
        let model: ReModel<B> = cfg.init(device);

        let weights = self.dir.join(MODEL_WEIGHTS);
        let record = CompactRecorder::new()
            .load(weights.clone(), device)
            .with_context(|| format!("Cannot load model weights '{}'", weights.display()))?;
        Ok((cfg, model.load_record(record)))
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write everything needed to reload the model for evaluation or
    /// to start another fine-tuning run from its encoder.
    pub fn save<B: Backend>(
        &self,
        model:     &ReModel<B>,
        model_cfg: &ReModelConfig,
        tokenizer: &Tokenizer,
        codec:     &LabelCodec,
        train_cfg: &TrainConfig,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        model_cfg.encoder
            .save(self.dir.join(ENCODER_CONFIG_FILE))
            .with_context(|| "Cannot write encoder config")?;
        model_cfg
            .save(self.dir.join(MODEL_CONFIG_FILE))
            .with_context(|| "Cannot write model config")?;

        let recorder = CompactRecorder::new();
        recorder
            .record(model.encoder.clone().into_record(), self.dir.join(ENCODER_WEIGHTS))
            .with_context(|| "Cannot write encoder weights")?;
        recorder
            .record(model.clone().into_record(), self.dir.join(MODEL_WEIGHTS))
            .with_context(|| "Cannot write model weights")?;

        self.tokenizer_store().save(tokenizer)?;
        codec.save(&self.label_map_path())?;
        write_json(&self.dir.join(TRAIN_CONFIG_FILE), train_cfg)?;

        tracing::info!("Saved pretrained model to '{}'", self.dir.display());
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tiny_model_config() -> ReModelConfig {
        ReModelConfig::new(EncoderConfig::new(20, 8, 2, 8, 2, 1, 16, 0.0), 3, 2)
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let steps = [100, 200, 300, 400, 500];
        assert_eq!(checkpoints_to_delete(&steps, 3, None), vec![100, 200]);
        assert!(checkpoints_to_delete(&steps, 5, None).is_empty());
    }

    #[test]
    fn test_rotation_never_deletes_best() {
        let steps = [100, 200, 300, 400, 500];
        assert_eq!(checkpoints_to_delete(&steps, 2, Some(100)), vec![200, 300, 400]);
        // limit 1 with an older best keeps best and newest
        assert_eq!(checkpoints_to_delete(&steps, 1, Some(300)), vec![100, 200, 400]);
    }

    #[test]
    fn test_save_checkpoint_and_rotate_on_disk() {
        let dir  = tempfile::tempdir().unwrap();
        let mgr  = CheckpointManager::new(dir.path(), Some(2)).unwrap();
        let device = Default::default();
        let model: ReModel<B> = tiny_model_config().init(&device);

        for step in [10, 20, 30] {
            let state = TrainerState { global_step: step, ..Default::default() };
            let ckpt = mgr.save_checkpoint(&model, &state).unwrap();
            assert!(ckpt.join("model.mpk").exists());
            assert!(ckpt.join(TRAINER_STATE_FILE).exists());
        }
        assert_eq!(mgr.list_checkpoints().unwrap(), vec![10, 20, 30]);

        let deleted = mgr.rotate(Some(10)).unwrap();
        assert_eq!(deleted, vec![20]);
        assert_eq!(mgr.list_checkpoints().unwrap(), vec![10, 30]);
    }

    #[test]
    fn test_missing_encoder_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let pre = PretrainedDir::new(dir.path());
        let device = Default::default();
        assert!(pre.load_encoder::<B>(&device).unwrap().is_none());
    }

    #[test]
    fn test_encoder_config_without_weights_initialises() {
        let dir = tempfile::tempdir().unwrap();
        tiny_model_config().encoder.save(dir.path().join("config.json")).unwrap();
        let pre = PretrainedDir::new(dir.path());
        let device = Default::default();
        let (cfg, encoder) = pre.load_encoder::<B>(&device).unwrap().unwrap();
        assert_eq!(cfg.num_layers, 1);
        assert_eq!(encoder.vocab_size(), 20);
    }
}
