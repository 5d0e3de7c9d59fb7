// ============================================================
// Layer 6 — Run Log
// ============================================================
// Records training and evaluation rows for one run so learning
// curves can be plotted afterwards.
//
// A run is keyed by project / entity / run name and written to
//
//   {logging_dir}/{project}/{run_name}/metrics.csv    (--report-to csv)
//   {logging_dir}/{project}/{run_name}/metrics.jsonl  (--report-to jsonl)
//
// Example CSV output:
//   step,epoch,kind,train_loss,learning_rate,eval_loss,micro_f1,auprc,accuracy
//   100,0.5,train,2.913400,0.00001,,,,
//   500,2.5,eval,,,1.204100,41.2,38.9,0.71
//
// How to read the rows:
//   - train rows carry the mean loss since the previous train row
//   - eval rows carry eval_loss plus the three metrics
//   - micro_f1 and auprc are on a 0..100 scale, accuracy 0..1

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::ml::metrics::EvalMetrics;

/// Where run-log rows go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    None,
    Csv,
    Jsonl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Train,
    Eval,
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Optimiser steps taken so far
    pub step: usize,
    /// Fractional epoch (steps / steps per epoch)
    pub epoch: f64,
    pub kind: RecordKind,
    pub train_loss: Option<f64>,
    pub learning_rate: Option<f64>,
    pub eval_loss: Option<f64>,
    pub micro_f1: Option<f64>,
    pub auprc: Option<f64>,
    pub accuracy: Option<f64>,
}

impl LogRecord {
    pub fn train(step: usize, epoch: f64, loss: f64, lr: f64) -> Self {
        Self {
            step,
            epoch,
            kind: RecordKind::Train,
            train_loss: Some(loss),
            learning_rate: Some(lr),
            eval_loss: None,
            micro_f1: None,
            auprc: None,
            accuracy: None,
        }
    }

    pub fn eval(step: usize, epoch: f64, eval_loss: f64, metrics: &EvalMetrics) -> Self {
        Self {
            step,
            epoch,
            kind: RecordKind::Eval,
            train_loss: None,
            learning_rate: None,
            eval_loss: Some(eval_loss),
            micro_f1: Some(metrics.micro_f1),
            auprc: Some(metrics.auprc),
            accuracy: Some(metrics.accuracy),
        }
    }
}

/// Identifies a run in the log tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunKey {
    pub project: String,
    pub entity:  String,
    pub run:     String,
}

#[derive(Serialize)]
struct JsonlRow<'a> {
    project: &'a str,
    entity:  &'a str,
    run:     &'a str,
    #[serde(flatten)]
    record:  &'a LogRecord,
}

enum Sink {
    None,
    Csv(csv::Writer<File>),
    Jsonl(File),
}

/// Appends run-log rows to a per-run file.
pub struct RunLogger {
    key:  RunKey,
    path: Option<PathBuf>,
    sink: Sink,
}

impl RunLogger {
    /// Create the run directory and open a fresh log file.
    pub fn new(logging_dir: &Path, key: RunKey, target: ReportTarget) -> Result<Self> {
        let run_dir = logging_dir.join(&key.project).join(&key.run);

        let (path, sink) = match target {
            ReportTarget::None => (None, Sink::None),
            ReportTarget::Csv => {
                fs::create_dir_all(&run_dir)
                    .with_context(|| format!("Cannot create '{}'", run_dir.display()))?;
                let path = run_dir.join("metrics.csv");
                let writer = csv::Writer::from_path(&path)
                    .with_context(|| format!("Cannot create '{}'", path.display()))?;
                (Some(path), Sink::Csv(writer))
            }
            ReportTarget::Jsonl => {
                fs::create_dir_all(&run_dir)
                    .with_context(|| format!("Cannot create '{}'", run_dir.display()))?;
                let path = run_dir.join("metrics.jsonl");
                let file = File::create(&path)
                    .with_context(|| format!("Cannot create '{}'", path.display()))?;
                (Some(path), Sink::Jsonl(file))
            }
        };

        if let Some(p) = &path {
            tracing::info!(
                "Run log for {}/{}/{}: '{}'",
                key.entity, key.project, key.run, p.display()
            );
        }
        Ok(Self { key, path, sink })
    }

    pub fn log(&mut self, record: &LogRecord) -> Result<()> {
        match &mut self.sink {
            Sink::None => {}
            Sink::Csv(writer) => {
                writer.serialize(record)?;
                writer.flush()?;
            }
            Sink::Jsonl(file) => {
                let row = JsonlRow {
                    project: &self.key.project,
                    entity:  &self.key.entity,
                    run:     &self.key.run,
                    record,
                };
                writeln!(file, "{}", serde_json::to_string(&row)?)?;
            }
        }
        tracing::debug!("Logged {:?} row at step {}", record.kind, record.step);
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
