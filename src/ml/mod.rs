// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches Burn tensors, plus the pure metric
// engine that scores what the model predicts.
//
//   model.rs     — Transformer encoder + relation head
//                  • Token, position and segment embeddings
//                  • Multi-head self-attention with padding mask
//                  • Feed-forward networks (GELU activation)
//                  • [CLS] vectors of the last N layers → classifier
//
//   trainer.rs   — The training loop
//                  Gradient accumulation, AdamW with clipping,
//                  warmup schedule, periodic logging / evaluation /
//                  checkpointing, best-model selection
//
//   predictor.rs — Batched inference without autodiff
//
//   metrics.rs   — Micro F1 (no_relation excluded), AUPRC, accuracy
//
//   scheduler.rs — Learning-rate warmup and decay
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// Transformer encoder relation classifier
pub mod model;

/// Full training loop with evaluation and checkpointing
pub mod trainer;

/// Batched inference over a dataset
pub mod predictor;

/// Evaluation metrics
pub mod metrics;

/// Learning-rate schedule
pub mod scheduler;
