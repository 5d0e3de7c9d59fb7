// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the cross-cutting concerns that don't belong in any
// specific business layer:
//
//   checkpoint.rs      — checkpoint-{step}/ directories with
//                        rotation, and the pretrained directory
//                        layout (save_pretrained / from_pretrained)
//
//   tokenizer_store.rs — Tokenizer persistence
//                        Loads the model directory's tokenizer or
//                        builds a word-level one from the training
//                        sentences; registers entity marker tokens
//
//   metrics.rs         — Run log
//                        Train / eval rows per run as CSV or JSONL
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Checkpoints and pretrained model directories
pub mod checkpoint;

/// Tokenizer loading, building, and saving
pub mod tokenizer_store;

/// Per-run metrics log
pub mod metrics;
