// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw relation records to device tensors.
//
//   CSV / JSONL file
//       │
//       ▼
//   loader          → RelationRecord (sentence + 2 entity spans)
//       │
//       ▼
//   splitter        → stratified train / validation partitions
//       │
//       ▼
//   marker          → entity markers in the sentence + clue text
//       │
//       ▼
//   preprocessor    → optional sentence cleaning
//       │
//       ▼
//   tokenize        → [CLS] clue [SEP] sentence [SEP] ids
//       │
//       ▼
//   dataset         → implements Burn's Dataset trait
//       │
//       ▼
//   batcher         → stacks samples into tensor batches
//
// registry picks the loader / tokenizer / dataset constructor
// for a run by name.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// KLUE CSV and JSON Lines record loaders
pub mod loader;

/// Entity marker styles and clue framing
pub mod marker;

/// Optional sentence cleaning
pub mod preprocessor;

/// Fixed-length tokenisation of relation records
pub mod tokenize;

/// Implements Burn's Dataset trait for relation samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Stratified shuffle split into train/validation sets
pub mod splitter;

/// Named, closed registry of data pipelines
pub mod registry;
