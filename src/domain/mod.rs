// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of relation extraction:
//
//   - A relation record: a sentence with a subject entity,
//     an object entity, and the relation label between them
//   - The label codec: the fixed label set and its indices
//   - The seeding context threaded through a run
//   - The data-pipeline contract other layers implement
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O except loading the label mapping artifact
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Typed errors shared by the domain and data layers
pub mod error;

// The relation label set and its index mapping
pub mod label;

// Sentence + entity pair records
pub mod relation;

// Explicit seeding context for reproducible runs
pub mod seed;

// Core abstractions (traits / function contracts)
pub mod traits;
