// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// By programming against traits instead of concrete types,
// the application layer can swap where relation records come
// from without changing the training workflow:
//   - KlueCsvSource   → KLUE-RE CSV export
//   - JsonlSource     → one JSON record per line
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use crate::domain::{error::DataError, relation::RelationRecord};

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can load labelled relation records.
pub trait RecordSource {
    /// Load every record, in file order.
    fn load_all(&self) -> Result<Vec<RelationRecord>, DataError>;
}
