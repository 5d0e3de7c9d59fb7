// ============================================================
// Layer 3 — Relation Domain Types
// ============================================================
// One relation-extraction example: a sentence, the subject and
// object entities inside it, and the relation label.
//
// Example (KLUE-RE):
//   sentence: "〈Something〉는 조지 해리슨이 쓰고 비틀즈가 1969년 앨범
//              《Abbey Road》에 담은 노래다."
//   subject:  비틀즈     (ORG, chars 24..=26)
//   object:   조지 해리슨 (PER, chars 13..=18)
//   label:    no_relation
//
// Entity offsets are CHARACTER indices (not bytes), end inclusive.

use serde::{Deserialize, Serialize};

/// An entity mention inside a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub word: String,
    /// First character of the mention
    pub start_idx: usize,
    /// Last character of the mention (inclusive)
    pub end_idx: usize,
    /// Entity type: PER, ORG, LOC, DAT, POH or NOH
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl EntitySpan {
    pub fn new(
        word:        impl Into<String>,
        start_idx:   usize,
        end_idx:     usize,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            word: word.into(),
            start_idx,
            end_idx,
            entity_type: entity_type.into(),
        }
    }

    /// True if the two spans share at least one character.
    pub fn overlaps(&self, other: &EntitySpan) -> bool {
        self.start_idx <= other.end_idx && other.start_idx <= self.end_idx
    }

    /// `end_idx` may not come before `start_idx`.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.end_idx < self.start_idx {
            return Err("end_idx before start_idx");
        }
        Ok(())
    }
}

/// A raw labelled record as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id:       String,
    pub sentence: String,
    pub subject:  EntitySpan,
    pub object:   EntitySpan,
    /// Relation label string; inference files may carry a placeholder
    pub label:    String,
    #[serde(default)]
    pub source:   String,
}
