// ============================================================
// Layer 4 — Entity Marking and Clue Framing
// ============================================================
// Tells the encoder WHICH two entities the relation is about.
//
// Entity marking rewrites the sentence itself:
//
//   baseline      〈비틀즈〉 is unchanged
//   punct         @ * ORG * 비틀즈 @   ...   # ^ PER ^ 조지 해리슨 #
//   entity        [E1] 비틀즈 [/E1]    ...   [E2] 조지 해리슨 [/E2]
//   typed_entity  <S:ORG> 비틀즈 </S:ORG> ... <O:PER> 조지 해리슨 </O:PER>
//
// The clue is a second text segment placed before the sentence:
//
//   question      "비틀즈와 조지 해리슨의 관계는 무엇인가?"
//   entity        "비틀즈 [SEP] 조지 해리슨"
//
// Markers are inserted by character offset. The later span is
// rewritten first so the earlier span's offsets stay valid.
//
// Reference: Zhou & Chen (2021) An Improved Baseline for
//            Sentence-level Relation Extraction

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::relation::{EntitySpan, RelationRecord};

/// Entity types that occur in KLUE-RE.
pub const ENTITY_TYPES: [&str; 6] = ["PER", "ORG", "LOC", "DAT", "POH", "NOH"];

/// How entity mentions are marked inside the sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum EntityMarking {
    Baseline,
    Punct,
    Entity,
    TypedEntity,
}

/// How the clue segment frames the entity pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClueType {
    Question,
    Entity,
}

/// Which side of the relation an entity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Subject,
    Object,
}

impl EntityMarking {
    /// Marker tokens that must be registered with the tokenizer as
    /// special tokens so they are never split.
    pub fn special_tokens(&self) -> Vec<String> {
        match self {
            EntityMarking::Baseline | EntityMarking::Punct => Vec::new(),
            EntityMarking::Entity => ["[E1]", "[/E1]", "[E2]", "[/E2]"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            EntityMarking::TypedEntity => ENTITY_TYPES
                .iter()
                .flat_map(|t| {
                    [
                        format!("<S:{t}>"),
                        format!("</S:{t}>"),
                        format!("<O:{t}>"),
                        format!("</O:{t}>"),
                    ]
                })
                .collect(),
        }
    }

    /// The entity word wrapped in this style's markers.
    fn wrap(&self, entity: &EntitySpan, role: Role) -> String {
        let word = entity.word.as_str();
        let ty   = entity.entity_type.as_str();
        match (self, role) {
            (EntityMarking::Baseline, _)                => word.to_string(),
            (EntityMarking::Punct, Role::Subject)       => format!("@ * {ty} * {word} @"),
            (EntityMarking::Punct, Role::Object)        => format!("# ^ {ty} ^ {word} #"),
            (EntityMarking::Entity, Role::Subject)      => format!("[E1] {word} [/E1]"),
            (EntityMarking::Entity, Role::Object)       => format!("[E2] {word} [/E2]"),
            (EntityMarking::TypedEntity, Role::Subject) => format!("<S:{ty}> {word} </S:{ty}>"),
            (EntityMarking::TypedEntity, Role::Object)  => format!("<O:{ty}> {word} </O:{ty}>"),
        }
    }

    /// Rewrite the sentence with both entities marked.
    ///
    /// Reversed offsets, offsets outside the sentence or overlapping spans leave the
    /// sentence unmarked; the clue still names both entities.
    pub fn mark_sentence(&self, record: &RelationRecord) -> String {
        if *self == EntityMarking::Baseline {
            return record.sentence.clone();
        }

        let chars: Vec<char> = record.sentence.chars().collect();
        let (subj, obj) = (&record.subject, &record.object);

        let unusable = subj.validate().is_err()
            || obj.validate().is_err()
            || subj.overlaps(obj)
            || subj.end_idx >= chars.len()
            || obj.end_idx >= chars.len();
        if unusable {
            tracing::debug!(
                "Record {}: entity spans unusable for marking, sentence left as-is",
                record.id
            );
            return record.sentence.clone();
        }

        let mentioned: String = chars[subj.start_idx..=subj.end_idx].iter().collect();
        if mentioned != subj.word {
            tracing::trace!(
                "Record {}: subject offsets cover '{}' but word is '{}'",
                record.id, mentioned, subj.word
            );
        }

        // Rewrite right-to-left so earlier offsets stay valid
        let mut spans = [(subj, Role::Subject), (obj, Role::Object)];
        spans.sort_by(|a, b| b.0.start_idx.cmp(&a.0.start_idx));

        let mut out = chars;
        for (span, role) in spans {
            let marked: Vec<char> = self.wrap(span, role).chars().collect();
            out.splice(span.start_idx..=span.end_idx, marked);
        }
        out.into_iter().collect()
    }

    /// Subject and object words as they appear in the clue.
    pub fn clue_entities(&self, record: &RelationRecord) -> (String, String) {
        (
            self.wrap(&record.subject, Role::Subject),
            self.wrap(&record.object, Role::Object),
        )
    }
}

impl ClueType {
    /// Build the clue text. `sep` is the tokenizer's separator token,
    /// used by the entity-style clue.
    pub fn frame(&self, subject: &str, object: &str, sep: &str) -> String {
        match self {
            ClueType::Question => format!("{subject}와 {object}의 관계는 무엇인가?"),
            ClueType::Entity   => format!("{subject} {sep} {object}"),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RelationRecord {
        RelationRecord {
            id:       "0".into(),
            sentence: "Alice founded Acme.".into(),
            subject:  EntitySpan::new("Acme", 14, 17, "ORG"),
            object:   EntitySpan::new("Alice", 0, 4, "PER"),
            label:    "org:founded_by".into(),
            source:   String::new(),
        }
    }

    #[test]
    fn test_baseline_keeps_sentence() {
        assert_eq!(EntityMarking::Baseline.mark_sentence(&record()), "Alice founded Acme.");
    }

    #[test]
    fn test_typed_entity_marking() {
        assert_eq!(
            EntityMarking::TypedEntity.mark_sentence(&record()),
            "<O:PER> Alice </O:PER> founded <S:ORG> Acme </S:ORG>."
        );
    }

    #[test]
    fn test_punct_marking() {
        assert_eq!(
            EntityMarking::Punct.mark_sentence(&record()),
            "# ^ PER ^ Alice # founded @ * ORG * Acme @."
        );
    }

    #[test]
    fn test_entity_marking_handles_multibyte_text() {
        let r = RelationRecord {
            id:       "1".into(),
            sentence: "비틀즈가 부른 노래".into(),
            subject:  EntitySpan::new("비틀즈", 0, 2, "ORG"),
            object:   EntitySpan::new("노래", 8, 9, "POH"),
            label:    "org:product".into(),
            source:   String::new(),
        };
        assert_eq!(
            EntityMarking::Entity.mark_sentence(&r),
            "[E1] 비틀즈 [/E1]가 부른 [E2] 노래 [/E2]"
        );
    }

    #[test]
    fn test_overlapping_spans_leave_sentence_unmarked() {
        let mut r = record();
        r.object  = EntitySpan::new("Acm", 14, 16, "ORG");
        assert_eq!(EntityMarking::TypedEntity.mark_sentence(&r), r.sentence);
    }

    #[test]
    fn test_reversed_span_leaves_sentence_unmarked() {
        let mut r = record();
        r.subject = EntitySpan::new("Acme", 17, 14, "ORG");
        assert_eq!(EntityMarking::TypedEntity.mark_sentence(&r), r.sentence);
    }

    #[test]
    fn test_special_tokens() {
        assert!(EntityMarking::Punct.special_tokens().is_empty());
        assert_eq!(EntityMarking::Entity.special_tokens().len(), 4);
        let typed = EntityMarking::TypedEntity.special_tokens();
        assert_eq!(typed.len(), 24);
        assert!(typed.contains(&"</O:DAT>".to_string()));
    }

    #[test]
    fn test_clue_framing() {
        let (s, o) = EntityMarking::Baseline.clue_entities(&record());
        assert_eq!(ClueType::Question.frame(&s, &o, "[SEP]"), "Acme와 Alice의 관계는 무엇인가?");
        assert_eq!(ClueType::Entity.frame(&s, &o, "[SEP]"), "Acme [SEP] Alice");
    }
}
