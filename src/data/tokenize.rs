// ============================================================
// Layer 4 — Relation Tokenisation
// ============================================================
// Turns marked records into fixed-length token id sequences.
//
// Pair layout (clue + sentence), BERT convention:
//
//   [CLS] clue tokens [SEP] sentence tokens [SEP] [PAD] ...
//   type:  0 ... 0      0     1 ...  1        1     0  ...
//   mask:  1 ... 1      1     1 ...  1        1     0  ...
//
// Single layout (sentence only):
//
//   [CLS] sentence tokens [SEP] [PAD] ...
//
// When the pair is longer than max_seq_len, tokens are dropped
// from the end of the LONGER segment first (longest-first),
// the sentence losing ties.
//
// Reference: Devlin et al. (2019) BERT paper
//            tokenizers crate documentation

use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::{
    marker::{ClueType, EntityMarking},
    preprocessor::Preprocessor,
};
use crate::domain::{error::DataError, relation::RelationRecord};

/// One tokenised example, padded to `max_seq_len`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedRelation {
    pub input_ids:      Vec<u32>,
    pub token_type_ids: Vec<u32>,
    /// 1 = real token, 0 = padding
    pub attention_mask: Vec<u32>,
}

/// Knobs that shape how a record becomes token ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizeOptions {
    pub marking:     EntityMarking,
    pub clue:        ClueType,
    pub max_seq_len: usize,
    /// Run the sentence cleaner after marking
    pub preprocess:  bool,
}

/// Ids of the structural tokens, looked up in the tokenizer vocabulary.
#[derive(Debug, Clone)]
pub struct SpecialIds {
    pub cls:       u32,
    pub sep:       u32,
    pub pad:       u32,
    pub sep_token: String,
}

impl SpecialIds {
    /// BERT names first, RoBERTa names as fallback.
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self, DataError> {
        let find = |names: &[&str]| -> Result<(u32, String), DataError> {
            names
                .iter()
                .find_map(|n| tokenizer.token_to_id(n).map(|id| (id, n.to_string())))
                .ok_or_else(|| {
                    DataError::Tokenizer(format!("vocabulary has none of {names:?}"))
                })
        };
        let (cls, _)         = find(&["[CLS]", "<s>"])?;
        let (sep, sep_token) = find(&["[SEP]", "</s>"])?;
        let (pad, _)         = find(&["[PAD]", "<pad>"])?;
        Ok(Self { cls, sep, pad, sep_token })
    }
}

fn encode_text(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>, DataError> {
    tokenizer
        .encode(text, false)
        .map(|enc| enc.get_ids().to_vec())
        .map_err(|e| DataError::Tokenizer(format!("cannot encode '{text}': {e}")))
}

/// Drop tokens from the longer segment until both fit in `budget`.
fn truncate_longest_first(clue: &mut Vec<u32>, sentence: &mut Vec<u32>, budget: usize) {
    while clue.len() + sentence.len() > budget {
        if sentence.len() >= clue.len() {
            sentence.pop();
        } else {
            clue.pop();
        }
    }
}

/// Assemble `[CLS] first [SEP] (second [SEP])` and pad to `max_seq_len`.
fn assemble(
    ids:         &SpecialIds,
    first:       &[u32],
    second:      Option<&[u32]>,
    max_seq_len: usize,
) -> EncodedRelation {
    let mut input_ids      = Vec::with_capacity(max_seq_len);
    let mut token_type_ids = Vec::with_capacity(max_seq_len);

    input_ids.push(ids.cls);
    input_ids.extend_from_slice(first);
    input_ids.push(ids.sep);
    token_type_ids.resize(input_ids.len(), 0);

    if let Some(second) = second {
        input_ids.extend_from_slice(second);
        input_ids.push(ids.sep);
        token_type_ids.resize(input_ids.len(), 1);
    }

    let mut attention_mask = vec![1u32; input_ids.len()];

    input_ids.resize(max_seq_len, ids.pad);
    token_type_ids.resize(max_seq_len, 0);
    attention_mask.resize(max_seq_len, 0);

    EncodedRelation { input_ids, token_type_ids, attention_mask }
}

fn check_len(max_seq_len: usize, reserved: usize) -> Result<(), DataError> {
    if max_seq_len <= reserved {
        return Err(DataError::Tokenizer(format!(
            "max_seq_len {max_seq_len} leaves no room next to {reserved} structural tokens"
        )));
    }
    Ok(())
}

/// Marked sentence, cleaned when requested.
fn prepared_sentence(record: &RelationRecord, opts: &TokenizeOptions) -> String {
    let marked = opts.marking.mark_sentence(record);
    if opts.preprocess {
        Preprocessor::new().clean(&marked)
    } else {
        marked
    }
}

/// Registry entry `tokenized_dataset`: clue + sentence pairs.
pub fn tokenize_pairs(
    records:   &[RelationRecord],
    tokenizer: &Tokenizer,
    opts:      &TokenizeOptions,
) -> Result<Vec<EncodedRelation>, DataError> {
    check_len(opts.max_seq_len, 3)?;
    let ids = SpecialIds::from_tokenizer(tokenizer)?;

    let mut truncated = 0usize;
    let encoded = records
        .iter()
        .map(|record| {
            let (subject, object) = opts.marking.clue_entities(record);
            let clue_text         = opts.clue.frame(&subject, &object, &ids.sep_token);

            let mut clue     = encode_text(tokenizer, &clue_text)?;
            let mut sentence = encode_text(tokenizer, &prepared_sentence(record, opts))?;

            let budget = opts.max_seq_len - 3;
            if clue.len() + sentence.len() > budget {
                truncated += 1;
                truncate_longest_first(&mut clue, &mut sentence, budget);
            }
            Ok(assemble(&ids, &clue, Some(&sentence), opts.max_seq_len))
        })
        .collect::<Result<Vec<_>, DataError>>()?;

    if truncated > 0 {
        tracing::debug!("{} of {} examples truncated to {} tokens", truncated, records.len(), opts.max_seq_len);
    }
    Ok(encoded)
}

/// Registry entry `tokenized_sentence`: the marked sentence alone.
pub fn tokenize_sentences(
    records:   &[RelationRecord],
    tokenizer: &Tokenizer,
    opts:      &TokenizeOptions,
) -> Result<Vec<EncodedRelation>, DataError> {
    check_len(opts.max_seq_len, 2)?;
    let ids = SpecialIds::from_tokenizer(tokenizer)?;

    records
        .iter()
        .map(|record| {
            let mut sentence = encode_text(tokenizer, &prepared_sentence(record, opts))?;
            sentence.truncate(opts.max_seq_len - 2);
            Ok(assemble(&ids, &sentence, None, opts.max_seq_len))
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relation::EntitySpan;
    use crate::infra::tokenizer_store::TokenizerStore;

    fn fixture() -> (tempfile::TempDir, Tokenizer, RelationRecord) {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let texts = vec!["alice founded acme".to_string(), "관계는 무엇인가".to_string()];
        let tok   = store.build_and_save(&texts, 100).unwrap();
        let record = RelationRecord {
            id:       "0".into(),
            sentence: "alice founded acme".into(),
            subject:  EntitySpan::new("acme", 14, 17, "ORG"),
            object:   EntitySpan::new("alice", 0, 4, "PER"),
            label:    "org:founded_by".into(),
            source:   String::new(),
        };
        (dir, tok, record)
    }

    fn opts(clue: ClueType, max_seq_len: usize) -> TokenizeOptions {
        TokenizeOptions { marking: EntityMarking::Baseline, clue, max_seq_len, preprocess: false }
    }

    #[test]
    fn test_pair_layout() {
        let (_dir, tok, record) = fixture();
        let ids = SpecialIds::from_tokenizer(&tok).unwrap();
        let out = tokenize_pairs(&[record], &tok, &opts(ClueType::Entity, 16)).unwrap();
        let e   = &out[0];

        // [CLS] acme [SEP] alice [SEP] alice founded acme [SEP] [PAD]...
        assert_eq!(e.input_ids.len(), 16);
        assert_eq!(e.input_ids[0], ids.cls);
        assert_eq!(e.input_ids[2], ids.sep);
        assert_eq!(e.input_ids[4], ids.sep);
        assert_eq!(e.input_ids[8], ids.sep);
        assert_eq!(&e.token_type_ids[..9], &[0, 0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(e.attention_mask.iter().sum::<u32>(), 9);
        assert_eq!(e.input_ids[9], ids.pad);
    }

    #[test]
    fn test_pair_truncation_respects_max_len() {
        let (_dir, tok, record) = fixture();
        let out = tokenize_pairs(&[record], &tok, &opts(ClueType::Question, 6)).unwrap();
        assert_eq!(out[0].input_ids.len(), 6);
        assert_eq!(out[0].attention_mask, vec![1; 6]);
    }

    #[test]
    fn test_sentence_only_layout() {
        let (_dir, tok, record) = fixture();
        let ids = SpecialIds::from_tokenizer(&tok).unwrap();
        let out = tokenize_sentences(&[record], &tok, &opts(ClueType::Question, 8)).unwrap();
        assert_eq!(out[0].input_ids[0], ids.cls);
        assert_eq!(out[0].input_ids[4], ids.sep);
        assert!(out[0].token_type_ids.iter().all(|&t| t == 0));
    }

    #[test]
    fn test_too_short_max_len_is_an_error() {
        let (_dir, tok, record) = fixture();
        assert!(tokenize_pairs(&[record], &tok, &opts(ClueType::Entity, 3)).is_err());
    }

    #[test]
    fn test_truncate_longest_first() {
        let mut a = vec![1, 2, 3];
        let mut b = vec![4, 5, 6, 7, 8];
        truncate_longest_first(&mut a, &mut b, 4);
        assert_eq!(a, vec![1, 2]);
        assert_eq!(b, vec![4, 5]);
    }
}
