// ============================================================
// Layer 4 — Record Loaders
// ============================================================
// Reads labelled relation records from disk.
//
// KLUE-RE CSV layout:
//
//   id,sentence,subject_entity,object_entity,label,source
//   0,"〈Something〉는 ...","{'word': '비틀즈', 'start_idx': 24,
//      'end_idx': 26, 'type': 'ORG'}","{'word': ...}",no_relation,wikipedia
//
// The entity columns are Python dict literals, not JSON, so
// they are parsed by hand. Words containing an apostrophe are
// written with double quotes instead: {'word': "Jack's", ...}
//
// The JSON Lines variant carries the same fields with real
// JSON objects for the entities.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::domain::{
    error::DataError,
    relation::{EntitySpan, RelationRecord},
    traits::RecordSource,
};

// ─── KLUE CSV ─────────────────────────────────────────────────────────────────

/// One CSV row before the entity columns are parsed.
#[derive(Debug, Deserialize)]
struct KlueRow {
    id:             String,
    sentence:       String,
    subject_entity: String,
    object_entity:  String,
    #[serde(default)]
    label:          String,
    #[serde(default)]
    source:         String,
}

/// Loads the KLUE-RE CSV export.
pub struct KlueCsvSource {
    path: PathBuf,
}

impl KlueCsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for KlueCsvSource {
    fn load_all(&self) -> Result<Vec<RelationRecord>, DataError> {
        let path_str = self.path.display().to_string();
        let csv_err  = |source| DataError::Csv { path: path_str.clone(), source };

        let mut reader = csv::Reader::from_path(&self.path).map_err(csv_err)?;

        let mut records = Vec::new();
        for row in reader.deserialize::<KlueRow>() {
            let row = row.map_err(csv_err)?;
            records.push(RelationRecord {
                id:       row.id,
                sentence: row.sentence,
                subject:  parse_entity(&row.subject_entity)?,
                object:   parse_entity(&row.object_entity)?,
                label:    row.label,
                source:   row.source,
            });
        }

        tracing::info!("Loaded {} records from '{}'", records.len(), path_str);
        Ok(records)
    }
}

/// Parse a Python dict literal such as
/// `{'word': '비틀즈', 'start_idx': 24, 'end_idx': 26, 'type': 'ORG'}`.
pub fn parse_entity(raw: &str) -> Result<EntitySpan, DataError> {
    let malformed = |reason: &str| DataError::MalformedEntity {
        raw:    raw.to_string(),
        reason: reason.to_string(),
    };

    let body = raw
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| malformed("expected a {...} literal"))?;

    let word        = string_field(body, "word").ok_or_else(|| malformed("missing 'word'"))?;
    let start_idx   = int_field(body, "start_idx").ok_or_else(|| malformed("missing 'start_idx'"))?;
    let end_idx     = int_field(body, "end_idx").ok_or_else(|| malformed("missing 'end_idx'"))?;
    let entity_type = string_field(body, "type").ok_or_else(|| malformed("missing 'type'"))?;

    let span = EntitySpan::new(word, start_idx, end_idx, entity_type);
    span.validate().map_err(malformed)?;
    Ok(span)
}

/// Text right after `'key':`, with leading whitespace removed.
fn field_value<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let pos    = body.find(&needle)?;
    Some(body[pos + needle.len()..].trim_start())
}

/// A quoted string value. The closing quote is the first one that is
/// followed by a comma or by the end of the literal.
fn string_field(body: &str, key: &str) -> Option<String> {
    let rest  = field_value(body, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = &rest[quote.len_utf8()..];

    for (i, c) in inner.char_indices() {
        if c != quote {
            continue;
        }
        let after = inner[i + c.len_utf8()..].trim_start();
        if after.is_empty() || after.starts_with(',') {
            return Some(inner[..i].to_string());
        }
    }
    None
}

fn int_field(body: &str, key: &str) -> Option<usize> {
    let rest   = field_value(body, key)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// ─── JSON Lines ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonlRow {
    #[serde(deserialize_with = "id_as_string")]
    id:             String,
    sentence:       String,
    subject_entity: EntitySpan,
    object_entity:  EntitySpan,
    #[serde(default)]
    label:          String,
    #[serde(default)]
    source:         String,
}

/// Accept both `"id": 12` and `"id": "12"`.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Loads one JSON record per line. Blank lines are skipped.
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonlSource {
    fn load_all(&self) -> Result<Vec<RelationRecord>, DataError> {
        let path_str = self.path.display().to_string();
        let file = File::open(&self.path).map_err(|source| DataError::Io {
            path: path_str.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| DataError::Io { path: path_str.clone(), source })?;
            if line.trim().is_empty() {
                continue;
            }
            let row: JsonlRow = serde_json::from_str(&line).map_err(|source| DataError::Json {
                path: path_str.clone(),
                line: n + 1,
                source,
            })?;
            for span in [&row.subject_entity, &row.object_entity] {
                span.validate().map_err(|reason| DataError::MalformedEntity {
                    raw:    format!("line {}: {}", n + 1, line.trim()),
                    reason: reason.to_string(),
                })?;
            }
            records.push(RelationRecord {
                id:       row.id,
                sentence: row.sentence,
                subject:  row.subject_entity,
                object:   row.object_entity,
                label:    row.label,
                source:   row.source,
            });
        }

        tracing::info!("Loaded {} records from '{}'", records.len(), path_str);
        Ok(records)
    }
}

/// Registry entry: KLUE CSV loader.
pub fn load_klue_csv(path: &Path) -> Result<Vec<RelationRecord>, DataError> {
    KlueCsvSource::new(path).load_all()
}

/// Registry entry: JSON Lines loader.
pub fn load_jsonl(path: &Path) -> Result<Vec<RelationRecord>, DataError> {
    JsonlSource::new(path).load_all()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_klue_entity() {
        let e = parse_entity("{'word': '비틀즈', 'start_idx': 24, 'end_idx': 26, 'type': 'ORG'}").unwrap();
        assert_eq!(e, EntitySpan::new("비틀즈", 24, 26, "ORG"));
    }

    #[test]
    fn test_parse_entity_with_apostrophe() {
        let e = parse_entity("{'word': \"Jack's\", 'start_idx': 0, 'end_idx': 5, 'type': 'PER'}").unwrap();
        assert_eq!(e.word, "Jack's");
        assert_eq!(e.end_idx, 5);
    }

    #[test]
    fn test_parse_entity_with_comma_in_word() {
        let e = parse_entity("{'word': '1, 2', 'start_idx': 3, 'end_idx': 6, 'type': 'NOH'}").unwrap();
        assert_eq!(e.word, "1, 2");
    }

    #[test]
    fn test_malformed_entity() {
        assert!(matches!(
            parse_entity("'word': 'x'"),
            Err(DataError::MalformedEntity { .. })
        ));
        assert!(matches!(
            parse_entity("{'word': 'x', 'start_idx': 4, 'end_idx': 2, 'type': 'PER'}"),
            Err(DataError::MalformedEntity { .. })
        ));
    }

    #[test]
    fn test_load_csv() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "id,sentence,subject_entity,object_entity,label,source").unwrap();
        writeln!(
            f,
            "0,\"비틀즈 노래다\",\"{{'word': '비틀즈', 'start_idx': 0, 'end_idx': 2, 'type': 'ORG'}}\",\"{{'word': '노래', 'start_idx': 4, 'end_idx': 5, 'type': 'POH'}}\",org:product,wikipedia"
        ).unwrap();

        let records = load_klue_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject.word, "비틀즈");
        assert_eq!(records[0].object.entity_type, "POH");
        assert_eq!(records[0].label, "org:product");
    }

    #[test]
    fn test_load_jsonl() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"id": 7, "sentence": "A met B", "subject_entity": {{"word": "A", "start_idx": 0, "end_idx": 0, "type": "PER"}}, "object_entity": {{"word": "B", "start_idx": 6, "end_idx": 6, "type": "PER"}}, "label": "per:colleagues"}}"#
        ).unwrap();
        writeln!(f).unwrap();

        let records = load_jsonl(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "7");
        assert_eq!(records[0].object.start_idx, 6);
    }

    #[test]
    fn test_jsonl_reversed_span_is_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("reversed.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"id": 0, "sentence": "Alice founded Acme.", "subject_entity": {{"word": "Acme", "start_idx": 17, "end_idx": 14, "type": "ORG"}}, "object_entity": {{"word": "Alice", "start_idx": 0, "end_idx": 4, "type": "PER"}}, "label": "org:founded_by"}}"#
        )
        .unwrap();

        let err = load_jsonl(&path).unwrap_err();
        assert!(matches!(err, DataError::MalformedEntity { .. }), "got {err:?}");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_jsonl(Path::new("/nonexistent/file.jsonl")).is_err());
        assert!(load_klue_csv(Path::new("/nonexistent/file.csv")).is_err());
    }
}
