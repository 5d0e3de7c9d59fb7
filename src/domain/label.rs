// ============================================================
// Layer 3 — Label Codec
// ============================================================
// Bidirectional mapping between relation label strings and
// dense integer indices.
//
// The mapping is an external artifact (dict_label_to_num.json)
// loaded once at the start of a run and never modified:
//
//   {
//     "no_relation": 0,
//     "org:top_members/employees": 1,
//     ...
//   }
//
// Invariants checked at load time:
//   - indices are exactly 0..n (dense, no gaps, no duplicates)
//   - the "no_relation" sentinel is present
//
// Reference: Rust Book §8 (Hash Maps)

use std::{collections::HashMap, fs, path::Path};

use crate::domain::error::LabelError;

/// The sentinel label meaning "no relation holds between the entities".
pub const NO_RELATION: &str = "no_relation";

/// The 30 KLUE-RE relation labels, ordered by their index.
pub const KLUE_LABELS: [&str; 30] = [
    "no_relation",
    "org:top_members/employees",
    "org:members",
    "org:product",
    "per:title",
    "org:alternate_names",
    "per:employee_of",
    "org:place_of_headquarters",
    "per:product",
    "org:number_of_employees/members",
    "per:children",
    "per:place_of_residence",
    "per:alternate_names",
    "per:other_family",
    "per:colleagues",
    "per:origin",
    "per:siblings",
    "per:spouse",
    "org:founded",
    "org:political/religious_affiliation",
    "org:member_of",
    "per:parents",
    "org:dissolved",
    "per:schools_attended",
    "per:date_of_death",
    "per:date_of_birth",
    "per:place_of_birth",
    "per:place_of_death",
    "org:founded_by",
    "per:religion",
];

/// Immutable label ↔ index mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelCodec {
    /// Labels ordered by index — `labels[i]` has index `i`
    labels: Vec<String>,
    to_index: HashMap<String, usize>,
}

impl LabelCodec {
    /// Build a codec from `(label, index)` pairs, validating the invariants.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let to_index: HashMap<String, usize> =
            pairs.into_iter().map(|(l, i)| (l.into(), i)).collect();

        let n = to_index.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (label, &index) in &to_index {
            if index >= n {
                return Err(LabelError::InvalidMapping(format!(
                    "label '{label}' has index {index}, expected indices 0..{n}"
                )));
            }
            if let Some(other) = &slots[index] {
                return Err(LabelError::InvalidMapping(format!(
                    "labels '{other}' and '{label}' share index {index}"
                )));
            }
            slots[index] = Some(label.clone());
        }

        // Every slot is filled: n distinct indices all < n
        let labels: Vec<String> = slots.into_iter().flatten().collect();

        if !to_index.contains_key(NO_RELATION) {
            return Err(LabelError::InvalidMapping(format!(
                "missing the '{NO_RELATION}' label"
            )));
        }

        Ok(Self { labels, to_index })
    }

    /// The built-in KLUE-RE mapping.
    pub fn klue() -> Self {
        let labels: Vec<String> = KLUE_LABELS.iter().map(|s| s.to_string()).collect();
        let to_index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Self { labels, to_index }
    }

    /// Load the mapping artifact (a JSON object of label → index).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let map: HashMap<String, usize> =
            serde_json::from_str(&text).map_err(|source| LabelError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let codec = Self::from_pairs(map)?;
        tracing::debug!("Loaded {} labels from '{}'", codec.len(), path.display());
        Ok(codec)
    }

    /// Write the mapping as a JSON object, ordered by index.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut map = serde_json::Map::new();
        for (i, label) in self.labels().iter().enumerate() {
            map.insert(label.clone(), serde_json::Value::from(i));
        }
        let json = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
        fs::write(path, json)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn index_of(&self, label: &str) -> Result<usize, LabelError> {
        self.to_index
            .get(label)
            .copied()
            .ok_or_else(|| LabelError::UnknownLabel(label.to_string()))
    }

    pub fn label_of(&self, index: usize) -> Result<&str, LabelError> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(LabelError::IndexOutOfRange { index, len: self.len() })
    }

    /// Index of the `no_relation` sentinel (present by construction).
    pub fn no_relation_index(&self) -> usize {
        self.to_index[NO_RELATION]
    }

    /// Map label strings to indices, preserving order and length.
    /// Fails on the first unknown label.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, LabelError> {
        labels.iter().map(|l| self.index_of(l.as_ref())).collect()
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(&self, indices: &[usize]) -> Result<Vec<String>, LabelError> {
        indices
            .iter()
            .map(|&i| self.label_of(i).map(str::to_string))
            .collect()
    }
}
