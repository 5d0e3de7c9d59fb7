use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::tokenize::EncodedRelation;
use crate::domain::error::DataError;

/// One tokenised, padded example with its label index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSample {
    pub input_ids:      Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub label:          usize,
}

pub struct RelationDataset {
    samples: Vec<RelationSample>,
}

impl RelationDataset {
    pub fn new(samples: Vec<RelationSample>) -> Self { Self { samples } }

    /// Pair features with label indices; both must have the same length.
    pub fn from_features(
        features: Vec<EncodedRelation>,
        labels:   Vec<usize>,
    ) -> Result<Self, DataError> {
        if features.len() != labels.len() {
            return Err(DataError::LengthMismatch {
                features: features.len(),
                labels:   labels.len(),
            });
        }
        let samples = features
            .into_iter()
            .zip(labels)
            .map(|(f, label)| RelationSample {
                input_ids:      f.input_ids,
                token_type_ids: f.token_type_ids,
                attention_mask: f.attention_mask,
                label,
            })
            .collect();
        Ok(Self { samples })
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<RelationSample> for RelationDataset {
    fn get(&self, index: usize) -> Option<RelationSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Registry entry `RE_Dataset`.
pub fn build_relation_dataset(
    features: Vec<EncodedRelation>,
    labels:   Vec<usize>,
) -> Result<RelationDataset, DataError> {
    RelationDataset::from_features(features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(id: u32) -> EncodedRelation {
        EncodedRelation {
            input_ids:      vec![101, id, 102],
            token_type_ids: vec![0, 0, 0],
            attention_mask: vec![1, 1, 1],
        }
    }

    #[test]
    fn test_pairs_features_with_labels() {
        let ds = build_relation_dataset(vec![feature(5), feature(6)], vec![3, 0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().input_ids[1], 6);
        assert_eq!(ds.get(0).unwrap().label, 3);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let err = build_relation_dataset(vec![feature(5)], vec![1, 2]).err().unwrap();
        assert!(matches!(err, DataError::LengthMismatch { features: 1, labels: 2 }));
    }
}
