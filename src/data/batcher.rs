// ============================================================
// Layer 4 — Relation Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<RelationSample>
// into device tensors.
//
//   Input:  Vec of N RelationSamples, each padded to length S
//   Output: RelationBatch with [N, S] id/type/mask tensors and
//           an [N] label tensor
//
// Samples are pre-padded, so every row has the same length and
// the flatten-then-reshape trick is enough.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::RelationSample;

/// A batch of relation samples ready for the forward pass.
#[derive(Debug, Clone)]
pub struct RelationBatch<B: Backend> {
    /// Token ids — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// Segment ids — shape: [batch_size, seq_len]
    /// 0 = clue segment, 1 = sentence segment
    pub token_type_ids: Tensor<B, 2, Int>,

    /// Attention masks — shape: [batch_size, seq_len]
    /// 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// Label indices — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,

    /// The same labels on the host, for the metric engine
    pub label_ids: Vec<usize>,
}

/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct RelationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> RelationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, rows: Vec<&Vec<u32>>, seq_len: usize) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let flat: Vec<i32> = rows
            .into_iter()
            .flat_map(|row| row.iter().map(|&x| x as i32))
            .collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len])
    }
}

impl<B: Backend> Batcher<RelationSample, RelationBatch<B>> for RelationBatcher<B> {
    fn batch(&self, items: Vec<RelationSample>) -> RelationBatch<B> {
        // All sequences have the same length (pre-padded)
        let seq_len = items[0].input_ids.len();

        let input_ids      = self.stack(items.iter().map(|s| &s.input_ids).collect(), seq_len);
        let token_type_ids = self.stack(items.iter().map(|s| &s.token_type_ids).collect(), seq_len);
        let attention_mask = self.stack(items.iter().map(|s| &s.attention_mask).collect(), seq_len);

        let label_ids: Vec<usize> = items.iter().map(|s| s.label).collect();
        let label_i32: Vec<i32>   = label_ids.iter().map(|&l| l as i32).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(label_i32.as_slice(), &self.device);

        RelationBatch {
            input_ids,
            token_type_ids,
            attention_mask,
            labels,
            label_ids,
        }
    }
}
