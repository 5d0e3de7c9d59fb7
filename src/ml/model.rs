use burn::{
    module::Param,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{activation, Distribution},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub vocab_size:      usize,
    pub max_position:    usize,
    pub type_vocab_size: usize,
    pub d_model:         usize,
    pub num_heads:       usize,
    pub num_layers:      usize,
    pub d_ff:            usize,
    pub dropout:         f64,
}

/// Encoder plus relation classification head.
#[derive(Config, Debug)]
pub struct ReModelConfig {
    pub encoder:       EncoderConfig,
    pub num_labels:    usize,
    /// How many of the last hidden layers contribute their [CLS] vector
    pub hidden_emb_no: usize,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position, self.d_model).init(device);
        let segment_embedding  = EmbeddingConfig::new(self.type_vocab_size, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        Encoder {
            token_embedding,
            position_embedding,
            segment_embedding,
            embed_norm: LayerNormConfig::new(self.d_model).init(device),
            layers,
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

impl ReModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReModel<B> {
        self.init_with_encoder(self.encoder.init(device), device)
    }

    /// Attach a fresh head to an existing (possibly pretrained) encoder.
    pub fn init_with_encoder<B: Backend>(&self, encoder: Encoder<B>, device: &B::Device) -> ReModel<B> {
        let d_model = self.encoder.d_model;
        // Embedding output + one hidden state per layer
        let hidden_emb_no = self.hidden_emb_no.clamp(1, self.encoder.num_layers + 1);
        ReModel {
            encoder,
            dense:      LinearConfig::new(d_model * hidden_emb_no, d_model).init(device),
            dropout:    DropoutConfig::new(self.encoder.dropout).init(),
            classifier: LinearConfig::new(d_model, self.num_labels).init(device),
            hidden_emb_no,
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `mask_pad`: [batch, seq_len], true at padding positions.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_input  = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(attn_input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding:  Embedding<B>,
    pub embed_norm:         LayerNorm<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub dropout:            Dropout,
}

impl<B: Backend> Encoder<B> {
    /// Returns the embedding output followed by every layer's output,
    /// each [batch, seq_len, d_model].
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Vec<Tensor<B, 3>> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let tok_emb = self.token_embedding.forward(input_ids);
        let seg_emb = self.segment_embedding.forward(token_type_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(self.embed_norm.forward(tok_emb + pos_emb + seg_emb));
        let mask_pad = attention_mask.equal_elem(0);

        let mut hidden = Vec::with_capacity(self.layers.len() + 1);
        hidden.push(x.clone());
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
            hidden.push(x.clone());
        }
        hidden
    }

    pub fn vocab_size(&self) -> usize {
        self.token_embedding.weight.dims()[0]
    }

    /// Grow the token embedding to `new_vocab` rows; new rows ~ N(0, 0.02).
    /// Never shrinks.
    pub fn resize_token_embeddings(mut self, new_vocab: usize) -> Self {
        let weight = self.token_embedding.weight.val();
        let [old_vocab, d_model] = weight.dims();
        if new_vocab <= old_vocab {
            return self;
        }
        let extra = Tensor::<B, 2>::random(
            [new_vocab - old_vocab, d_model],
            Distribution::Normal(0.0, 0.02),
            &weight.device(),
        );
        self.token_embedding = Embedding {
            weight: Param::from_tensor(Tensor::cat(vec![weight, extra], 0)),
        };
        tracing::info!("Resized token embeddings {} → {}", old_vocab, new_vocab);
        self
    }
}

#[derive(Module, Debug)]
pub struct ReModel<B: Backend> {
    pub encoder:       Encoder<B>,
    pub dense:         Linear<B>,
    pub dropout:       Dropout,
    pub classifier:    Linear<B>,
    pub hidden_emb_no: usize,
}

impl<B: Backend> ReModel<B> {
    /// Returns class logits [batch, num_labels].
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let hidden = self.encoder.forward(input_ids, token_type_ids, attention_mask);
        let [batch_size, _, d_model] = hidden[0].dims();

        // [CLS] vector of the last `hidden_emb_no` hidden states, concatenated
        let cls: Vec<Tensor<B, 2>> = hidden
            .iter()
            .rev()
            .take(self.hidden_emb_no)
            .map(|h| h.clone().slice([0..batch_size, 0..1, 0..d_model]).reshape([batch_size, d_model]))
            .collect();
        let pooled = Tensor::cat(cls, 1);

        let x = activation::tanh(self.dense.forward(pooled));
        self.classifier.forward(self.dropout.forward(x))
    }

    /// Mean cross-entropy loss and the logits it was computed from.
    pub fn forward_loss(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(input_ids, token_type_ids, attention_mask);
        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        let loss = ce.forward(logits.clone(), labels);
        (loss, logits)
    }
}
