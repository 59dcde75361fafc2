// ============================================================
// Layer 5 — Tagging Network (Burn)
// ============================================================
// One disfluency label per source token. The encoder is the same
// stack the copy network uses; the head scores labels at every
// source position:
//
//   source ids [b, S]
//     │ token emb + position emb
//     ▼
//   encoder blocks (self-attention, pad-masked)   → enc [b, S, d]
//     │ Linear + ReLU + dropout
//     ▼
//   labels: Linear                                 [b, S, L]
//
// The batch's decoder length is the bucket's target length, which
// never exceeds its source length, so the logits are cut to the
// first `steps` positions.
//
// Reference: Zayats et al. (2016) Disfluency Detection using a
//            Bidirectional LSTM

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::vocabulary::PAD_ID;
use crate::ml::model::{encoder_block, EncoderBlock, NetworkShape, OutputNetwork};

#[derive(Config, Debug)]
pub struct TaggerNetConfig {
    pub source_vocab_size: usize,
    /// Size of the label vocabulary, sentinels included.
    pub num_labels:        usize,
    pub max_source_len:    usize,
    pub d_model:           usize,
    pub num_heads:         usize,
    pub num_layers:        usize,
    #[config(default = 0.1)]
    pub dropout:           f64,
}

impl TaggerNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TaggerNet<B> {
        TaggerNet {
            token_embedding: EmbeddingConfig::new(self.source_vocab_size, self.d_model).init(device),
            positions:       EmbeddingConfig::new(self.max_source_len, self.d_model).init(device),
            encoder:         (0..self.num_layers)
                .map(|_| encoder_block(self.d_model, self.num_heads, self.dropout, device))
                .collect(),
            hidden:          LinearConfig::new(self.d_model, self.d_model).init(device),
            labels:          LinearConfig::new(self.d_model, self.num_labels).init(device),
            dropout:         DropoutConfig::new(self.dropout).init(),
        }
    }

    /// Tag sequences are as long as their source.
    pub fn shape(&self) -> NetworkShape {
        NetworkShape {
            source_vocab_size: self.source_vocab_size,
            max_source_len:    self.max_source_len,
            max_target_len:    self.max_source_len,
            aligned:           true,
        }
    }
}

#[derive(Module, Debug)]
pub struct TaggerNet<B: Backend> {
    pub token_embedding: Embedding<B>,
    pub positions:       Embedding<B>,
    pub encoder:         Vec<EncoderBlock<B>>,
    pub hidden:          Linear<B>,
    pub labels:          Linear<B>,
    pub dropout:         Dropout,
}

impl<B: Backend> TaggerNet<B> {
    /// source_ids: [batch, S] → logits: [batch, S, L]
    pub fn forward(&self, source_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, source_len] = source_ids.dims();
        let device = source_ids.device();
        let pad_mask = source_ids.clone().equal_elem(PAD_ID as i64);

        let positions = Tensor::<B, 1, Int>::arange(0..source_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, source_len]);
        let mut x = self.dropout.forward(
            self.token_embedding.forward(source_ids) + self.positions.forward(positions),
        );
        for block in &self.encoder {
            x = block.forward(x, pad_mask.clone());
        }

        let x = self.dropout.forward(relu(self.hidden.forward(x)));
        self.labels.forward(x)
    }
}

impl<B: Backend> OutputNetwork<B> for TaggerNet<B> {
    fn forward_logits(&self, source_ids: Tensor<B, 2, Int>, steps: usize) -> Tensor<B, 3> {
        let logits = self.forward(source_ids);
        let [_, source_len, _] = logits.dims();
        if steps < source_len {
            logits.narrow(1, 0, steps)
        } else {
            logits
        }
    }
}
