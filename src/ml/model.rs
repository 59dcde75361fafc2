// ============================================================
// Layer 5 — Copy Network (Burn)
// ============================================================
// Encoder plus a one-shot decoder whose output space is the
// target vocabulary followed by every encoder position:
//
//   source ids [b, S]
//     │ token emb + position emb
//     ▼
//   encoder blocks (self-attention, pad-masked)   → enc [b, S, d]
//
//   target positions 0..T
//     │ position emb
//     ▼
//   cross-attention over enc + LayerNorm          → dec [b, T, d]
//
//   generate: Linear(dec)                          [b, T, V]
//   copy:     dec · encᵀ / √d, pads masked         [b, T, S]
//   logits:   cat(generate, copy)                  [b, T, V + S]
//
// Class `V + i` means "copy source position i", so greedy argmax
// over the logits already lands in the copy-extended id space.
//
// The loss is cross-entropy weighted by the batch's target
// weights, normalised by the total weight. It is shared with the
// tagging network in `tagger.rs`.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Vinyals et al. (2015) Pointer Networks

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, log_softmax},
};

use crate::domain::vocabulary::PAD_ID;

/// A network that maps padded source ids to per-step class scores.
pub trait OutputNetwork<B: Backend> {
    /// source_ids: [batch, S] → logits: [batch, steps, classes]
    fn forward_logits(&self, source_ids: Tensor<B, 2, Int>, steps: usize) -> Tensor<B, 3>;
}

/// Largest lengths a network accepts, plus its source vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkShape {
    pub source_vocab_size: usize,
    pub max_source_len:    usize,
    pub max_target_len:    usize,
    /// Output step `t` scores source position `t`, so a batch may
    /// not decode past its encoder length.
    pub aligned:           bool,
}

/// Score given to padded source positions in the copy range.
const MASKED_SCORE: f32 = -1.0e4;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct CopyNetConfig {
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    /// Largest bucket source length.
    pub max_source_len:    usize,
    /// Largest bucket target length.
    pub max_target_len:    usize,
    pub d_model:           usize,
    pub num_heads:         usize,
    pub num_layers:        usize,
    #[config(default = 0.1)]
    pub dropout:           f64,
}

impl CopyNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CopyNet<B> {
        let source_embedding = EmbeddingConfig::new(self.source_vocab_size, self.d_model).init(device);
        let source_positions = EmbeddingConfig::new(self.max_source_len, self.d_model).init(device);
        let target_positions = EmbeddingConfig::new(self.max_target_len, self.d_model).init(device);
        let encoder: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| encoder_block(self.d_model, self.num_heads, self.dropout, device))
            .collect();
        let cross_attn = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let decoder_norm = LayerNormConfig::new(self.d_model).init(device);
        let generate     = LinearConfig::new(self.d_model, self.target_vocab_size).init(device);
        let dropout      = DropoutConfig::new(self.dropout).init();

        CopyNet {
            source_embedding, source_positions, target_positions,
            encoder, cross_attn, decoder_norm, generate, dropout,
            d_model: self.d_model,
        }
    }

    pub fn shape(&self) -> NetworkShape {
        NetworkShape {
            source_vocab_size: self.source_vocab_size,
            max_source_len:    self.max_source_len,
            max_target_len:    self.max_target_len,
            aligned:           false,
        }
    }
}

// ─── Encoder block ────────────────────────────────────────────────────────────
pub fn encoder_block<B: Backend>(
    d_model:   usize,
    num_heads: usize,
    dropout:   f64,
    device:    &B::Device,
) -> EncoderBlock<B> {
    let self_attn   = MultiHeadAttentionConfig::new(d_model, num_heads)
        .with_dropout(dropout)
        .init(device);
    let ffn_linear1 = LinearConfig::new(d_model, 4 * d_model).init(device);
    let ffn_linear2 = LinearConfig::new(4 * d_model, d_model).init(device);
    let norm1   = LayerNormConfig::new(d_model).init(device);
    let norm2   = LayerNormConfig::new(d_model).init(device);
    let dropout = DropoutConfig::new(dropout).init();
    EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
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
    /// `pad_mask`: [batch, seq_len], true where the input is padding.
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));
        let ffn = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn))
    }
}

// ─── Copy network ─────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CopyNet<B: Backend> {
    pub source_embedding: Embedding<B>,
    pub source_positions: Embedding<B>,
    pub target_positions: Embedding<B>,
    pub encoder:          Vec<EncoderBlock<B>>,
    pub cross_attn:       MultiHeadAttention<B>,
    pub decoder_norm:     LayerNorm<B>,
    pub generate:         Linear<B>,
    pub dropout:          Dropout,
    pub d_model:          usize,
}

impl<B: Backend> CopyNet<B> {
    /// source_ids: [batch, S] → logits: [batch, target_len, V + S]
    pub fn forward(&self, source_ids: Tensor<B, 2, Int>, target_len: usize) -> Tensor<B, 3> {
        let [batch_size, source_len] = source_ids.dims();
        let device = source_ids.device();
        let pad_mask = source_ids.clone().equal_elem(PAD_ID as i64);

        // ── Encoder ──────────────────────────────────────────────────────────
        let positions = Tensor::<B, 1, Int>::arange(0..source_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, source_len]);
        let mut enc = self.dropout.forward(
            self.source_embedding.forward(source_ids) + self.source_positions.forward(positions),
        );
        for block in &self.encoder {
            enc = block.forward(enc, pad_mask.clone());
        }

        // ── Decoder ──────────────────────────────────────────────────────────
        let steps = Tensor::<B, 1, Int>::arange(0..target_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, target_len]);
        let queries = self.target_positions.forward(steps);
        let attended = self
            .cross_attn
            .forward(MhaInput::new(queries.clone(), enc.clone(), enc.clone()).mask_pad(pad_mask.clone()))
            .context;
        let dec = self.decoder_norm.forward(queries + self.dropout.forward(attended));

        // ── Output space: vocabulary, then source positions ──────────────────
        let generate = self.generate.forward(dec.clone());
        let copy = dec.matmul(enc.swap_dims(1, 2)) / (self.d_model as f64).sqrt();
        let copy_mask = pad_mask
            .unsqueeze_dim::<3>(1)
            .expand([batch_size, target_len, source_len]);
        let copy = copy.mask_fill(copy_mask, MASKED_SCORE);

        Tensor::cat(vec![generate, copy], 2)
    }
}

impl<B: Backend> OutputNetwork<B> for CopyNet<B> {
    fn forward_logits(&self, source_ids: Tensor<B, 2, Int>, steps: usize) -> Tensor<B, 3> {
        self.forward(source_ids, steps)
    }
}

// ─── Loss ─────────────────────────────────────────────────────────────────────
/// Weighted cross-entropy, normalised by the total weight so that
/// zero-weight positions contribute nothing.
///
/// logits: [b, T, C], targets: [b, T], weights: [b, T]
pub fn weighted_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch_size, steps, _] = logits.dims();
    let log_probs = log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.unsqueeze_dim::<3>(2))
        .reshape([batch_size, steps]);

    let total = weights.clone().sum().clamp_min(1e-12);
    (picked * weights).sum().neg() / total
}
