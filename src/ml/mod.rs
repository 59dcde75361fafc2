// ============================================================
// Layer 5 — ML Layer
// ============================================================
// Everything that runs the model or reads what it produced.
// Only model.rs, tagger.rs and seq2seq.rs import burn; the rest talks to
// the network through the `Seq2SeqModel` trait.
//
//   model.rs     — CopyNet: encoder, one-shot decoder and the
//                  vocabulary-plus-source-position output space
//
//   tagger.rs    — TaggerNet: the same encoder with a per-token
//                  label head
//
//   seq2seq.rs   — BurnSeq2Seq: either network + Adam behind the
//                  Seq2SeqModel seam, parameter save/restore
//
//   decoder.rs   — greedy argmax and copy resolution
//
//   evaluator.rs — forward-only pass over a split: loss,
//                  perplexity, exact-match accuracy
//
//   trainer.rs   — the training controller: sampling, learning
//                  rate decay, checkpointing, early stopping
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Copy-augmented encoder/decoder network
pub mod model;

/// Per-token disfluency labelling network
pub mod tagger;

/// Burn-backed Seq2SeqModel
pub mod seq2seq;

/// Greedy decoding and copy resolution
pub mod decoder;

/// Split evaluation
pub mod evaluator;

/// Training controller state machine
pub mod trainer;

/// Scripted test double for the orchestration layer
#[cfg(test)]
pub mod testing;
