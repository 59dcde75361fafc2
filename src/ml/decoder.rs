// ============================================================
// Layer 5 — Greedy Decoding and Copy Resolution
// ============================================================
// The model scores |vocab| + encoder_len classes per output
// position. Greedy decoding takes the argmax at each position;
// copy resolution then turns those ids into surface tokens:
//
//   id <  |vocab|                  → vocab[id]
//   |vocab| <= id < |vocab| + |src| → src[id - |vocab|]
//   anything larger                 → DecodeError::IdOutOfRange
//
// The sequence is cut at the first EOS, and EOS itself is not
// emitted. Both steps are pure functions of their inputs.
//
// A tagger's output needs no copy resolution: position i holds
// the label of input token i, so the argmax row is cut to the
// input length and read through the label vocabulary.
//
// Reference: Gu et al. (2016) Incorporating Copying Mechanism
//            in Sequence-to-Sequence Learning

use crate::domain::error::DecodeError;
use crate::domain::traits::Logits;
use crate::domain::vocabulary::{Vocabulary, EOS_ID};

/// What an output id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    InVocab(&'a str),
    CopyFromSource(usize),
}

/// Classify one output id against the vocabulary and source length.
pub fn lookup<'a>(
    id:            u32,
    inverse_vocab: &'a [String],
    source_len:    usize,
) -> Result<Resolved<'a>, DecodeError> {
    let id_usize = id as usize;
    if let Some(token) = inverse_vocab.get(id_usize) {
        return Ok(Resolved::InVocab(token));
    }
    let position = id_usize - inverse_vocab.len();
    if position < source_len {
        Ok(Resolved::CopyFromSource(position))
    } else {
        Err(DecodeError::IdOutOfRange {
            id,
            vocab_size: inverse_vocab.len(),
            source_len,
        })
    }
}

/// Ids before the first EOS.
pub fn truncate_at_eos(raw_ids: &[u32]) -> &[u32] {
    match raw_ids.iter().position(|&id| id == EOS_ID) {
        Some(end) => &raw_ids[..end],
        None => raw_ids,
    }
}

/// Turn a raw greedy output into surface tokens.
pub fn resolve<S: AsRef<str>>(
    raw_ids:       &[u32],
    inverse_vocab: &[String],
    source_tokens: &[S],
) -> Result<Vec<String>, DecodeError> {
    truncate_at_eos(raw_ids)
        .iter()
        .map(|&id| {
            Ok(match lookup(id, inverse_vocab, source_tokens.len())? {
                Resolved::InVocab(token) => token.to_string(),
                Resolved::CopyFromSource(pos) => source_tokens[pos].as_ref().to_string(),
            })
        })
        .collect()
}

/// Labels of the first `input_len` positions.
pub fn resolve_tags<'a>(
    raw_ids:   &[u32],
    labels:    &'a Vocabulary,
    input_len: usize,
) -> Result<Vec<&'a str>, DecodeError> {
    raw_ids
        .iter()
        .take(input_len)
        .map(|&id| labels.token(id).ok_or(DecodeError::UnknownLabel { id, labels: labels.len() }))
        .collect()
}

/// Whether the per-token argmax agrees with every gold label.
/// Positions past the input are padding and not compared.
pub fn tags_match(raw_ids: &[u32], gold: &[u32]) -> bool {
    raw_ids.get(..gold.len()) == Some(gold)
}

/// Argmax at every position of every example. Ties go to the
/// smallest class index.
pub fn greedy_decode(logits: &Logits) -> Vec<Vec<u32>> {
    (0..logits.batch())
        .map(|example| {
            (0..logits.steps())
                .map(|step| argmax(logits.scores(example, step)))
                .collect()
        })
        .collect()
}

fn argmax(scores: &[f32]) -> u32 {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best as u32
}
