// ============================================================
// Layer 2 — Decode Use Case
// ============================================================
// Interactive denoising, one utterance per input line:
//
//   line → clean + tokenize → ids (unknown → UNK)
//        → smallest bucket whose capacity exceeds the length;
//          if none does, truncate to the largest bucket and log
//          a warning
//        → 1-example batch → forward-only step
//        → greedy argmax → copy resolution → printed tokens
//
// A tagging model prints one label per input token instead of
// resolving copies. Its bucket capacity is bounded by both sides,
// since every token needs a target position.
//
// Input bytes that are not UTF-8 are replaced and logged. A
// hypothesis that cannot be resolved is reported and the loop
// moves on to the next line; any other failure ends the session.

use anyhow::{ensure, Result};
use std::borrow::Cow;
use std::io::{BufRead, Write};

use crate::data::{batcher::BatchAssembler, preprocessor::Preprocessor};
use crate::domain::error::DecodeError;
use crate::domain::sequence::{Bucket, SequencePair};
use crate::domain::task::Task;
use crate::domain::traits::{Seq2SeqModel, StepMode};
use crate::domain::vocabulary::{Vocabulary, PAD};
use crate::ml::decoder::{greedy_decode, resolve, resolve_tags};

pub struct DecodeUseCase<M: Seq2SeqModel> {
    model:        M,
    source_vocab: Vocabulary,
    /// Target tokens, or labels when tagging.
    target_vocab: Vocabulary,
    buckets:      Vec<Bucket>,
    task:         Task,
    assembler:    BatchAssembler,
    preprocessor: Preprocessor,
}

impl<M: Seq2SeqModel> DecodeUseCase<M> {
    pub fn new(
        mut model:    M,
        source_vocab: Vocabulary,
        target_vocab: Vocabulary,
        buckets:      Vec<Bucket>,
        task:         Task,
    ) -> Result<Self> {
        ensure!(!buckets.is_empty(), "at least one bucket is required");
        // One sentence at a time.
        model.set_batch_size(1);
        let assembler = BatchAssembler::new(model.reverse_encoder_input());
        Ok(Self {
            model,
            source_vocab,
            target_vocab,
            buckets,
            task,
            assembler,
            preprocessor: Preprocessor::new(),
        })
    }

    /// Tokens a bucket can hold is one less than this.
    fn capacity(&self, bucket: &Bucket) -> usize {
        match self.task {
            Task::Denoise => bucket.source_len,
            Task::Tag => bucket.source_len.min(bucket.target_len),
        }
    }

    /// Bucket for an input of `len` tokens, and whether it must be truncated.
    pub fn choose_bucket(&self, len: usize) -> (usize, bool) {
        match self.buckets.iter().position(|b| len < self.capacity(b)) {
            Some(bucket_id) => (bucket_id, false),
            None => {
                let largest = (0..self.buckets.len())
                    .max_by_key(|&b| self.capacity(&self.buckets[b]))
                    .unwrap_or(0);
                (largest, true)
            }
        }
    }

    /// Denoise or tag one utterance.
    pub fn decode_line(&mut self, line: &str) -> Result<Vec<String>> {
        let mut tokens = self.preprocessor.tokenize(line);
        let (bucket_id, truncated) = self.choose_bucket(tokens.len());
        let bucket = self.buckets[bucket_id];
        if truncated {
            tracing::warn!("Sentence truncated: {}", line.trim_end());
            tokens.truncate(self.capacity(&bucket).saturating_sub(1));
        }

        let ids = self.source_vocab.encode(&tokens);
        let pair = SequencePair::new(ids, Vec::new(), 0);
        let mut no_draws = rand::rngs::mock::StepRng::new(0, 0);
        let batch = self.assembler.build(bucket, &[&pair], 0.0, &mut no_draws)?;

        let output = self.model.step(&batch, bucket_id, StepMode::ForwardOnly)?;
        let raw = greedy_decode(&output.logits).into_iter().next().unwrap_or_default();

        if self.task == Task::Tag {
            let tags = resolve_tags(&raw, &self.target_vocab, tokens.len())?;
            return Ok(tags.into_iter().map(str::to_string).collect());
        }

        // Copy positions past the utterance point at encoder padding.
        let mut source: Vec<&str> = tokens.iter().map(String::as_str).collect();
        source.resize(bucket.source_len, PAD);
        Ok(resolve(&raw, self.target_vocab.tokens(), &source)?)
    }

    /// Read lines until end of input, writing one denoised line
    /// per input. Returns the number of lines decoded.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<usize> {
        let mut decoded = 0;
        let mut buf = Vec::new();
        write!(out, "> ")?;
        out.flush()?;

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if let Cow::Owned(_) = line {
                tracing::warn!("Input line is not valid UTF-8; invalid bytes replaced");
            }
            let line = line.trim_end_matches(['\n', '\r']);

            match self.decode_line(line) {
                Ok(tokens) => {
                    writeln!(out, "{}", tokens.join(" "))?;
                    decoded += 1;
                }
                Err(e) if e.downcast_ref::<DecodeError>().is_some() => {
                    tracing::error!("Cannot decode '{}': {e}", line.trim_end());
                }
                Err(e) => return Err(e),
            }
            write!(out, "> ")?;
            out.flush()?;
        }
        Ok(decoded)
    }
}
