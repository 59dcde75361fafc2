// ============================================================
// Layer 3 — Typed Errors
// ============================================================
// Failures that a caller has to tell apart. Everything else
// travels as anyhow::Error with context attached at the
// boundary where it happened.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VocabularyError {
    #[error("reserved token '{expected}' must be at id {id}, found '{found}'")]
    MissingSentinel {
        id:       u32,
        expected: &'static str,
        found:    String,
    },

    #[error("token '{token}' appears at both id {first} and id {second}")]
    DuplicateToken { token: String, first: u32, second: u32 },
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("{}:{line}: '{token}' is not a token id", .path.display())]
    MalformedToken {
        path:  PathBuf,
        line:  usize,
        token: String,
    },

    #[error(
        "line {line}: target id {id} addresses source position {} but the source has {source_len} tokens",
        .id - .vocab_size
    )]
    CopyIdOutOfRange {
        line:       usize,
        id:         u32,
        vocab_size: u32,
        source_len: usize,
    },

    #[error("line {line}: {tokens} tokens but {tags} tags")]
    TagCountMismatch { line: usize, tokens: usize, tags: usize },

    #[error("line {line}: label id {id} is outside the label vocabulary ({labels} labels)")]
    LabelOutOfRange { line: usize, id: u32, labels: usize },

    #[error("{split} set holds no examples that fit the configured buckets")]
    EmptyDataset { split: String },

    #[error("reference for line {line} is missing ({available} reference lines loaded)")]
    MissingReference { line: usize, available: usize },
}

/// Raised when a greedy hypothesis cannot be mapped back to tokens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error(
        "output id {id} is beyond the copy range (vocabulary {vocab_size} + source {source_len})"
    )]
    IdOutOfRange {
        id:         u32,
        vocab_size: usize,
        source_len: usize,
    },

    #[error("output id {id} is not a label ({labels} labels)")]
    UnknownLabel { id: u32, labels: usize },
}
