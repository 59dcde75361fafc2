// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the files on disk and the padded batches
// a model step consumes:
//
//   <split>.ids.from / .ids.to          <split>.from / .to
//       │                                    │
//       ▼                                    ▼
//   DatasetLoader  ── parse ids ──►   Preprocessor (tokenize)
//       │                                    │
//       ▼                                    ▼
//   BucketedDataset                     Reference per line
//       │
//       ├──► BucketScale     → which bucket to train on next
//       │
//       ▼
//   BatchAssembler   → padded, weight-masked Batch
//
// Each module is responsible for exactly one step.
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Reads id files and text references for one split
pub mod loader;

/// Normalises and tokenizes raw utterances
pub mod preprocessor;

/// Sequence pairs grouped by length bucket
pub mod dataset;

/// Size-proportional bucket selection
pub mod bucketer;

/// Builds padded batches from a bucket
pub mod batcher;

/// Balanced per-label loss weights for tagging
pub mod class_weights;
