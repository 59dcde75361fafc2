// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the training or data directory:
//
//   checkpoint.rs  — where weights go, the atomic checkpoint
//                    pointer, restore-or-fresh, and the saved
//                    TrainConfig used to rebuild the network
//
//   vocab_store.rs — the JSON vocabulary lists next to the data
//
//   metrics.rs     — one CSV row of train/dev/test numbers per
//                    checkpoint
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Checkpoint pointer, pruning and run configuration
pub mod checkpoint;

/// Vocabulary file loading
pub mod vocab_store;

/// Per-checkpoint metrics CSV logger
pub mod metrics;
