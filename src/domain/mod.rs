// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing what the
// denoiser works with:
//
//   vocabulary.rs — token <-> id mapping with reserved sentinels
//   sequence.rs   — sequence pairs and length buckets
//   task.rs       — denoising or per-token tagging
//   traits.rs     — the model collaborator seam and the batch /
//                   step-output types that flow across it
//   error.rs      — typed failures callers need to branch on
//
// Rules for this layer:
//   - NO burn types
//   - NO file I/O
//   - Only data, invariants and abstractions
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

pub mod error;
pub mod sequence;
pub mod task;
pub mod traits;
pub mod vocabulary;
