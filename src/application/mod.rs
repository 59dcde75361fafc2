// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one command: train, decode, evaluate or self-test.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Interactive denoising from stdin
pub mod decode_use_case;

// Scoring a trained model on one split
pub mod evaluate_use_case;

// Wiring smoke test on a fake dataset
pub mod self_test_use_case;

// Rebuilding and restoring a trained model
pub mod trained_model;
