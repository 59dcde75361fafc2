// ============================================================
// Layer 3 — Task
// ============================================================
// The same bucketing, batching, training control and evaluation
// drive two kinds of output:
//
//   Denoise  target is the cleaned utterance; output ids are
//            target tokens or copies of source positions, and
//            the target ends with EOS
//
//   Tag      target is one disfluency label per source token;
//            output ids are labels, read up to the input length
//
// Reference: Rust Book §6 (Enums and Pattern Matching)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    Denoise,
    Tag,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_serialises_as_lowercase() {
        assert_eq!(serde_json::to_string(&Task::Tag).unwrap(), "\"tag\"");
        let task: Task = serde_json::from_str("\"denoise\"").unwrap();
        assert_eq!(task, Task::Denoise);
    }
}
