// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// Reads the vocabulary files that sit next to the data:
//
//   <data_dir>/vocab.from   encoder vocabulary
//   <data_dir>/vocab.to     decoder vocabulary (denoising)
//   <data_dir>/vocab.tags   label vocabulary (tagging)
//
// Each file is a JSON list of tokens in id order:
//
//   ["_PAD", "_GO", "_EOS", "_UNK", "hello", "there", ...]
//   ["_PAD", "_GO", "_EOS", "_UNK", "O", "B-RM", "I-RM", ...]
//
// Loaded once at process start; both directions of the lookup
// are built from the list, so they can never disagree.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::task::Task;
use crate::domain::vocabulary::Vocabulary;

pub const SOURCE_VOCAB_FILE: &str = "vocab.from";
pub const TARGET_VOCAB_FILE: &str = "vocab.to";
pub const LABEL_VOCAB_FILE: &str = "vocab.tags";

pub struct VocabStore {
    dir: PathBuf,
}

impl VocabStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn load_source(&self) -> Result<Vocabulary> {
        self.load(SOURCE_VOCAB_FILE)
    }

    pub fn load_target(&self) -> Result<Vocabulary> {
        self.load(TARGET_VOCAB_FILE)
    }

    pub fn load_labels(&self) -> Result<Vocabulary> {
        self.load(LABEL_VOCAB_FILE)
    }

    /// The vocabulary the model's outputs are read against.
    pub fn load_output(&self, task: Task) -> Result<Vocabulary> {
        match task {
            Task::Denoise => self.load_target(),
            Task::Tag => self.load_labels(),
        }
    }

    pub fn load(&self, file_name: &str) -> Result<Vocabulary> {
        let path = self.dir.join(file_name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read vocabulary '{}'", path.display()))?;
        let tokens: Vec<String> = serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a JSON list of tokens", path.display()))?;
        let vocab = Vocabulary::from_tokens(tokens)
            .with_context(|| format!("Invalid vocabulary '{}'", path.display()))?;

        tracing::info!("Loaded {} tokens from '{}'", vocab.len(), path.display());
        Ok(vocab)
    }

    #[cfg(test)]
    pub fn save(&self, file_name: &str, vocab: &Vocabulary) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, serde_json::to_string(vocab.tokens())?)
            .with_context(|| format!("Cannot write vocabulary '{}'", path.display()))?;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::VocabularyError;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        let vocab = Vocabulary::with_words(["hello", "there"]).unwrap();
        store.save(TARGET_VOCAB_FILE, &vocab).unwrap();

        let loaded = store.load_target().unwrap();
        assert_eq!(loaded.len(), 6);
        assert_eq!(loaded.id("there"), Some(5));
        assert_eq!(loaded.token(4), Some("hello"));
    }

    #[test]
    fn test_tagging_reads_the_label_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabStore::new(dir.path());
        store.save(TARGET_VOCAB_FILE, &Vocabulary::with_words(["hello"]).unwrap()).unwrap();
        store.save(LABEL_VOCAB_FILE, &Vocabulary::with_words(["O", "B-RM", "I-RM"]).unwrap()).unwrap();

        let labels = store.load_output(Task::Tag).unwrap();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.token(5), Some("B-RM"));
        assert_eq!(store.load_output(Task::Denoise).unwrap().len(), 5);
    }

    #[test]
    fn test_missing_sentinels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SOURCE_VOCAB_FILE), r#"["hello", "_GO", "_EOS", "_UNK"]"#).unwrap();
        let err = VocabStore::new(dir.path()).load_source().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VocabularyError>(),
            Some(VocabularyError::MissingSentinel { id: 0, .. })
        ));
    }

    #[test]
    fn test_not_a_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SOURCE_VOCAB_FILE), r#"{"a": 4}"#).unwrap();
        assert!(VocabStore::new(dir.path()).load_source().is_err());
    }
}
