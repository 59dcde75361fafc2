// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// Bidirectional token <-> id mapping.
//
// Ids are dense in [0, len) and the first four are reserved:
//
//   0  _PAD   padding
//   1  _GO    decoder start marker
//   2  _EOS   end of sequence
//   3  _UNK   unknown token
//
// The decoder's output space extends past len(): an id of
// len() + k means "copy the k-th source token" (see
// ml::decoder). The vocabulary itself never sees those ids.

use std::collections::HashMap;

use crate::domain::error::VocabularyError;

pub const PAD_ID: u32 = 0;
pub const GO_ID: u32 = 1;
pub const EOS_ID: u32 = 2;
pub const UNK_ID: u32 = 3;

pub const PAD: &str = "_PAD";
pub const GO: &str = "_GO";
pub const EOS: &str = "_EOS";
pub const UNK: &str = "_UNK";

/// Sentinels in id order.
pub const RESERVED: [&str; 4] = [PAD, GO, EOS, UNK];

#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
}

impl Vocabulary {
    /// Build from a token list where position == id.
    ///
    /// The list must start with the four reserved tokens and
    /// contain no duplicates, so the inverse map is exact.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self, VocabularyError> {
        for (id, expected) in RESERVED.iter().enumerate() {
            let found = tokens.get(id).map(String::as_str).unwrap_or("");
            if found != *expected {
                return Err(VocabularyError::MissingSentinel {
                    id:       id as u32,
                    expected,
                    found:    found.to_string(),
                });
            }
        }

        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if let Some(first) = token_to_id.insert(token.clone(), id as u32) {
                return Err(VocabularyError::DuplicateToken {
                    token:  token.clone(),
                    first,
                    second: id as u32,
                });
            }
        }

        Ok(Self { token_to_id, id_to_token: tokens })
    }

    /// Vocabulary holding only the reserved tokens plus `words`.
    #[cfg(test)]
    pub fn with_words<I, S>(words: I) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = RESERVED
            .iter()
            .map(|t| t.to_string())
            .chain(words.into_iter().map(Into::into))
            .collect();
        Self::from_tokens(tokens)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// The inverse map, indexed by id.
    pub fn tokens(&self) -> &[String] {
        &self.id_to_token
    }

    /// Map tokens to ids, sending unknown tokens to UNK_ID.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens
            .iter()
            .map(|t| self.id(t.as_ref()).unwrap_or(UNK_ID))
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_is_exact() {
        let vocab = Vocabulary::with_words(["a", "b", "c"]).unwrap();
        assert_eq!(vocab.len(), 7);
        for (id, token) in vocab.tokens().iter().enumerate() {
            assert_eq!(vocab.id(token), Some(id as u32));
            assert_eq!(vocab.token(id as u32), Some(token.as_str()));
        }
        assert_eq!(vocab.id("a"), Some(4));
        assert_eq!(vocab.id("c"), Some(6));
    }

    #[test]
    fn test_rejects_missing_sentinel() {
        let err = Vocabulary::from_tokens(vec!["_PAD".into(), "a".into()]).unwrap_err();
        assert_eq!(
            err,
            VocabularyError::MissingSentinel { id: 1, expected: GO, found: "a".into() }
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = Vocabulary::with_words(["a", "b", "a"]).unwrap_err();
        assert_eq!(
            err,
            VocabularyError::DuplicateToken { token: "a".into(), first: 4, second: 6 }
        );
    }

    #[test]
    fn test_encode_falls_back_to_unk() {
        let vocab = Vocabulary::with_words(["hello"]).unwrap();
        assert_eq!(vocab.encode(&["hello", "world"]), vec![4, UNK_ID]);
    }
}
