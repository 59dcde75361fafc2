// ============================================================
// Layer 4 — Utterance Preprocessor
// ============================================================
// Normalises a raw dialogue utterance and splits it into the
// surface tokens the vocabularies were built from.
//
// Cleaning steps (applied in order):
//   1. Tabs, non-breaking / zero-width spaces, BOM and other
//      control characters become plain spaces
//   2. Runs of whitespace collapse to a single space
//   3. Leading and trailing whitespace is trimmed
//
// Tokenisation then splits on whitespace and detaches the
// punctuation marks  . , ! ? " ' : ; ( )  into their own tokens:
//
//   "well, i mean (uh) yes!"
//     → ["well", ",", "i", "mean", "(", "uh", ")", "yes", "!"]
//
// Reference: Rust Book §8 (Strings in Rust)

const PUNCTUATION: &[char] = &['.', ',', '!', '?', '"', '\'', ':', ';', ')', '('];

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean one utterance. Newlines are treated as spaces.
    pub fn clean(&self, text: &str) -> String {
        let normalised: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        normalised.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Clean, then split into tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for word in self.clean(text).split(' ').filter(|w| !w.is_empty()) {
            let mut current = String::new();
            for c in word.chars() {
                if PUNCTUATION.contains(&c) {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    tokens.push(c.to_string());
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                tokens.push(current);
            }
        }
        tokens
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
