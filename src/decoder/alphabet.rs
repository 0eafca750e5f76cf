//! Token alphabet loading and index maps.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::DecoderError;

/// Special tokens injected at the front of the alphabet when the token file
/// does not carry them, in this order.
const SPECIAL_TOKENS: [&str; 5] = ["<BLANK>", "<UNK>", "<SOS>", "<EOS>", "<PAD>"];

/// Ordered phoneme alphabet with bidirectional token/index maps.
///
/// `<BLANK>` is guaranteed to sit at index 0 regardless of the source file.
pub struct Alphabet {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
}

impl Alphabet {
    /// Load an alphabet from a token file, one token per line.
    pub fn load(path: &Path) -> Result<Self, DecoderError> {
        let text = fs::read_to_string(path)?;
        let alphabet = Self::from_text(&text);
        log::info!("Loaded {} tokens from {:?}", alphabet.len(), path);
        Ok(alphabet)
    }

    /// Parse alphabet text. The first occurrence of `,`, `;`, tab, or CR
    /// ends the token field; surrounding whitespace is stripped; empty lines
    /// and duplicates are dropped (first occurrence wins).
    pub fn from_text(text: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for line in text.lines() {
            let field = match line.find([',', ';', '\t', '\r']) {
                Some(pos) => &line[..pos],
                None => line,
            };
            let token = field.trim();
            if token.is_empty() {
                continue;
            }
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }

        for special in SPECIAL_TOKENS.iter().rev() {
            if !tokens.iter().any(|t| t == special) {
                tokens.insert(0, special.to_string());
            }
        }

        // <BLANK> anchors index 0.
        if tokens.is_empty() {
            tokens.push("<BLANK>".to_string());
        } else if tokens[0] != "<BLANK>" {
            if let Some(pos) = tokens.iter().position(|t| t == "<BLANK>") {
                tokens.remove(pos);
            }
            tokens.insert(0, "<BLANK>".to_string());
        }

        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { tokens, index }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, idx: usize) -> Option<&str> {
        self.tokens.get(idx).map(String::as_str)
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specials_injected_preserving_order() {
        let alphabet = Alphabet::from_text("<BLANK>\n_\na\nb\n");
        assert_eq!(
            alphabet.tokens(),
            &["<BLANK>", "<UNK>", "<SOS>", "<EOS>", "<PAD>", "_", "a", "b"]
        );
        assert_eq!(alphabet.index_of("<BLANK>"), Some(0));
        assert_eq!(alphabet.index_of("a"), Some(6));
    }

    #[test]
    fn test_blank_is_moved_to_front() {
        let alphabet = Alphabet::from_text("a\n<BLANK>\nb\n");
        assert_eq!(alphabet.index_of("<BLANK>"), Some(0));
        assert_eq!(alphabet.token(0), Some("<BLANK>"));
    }

    #[test]
    fn test_separators_end_the_token_field() {
        let alphabet = Alphabet::from_text("a,1\nb;2\nc\t3\nd\r\n");
        for token in ["a", "b", "c", "d"] {
            assert!(alphabet.index_of(token).is_some(), "token {token}");
        }
        assert_eq!(alphabet.index_of("1"), None);
    }

    #[test]
    fn test_duplicates_and_blank_lines_dropped() {
        let alphabet = Alphabet::from_text("a\n\n  \na\nb\n");
        let a = alphabet.index_of("a").unwrap();
        let b = alphabet.index_of("b").unwrap();
        assert_eq!(b, a + 1);
        assert_eq!(alphabet.len(), 5 + 2);
    }

    #[test]
    fn test_empty_input_still_has_blank_at_zero() {
        let alphabet = Alphabet::from_text("");
        assert_eq!(alphabet.token(0), Some("<BLANK>"));
    }
}
