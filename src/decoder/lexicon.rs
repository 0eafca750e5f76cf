//! Pronunciation lexicon: words and their token spellings.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::alphabet::Alphabet;
use super::DecoderError;

/// Word list with accepted spellings resolved to token indices.
///
/// Word indices follow first-encounter order in the source file. A spelling
/// containing a token absent from the alphabet is rejected; a word whose
/// spellings are all rejected is dropped entirely.
pub struct Lexicon {
    words: Vec<String>,
    index: HashMap<String, usize>,
    spellings: Vec<Vec<Vec<usize>>>,
}

impl Lexicon {
    /// Load a lexicon file: each line is a word followed by its
    /// whitespace-separated spelling tokens.
    pub fn load(path: &Path, alphabet: &Alphabet) -> Result<Self, DecoderError> {
        let text = fs::read_to_string(path)?;
        let lexicon = Self::from_text(&text, alphabet)?;
        log::info!("Loaded lexicon with {} words from {:?}", lexicon.len(), path);
        Ok(lexicon)
    }

    /// Parse lexicon text against an alphabet.
    pub fn from_text(text: &str, alphabet: &Alphabet) -> Result<Self, DecoderError> {
        let mut words: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut spellings: Vec<Vec<Vec<usize>>> = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let word = match fields.next() {
                Some(w) => w,
                None => continue,
            };
            let tokens: Vec<&str> = fields.collect();
            if tokens.is_empty() {
                return Err(DecoderError::Config(format!(
                    "lexicon line {}: word {:?} has an empty spelling",
                    line_no + 1,
                    word
                )));
            }

            let mut spelling = Vec::with_capacity(tokens.len());
            let mut rejected = false;
            for token in &tokens {
                match alphabet.index_of(token) {
                    Some(idx) => spelling.push(idx),
                    None => {
                        log::warn!(
                            "lexicon line {}: token {:?} not in alphabet, spelling rejected",
                            line_no + 1,
                            token
                        );
                        rejected = true;
                        break;
                    }
                }
            }
            if rejected {
                continue;
            }

            let word_idx = match index.get(word) {
                Some(&i) => i,
                None => {
                    let i = words.len();
                    words.push(word.to_string());
                    index.insert(word.to_string(), i);
                    spellings.push(Vec::new());
                    i
                }
            };
            spellings[word_idx].push(spelling);
        }

        Ok(Self {
            words,
            index,
            spellings,
        })
    }

    /// Admit `word` without a spelling (used for the unknown-word entry) and
    /// return its index.
    pub(crate) fn admit(&mut self, word: &str) -> usize {
        if let Some(&i) = self.index.get(word) {
            return i;
        }
        let i = self.words.len();
        self.words.push(word.to_string());
        self.index.insert(word.to_string(), i);
        self.spellings.push(Vec::new());
        i
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn word(&self, idx: usize) -> Option<&str> {
        self.words.get(idx).map(String::as_str)
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    /// Accepted spellings of a word, as token index sequences.
    pub fn spellings(&self, idx: usize) -> &[Vec<usize>] {
        self.spellings.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet() -> Alphabet {
        Alphabet::from_text("<BLANK>\n_\nb\no~\nz^\nu\nr\na\n")
    }

    #[test]
    fn test_spellings_resolve_to_token_indices() {
        let alphabet = alphabet();
        let lexicon = Lexicon::from_text("bonjour b o~ z^ u r\n", &alphabet).unwrap();

        assert_eq!(lexicon.len(), 1);
        let idx = lexicon.index_of("bonjour").unwrap();
        let expected: Vec<usize> = ["b", "o~", "z^", "u", "r"]
            .iter()
            .map(|t| alphabet.index_of(t).unwrap())
            .collect();
        assert_eq!(lexicon.spellings(idx), &[expected]);
    }

    #[test]
    fn test_unknown_token_rejects_spelling_not_word() {
        let alphabet = alphabet();
        let text = "bonjour b o~ QQ u r\nbonjour b o~ z^ u r\n";
        let lexicon = Lexicon::from_text(text, &alphabet).unwrap();

        let idx = lexicon.index_of("bonjour").unwrap();
        assert_eq!(lexicon.spellings(idx).len(), 1);
    }

    #[test]
    fn test_word_with_no_accepted_spelling_is_dropped() {
        let alphabet = alphabet();
        let lexicon = Lexicon::from_text("xyzzy QQ\nau a\n", &alphabet).unwrap();

        assert_eq!(lexicon.index_of("xyzzy"), None);
        assert_eq!(lexicon.index_of("au"), Some(0));
    }

    #[test]
    fn test_empty_spelling_is_malformed() {
        let alphabet = alphabet();
        assert!(Lexicon::from_text("bonjour\n", &alphabet).is_err());
    }

    #[test]
    fn test_multiple_spellings_accumulate() {
        let alphabet = alphabet();
        let text = "au a\nau o~\n";
        let lexicon = Lexicon::from_text(text, &alphabet).unwrap();
        let idx = lexicon.index_of("au").unwrap();
        assert_eq!(lexicon.spellings(idx).len(), 2);
    }
}
