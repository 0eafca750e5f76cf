//! Homophone-based sentence correction.
//!
//! The decoded LIAPHON phonemes are converted to IPA, split into word
//! tokens, expanded into their homophone classes, and the best French word
//! sequence is selected by a beam search over a word-level n-gram model.
//! This LM is separate from the decoder's: it scores French orthography,
//! not lexicon entries.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::lm::{LmError, LmState, NgramModel};
use crate::phonemes;

/// Beam width of the homophone search.
const BEAM_WIDTH: usize = 20;

#[derive(Debug, Error)]
pub enum CorrectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("homophones parse error at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("language model error: {0}")]
    Lm(#[from] LmError),
}

#[derive(Debug, Deserialize)]
struct HomophoneRecord {
    ipa: String,
    #[serde(default)]
    words: Vec<String>,
}

/// IPA token → homophone class, preserving file order.
pub struct HomophoneTable {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl HomophoneTable {
    /// Load a JSON-lines homophone file.
    pub fn load(path: &Path) -> Result<Self, CorrectorError> {
        let text = fs::read_to_string(path)?;
        let table = Self::from_text(&text)?;
        log::info!("Loaded {} homophone classes from {:?}", table.len(), path);
        Ok(table)
    }

    /// Parse JSON-lines text: each line holds `"ipa"` and optionally
    /// `"words"`; a missing word list defaults to the IPA form itself.
    pub fn from_text(text: &str) -> Result<Self, CorrectorError> {
        let mut entries: Vec<(String, Vec<String>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: HomophoneRecord =
                serde_json::from_str(line).map_err(|source| CorrectorError::Json {
                    line: line_no + 1,
                    source,
                })?;
            let words = if record.words.is_empty() {
                vec![record.ipa.clone()]
            } else {
                record.words
            };
            match index.get(&record.ipa) {
                Some(&i) => entries[i].1 = words,
                None => {
                    index.insert(record.ipa.clone(), entries.len());
                    entries.push((record.ipa, words));
                }
            }
        }

        Ok(Self { entries, index })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Homophone class for an IPA token.
    pub fn get(&self, ipa: &str) -> Option<&[String]> {
        self.index
            .get(ipa)
            .map(|&i| self.entries[i].1.as_slice())
    }
}

/// Selects the most likely French rendering of a phoneme sequence.
pub struct SentenceCorrector {
    table: HomophoneTable,
    lm: NgramModel,
}

struct Beam {
    score: f32,
    state: LmState,
    words: Vec<usize>,
}

impl SentenceCorrector {
    /// Load the homophone table and the French word LM from disk.
    pub fn new(homophones_path: &Path, lm_path: &Path) -> Result<Self, CorrectorError> {
        let table = HomophoneTable::load(homophones_path)?;
        let lm = NgramModel::load(lm_path)?;
        Ok(Self::from_parts(table, lm))
    }

    pub fn from_parts(table: HomophoneTable, lm: NgramModel) -> Self {
        Self { table, lm }
    }

    /// Correct a LIAPHON phoneme sequence into a French sentence.
    ///
    /// Returns an empty string when the sequence carries nothing to
    /// correct.
    pub fn correct<S: AsRef<str>>(&self, liaphon_phonemes: &[S]) -> String {
        let ipa = phonemes::liaphon_to_ipa(liaphon_phonemes);

        let mut ipa_tokens: Vec<&str> = ipa.split_ascii_whitespace().collect();
        if ipa_tokens.is_empty() && !ipa.is_empty() {
            ipa_tokens.push(&ipa);
        }
        if ipa_tokens.is_empty() {
            return String::new();
        }

        // Identity fallback for tokens without a homophone class.
        let classes: Vec<Vec<&str>> = ipa_tokens
            .iter()
            .map(|token| match self.table.get(token) {
                Some(words) if !words.is_empty() => {
                    words.iter().map(String::as_str).collect()
                }
                _ => vec![*token],
            })
            .collect();

        let best = self.beam_search(&classes);
        if best.is_empty() {
            return String::new();
        }

        let sentence = best.join(" ");
        let mut corrected = capitalize(&sentence);
        if !corrected.ends_with('.') {
            corrected.push('.');
        }
        corrected
    }

    /// Beam search over the Cartesian product of homophone classes.
    fn beam_search<'a>(&self, classes: &[Vec<&'a str>]) -> Vec<&'a str> {
        let mut beams = vec![Beam {
            score: 0.0,
            state: self.lm.begin_sentence_state(),
            words: Vec::new(),
        }];

        for (position, class) in classes.iter().enumerate() {
            let mut next: Vec<Beam> = Vec::with_capacity(beams.len() * class.len());
            for beam in &beams {
                for (choice, word) in class.iter().enumerate() {
                    let (state, delta) = self.lm.score(&beam.state, word);
                    let mut words = beam.words.clone();
                    words.push(choice);
                    next.push(Beam {
                        score: beam.score + delta,
                        state,
                        words,
                    });
                }
            }
            if next.is_empty() {
                return Vec::new();
            }
            next.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
            next.truncate(BEAM_WIDTH);
            beams = next;
            log::trace!("homophone beam at position {}: {} beams", position, beams.len());
        }

        match beams.first() {
            Some(best) => best
                .words
                .iter()
                .enumerate()
                .map(|(pos, &choice)| classes[pos][choice])
                .collect(),
            None => Vec::new(),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOMOPHONES: &str = r#"{"ipa": "se", "words": ["c'est", "s'est", "ses", "ces"]}
{"ipa": "la", "words": ["la", "là", "l'a"]}
{"ipa": "o", "words": []}
"#;

    const FRENCH_ARPA: &str = "\
\\data\\
ngram 1=9
ngram 2=2

\\1-grams:
-99.0\t<s>\t-0.5
-2.0\t</s>
-1.4\tc'est\t-0.3
-2.5\ts'est\t-0.3
-2.0\tses\t-0.3
-2.1\tces\t-0.3
-1.2\tla\t-0.3
-2.6\tlà
-2.7\tl'a

\\2-grams:
-0.1\t<s> c'est
-0.2\tc'est la

\\end\\
";

    fn corrector() -> SentenceCorrector {
        let table = HomophoneTable::from_text(HOMOPHONES).unwrap();
        let lm = NgramModel::from_arpa(FRENCH_ARPA).unwrap();
        SentenceCorrector::from_parts(table, lm)
    }

    #[test]
    fn test_table_preserves_order_and_defaults() {
        let table = HomophoneTable::from_text(HOMOPHONES).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get("se").unwrap(),
            &["c'est", "s'est", "ses", "ces"]
        );
        // Empty word list falls back to the IPA form.
        assert_eq!(table.get("o").unwrap(), &["o"]);
        assert_eq!(table.get("zz"), None);
    }

    #[test]
    fn test_malformed_homophone_line_is_fatal() {
        assert!(HomophoneTable::from_text("{\"words\": [\"a\"]}\n").is_err());
        assert!(HomophoneTable::from_text("not json\n").is_err());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let table =
            HomophoneTable::from_text("{\"words\": [\"eau\"], \"ipa\": \"o\"}\n").unwrap();
        assert_eq!(table.get("o").unwrap(), &["eau"]);
    }

    #[test]
    fn test_bigram_selects_cest_la() {
        let corrector = corrector();
        // "se la" in LIAPHON: s, e, _, l, a. The silence maps back to the
        // IPA space that separates the two word tokens.
        let phonemes = ["s", "e", "_", "l", "a"];
        assert_eq!(corrector.correct(&phonemes), "C'est la.");
    }

    #[test]
    fn test_unknown_token_identity_fallback() {
        let corrector = corrector();
        let phonemes = ["t", "u"];
        assert_eq!(corrector.correct(&phonemes), "Tu.");
    }

    #[test]
    fn test_empty_input_yields_empty_sentence() {
        let corrector = corrector();
        let empty: [&str; 0] = [];
        assert_eq!(corrector.correct(&empty), "");
    }
}
