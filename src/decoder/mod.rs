//! Lexicon-constrained CTC beam-search decoder.
//!
//! Initialization loads the token alphabet, the pronunciation lexicon, and
//! the n-gram language model, then builds a MAX-smeared trie over all
//! accepted spellings. Decoding log-softmaxes a `[T x V]` logit matrix and
//! runs the beam search; the decoder itself is read-only afterwards and safe
//! to share across streams.

mod alphabet;
mod lexicon;
mod search;
mod trie;

pub use alphabet::Alphabet;
pub use lexicon::Lexicon;
pub use trie::{Trie, TrieLabel, ROOT};

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use crate::config::DecoderConfig;
use crate::error::set_last_error;
use crate::lm::{LmError, NgramModel};

use search::{RawHypothesis, SearchParams, Searcher};

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("language model error: {0}")]
    Lm(#[from] LmError),
}

/// One decoded hypothesis.
///
/// `tokens` is the frame-level token path bracketed by blank sentinels, as
/// expected by [`CtcDecoder::idxs_to_tokens`]; `timesteps` holds the frame
/// of each entry.
#[derive(Debug, Clone)]
pub struct CtcHypothesis {
    pub tokens: Vec<usize>,
    pub words: Vec<String>,
    pub score: f32,
    pub timesteps: Vec<usize>,
}

struct DecoderResources {
    alphabet: Alphabet,
    lexicon: Lexicon,
    lm: Option<NgramModel>,
    trie: Trie,
    blank_idx: usize,
    sil_idx: Option<usize>,
    unk_word_idx: Option<usize>,
}

/// Lexicon-constrained CTC beam-search decoder.
pub struct CtcDecoder {
    config: DecoderConfig,
    resources: Option<DecoderResources>,
}

impl CtcDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            resources: None,
        }
    }

    /// Load tokens, lexicon, and LM from the configured paths and build the
    /// search trie. Must be called once before decoding.
    pub fn initialize(&mut self) -> Result<(), DecoderError> {
        let alphabet = Alphabet::load(&self.config.tokens_path)?;
        let lexicon = Lexicon::load(&self.config.lexicon_path, &alphabet)?;
        let lm = match &self.config.lm_path {
            Some(path) => Some(NgramModel::load(path)?),
            None => None,
        };
        self.install(alphabet, lexicon, lm);
        Ok(())
    }

    /// Build a decoder from already-loaded resources. Useful when the
    /// token, lexicon, or LM data comes from somewhere other than the
    /// configured paths.
    pub fn from_resources(
        config: DecoderConfig,
        alphabet: Alphabet,
        lexicon: Lexicon,
        lm: Option<NgramModel>,
    ) -> Self {
        let mut decoder = Self::new(config);
        decoder.install(alphabet, lexicon, lm);
        decoder
    }

    fn install(&mut self, alphabet: Alphabet, mut lexicon: Lexicon, lm: Option<NgramModel>) {
        let blank_idx = alphabet.index_of(&self.config.blank_token).unwrap_or(0);
        let sil_idx = alphabet.index_of(&self.config.sil_token);
        if sil_idx.is_none() {
            log::warn!(
                "silence token {:?} not in alphabet, silence scoring disabled",
                self.config.sil_token
            );
        }

        let unk_word_idx = if self.config.unk_word.is_empty() {
            None
        } else {
            Some(lexicon.admit(&self.config.unk_word))
        };

        let mut trie = Trie::new();
        let start_state = lm.as_ref().map(|m| m.begin_sentence_state());
        for word_idx in 0..lexicon.len() {
            let unigram = match (&lm, &start_state, lexicon.word(word_idx)) {
                (Some(lm), Some(start), Some(word)) => lm.score(start, word).1,
                _ => 0.0,
            };
            // Clone the spellings out so the borrow does not pin the trie.
            let spellings: Vec<Vec<usize>> = lexicon.spellings(word_idx).to_vec();
            for spelling in spellings {
                trie.insert(&spelling, word_idx, unigram);
            }
        }
        trie.smear();

        log::info!(
            "CTC decoder initialized: {} tokens, {} words, {} trie nodes, blank={}, sil={:?}",
            alphabet.len(),
            lexicon.len(),
            trie.len(),
            blank_idx,
            sil_idx
        );

        self.resources = Some(DecoderResources {
            alphabet,
            lexicon,
            lm,
            trie,
            blank_idx,
            sil_idx,
            unk_word_idx,
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    /// Alphabet size, or 0 before initialization.
    pub fn vocab_size(&self) -> usize {
        self.resources.as_ref().map_or(0, |r| r.alphabet.len())
    }

    pub fn token_to_idx(&self, token: &str) -> Option<usize> {
        self.resources.as_ref()?.alphabet.index_of(token)
    }

    pub fn idx_to_token(&self, idx: usize) -> Option<&str> {
        self.resources.as_ref()?.alphabet.token(idx)
    }

    /// Decode raw logits: log-softmax each row, then beam-search.
    pub fn decode(&self, logits: ArrayView2<f32>) -> Vec<CtcHypothesis> {
        let log_probs = log_softmax(logits);
        self.decode_log_probs(log_probs.view())
    }

    /// Beam-search a matrix that is already in log space.
    ///
    /// An uninitialized decoder yields an empty list and records the
    /// condition in the per-thread error slot.
    pub fn decode_log_probs(&self, log_probs: ArrayView2<f32>) -> Vec<CtcHypothesis> {
        let Some(resources) = &self.resources else {
            set_last_error("decode called before decoder initialization");
            return Vec::new();
        };

        let vocab = log_probs.ncols();
        let beam_size_token = if self.config.beam_size_token <= 0 {
            vocab
        } else {
            (self.config.beam_size_token as usize).min(vocab)
        };

        let searcher = Searcher {
            trie: &resources.trie,
            lexicon: &resources.lexicon,
            lm: resources.lm.as_ref(),
            params: SearchParams {
                beam_size: self.config.beam_size,
                beam_size_token,
                beam_threshold: self.config.beam_threshold,
                lm_weight: self.config.lm_weight,
                word_score: self.config.word_score,
                unk_score: self.config.unk_score,
                sil_score: self.config.sil_score,
                log_add: self.config.log_add,
                nbest: self.config.nbest.max(1),
                blank: resources.blank_idx,
                sil: resources.sil_idx,
                unk_word: resources.unk_word_idx,
            },
        };

        searcher
            .decode(log_probs)
            .into_iter()
            .map(|raw| self.resolve(resources, raw))
            .collect()
    }

    fn resolve(&self, resources: &DecoderResources, raw: RawHypothesis) -> CtcHypothesis {
        let words = raw
            .words
            .iter()
            .filter_map(|&idx| resources.lexicon.word(idx).map(str::to_string))
            .collect();
        CtcHypothesis {
            tokens: raw.tokens,
            words,
            score: raw.score,
            timesteps: raw.timesteps,
        }
    }

    /// Post-process a hypothesis token path into phoneme strings: drop the
    /// sentinel pair, drop empties and special tokens, deduplicate
    /// consecutive repeats, strip trailing silences.
    pub fn idxs_to_tokens(&self, indices: &[usize]) -> Vec<String> {
        let Some(resources) = &self.resources else {
            return Vec::new();
        };

        let trimmed = if indices.len() >= 2 {
            &indices[1..indices.len() - 1]
        } else {
            indices
        };

        let mut out: Vec<String> = Vec::with_capacity(trimmed.len());
        for &idx in trimmed {
            let token = resources.alphabet.token(idx).unwrap_or_default();
            if token.is_empty() {
                continue;
            }
            if matches!(token, "<BLANK>" | "<PAD>" | "<SOS>" | "<EOS>") {
                continue;
            }
            if out.last().map(String::as_str) == Some(token) {
                continue;
            }
            out.push(token.to_string());
        }

        while out.last().map(String::as_str) == Some("_") {
            out.pop();
        }
        out
    }
}

/// Numerically stable row-wise log-softmax.
pub fn log_softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        if row.is_empty() {
            continue;
        }
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let sum: f32 = row.iter().map(|&v| (v - max).exp()).sum();
        let log_sum = sum.ln();
        row.mapv_inplace(|v| v - max - log_sum);
    }
    out
}
