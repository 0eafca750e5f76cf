//! N-gram language model over the ARPA interchange format.
//!
//! Two independent instances exist at runtime: one scoring lexicon words
//! inside the CTC beam search, one scoring French words in the sentence
//! corrector. Scores are log10 probabilities, matching what the ARPA file
//! stores; callers weight them as needed.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

/// Log10 probability assigned to a word the model has never seen when no
/// `<unk>` entry exists.
const UNKNOWN_LOG_PROB: f32 = -10.0;

#[derive(Debug, Error)]
pub enum LmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ARPA parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Opaque scoring context: the trailing word ids, newest last, never longer
/// than `order - 1`. Cheap to clone, hashable so beams can be merged on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LmState {
    context: Vec<u32>,
}

#[derive(Clone, Copy)]
struct NgramEntry {
    log_prob: f32,
    backoff: f32,
}

/// Back-off n-gram model loaded from an ARPA file.
pub struct NgramModel {
    order: usize,
    vocab: HashMap<String, u32>,
    /// `ngrams[n - 1]` maps the id sequence of an n-gram to its entry.
    ngrams: Vec<HashMap<Box<[u32]>, NgramEntry>>,
    unk_id: Option<u32>,
    bos_id: Option<u32>,
    eos_id: Option<u32>,
}

impl NgramModel {
    /// Load a model from an ARPA file on disk.
    pub fn load(path: &Path) -> Result<Self, LmError> {
        let text = fs::read_to_string(path)?;
        let model = Self::from_arpa(&text)?;
        log::info!(
            "Loaded {}-gram LM from {:?} ({} words)",
            model.order,
            path,
            model.vocab.len()
        );
        Ok(model)
    }

    /// Parse a model from ARPA text.
    pub fn from_arpa(text: &str) -> Result<Self, LmError> {
        let mut counts: Vec<usize> = Vec::new();
        let mut vocab: HashMap<String, u32> = HashMap::new();
        let mut ngrams: Vec<HashMap<Box<[u32]>, NgramEntry>> = Vec::new();
        let mut current_order: Option<usize> = None;
        let mut in_data = false;

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line == "\\data\\" {
                in_data = true;
                continue;
            }
            if line == "\\end\\" {
                break;
            }
            if let Some(rest) = line.strip_prefix("ngram ") {
                if !in_data {
                    return Err(LmError::Parse {
                        line: line_no + 1,
                        message: "ngram count outside \\data\\ section".to_string(),
                    });
                }
                let count = rest
                    .split('=')
                    .nth(1)
                    .and_then(|c| c.trim().parse::<usize>().ok())
                    .ok_or_else(|| LmError::Parse {
                        line: line_no + 1,
                        message: format!("malformed count line: {rest}"),
                    })?;
                counts.push(count);
                continue;
            }
            if line.starts_with('\\') && line.ends_with("-grams:") {
                let order: usize = line[1..line.len() - "-grams:".len()]
                    .parse()
                    .map_err(|_| LmError::Parse {
                        line: line_no + 1,
                        message: format!("malformed section header: {line}"),
                    })?;
                while ngrams.len() < order {
                    ngrams.push(HashMap::new());
                }
                current_order = Some(order);
                continue;
            }

            let Some(order) = current_order else {
                continue;
            };

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < order + 1 || fields.len() > order + 2 {
                return Err(LmError::Parse {
                    line: line_no + 1,
                    message: format!("expected {order}-gram entry, got: {line}"),
                });
            }
            let log_prob: f32 = fields[0].parse().map_err(|_| LmError::Parse {
                line: line_no + 1,
                message: format!("bad log-probability: {}", fields[0]),
            })?;
            let backoff: f32 = if fields.len() == order + 2 {
                fields[order + 1].parse().map_err(|_| LmError::Parse {
                    line: line_no + 1,
                    message: format!("bad backoff weight: {}", fields[order + 1]),
                })?
            } else {
                0.0
            };

            let mut ids = Vec::with_capacity(order);
            for &word in &fields[1..=order] {
                let next_id = vocab.len() as u32;
                let id = *vocab.entry(word.to_string()).or_insert(next_id);
                ids.push(id);
            }
            ngrams[order - 1].insert(ids.into_boxed_slice(), NgramEntry { log_prob, backoff });
        }

        if ngrams.is_empty() {
            return Err(LmError::Parse {
                line: 0,
                message: "no n-gram sections found".to_string(),
            });
        }
        if counts.len() != ngrams.len() {
            log::warn!(
                "ARPA header declares {} orders, file contains {}",
                counts.len(),
                ngrams.len()
            );
        }

        let unk_id = vocab.get("<unk>").copied();
        let bos_id = vocab.get("<s>").copied();
        let eos_id = vocab.get("</s>").copied();

        Ok(Self {
            order: ngrams.len(),
            vocab,
            ngrams,
            unk_id,
            bos_id,
            eos_id,
        })
    }

    /// Highest n-gram order of the model.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Empty scoring context.
    pub fn null_state(&self) -> LmState {
        LmState::default()
    }

    /// Context seeded with the sentence-start marker, when the model has
    /// one.
    pub fn begin_sentence_state(&self) -> LmState {
        LmState {
            context: self.bos_id.into_iter().collect(),
        }
    }

    /// Score `word` in `state`, returning the successor state and the log10
    /// probability. Unknown words score through `<unk>` when present.
    pub fn score(&self, state: &LmState, word: &str) -> (LmState, f32) {
        match self.vocab.get(word) {
            Some(&id) => self.score_id(state, id),
            None => match self.unk_id {
                Some(unk) => self.score_id(state, unk),
                None => (self.null_state(), UNKNOWN_LOG_PROB),
            },
        }
    }

    /// Log10 probability of the sentence-end marker in `state`; 0 when the
    /// model has none.
    pub fn finish(&self, state: &LmState) -> f32 {
        match self.eos_id {
            Some(eos) => self.score_id(state, eos).1,
            None => 0.0,
        }
    }

    fn score_id(&self, state: &LmState, word: u32) -> (LmState, f32) {
        let max_context = self.order.saturating_sub(1);
        let mut ctx = &state.context[state.context.len().saturating_sub(max_context)..];
        let mut backoff = 0.0f32;

        let log_prob = loop {
            let mut key = Vec::with_capacity(ctx.len() + 1);
            key.extend_from_slice(ctx);
            key.push(word);
            if let Some(entry) = self.ngrams[key.len() - 1].get(key.as_slice()) {
                break entry.log_prob + backoff;
            }
            if ctx.is_empty() {
                // Word was interned from a higher-order entry but has no
                // unigram of its own.
                break UNKNOWN_LOG_PROB + backoff;
            }
            if let Some(entry) = self.ngrams[ctx.len() - 1].get(ctx) {
                backoff += entry.backoff;
            }
            ctx = &ctx[1..];
        };

        let mut context = Vec::with_capacity(max_context);
        if max_context > 0 {
            let keep = state.context.len().saturating_sub(max_context - 1);
            context.extend_from_slice(&state.context[keep..]);
            context.push(word);
        }
        (LmState { context }, log_prob)
    }
}
