//! Lexicon-constrained CTC beam search.
//!
//! Hypotheses walk the pronunciation trie token by token; word completions
//! fire when an accepting node is followed by blank or silence, at which
//! point the accumulated smeared estimate is replaced by the true
//! language-model score. Backpointers form an arena so beams share their
//! frame-level token paths.

use std::collections::HashMap;

use ndarray::ArrayView2;

use crate::lm::{LmState, NgramModel};

use super::lexicon::Lexicon;
use super::trie::{Trie, ROOT};

/// Tunables resolved from `DecoderConfig` against a concrete alphabet.
pub(crate) struct SearchParams {
    pub beam_size: usize,
    /// Token candidates expanded per step (already clamped to vocab size).
    pub beam_size_token: usize,
    pub beam_threshold: f32,
    pub lm_weight: f32,
    pub word_score: f32,
    pub unk_score: f32,
    pub sil_score: f32,
    pub log_add: bool,
    pub nbest: usize,
    pub blank: usize,
    pub sil: Option<usize>,
    /// Word index of the unknown word, when admitted.
    pub unk_word: Option<usize>,
}

/// Position within the lexicon: a trie node, or the out-of-lexicon
/// traversal entered when `unk_score` permits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LexState {
    Node(usize),
    Unknown,
}

#[derive(Clone)]
struct Beam {
    score: f32,
    lex: LexState,
    lm_state: LmState,
    words: Vec<usize>,
    last_token: usize,
    prev_blank: bool,
    trace: usize,
}

/// Backpointer arena node: parent index, emitted token, frame.
#[derive(Clone, Copy)]
struct Trace {
    parent: usize,
    token: usize,
    frame: usize,
}

#[derive(PartialEq, Eq, Hash)]
struct MergeKey {
    lex: LexState,
    last_token: usize,
    prev_blank: bool,
    lm_state: LmState,
}

/// Decoded hypothesis before token/word resolution.
pub(crate) struct RawHypothesis {
    /// Frame-level token path bracketed by blank sentinels.
    pub tokens: Vec<usize>,
    pub timesteps: Vec<usize>,
    pub words: Vec<usize>,
    pub score: f32,
}

pub(crate) struct Searcher<'a> {
    pub trie: &'a Trie,
    pub lexicon: &'a Lexicon,
    pub lm: Option<&'a NgramModel>,
    pub params: SearchParams,
}

fn log_add_exp(a: f32, b: f32) -> f32 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f32::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

impl<'a> Searcher<'a> {
    /// Run the search over a `[T x V]` log-probability matrix.
    pub fn decode(&self, log_probs: ArrayView2<f32>) -> Vec<RawHypothesis> {
        let t_max = log_probs.nrows();
        let vocab = log_probs.ncols();
        if t_max == 0 || vocab == 0 {
            return Vec::new();
        }

        let start_lm = match self.lm {
            Some(lm) => lm.begin_sentence_state(),
            None => LmState::default(),
        };

        let mut arena = vec![Trace {
            parent: 0,
            token: self.params.blank,
            frame: 0,
        }];
        let mut beams = vec![Beam {
            score: 0.0,
            lex: LexState::Node(ROOT),
            lm_state: start_lm,
            words: Vec::new(),
            last_token: self.params.blank,
            prev_blank: false,
            trace: 0,
        }];

        let mut token_order: Vec<usize> = (0..vocab).collect();
        for t in 0..t_max {
            let row = log_probs.row(t);
            let candidates: &[usize] = if self.params.beam_size_token < vocab {
                token_order.sort_unstable_by(|&a, &b| {
                    row[b].partial_cmp(&row[a]).unwrap_or(std::cmp::Ordering::Equal)
                });
                &token_order[..self.params.beam_size_token]
            } else {
                &token_order
            };

            let mut next: Vec<Beam> = Vec::with_capacity(beams.len() * 2);
            let mut merge: HashMap<MergeKey, usize> = HashMap::new();

            for beam in &beams {
                for &token in candidates {
                    let emission = row[token];
                    if emission == f32::NEG_INFINITY {
                        continue;
                    }
                    self.expand(beam, token, emission, t, &mut arena, &mut next, &mut merge);
                }
            }

            if next.is_empty() {
                break;
            }

            let best = next
                .iter()
                .map(|b| b.score)
                .fold(f32::NEG_INFINITY, f32::max);
            next.retain(|b| b.score >= best - self.params.beam_threshold);
            next.sort_unstable_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
            next.truncate(self.params.beam_size);
            beams = next;
        }

        if let Some(lm) = self.lm {
            for beam in &mut beams {
                beam.score += self.params.lm_weight * lm.finish(&beam.lm_state);
            }
            beams.sort_unstable_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        beams
            .iter()
            .take(self.params.nbest)
            .map(|beam| self.reconstruct(beam, &arena, t_max))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &self,
        beam: &Beam,
        token: usize,
        emission: f32,
        frame: usize,
        arena: &mut Vec<Trace>,
        next: &mut Vec<Beam>,
        merge: &mut HashMap<MergeKey, usize>,
    ) {
        let trace = arena.len();
        arena.push(Trace {
            parent: beam.trace,
            token,
            frame,
        });

        if token == self.params.blank {
            // Plain blank keeps the traversal alive.
            push_candidate(
                next,
                merge,
                self.params.log_add,
                Beam {
                    score: beam.score + emission,
                    lex: beam.lex,
                    lm_state: beam.lm_state.clone(),
                    words: beam.words.clone(),
                    last_token: self.params.blank,
                    prev_blank: true,
                    trace,
                },
            );
            // Blank after an accepting node completes the pending word.
            self.complete_words(beam, emission, 0.0, self.params.blank, true, trace, next, merge);
            return;
        }

        if token == beam.last_token && !beam.prev_blank {
            // CTC collapse: the emission extends the previous token.
            push_candidate(
                next,
                merge,
                self.params.log_add,
                Beam {
                    score: beam.score + emission,
                    lex: beam.lex,
                    lm_state: beam.lm_state.clone(),
                    words: beam.words.clone(),
                    last_token: beam.last_token,
                    prev_blank: false,
                    trace,
                },
            );
            return;
        }

        if Some(token) == self.params.sil {
            // Silence is only legal between words; it also completes a
            // pending word like blank does.
            if beam.lex == LexState::Node(ROOT) {
                push_candidate(
                    next,
                    merge,
                    self.params.log_add,
                    Beam {
                        score: beam.score + emission + self.params.sil_score,
                        lex: LexState::Node(ROOT),
                        lm_state: beam.lm_state.clone(),
                        words: beam.words.clone(),
                        last_token: token,
                        prev_blank: false,
                        trace,
                    },
                );
            }
            self.complete_words(
                beam,
                emission,
                self.params.sil_score,
                token,
                false,
                trace,
                next,
                merge,
            );
            return;
        }

        match beam.lex {
            LexState::Node(node) => {
                if let Some(child) = self.trie.child(node, token) {
                    let smear = self.trie.max_score(child) - self.trie.max_score(node);
                    push_candidate(
                        next,
                        merge,
                        self.params.log_add,
                        Beam {
                            score: beam.score + emission + self.params.lm_weight * smear,
                            lex: LexState::Node(child),
                            lm_state: beam.lm_state.clone(),
                            words: beam.words.clone(),
                            last_token: token,
                            prev_blank: false,
                            trace,
                        },
                    );
                } else if node == ROOT && self.unk_enabled() {
                    push_candidate(
                        next,
                        merge,
                        self.params.log_add,
                        Beam {
                            score: beam.score + emission,
                            lex: LexState::Unknown,
                            lm_state: beam.lm_state.clone(),
                            words: beam.words.clone(),
                            last_token: token,
                            prev_blank: false,
                            trace,
                        },
                    );
                }
            }
            LexState::Unknown => {
                push_candidate(
                    next,
                    merge,
                    self.params.log_add,
                    Beam {
                        score: beam.score + emission,
                        lex: LexState::Unknown,
                        lm_state: beam.lm_state.clone(),
                        words: beam.words.clone(),
                        last_token: token,
                        prev_blank: false,
                        trace,
                    },
                );
            }
        }
    }

    /// Emit completion candidates for a beam whose emission (blank or
    /// silence) terminates a word. `extra` carries the silence bonus;
    /// `last_token`/`prev_blank` describe the terminating emission.
    #[allow(clippy::too_many_arguments)]
    fn complete_words(
        &self,
        beam: &Beam,
        emission: f32,
        extra: f32,
        last_token: usize,
        prev_blank: bool,
        trace: usize,
        next: &mut Vec<Beam>,
        merge: &mut HashMap<MergeKey, usize>,
    ) {
        match beam.lex {
            LexState::Node(node) => {
                for label in self.trie.labels(node) {
                    let (lm_state, lm_score) = self.score_word(&beam.lm_state, label.word);
                    // Replace the accumulated smeared estimate with the true
                    // LM score for the completed word.
                    let correction = lm_score - self.trie.max_score(node);
                    let mut words = beam.words.clone();
                    words.push(label.word);
                    push_candidate(
                        next,
                        merge,
                        self.params.log_add,
                        Beam {
                            score: beam.score
                                + emission
                                + extra
                                + self.params.lm_weight * correction
                                + self.params.word_score,
                            lex: LexState::Node(ROOT),
                            lm_state,
                            words,
                            last_token,
                            prev_blank,
                            trace,
                        },
                    );
                }
            }
            LexState::Unknown => {
                if let Some(unk) = self.params.unk_word {
                    let (lm_state, lm_score) = self.score_word(&beam.lm_state, unk);
                    let mut words = beam.words.clone();
                    words.push(unk);
                    push_candidate(
                        next,
                        merge,
                        self.params.log_add,
                        Beam {
                            score: beam.score
                                + emission
                                + extra
                                + self.params.lm_weight * lm_score
                                + self.params.unk_score,
                            lex: LexState::Node(ROOT),
                            lm_state,
                            words,
                            last_token,
                            prev_blank,
                            trace,
                        },
                    );
                }
            }
        }
    }

    fn unk_enabled(&self) -> bool {
        self.params.unk_word.is_some() && self.params.unk_score.is_finite()
    }

    fn score_word(&self, state: &LmState, word: usize) -> (LmState, f32) {
        match (self.lm, self.lexicon.word(word)) {
            (Some(lm), Some(text)) => lm.score(state, text),
            _ => (state.clone(), 0.0),
        }
    }

    fn reconstruct(&self, beam: &Beam, arena: &[Trace], t_max: usize) -> RawHypothesis {
        let mut tokens = Vec::new();
        let mut timesteps = Vec::new();
        let mut cursor = beam.trace;
        while cursor != 0 {
            let trace = arena[cursor];
            tokens.push(trace.token);
            timesteps.push(trace.frame);
            cursor = trace.parent;
        }
        // Leading sentinel is the arena root itself.
        tokens.push(arena[0].token);
        timesteps.push(arena[0].frame);
        tokens.reverse();
        timesteps.reverse();
        // Trailing sentinel.
        tokens.push(self.params.blank);
        timesteps.push(t_max.saturating_sub(1));

        RawHypothesis {
            tokens,
            timesteps,
            words: beam.words.clone(),
            score: beam.score,
        }
    }
}

fn push_candidate(
    next: &mut Vec<Beam>,
    merge: &mut HashMap<MergeKey, usize>,
    log_add: bool,
    beam: Beam,
) {
    let key = MergeKey {
        lex: beam.lex,
        last_token: beam.last_token,
        prev_blank: beam.prev_blank,
        lm_state: beam.lm_state.clone(),
    };
    match merge.entry(key) {
        std::collections::hash_map::Entry::Occupied(slot) => {
            let existing = &mut next[*slot.get()];
            if log_add {
                let combined = log_add_exp(existing.score, beam.score);
                if beam.score > existing.score {
                    *existing = beam;
                }
                existing.score = combined;
            } else if beam.score > existing.score {
                *existing = beam;
            }
        }
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(next.len());
            next.push(beam);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_add_exp_matches_naive() {
        let naive = |a: f32, b: f32| ((a.exp()) + (b.exp())).ln();
        for (a, b) in [(-1.0f32, -2.0f32), (-3.5, -3.5), (0.0, -10.0)] {
            assert!((log_add_exp(a, b) - naive(a, b)).abs() < 1e-5);
        }
        assert_eq!(log_add_exp(-1.0, f32::NEG_INFINITY), -1.0);
    }
}
