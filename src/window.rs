//! Overlap-save window processor.
//!
//! Streams valid feature frames into fixed-size windows, commits only the
//! central slice of each window's logits (so every committed row was scored
//! with bidirectional context), and re-decodes the accumulated matrix after
//! each commit. No committed row is ever recomputed; after `finalize` the
//! committed length equals the number of valid frames consumed, up to
//! model-reported truncation.

use std::sync::Arc;

use ndarray::{concatenate, Array2, Axis};

use crate::decoder::CtcDecoder;
use crate::error::set_last_error;
use crate::features::FrameFeatures;
use crate::model::SequenceModel;

/// Frames per inference window.
pub const WINDOW_SIZE: usize = 100;
/// Rows committed from the center of each steady-state window.
pub const COMMIT_SIZE: usize = 50;
/// Context frames to the left of the commit region.
pub const LEFT_CONTEXT: usize = 25;
/// Context frames to the right of the commit region.
pub const RIGHT_CONTEXT: usize = 25;

/// One incremental recognition update.
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    /// Number of valid frames consumed when this result was produced.
    pub frame_number: usize,
    /// Best-hypothesis phoneme strings; empty when nothing was decodable.
    pub phonemes: Vec<String>,
    /// Corrected French sentence; empty until a corrector fills it in.
    pub french_sentence: String,
    /// Score of the best hypothesis, 0 when none.
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn is_empty(&self) -> bool {
        self.phonemes.is_empty()
    }
}

/// Streams features through overlap-save windows into the decoder.
///
/// Single-owner state: `push_frame`, `process_window`, and `finalize` must
/// be called in order from one logical caller. The decoder and model handles
/// are shared and internally synchronized.
pub struct WindowProcessor {
    decoder: Arc<CtcDecoder>,
    model: Arc<dyn SequenceModel + Send + Sync>,

    valid_features: Vec<FrameFeatures>,
    all_logits: Vec<Array2<f32>>,
    chunk_idx: usize,
    next_window_needed: usize,
    frame_count: usize,
    effective_vocab_size: usize,
    total_frames_seen: usize,
    chunks_processed: usize,
}

impl WindowProcessor {
    pub fn new(decoder: Arc<CtcDecoder>, model: Arc<dyn SequenceModel + Send + Sync>) -> Self {
        let effective_vocab_size = decoder.vocab_size();
        Self {
            decoder,
            model,
            valid_features: Vec::new(),
            all_logits: Vec::new(),
            chunk_idx: 0,
            next_window_needed: WINDOW_SIZE,
            frame_count: 0,
            effective_vocab_size,
            total_frames_seen: 0,
            chunks_processed: 0,
        }
    }

    /// Clear all streaming state for a new stream.
    pub fn reset(&mut self) {
        self.valid_features.clear();
        self.all_logits.clear();
        self.chunk_idx = 0;
        self.next_window_needed = WINDOW_SIZE;
        self.frame_count = 0;
        self.effective_vocab_size = self.decoder.vocab_size();
        self.total_frames_seen = 0;
        self.chunks_processed = 0;
    }

    /// Push one frame. Invalid frames (`None` or non-finite) are counted
    /// and dropped. Returns true when a window is ready for
    /// [`process_window`](Self::process_window).
    pub fn push_frame(&mut self, features: Option<FrameFeatures>) -> bool {
        self.total_frames_seen += 1;

        let Some(features) = features else {
            return false;
        };
        if !features.is_valid() {
            return false;
        }

        self.valid_features.push(features);
        self.frame_count += 1;
        self.valid_features.len() >= self.next_window_needed
    }

    /// Run inference on the due window, commit its central slice, and
    /// re-decode the accumulated logits.
    pub fn process_window(&mut self) -> RecognitionResult {
        let mut result = RecognitionResult {
            frame_number: self.frame_count,
            ..RecognitionResult::default()
        };

        if !self.model.is_loaded() {
            return result;
        }
        let num_valid = self.valid_features.len();
        if num_valid < self.next_window_needed {
            return result;
        }

        let (window_start, window_end, commit_start, commit_end) = if self.chunk_idx == 0 {
            self.next_window_needed = LEFT_CONTEXT + WINDOW_SIZE;
            (
                0,
                (WINDOW_SIZE - 1).min(num_valid - 1),
                0,
                (COMMIT_SIZE - 1).min(num_valid - 1),
            )
        } else if self.chunk_idx == 1 {
            self.next_window_needed = COMMIT_SIZE + WINDOW_SIZE;
            (
                LEFT_CONTEXT,
                (LEFT_CONTEXT + WINDOW_SIZE - 1).min(num_valid - 1),
                COMMIT_SIZE,
                (COMMIT_SIZE + LEFT_CONTEXT - 1).min(num_valid - 1),
            )
        } else {
            let window_start = COMMIT_SIZE * (self.chunk_idx - 1);
            let commit_start = window_start + LEFT_CONTEXT;
            self.next_window_needed = COMMIT_SIZE * self.chunk_idx + WINDOW_SIZE;
            (
                window_start,
                (window_start + WINDOW_SIZE - 1).min(num_valid - 1),
                commit_start,
                (commit_start + COMMIT_SIZE - 1).min(num_valid - 1),
            )
        };

        log::debug!(
            "[valid frames: {}] chunk {}: window=[{}, {}], commit=[{}, {}]",
            num_valid,
            self.chunk_idx,
            window_start,
            window_end,
            commit_start,
            commit_end
        );

        let committed =
            self.process_single_window(window_start, window_end, commit_start, commit_end);
        self.chunk_idx += 1;

        let Some(committed) = committed else {
            return result;
        };
        self.accept_slice(committed);
        self.decode_accumulated(&mut result);
        result
    }

    /// Drain the tail of the stream after the final frame was pushed.
    pub fn finalize(&mut self) -> RecognitionResult {
        let mut result = RecognitionResult {
            frame_number: self.frame_count,
            ..RecognitionResult::default()
        };

        if !self.model.is_loaded() {
            return result;
        }
        let num_valid = self.valid_features.len();
        if num_valid == 0 {
            return result;
        }

        let frames_committed = match self.chunk_idx {
            0 => 0,
            1 => COMMIT_SIZE,
            k => COMMIT_SIZE + LEFT_CONTEXT + (k - 2) * COMMIT_SIZE,
        };
        if frames_committed >= num_valid {
            return result;
        }

        let (window_start, commit_start) = match self.chunk_idx {
            0 => (0, 0),
            1 => (LEFT_CONTEXT, COMMIT_SIZE),
            k => {
                let window_start = COMMIT_SIZE * (k - 1);
                (window_start, window_start + LEFT_CONTEXT)
            }
        };
        let window_end = num_valid - 1;
        let commit_end = num_valid - 1;

        if window_end + 1 < window_start + LEFT_CONTEXT {
            return result;
        }
        if self.chunk_idx == 0 && num_valid < WINDOW_SIZE {
            log::warn!(
                "finalizing a short stream ({} frames) on a single zero-padded window",
                num_valid
            );
        }

        let committed =
            self.process_single_window(window_start, window_end, commit_start, commit_end);
        let Some(committed) = committed else {
            return result;
        };
        self.accept_slice(committed);
        self.decode_accumulated(&mut result);
        result
    }

    /// Number of valid frames buffered so far.
    pub fn valid_frame_count(&self) -> usize {
        self.valid_features.len()
    }

    /// All frames pushed, valid or not.
    pub fn total_frames_seen(&self) -> usize {
        self.total_frames_seen
    }

    /// Frames dropped as invalid.
    pub fn dropped_frame_count(&self) -> usize {
        self.total_frames_seen - self.valid_features.len()
    }

    /// Windows whose commit produced a decode.
    pub fn chunks_processed(&self) -> usize {
        self.chunks_processed
    }

    /// Committed rows across all accepted slices.
    pub fn committed_rows(&self) -> usize {
        self.all_logits.iter().map(|m| m.nrows()).sum()
    }

    /// Run the model on `[window_start, window_end]` (zero-padded to
    /// `WINDOW_SIZE`) and slice out the commit rows.
    fn process_single_window(
        &mut self,
        window_start: usize,
        window_end: usize,
        commit_start: usize,
        commit_end: usize,
    ) -> Option<Array2<f32>> {
        if window_end < window_start {
            return None;
        }

        let window: Vec<FrameFeatures> =
            self.valid_features[window_start..=window_end].to_vec();

        let logits = match self.model.infer(&window, WINDOW_SIZE) {
            Ok(logits) => logits,
            Err(err) => {
                set_last_error(format!("window {} inference failed: {}", self.chunk_idx, err));
                return None;
            }
        };

        let seq_len = logits.nrows();
        let vocab = logits.ncols();
        if seq_len == 0 || vocab == 0 {
            return None;
        }

        // Map commit bounds from absolute frame indices into the model's
        // output rows, clamped to what it actually produced.
        let commit_start_rel = commit_start.saturating_sub(window_start);
        let commit_end_rel = (commit_end - window_start).min(seq_len - 1);
        if commit_start_rel > commit_end_rel {
            return None;
        }

        Some(
            logits
                .slice(ndarray::s![commit_start_rel..=commit_end_rel, ..])
                .to_owned(),
        )
    }

    fn accept_slice(&mut self, slice: Array2<f32>) {
        let vocab = slice.ncols();
        if vocab > 0 {
            if self.effective_vocab_size == 0 {
                self.effective_vocab_size = vocab;
            } else if self.effective_vocab_size != vocab {
                log::warn!(
                    "model vocab size changed between windows: {} -> {}",
                    self.effective_vocab_size,
                    vocab
                );
                self.effective_vocab_size = vocab;
            }
        }
        self.all_logits.push(slice);
    }

    /// Concatenate every committed slice and re-decode the whole matrix.
    fn decode_accumulated(&mut self, result: &mut RecognitionResult) {
        // Slices are assembled at the width the model actually produced;
        // the alphabet is consulted only when resolving token indices.
        let vocab = self.effective_vocab_size;
        if vocab == 0 {
            return;
        }

        let views: Vec<_> = self
            .all_logits
            .iter()
            .filter(|m| m.ncols() == vocab)
            .map(|m| m.view())
            .collect();
        if views.is_empty() {
            return;
        }
        let full = match concatenate(Axis(0), &views) {
            Ok(full) => full,
            Err(err) => {
                set_last_error(format!("failed to assemble accumulated logits: {err}"));
                return;
            }
        };

        log::debug!(
            "accumulated logits: [{} x {}] after chunk {}",
            full.nrows(),
            full.ncols(),
            self.chunk_idx
        );

        let hypotheses = self.decoder.decode(full.view());
        if let Some(best) = hypotheses.first() {
            result.phonemes = self.decoder.idxs_to_tokens(&best.tokens);
            result.confidence = best.score;
            self.chunks_processed += 1;
            log::debug!(
                "decoded after chunk {}: {}",
                self.chunk_idx,
                result.phonemes.join(" ")
            );
        }
    }
}
