//! End-to-end recognition stream.
//!
//! Ties the feature extractor, window processor, and optional sentence
//! corrector together behind a push-driven API: feed one optional landmark
//! frame per video frame, collect incremental [`RecognitionResult`]s, and
//! drain the tail with [`finalize`](RecognitionStream::finalize). Results
//! accumulate in frame order for downstream subtitle writers.

use std::sync::Arc;

use crate::corrector::SentenceCorrector;
use crate::decoder::CtcDecoder;
use crate::features::FeatureExtractor;
use crate::landmarks::LandmarkFrame;
use crate::model::SequenceModel;
use crate::window::{RecognitionResult, WindowProcessor};

/// One recognition stream over a single speaker's video.
///
/// Streams are single-owner; run independent videos on separate instances.
/// The decoder, model, and corrector handles are shared and read-only or
/// internally synchronized.
pub struct RecognitionStream {
    extractor: FeatureExtractor,
    processor: WindowProcessor,
    corrector: Option<Arc<SentenceCorrector>>,
    prev: Option<LandmarkFrame>,
    prev2: Option<LandmarkFrame>,
    results: Vec<RecognitionResult>,
}

impl RecognitionStream {
    pub fn new(decoder: Arc<CtcDecoder>, model: Arc<dyn SequenceModel + Send + Sync>) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            processor: WindowProcessor::new(decoder, model),
            corrector: None,
            prev: None,
            prev2: None,
            results: Vec::new(),
        }
    }

    /// Attach a sentence corrector; decoded phonemes will be rendered into
    /// `french_sentence` on every result.
    pub fn with_corrector(mut self, corrector: Arc<SentenceCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    /// Feed the landmarks of the next video frame. `None` marks a frame
    /// where detection failed; it is counted and dropped. Returns a result
    /// whenever a window commit produced a new decode.
    pub fn push_landmarks(&mut self, frame: Option<&LandmarkFrame>) -> Option<RecognitionResult> {
        let features = frame.and_then(|current| {
            self.extractor
                .extract(current, self.prev.as_ref(), self.prev2.as_ref())
        });
        self.prev2 = self.prev.take();
        self.prev = frame.cloned();

        if !self.processor.push_frame(features) {
            return None;
        }

        let mut result = self.processor.process_window();
        if result.is_empty() {
            return None;
        }
        self.apply_correction(&mut result);
        self.results.push(result.clone());
        Some(result)
    }

    /// Drain the stream tail after the last frame.
    pub fn finalize(&mut self) -> Option<RecognitionResult> {
        let mut result = self.processor.finalize();
        if result.is_empty() {
            return None;
        }
        self.apply_correction(&mut result);
        self.results.push(result.clone());
        Some(result)
    }

    /// All results so far, ordered by frame number.
    pub fn results(&self) -> &[RecognitionResult] {
        &self.results
    }

    /// Reset for a new stream, keeping the shared handles.
    pub fn reset(&mut self) {
        self.processor.reset();
        self.prev = None;
        self.prev2 = None;
        self.results.clear();
    }

    pub fn total_frames_seen(&self) -> usize {
        self.processor.total_frames_seen()
    }

    pub fn valid_frame_count(&self) -> usize {
        self.processor.valid_frame_count()
    }

    pub fn dropped_frame_count(&self) -> usize {
        self.processor.dropped_frame_count()
    }

    pub fn chunks_processed(&self) -> usize {
        self.processor.chunks_processed()
    }

    fn apply_correction(&self, result: &mut RecognitionResult) {
        if let Some(corrector) = &self.corrector {
            if !result.phonemes.is_empty() {
                result.french_sentence = corrector.correct(&result.phonemes);
            }
        }
    }
}
