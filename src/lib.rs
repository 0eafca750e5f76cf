//! # cuedspeech-rs
//!
//! A Rust library for streaming recognition of French *Cued Speech*: it
//! turns per-frame face/hand landmark tuples into committed phoneme text
//! and, optionally, a corrected French sentence.
//!
//! ## Pipeline
//!
//! - **Feature extraction**: a 3-frame sliding window of landmark tuples
//!   becomes a fixed 33-dimensional geometric feature vector per frame.
//! - **Overlap-save inference**: fixed 100-frame windows are fed to an
//!   opaque ONNX sequence model; only the central slice of each window's
//!   logits is committed, so every committed row was scored with
//!   bidirectional context.
//! - **CTC decoding**: the accumulated logit matrix is re-decoded after
//!   each commit by a lexicon-constrained beam search over a pronunciation
//!   trie, scored by an n-gram language model.
//! - **Sentence correction**: decoded phonemes are mapped through homophone
//!   classes and the best French word sequence is picked by a second,
//!   word-level n-gram model.
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cuedspeech_rs::{
//!     CtcDecoder, DecoderConfig, OnnxSequenceModel, RecognitionStream, SequenceModel,
//! };
//!
//! let mut config = DecoderConfig::default();
//! config.tokens_path = "models/tokens.txt".into();
//! config.lexicon_path = "models/lexicon.txt".into();
//! config.lm_path = Some("models/phoneme_lm.arpa".into());
//!
//! let mut decoder = CtcDecoder::new(config);
//! decoder.initialize()?;
//!
//! let mut model = OnnxSequenceModel::new();
//! model.load("models/acoustic.onnx".as_ref())?;
//!
//! let mut stream = RecognitionStream::new(Arc::new(decoder), Arc::new(model));
//! for landmarks in detector_frames {
//!     if let Some(result) = stream.push_landmarks(landmarks.as_ref()) {
//!         println!("[{}] {}", result.frame_number, result.phonemes.join(" "));
//!     }
//! }
//! if let Some(result) = stream.finalize() {
//!     println!("final: {}", result.phonemes.join(" "));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Concurrency
//!
//! A [`CtcDecoder`] is read-only after initialization and safe to share
//! across streams. The [`OnnxSequenceModel`] serializes inference behind an
//! internal mutex, so sharing one adapter simply queues concurrent windows.
//! Each [`RecognitionStream`] is single-owner.

pub mod config;
pub mod corrector;
pub mod decoder;
pub mod error;
pub mod features;
pub mod landmarks;
pub mod lm;
pub mod model;
pub mod phonemes;
pub mod stream;
pub mod window;

pub use config::DecoderConfig;
pub use corrector::{CorrectorError, HomophoneTable, SentenceCorrector};
pub use decoder::{CtcDecoder, CtcHypothesis, DecoderError};
pub use error::{clear_last_error, last_error};
pub use features::{FeatureExtractor, FrameFeatures};
pub use landmarks::{Landmark, LandmarkFrame};
pub use lm::{LmError, LmState, NgramModel};
pub use model::{ModelError, OnnxSequenceModel, SequenceModel};
pub use stream::RecognitionStream;
pub use window::{
    RecognitionResult, WindowProcessor, COMMIT_SIZE, LEFT_CONTEXT, RIGHT_CONTEXT, WINDOW_SIZE,
};
