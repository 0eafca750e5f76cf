//! ONNX-backed acoustic sequence model.
//!
//! The model is opaque: three parallel input tensors (`lips` `[1, T, 8]`,
//! `hand_shape` `[1, T, 7]`, `hand_position` `[1, T, 18]`) and one output
//! `[1, T', V]` of logits. `T'` and `V` are observed from the first
//! invocation. A mutex serializes inference so one adapter can be shared
//! across streams.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array2, Array3};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::features::FrameFeatures;

const LIPS_DIM: usize = 8;
const HAND_SHAPE_DIM: usize = 7;
const HAND_POSITION_DIM: usize = 18;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("model load failed: {0}")]
    LoadFailed(String),
    #[error("model shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model not loaded")]
    NotLoaded,
}

/// Contract of the acoustic model as seen by the window processor.
///
/// `infer` pads or truncates its input to exactly `window_size` frames
/// (missing frames become the zero frame) and returns the `[T' x V]` logit
/// matrix. Implementations serialize inference internally, so one instance
/// may be shared across streams behind an `Arc`.
pub trait SequenceModel {
    fn load(&mut self, model_path: &Path) -> Result<(), ModelError>;
    fn infer(&self, frames: &[FrameFeatures], window_size: usize) -> Result<Array2<f32>, ModelError>;
    /// Vocabulary size of the most recent output; 0 before the first call.
    fn vocab_size(&self) -> usize;
    /// Time dimension of the most recent output; 0 before the first call.
    fn last_sequence_length(&self) -> usize;
    fn is_loaded(&self) -> bool;
}

struct LoadedSession {
    session: Session,
    lips_input: String,
    hand_shape_input: String,
    hand_position_input: String,
    output_name: String,
    vocab_size: usize,
    last_sequence_length: usize,
}

/// [`SequenceModel`] backed by an ONNX Runtime session.
pub struct OnnxSequenceModel {
    inner: Mutex<Option<LoadedSession>>,
}

impl OnnxSequenceModel {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Convenience constructor: create and load in one step.
    pub fn from_file(model_path: &Path) -> Result<Self, ModelError> {
        let mut model = Self::new();
        model.load(model_path)?;
        Ok(model)
    }

    fn init_session(path: &Path) -> Result<Session, ModelError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .commit_from_file(path)?;

        for input in &session.inputs {
            log::info!("Model input: name={}, type={:?}", input.name, input.input_type);
        }
        for output in &session.outputs {
            log::info!(
                "Model output: name={}, type={:?}",
                output.name,
                output.output_type
            );
        }
        Ok(session)
    }

    /// Resolve an input by name, falling back to its position.
    fn resolve_input(names: &[String], wanted: &str, position: usize) -> String {
        names
            .iter()
            .find(|n| n.as_str() == wanted)
            .cloned()
            .unwrap_or_else(|| names[position].clone())
    }
}

impl Default for OnnxSequenceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn load(&mut self, model_path: &Path) -> Result<(), ModelError> {
        if !model_path.exists() {
            return Err(ModelError::LoadFailed(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        log::info!("Loading acoustic model from {:?}...", model_path);
        let session = Self::init_session(model_path)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        if input_names.len() != 3 {
            return Err(ModelError::ShapeMismatch(format!(
                "model must have exactly 3 inputs (lips, hand_shape, hand_position), found {}",
                input_names.len()
            )));
        }
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelError::ShapeMismatch("model has no outputs".to_string()))?;

        let lips_input = Self::resolve_input(&input_names, "lips", 0);
        let hand_shape_input = Self::resolve_input(&input_names, "hand_shape", 1);
        let hand_position_input = Self::resolve_input(&input_names, "hand_position", 2);

        log::info!(
            "Acoustic model I/O: lips='{}', hand_shape='{}', hand_position='{}', output='{}'",
            lips_input,
            hand_shape_input,
            hand_position_input,
            output_name
        );

        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ModelError::LoadFailed("model mutex poisoned".to_string()))?;
        *guard = Some(LoadedSession {
            session,
            lips_input,
            hand_shape_input,
            hand_position_input,
            output_name,
            vocab_size: 0,
            last_sequence_length: 0,
        });
        Ok(())
    }

    fn infer(&self, frames: &[FrameFeatures], window_size: usize) -> Result<Array2<f32>, ModelError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ModelError::InferenceFailed("model mutex poisoned".to_string()))?;
        let loaded = guard.as_mut().ok_or(ModelError::NotLoaded)?;

        let seq_len = if window_size > 0 {
            window_size
        } else {
            frames.len()
        };
        if seq_len == 0 {
            return Err(ModelError::InferenceFailed("empty window".to_string()));
        }

        let mut lips = Array3::<f32>::zeros((1, seq_len, LIPS_DIM));
        let mut hand_shape = Array3::<f32>::zeros((1, seq_len, HAND_SHAPE_DIM));
        let mut hand_position = Array3::<f32>::zeros((1, seq_len, HAND_POSITION_DIM));
        for (t, frame) in frames.iter().take(seq_len).enumerate() {
            for (d, &v) in frame.lips.iter().enumerate() {
                lips[[0, t, d]] = v;
            }
            for (d, &v) in frame.hand_shape.iter().enumerate() {
                hand_shape[[0, t, d]] = v;
            }
            for (d, &v) in frame.hand_position.iter().enumerate() {
                hand_position[[0, t, d]] = v;
            }
        }

        let lips_dyn = lips.into_dyn();
        let hand_shape_dyn = hand_shape.into_dyn();
        let hand_position_dyn = hand_position.into_dyn();
        let feeds = inputs![
            loaded.lips_input.as_str() => TensorRef::from_array_view(lips_dyn.view())?,
            loaded.hand_shape_input.as_str() => TensorRef::from_array_view(hand_shape_dyn.view())?,
            loaded.hand_position_input.as_str() => TensorRef::from_array_view(hand_position_dyn.view())?,
        ];

        let output_name = loaded.output_name.clone();
        let outputs = loaded.session.run(feeds)?;
        let logits = outputs
            .get(output_name.as_str())
            .ok_or_else(|| {
                ModelError::InferenceFailed(format!("output {:?} missing from results", output_name))
            })?
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|_| {
                ModelError::ShapeMismatch("model output is not rank 3 [1, T', V]".to_string())
            })?;

        drop(outputs);

        let time_steps = logits.shape()[1];
        let vocab_size = logits.shape()[2];
        if time_steps == 0 || vocab_size == 0 {
            return Err(ModelError::ShapeMismatch(format!(
                "model output has degenerate shape [{}, {}, {}]",
                logits.shape()[0],
                time_steps,
                vocab_size
            )));
        }

        loaded.last_sequence_length = time_steps;
        loaded.vocab_size = vocab_size;

        let logits_2d = logits.into_shape_with_order((time_steps, vocab_size))?;
        Ok(logits_2d)
    }

    fn vocab_size(&self) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|l| l.vocab_size))
            .unwrap_or(0)
    }

    fn last_sequence_length(&self) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.as_ref().map(|l| l.last_sequence_length))
            .unwrap_or(0)
    }

    fn is_loaded(&self) -> bool {
        self.inner.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_model_reports_state() {
        let model = OnnxSequenceModel::new();
        assert!(!model.is_loaded());
        assert_eq!(model.vocab_size(), 0);
        assert_eq!(model.last_sequence_length(), 0);
        assert!(matches!(
            model.infer(&[FrameFeatures::zeroed()], 4),
            Err(ModelError::NotLoaded)
        ));
    }

    #[test]
    fn test_missing_file_is_load_failed() {
        let mut model = OnnxSequenceModel::new();
        let result = model.load(Path::new("does/not/exist.onnx"));
        assert!(matches!(result, Err(ModelError::LoadFailed(_))));
    }

    #[test]
    fn test_resolve_input_prefers_name_over_position() {
        let names = vec![
            "hand_position".to_string(),
            "lips".to_string(),
            "hand_shape".to_string(),
        ];
        assert_eq!(OnnxSequenceModel::resolve_input(&names, "lips", 0), "lips");
        assert_eq!(
            OnnxSequenceModel::resolve_input(&names, "hand_shape", 1),
            "hand_shape"
        );
        let positional = vec!["in0".to_string(), "in1".to_string(), "in2".to_string()];
        assert_eq!(OnnxSequenceModel::resolve_input(&positional, "lips", 0), "in0");
    }
}
