//! Model scoring wrappers over loaded ONNX sessions.
//!
//! Both scorers are stateless from the caller's perspective: `score` takes a
//! prepared input and returns a probability in [0, 1]. The traits exist so
//! the orchestrator and tests can substitute counting or failing models
//! without touching ONNX.

use crate::error::PipelineError;
use crate::featurizer::SequenceTensor;
use crate::models::loader::LoadedArtifact;
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Gradient-boosted tree model: fixed-width feature vector in, probability out.
pub trait TreeModel: Send + Sync {
    fn score(&self, features: &[f32]) -> Result<f64, PipelineError>;
}

/// Sequence model: time-ordered tensor in, probability out.
pub trait SequenceModel: Send + Sync {
    fn score(&self, tensor: &SequenceTensor) -> Result<f64, PipelineError>;
}

/// Tree scorer backed by an ONNX session.
pub struct OnnxTreeScorer {
    artifact: Mutex<LoadedArtifact>,
}

impl OnnxTreeScorer {
    pub fn new(artifact: LoadedArtifact) -> Self {
        Self {
            artifact: Mutex::new(artifact),
        }
    }
}

impl TreeModel for OnnxTreeScorer {
    fn score(&self, features: &[f32]) -> Result<f64, PipelineError> {
        let mut artifact = self
            .artifact
            .lock()
            .map_err(|_| PipelineError::ModelUnavailable("tree model lock poisoned".to_string()))?;

        let shape = vec![1_i64, features.len() as i64];
        run_session(&mut artifact, shape, features.to_vec())
    }
}

/// Sequence scorer backed by an ONNX session.
pub struct OnnxSequenceScorer {
    artifact: Mutex<LoadedArtifact>,
}

impl OnnxSequenceScorer {
    pub fn new(artifact: LoadedArtifact) -> Self {
        Self {
            artifact: Mutex::new(artifact),
        }
    }
}

impl SequenceModel for OnnxSequenceScorer {
    fn score(&self, tensor: &SequenceTensor) -> Result<f64, PipelineError> {
        let mut artifact = self.artifact.lock().map_err(|_| {
            PipelineError::ModelUnavailable("sequence model lock poisoned".to_string())
        })?;

        let shape = tensor.shape().to_vec();
        run_session(&mut artifact, shape, tensor.data.clone())
    }
}

/// Run one inference call and extract the positive-class probability.
fn run_session(
    artifact: &mut LoadedArtifact,
    shape: Vec<i64>,
    data: Vec<f32>,
) -> Result<f64, PipelineError> {
    use ort::value::Tensor;

    let input_tensor = Tensor::from_array((shape, data)).map_err(|e| {
        PipelineError::ModelUnavailable(format!(
            "{}: failed to create input tensor: {e}",
            artifact.name
        ))
    })?;

    let model_name = artifact.name.clone();
    let output_name = artifact.output_name.clone();
    let input_name = artifact.input_name.clone();

    let outputs = artifact
        .session
        .run(ort::inputs![&input_name => input_tensor])
        .map_err(|e| {
            PipelineError::ModelUnavailable(format!("{model_name}: inference failed: {e}"))
        })?;

    extract_probability(&outputs, &output_name, &model_name)
}

/// Extract the positive-class probability from model output.
/// Handles tensor outputs (XGBoost, sigmoid heads) and seq(map) outputs
/// (some tree-model ONNX exports).
fn extract_probability(
    outputs: &ort::session::SessionOutputs,
    output_name: &str,
    model_name: &str,
) -> Result<f64, PipelineError> {
    // First, try the named probability output
    if let Some(output) = outputs.get(output_name) {
        let dtype = output.dtype();

        if let Ok(tensor) = output.try_extract_tensor::<f32>() {
            let (shape, data) = tensor;
            let prob = positive_class_probability(&shape, data);
            debug!(model = %model_name, prob = prob, "Extracted from tensor");
            return Ok(prob);
        }

        if DynSequenceValueType::can_downcast(&dtype) {
            if let Ok(prob) = extract_from_sequence_map(output, model_name) {
                return Ok(prob);
            }
        }
    }

    // Fallback: iterate all outputs and try extraction
    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }

        let dtype = output.dtype();

        if let Ok(tensor) = output.try_extract_tensor::<f32>() {
            let (shape, data) = tensor;
            let prob = positive_class_probability(&shape, data);
            debug!(model = %model_name, output = %name, prob = prob, "Extracted from tensor (fallback)");
            return Ok(prob);
        }

        if DynSequenceValueType::can_downcast(&dtype) {
            if let Ok(prob) = extract_from_sequence_map(&output, model_name) {
                return Ok(prob);
            }
        }
    }

    warn!(model = %model_name, "Could not extract probability from any output");
    Err(PipelineError::ScoringAnomaly(format!(
        "{model_name}: no probability output found"
    )))
}

/// Extract probability from seq(map(int64, float)) format
fn extract_from_sequence_map(
    output: &ort::value::DynValue,
    model_name: &str,
) -> Result<f64, PipelineError> {
    let allocator = Allocator::default();

    let sequence = output.downcast_ref::<DynSequenceValueType>().map_err(|e| {
        PipelineError::ScoringAnomaly(format!("{model_name}: failed to downcast to sequence: {e}"))
    })?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| {
            PipelineError::ScoringAnomaly(format!("{model_name}: sequence extraction failed: {e}"))
        })?;

    if maps.is_empty() {
        return Err(PipelineError::ScoringAnomaly(format!(
            "{model_name}: empty output sequence"
        )));
    }

    // Batch size is always 1; read class probabilities from the first map
    let kv_pairs = maps[0].try_extract_key_values::<i64, f32>().map_err(|e| {
        PipelineError::ScoringAnomaly(format!("{model_name}: map extraction failed: {e}"))
    })?;

    for (class_id, prob) in &kv_pairs {
        if *class_id == 1 {
            debug!(model = %model_name, prob = *prob, "Extracted from seq(map)");
            return Ok(*prob as f64);
        }
    }

    for (class_id, prob) in &kv_pairs {
        if *class_id == 0 {
            return Ok(1.0 - *prob as f64);
        }
    }

    Err(PipelineError::ScoringAnomaly(format!(
        "{model_name}: no class probability in output map"
    )))
}

/// Extract the positive-class probability from tensor data
fn positive_class_probability(shape: &ort::tensor::Shape, data: &[f32]) -> f64 {
    let dims: Vec<i64> = shape.iter().copied().collect();

    if dims.len() == 2 {
        let num_classes = dims[1] as usize;
        if num_classes >= 2 {
            // [batch, num_classes] - positive class is index 1
            return data[1] as f64;
        } else if num_classes == 1 {
            // [batch, 1] - single sigmoid probability
            return data[0] as f64;
        }
    } else if dims.len() == 1 {
        let num_classes = dims[0] as usize;
        if num_classes >= 2 {
            return data[1] as f64;
        } else if num_classes == 1 {
            return data[0] as f64;
        }
    }

    // Fallback: last value
    data.last().map(|&v| v as f64).unwrap_or(0.5)
}
