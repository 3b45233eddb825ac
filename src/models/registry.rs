//! Active model version tracking and atomic hot-swap.
//!
//! A `ModelVersion` bundles both scorers with their metadata so a request
//! resolves the pair exactly once and scores the whole session against one
//! consistent version. Activating a new version swaps the shared reference;
//! in-flight requests keep their pinned `Arc` until they finish.

use crate::config::ModelsConfig;
use crate::error::PipelineError;
use crate::models::loader::ModelLoader;
use crate::models::scorer::{OnnxSequenceScorer, OnnxTreeScorer, SequenceModel, TreeModel};
use crate::types::verdict::ModelVersionInfo;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::info;

/// One consistent pair of loaded scorers plus metadata.
pub struct ModelVersion {
    pub version_id: String,
    pub loaded_at: DateTime<Utc>,
    pub xgb_artifact: String,
    pub lstm_artifact: String,
    pub tree: Arc<dyn TreeModel>,
    pub sequence: Arc<dyn SequenceModel>,
}

impl std::fmt::Debug for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelVersion")
            .field("version_id", &self.version_id)
            .field("loaded_at", &self.loaded_at)
            .field("xgb_artifact", &self.xgb_artifact)
            .field("lstm_artifact", &self.lstm_artifact)
            .finish_non_exhaustive()
    }
}

impl ModelVersion {
    pub fn new(
        version_id: impl Into<String>,
        xgb_artifact: impl Into<String>,
        lstm_artifact: impl Into<String>,
        tree: Arc<dyn TreeModel>,
        sequence: Arc<dyn SequenceModel>,
    ) -> Self {
        Self {
            version_id: version_id.into(),
            loaded_at: Utc::now(),
            xgb_artifact: xgb_artifact.into(),
            lstm_artifact: lstm_artifact.into(),
            tree,
            sequence,
        }
    }

    /// Load both ONNX artifacts named in the configuration.
    pub fn load(config: &ModelsConfig) -> anyhow::Result<Self> {
        let loader = ModelLoader::with_threads(config.onnx_threads)?;
        let tree_artifact = loader.load_artifact(&config.xgb_artifact, "xgboost")?;
        let sequence_artifact = loader.load_artifact(&config.lstm_artifact, "lstm")?;

        Ok(Self::new(
            config.version_id.clone(),
            config.xgb_artifact.clone(),
            config.lstm_artifact.clone(),
            Arc::new(OnnxTreeScorer::new(tree_artifact)),
            Arc::new(OnnxSequenceScorer::new(sequence_artifact)),
        ))
    }

    pub fn info(&self) -> ModelVersionInfo {
        ModelVersionInfo {
            version_id: self.version_id.clone(),
            loaded_at: self.loaded_at,
            xgb_artifact: self.xgb_artifact.clone(),
            lstm_artifact: self.lstm_artifact.clone(),
        }
    }
}

/// Holds the active model version behind a reference cell.
///
/// Readers dereference once per request; scoring fails closed when no
/// version has been activated.
pub struct ModelRegistry {
    active: RwLock<Option<Arc<ModelVersion>>>,
}

impl ModelRegistry {
    /// Registry with no active version; all scoring is rejected until
    /// `activate` is called.
    pub fn empty() -> Self {
        Self {
            active: RwLock::new(None),
        }
    }

    pub fn with_active(version: ModelVersion) -> Self {
        Self {
            active: RwLock::new(Some(Arc::new(version))),
        }
    }

    /// Swap in a new version. In-flight requests holding the previous
    /// `Arc` finish against the version they started with.
    pub fn activate(&self, version: ModelVersion) {
        let version_id = version.version_id.clone();
        let mut active = self.active.write().expect("model registry lock poisoned");
        let previous = active.replace(Arc::new(version));

        info!(
            version = %version_id,
            previous = previous.as_ref().map(|v| v.version_id.as_str()).unwrap_or("none"),
            "Model version activated"
        );
    }

    /// Resolve the active version, pinning it for the caller's request.
    pub fn active(&self) -> Result<Arc<ModelVersion>, PipelineError> {
        self.active
            .read()
            .expect("model registry lock poisoned")
            .clone()
            .ok_or_else(|| PipelineError::ModelUnavailable("no active model version".to_string()))
    }

    pub fn info(&self) -> Option<ModelVersionInfo> {
        self.active
            .read()
            .expect("model registry lock poisoned")
            .as_ref()
            .map(|v| v.info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::featurizer::SequenceTensor;

    struct FixedTree(f64);
    impl TreeModel for FixedTree {
        fn score(&self, _features: &[f32]) -> Result<f64, PipelineError> {
            Ok(self.0)
        }
    }

    struct FixedSequence(f64);
    impl SequenceModel for FixedSequence {
        fn score(&self, _tensor: &SequenceTensor) -> Result<f64, PipelineError> {
            Ok(self.0)
        }
    }

    fn version(id: &str) -> ModelVersion {
        ModelVersion::new(
            id,
            "models/xgboost.onnx",
            "models/lstm.onnx",
            Arc::new(FixedTree(0.7)),
            Arc::new(FixedSequence(0.3)),
        )
    }

    #[test]
    fn test_empty_registry_fails_closed() {
        let registry = ModelRegistry::empty();
        let err = registry.active().unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
        assert!(registry.info().is_none());
    }

    #[test]
    fn test_activate_and_resolve() {
        let registry = ModelRegistry::empty();
        registry.activate(version("v1"));

        let active = registry.active().unwrap();
        assert_eq!(active.version_id, "v1");
        assert_eq!(registry.info().unwrap().version_id, "v1");
    }

    #[test]
    fn test_swap_does_not_disturb_pinned_version() {
        let registry = ModelRegistry::with_active(version("v1"));

        let pinned = registry.active().unwrap();
        registry.activate(version("v2"));

        // The pinned reference still scores against v1 end to end
        assert_eq!(pinned.version_id, "v1");
        assert_eq!(pinned.tree.score(&[0.0]).unwrap(), 0.7);
        assert_eq!(registry.active().unwrap().version_id, "v2");
    }
}
