//! Attribute analysis with graceful degradation.
//!
//! [`AttributeAnalyzer`] asks the inference capability for the full feature
//! set first, retries with a reduced set on failure, and finally reports a
//! degraded outcome instead of propagating the error.

use crate::buffer::{BufferError, PixelBuffer};
use crate::composer::ComposeError;
use crate::detector::DetectorError;
use crate::types::{AttributeResult, Feature};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("no model loaded for feature '{0}'")]
    FeatureUnavailable(Feature),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// Estimates per-face attributes for a whole frame.
pub trait AttributeInference: Send + Sync {
    fn name(&self) -> &str;

    /// Locate faces in `buffer` and estimate `features` for each.
    ///
    /// With `enforce_detection` set, a frame without faces is an error;
    /// otherwise the whole frame is analysed as a single face.
    fn infer_attributes(
        &self,
        buffer: &PixelBuffer,
        features: &[Feature],
        enforce_detection: bool,
    ) -> Result<Vec<AttributeResult>, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisState {
    FullAttempt,
    ReducedAttempt,
    Degraded,
}

/// Result of [`AttributeAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The full feature set succeeded.
    Full(Vec<AttributeResult>),
    /// Only the reduced feature set succeeded; other attributes are absent.
    Reduced(Vec<AttributeResult>),
    /// Both attempts failed.
    Degraded,
}

impl AnalysisOutcome {
    pub fn results(&self) -> &[AttributeResult] {
        match self {
            AnalysisOutcome::Full(r) | AnalysisOutcome::Reduced(r) => r,
            AnalysisOutcome::Degraded => &[],
        }
    }

    pub fn into_results(self) -> Vec<AttributeResult> {
        match self {
            AnalysisOutcome::Full(r) | AnalysisOutcome::Reduced(r) => r,
            AnalysisOutcome::Degraded => Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisOutcome::Degraded)
    }
}

pub struct AttributeAnalyzer {
    inference: Arc<dyn AttributeInference>,
    full: Vec<Feature>,
    reduced: Vec<Feature>,
}

impl AttributeAnalyzer {
    /// Full set is every feature, reduced set is emotion only.
    pub fn new(inference: Arc<dyn AttributeInference>) -> Self {
        Self {
            inference,
            full: Feature::ALL.to_vec(),
            reduced: vec![Feature::Emotion],
        }
    }

    pub fn with_feature_sets(mut self, full: Vec<Feature>, reduced: Vec<Feature>) -> Self {
        self.full = full;
        self.reduced = reduced;
        self
    }

    pub fn inference_name(&self) -> &str {
        self.inference.name()
    }

    /// Never fails; inference errors are logged and folded into the outcome.
    pub fn analyze(&self, buffer: &PixelBuffer) -> AnalysisOutcome {
        let mut state = AnalysisState::FullAttempt;
        loop {
            state = match state {
                AnalysisState::FullAttempt => match self.attempt(buffer, &self.full) {
                    Ok(results) => return AnalysisOutcome::Full(results),
                    Err(e) => {
                        tracing::warn!(
                            inference = self.inference.name(),
                            error = %e,
                            "full attribute analysis failed, retrying with reduced set"
                        );
                        AnalysisState::ReducedAttempt
                    }
                },
                AnalysisState::ReducedAttempt => match self.attempt(buffer, &self.reduced) {
                    Ok(results) => return AnalysisOutcome::Reduced(results),
                    Err(e) => {
                        tracing::warn!(
                            inference = self.inference.name(),
                            error = %e,
                            "reduced attribute analysis failed"
                        );
                        AnalysisState::Degraded
                    }
                },
                AnalysisState::Degraded => return AnalysisOutcome::Degraded,
            };
        }
    }

    fn attempt(
        &self,
        buffer: &PixelBuffer,
        features: &[Feature],
    ) -> Result<Vec<AttributeResult>, InferenceError> {
        let mut results = self.inference.infer_attributes(buffer, features, false)?;
        for result in &mut results {
            result.retain_features(features);
        }
        Ok(results)
    }
}
