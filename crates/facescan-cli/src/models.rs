use crate::config::Config;
use anyhow::{Context, Result};
use facescan_core::{
    AttributeAnalyzer, AttributeModelPaths, CascadeDetector, Classifier, OnnxAttributeModel, Pipeline,
};
use std::sync::Arc;

/// Which optional stages a command needs.
#[derive(Debug, Clone, Copy)]
pub struct Needs {
    pub eyes: bool,
    pub attributes: bool,
}

/// Load classifiers and models named by `config` and build a pipeline.
///
/// The face cascade is mandatory. A missing eye cascade only disables eye
/// detection; the attribute models are loaded only when `needs.attributes`.
pub fn build_pipeline(config: &Config, needs: Needs) -> Result<Pipeline> {
    let face_path = config.face_cascade_path();
    let faces: Arc<dyn Classifier> = Arc::new(
        CascadeDetector::load("face", &face_path.to_string_lossy())
            .with_context(|| format!("loading face cascade {}", face_path.display()))?,
    );

    let eyes: Option<Arc<dyn Classifier>> = if needs.eyes {
        let eye_path = config.eye_cascade_path();
        match CascadeDetector::load("eye", &eye_path.to_string_lossy()) {
            Ok(detector) => Some(Arc::new(detector) as Arc<dyn Classifier>),
            Err(e) => {
                tracing::warn!(error = %e, "eye cascade unavailable, continuing without eye detection");
                None
            }
        }
    } else {
        None
    };

    let analyzer = if needs.attributes {
        let optional = |path: std::path::PathBuf| path.exists().then_some(path);
        let paths = AttributeModelPaths {
            emotion: config.emotion_model_path(),
            gender_age: optional(config.gender_age_model_path()),
            race: optional(config.race_model_path()),
        };
        let model = OnnxAttributeModel::load(faces.clone(), &paths)
            .context("loading attribute models")?
            .with_detection_parameters(config.detection_params());
        tracing::info!(features = ?model.supported_features(), "attribute models ready");
        Some(AttributeAnalyzer::new(Arc::new(model)))
    } else {
        None
    };

    Ok(Pipeline::new(faces, eyes, analyzer)?.with_render_options(config.render.clone()))
}
