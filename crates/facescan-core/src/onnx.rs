//! ONNX Runtime attribute models.
//!
//! Faces are located with a cascade [`Classifier`], cropped, and passed to
//! up to three models:
//!
//! - emotion: FER+ (`emotion-ferplus-8.onnx`), 64×64 grayscale, raw 0–255 input, 8 logits
//! - gender/age: InsightFace genderage, 96×96 RGB, `[female, male, age/100]`
//! - race: 224×224 RGB scaled to 0–1, 6 logits in [`Race::CLASSES`] order
//!
//! Only the emotion model is required; the others are loaded when present.

use crate::analysis::{AttributeInference, InferenceError};
use crate::buffer::PixelBuffer;
use crate::composer;
use crate::detector::{self, Classifier};
use crate::labels::{Emotion, Gender, Race};
use crate::types::{AttributeResult, DetectionParameters, Feature, Region, Scored};
use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const EMOTION_INPUT_SIZE: u32 = 64;
const EMOTION_CLASSES: usize = 8;
const GENDER_AGE_INPUT_SIZE: u32 = 96;
const GENDER_AGE_MEAN: f32 = 127.5;
const GENDER_AGE_STD: f32 = 128.0;
const RACE_INPUT_SIZE: u32 = 224;

/// Model file locations. Optional models are skipped when `None`.
#[derive(Debug, Clone)]
pub struct AttributeModelPaths {
    pub emotion: PathBuf,
    pub gender_age: Option<PathBuf>,
    pub race: Option<PathBuf>,
}

/// Attribute inference backed by ONNX Runtime sessions.
pub struct OnnxAttributeModel {
    locator: Arc<dyn Classifier>,
    params: DetectionParameters,
    emotion: Mutex<Session>,
    gender_age: Option<Mutex<Session>>,
    race: Option<Mutex<Session>>,
}

impl OnnxAttributeModel {
    /// Load the models in `paths`; faces are located with `locator`.
    pub fn load(locator: Arc<dyn Classifier>, paths: &AttributeModelPaths) -> Result<Self, InferenceError> {
        let emotion = Mutex::new(load_session(&paths.emotion, "emotion")?);
        let gender_age = paths
            .gender_age
            .as_deref()
            .map(|p| load_session(p, "gender/age").map(Mutex::new))
            .transpose()?;
        let race = paths
            .race
            .as_deref()
            .map(|p| load_session(p, "race").map(Mutex::new))
            .transpose()?;

        Ok(Self {
            locator,
            params: DetectionParameters::default(),
            emotion,
            gender_age,
            race,
        })
    }

    /// Parameters used when locating faces for analysis.
    pub fn with_detection_parameters(mut self, params: DetectionParameters) -> Self {
        self.params = params;
        self
    }

    /// Features this instance can answer.
    pub fn supported_features(&self) -> Vec<Feature> {
        let mut features = vec![Feature::Emotion];
        if self.gender_age.is_some() {
            features.extend([Feature::Age, Feature::Gender]);
        }
        if self.race.is_some() {
            features.push(Feature::Race);
        }
        features
    }

    fn analyze_face(&self, face: &PixelBuffer, region: Region, features: &[Feature]) -> Result<AttributeResult, InferenceError> {
        let image = face.to_dynamic_image()?;
        let mut result = AttributeResult::empty(region);

        if features.contains(&Feature::Emotion) {
            let gray = image::imageops::resize(
                &image.to_luma8(),
                EMOTION_INPUT_SIZE,
                EMOTION_INPUT_SIZE,
                FilterType::Triangle,
            );
            let logits = run(&self.emotion, &preprocess_emotion(&gray))?;
            if logits.len() != EMOTION_CLASSES {
                return Err(InferenceError::InferenceFailed(format!(
                    "emotion model returned {} values, expected {EMOTION_CLASSES}",
                    logits.len()
                )));
            }
            let (idx, conf) = argmax(&softmax(&logits));
            result.emotion = Some(Scored::new(Emotion::from_ferplus_index(idx), conf * 100.0));
        }

        if features.contains(&Feature::Age) || features.contains(&Feature::Gender) {
            let session = self.gender_age.as_ref().ok_or_else(|| {
                let missing = if features.contains(&Feature::Gender) { Feature::Gender } else { Feature::Age };
                InferenceError::FeatureUnavailable(missing)
            })?;
            let rgb = image::imageops::resize(
                &image.to_rgb8(),
                GENDER_AGE_INPUT_SIZE,
                GENDER_AGE_INPUT_SIZE,
                FilterType::Triangle,
            );
            let out = run(session, &preprocess_rgb(&rgb, GENDER_AGE_MEAN, GENDER_AGE_STD))?;
            let (gender, age) = decode_gender_age(&out)?;
            if features.contains(&Feature::Gender) {
                result.gender = Some(gender);
            }
            if features.contains(&Feature::Age) {
                result.age = Some(age);
            }
        }

        if features.contains(&Feature::Race) {
            let session = self.race.as_ref().ok_or(InferenceError::FeatureUnavailable(Feature::Race))?;
            let rgb = image::imageops::resize(&image.to_rgb8(), RACE_INPUT_SIZE, RACE_INPUT_SIZE, FilterType::Triangle);
            let logits = run(session, &preprocess_rgb(&rgb, 0.0, 255.0))?;
            if logits.len() != Race::CLASSES.len() {
                return Err(InferenceError::InferenceFailed(format!(
                    "race model returned {} values, expected {}",
                    logits.len(),
                    Race::CLASSES.len()
                )));
            }
            let (idx, conf) = argmax(&softmax(&logits));
            result.race = Some(Scored::new(Race::from_index(idx), conf * 100.0));
        }

        Ok(result)
    }
}

impl AttributeInference for OnnxAttributeModel {
    fn name(&self) -> &str {
        "onnx"
    }

    fn infer_attributes(
        &self,
        buffer: &PixelBuffer,
        features: &[Feature],
        enforce_detection: bool,
    ) -> Result<Vec<AttributeResult>, InferenceError> {
        let supported = self.supported_features();
        if let Some(f) = features.iter().find(|f| !supported.contains(f)) {
            return Err(InferenceError::FeatureUnavailable(*f));
        }

        let mut regions = detector::detect(buffer, self.locator.as_ref(), &self.params)?;
        if regions.is_empty() {
            if enforce_detection {
                return Err(InferenceError::NoFaceDetected);
            }
            regions.push(Region::new(0, 0, buffer.width() as i32, buffer.height() as i32));
        }

        let mut results = Vec::with_capacity(regions.len());
        for region in regions {
            let Some(clipped) = composer::intersect(&region, buffer.width(), buffer.height()) else {
                continue;
            };
            let face = composer::crop(buffer, &clipped)?;
            results.push(self.analyze_face(&face, region, features)?);
        }

        tracing::debug!(faces = results.len(), features = ?features, "attribute inference");
        Ok(results)
    }
}

fn load_session(path: &Path, what: &str) -> Result<Session, InferenceError> {
    if !path.exists() {
        return Err(InferenceError::ModelNotFound(path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?;

    tracing::info!(
        path = %path.display(),
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded {what} model"
    );

    Ok(session)
}

/// Run a single-input session and return its first output flattened.
fn run(session: &Mutex<Session>, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
    let mut session = session
        .lock()
        .map_err(|_| InferenceError::InferenceFailed("session lock poisoned".into()))?;
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
    let (_, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::InferenceFailed(format!("output extraction: {e}")))?;
    Ok(data.to_vec())
}

/// FER+ takes unnormalised grey levels in NCHW `[1, 1, 64, 64]`.
fn preprocess_emotion(gray: &GrayImage) -> Array4<f32> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 1, h, w));
    for (x, y, p) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = p[0] as f32;
    }
    tensor
}

/// NCHW RGB tensor with `(v - mean) / std` per channel.
fn preprocess_rgb(rgb: &RgbImage, mean: f32, std: f32) -> Array4<f32> {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, p) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (p[c] as f32 - mean) / std;
        }
    }
    tensor
}

/// `[female_logit, male_logit, age_scale]` to a gender with confidence and an age in years.
fn decode_gender_age(out: &[f32]) -> Result<(Scored<Gender>, u32), InferenceError> {
    let [female, male, age_scale] = out else {
        return Err(InferenceError::InferenceFailed(format!(
            "gender/age model returned {} values, expected 3",
            out.len()
        )));
    };
    let probs = softmax(&[*female, *male]);
    let gender = if male > female {
        Scored::new(Gender::Man, probs[1] * 100.0)
    } else {
        Scored::new(Gender::Woman, probs[0] * 100.0)
    };
    let age = (age_scale * 100.0).round().max(0.0) as u32;
    Ok((gender, age))
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element; first wins on ties.
fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}
