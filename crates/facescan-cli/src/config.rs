use anyhow::{Context, Result};
use facescan_core::{DetectionParameters, RenderOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration.
///
/// Layering, lowest to highest: built-in defaults, the TOML file named by
/// `FACESCAN_CONFIG`, `FACESCAN_*` environment variables, command-line flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing cascade and ONNX model files.
    pub model_dir: PathBuf,
    pub face_cascade: String,
    pub eye_cascade: String,
    pub emotion_model: String,
    pub gender_age_model: String,
    pub race_model: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    /// Minimum face side in pixels.
    pub min_size: u32,
    /// Where `stream --save` and `folder` write annotated frames.
    pub output_dir: PathBuf,
    pub render: RenderOptions,
}

impl Default for Config {
    fn default() -> Self {
        let face = DetectionParameters::default();
        Self {
            model_dir: default_model_dir(),
            face_cascade: "haarcascade_frontalface_default.xml".into(),
            eye_cascade: "haarcascade_eye.xml".into(),
            emotion_model: "emotion-ferplus-8.onnx".into(),
            gender_age_model: "genderage.onnx".into(),
            race_model: "race.onnx".into(),
            camera_device: "/dev/video0".into(),
            camera_width: 640,
            camera_height: 480,
            scale_factor: face.scale_factor,
            min_neighbors: face.min_neighbors,
            min_size: face.min_size.0,
            output_dir: PathBuf::from("captures"),
            render: RenderOptions::default(),
        }
    }
}

impl Config {
    /// Load from `FACESCAN_CONFIG` (if set) and `FACESCAN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("FACESCAN_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(v) = lookup("FACESCAN_MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESCAN_CAMERA_DEVICE") {
            config.camera_device = v;
        }
        if let Some(v) = lookup("FACESCAN_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        config.scale_factor = parse_or(&lookup, "FACESCAN_SCALE_FACTOR", config.scale_factor);
        config.min_neighbors = parse_or(&lookup, "FACESCAN_MIN_NEIGHBORS", config.min_neighbors);
        config.min_size = parse_or(&lookup, "FACESCAN_MIN_SIZE", config.min_size);
        config.camera_width = parse_or(&lookup, "FACESCAN_CAMERA_WIDTH", config.camera_width);
        config.camera_height = parse_or(&lookup, "FACESCAN_CAMERA_HEIGHT", config.camera_height);

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Face detection parameters from the configured defaults.
    pub fn detection_params(&self) -> DetectionParameters {
        DetectionParameters::default()
            .with_scale_factor(self.scale_factor)
            .with_min_neighbors(self.min_neighbors)
            .with_min_size(self.min_size, self.min_size)
    }

    pub fn face_cascade_path(&self) -> PathBuf {
        self.model_dir.join(&self.face_cascade)
    }

    pub fn eye_cascade_path(&self) -> PathBuf {
        self.model_dir.join(&self.eye_cascade)
    }

    pub fn emotion_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.emotion_model)
    }

    pub fn gender_age_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.gender_age_model)
    }

    pub fn race_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.race_model)
    }
}

/// `$XDG_DATA_HOME/facescan/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facescan/models")
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
