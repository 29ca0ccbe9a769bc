//! Multi-scale region detection.
//!
//! [`detect`] is the entry point used by the pipeline: it normalises the
//! buffer to luminance, validates parameters and the classifier handle, and
//! enforces the minimum size on whatever the classifier returns.
//! [`CascadeDetector`] is the sliding-window implementation of the
//! [`Classifier`] capability.

use crate::buffer::{BufferError, PixelBuffer};
use crate::cascade::{HaarCascade, IntegralImage, WindowClassifier};
use crate::composer;
use crate::types::{DetectionParameters, Region};
use rayon::prelude::*;
use thiserror::Error;

/// Edge tolerance used when grouping raw window hits.
const GROUP_EPS: f32 = 0.2;
/// Window step (in scaled pixels) for pyramid levels up to this scale.
const FINE_STEP_MAX_SCALE: f32 = 2.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("invalid detection parameters: {0}")]
    InvalidParameters(String),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// A pre-loaded region classifier (face or eye detector).
///
/// Implementations are shared read-only between pipelines, hence `Send + Sync`.
pub trait Classifier: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Whether the underlying model is loaded and usable.
    fn is_loaded(&self) -> bool {
        true
    }

    /// Find candidate regions in a single-channel buffer.
    fn detect_regions(
        &self,
        gray: &PixelBuffer,
        params: &DetectionParameters,
    ) -> Result<Vec<Region>, DetectorError>;
}

/// Detect regions in `buffer` with `classifier`.
///
/// Three-channel buffers are converted to luminance first. Every returned
/// region satisfies `params.min_size`; order is the classifier's.
pub fn detect(
    buffer: &PixelBuffer,
    classifier: &dyn Classifier,
    params: &DetectionParameters,
) -> Result<Vec<Region>, DetectorError> {
    validate_params(params)?;
    let gray = buffer.to_luminance()?;

    if !classifier.is_loaded() {
        return Err(DetectorError::ClassifierUnavailable(format!(
            "{} is not loaded",
            classifier.name()
        )));
    }

    let raw = classifier.detect_regions(&gray, params)?;
    let raw_count = raw.len();
    let regions: Vec<Region> = raw.into_iter().filter(|r| params.accepts(r)).collect();

    tracing::debug!(
        classifier = classifier.name(),
        width = gray.width(),
        height = gray.height(),
        raw = raw_count,
        kept = regions.len(),
        "detect"
    );

    Ok(regions)
}

fn validate_params(params: &DetectionParameters) -> Result<(), DetectorError> {
    if !params.scale_factor.is_finite() || params.scale_factor < DetectionParameters::MIN_SCALE_FACTOR {
        return Err(DetectorError::InvalidParameters(format!(
            "scale_factor must be >= {}, got {}",
            DetectionParameters::MIN_SCALE_FACTOR,
            params.scale_factor
        )));
    }
    if params.min_neighbors < 1 {
        return Err(DetectorError::InvalidParameters(
            "min_neighbors must be >= 1".into(),
        ));
    }
    Ok(())
}

/// Sliding-window detector over an image pyramid.
pub struct CascadeDetector<W> {
    name: String,
    window: W,
}

impl<W: WindowClassifier> CascadeDetector<W> {
    pub fn new(name: impl Into<String>, window: W) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }

    /// Scales at which the base window still fits the buffer and meets `min_size`.
    fn pyramid(&self, width: u32, height: u32, params: &DetectionParameters) -> Vec<f32> {
        let (bw, bh) = self.window.window_size();
        let mut scales = Vec::new();
        let mut scale = 1.0f32;
        loop {
            let ww = (bw as f32 * scale).round() as u32;
            let wh = (bh as f32 * scale).round() as u32;
            if ww > width || wh > height {
                break;
            }
            if ww >= params.min_size.0 && wh >= params.min_size.1 {
                scales.push(scale);
            }
            scale *= params.scale_factor;
        }
        scales
    }

    /// Raw positive windows at one pyramid level, in raster order.
    fn scan_level(&self, integral: &IntegralImage, scale: f32) -> Vec<Region> {
        let (bw, bh) = self.window.window_size();
        let ww = (bw as f32 * scale).round() as u32;
        let wh = (bh as f32 * scale).round() as u32;
        let step = if scale <= FINE_STEP_MAX_SCALE {
            (2.0 * scale).round()
        } else {
            scale.round()
        }
        .max(1.0) as usize;

        let mut hits = Vec::new();
        for y in (0..=integral.height() - wh).step_by(step) {
            for x in (0..=integral.width() - ww).step_by(step) {
                if self.window.evaluate(integral, x, y, scale) {
                    hits.push(Region::new(x as i32, y as i32, ww as i32, wh as i32));
                }
            }
        }
        hits
    }
}

impl CascadeDetector<HaarCascade> {
    /// Load a Haar cascade model and wrap it in a detector.
    pub fn load(name: impl Into<String>, path: &str) -> Result<Self, DetectorError> {
        Ok(Self::new(name, HaarCascade::load(path)?))
    }
}

impl<W: WindowClassifier> Classifier for CascadeDetector<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect_regions(
        &self,
        gray: &PixelBuffer,
        params: &DetectionParameters,
    ) -> Result<Vec<Region>, DetectorError> {
        if gray.channels() != 1 {
            return Err(BufferError::InvalidBufferFormat {
                channels: gray.channels(),
            }
            .into());
        }

        let integral = if self.window.needs_tilted() {
            IntegralImage::with_tilted(gray.data(), gray.width(), gray.height())
        } else {
            IntegralImage::new(gray.data(), gray.width(), gray.height())
        };
        let scales = self.pyramid(gray.width(), gray.height(), params);

        // Levels run in parallel; collect() keeps level order.
        let per_level: Vec<Vec<Region>> = scales
            .par_iter()
            .map(|&scale| self.scan_level(&integral, scale))
            .collect();
        let candidates: Vec<Region> = per_level.into_iter().flatten().collect();

        let grouped = composer::group_rectangles(&candidates, params.min_neighbors, GROUP_EPS);

        tracing::trace!(
            detector = %self.name,
            levels = scales.len(),
            windows = candidates.len(),
            grouped = grouped.len(),
            "pyramid sweep"
        );

        Ok(grouped.into_iter().filter(|r| params.accepts(r)).collect())
    }
}
