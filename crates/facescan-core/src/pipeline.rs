//! Frame pipeline: detect faces, locate eyes inside each face, analyse
//! attributes, render the overlay.
//!
//! Classifiers are loaded once and shared; a [`Pipeline`] is built at
//! startup and refuses to start if a required classifier is missing.

use crate::analysis::{AnalysisOutcome, AttributeAnalyzer};
use crate::buffer::{BufferError, PixelBuffer};
use crate::composer::{self, ComposeError};
use crate::detector::{self, Classifier, DetectorError};
use crate::render::{self, AnnotatedBuffer, Annotation, RenderOptions};
use crate::types::{AttributeResult, DetectionParameters, FaceDetection, Region};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// What a pipeline run computes per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Face and eye rectangles.
    #[default]
    Geometric,
    /// Attribute estimates only.
    Attributes,
    /// Geometry plus attributes, annotated in one overlay.
    Combined,
}

impl AnalysisMode {
    fn wants_geometry(self) -> bool {
        matches!(self, AnalysisMode::Geometric | AnalysisMode::Combined)
    }

    fn wants_attributes(self) -> bool {
        matches!(self, AnalysisMode::Attributes | AnalysisMode::Combined)
    }
}

/// Pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Startup,
    Source,
    Detect,
    Compose,
    Analyze,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Startup => "startup",
            Stage::Source => "source",
            Stage::Detect => "detect",
            Stage::Compose => "compose",
            Stage::Analyze => "analyze",
            Stage::Render => "render",
        })
    }
}

#[derive(Error, Debug)]
pub enum FailureKind {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("frame source: {0}")]
    Source(String),
    #[error("attribute analysis requested but no analyzer is configured")]
    AnalyzerMissing,
}

#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: FailureKind,
}

impl PipelineError {
    fn at(stage: Stage, source: impl Into<FailureKind>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub annotated: AnnotatedBuffer,
    /// Detected faces with eyes, in frame coordinates. Empty in attributes-only mode.
    pub faces: Vec<FaceDetection>,
    /// Present whenever the mode asked for attributes.
    pub analysis: Option<AnalysisOutcome>,
}

impl PipelineOutput {
    pub fn attributes(&self) -> &[AttributeResult] {
        self.analysis.as_ref().map(AnalysisOutcome::results).unwrap_or(&[])
    }
}

/// A pull-based source of frames (camera, folder, in-memory list).
pub trait FrameSource {
    type Error: fmt::Display;

    /// Next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Option<Result<PixelBuffer, Self::Error>>;
}

/// Adapts any iterator of frame results into a [`FrameSource`].
pub struct IterSource<I>(pub I);

impl<I, E> FrameSource for IterSource<I>
where
    I: Iterator<Item = Result<PixelBuffer, E>>,
    E: fmt::Display,
{
    type Error = E;

    fn next_frame(&mut self) -> Option<Result<PixelBuffer, E>> {
        self.0.next()
    }
}

/// Cooperative cancellation flag shared between a stream and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    faces: Arc<dyn Classifier>,
    eyes: Option<Arc<dyn Classifier>>,
    analyzer: Option<AttributeAnalyzer>,
    render_options: RenderOptions,
    eye_params: DetectionParameters,
}

impl Pipeline {
    /// Build a pipeline around pre-loaded classifiers.
    ///
    /// Fails at [`Stage::Startup`] if any supplied classifier reports it is
    /// not loaded. Without an eye classifier faces are reported with no eyes.
    pub fn new(
        faces: Arc<dyn Classifier>,
        eyes: Option<Arc<dyn Classifier>>,
        analyzer: Option<AttributeAnalyzer>,
    ) -> Result<Self, PipelineError> {
        for classifier in std::iter::once(&faces).chain(eyes.as_ref()) {
            if !classifier.is_loaded() {
                return Err(PipelineError::at(
                    Stage::Startup,
                    DetectorError::ClassifierUnavailable(format!("{} is not loaded", classifier.name())),
                ));
            }
        }

        tracing::info!(
            faces = faces.name(),
            eyes = eyes.as_ref().map(|e| e.name()),
            analyzer = analyzer.as_ref().map(|a| a.inference_name()),
            "pipeline ready"
        );

        Ok(Self {
            faces,
            eyes,
            analyzer,
            render_options: RenderOptions::default(),
            eye_params: DetectionParameters::EYES,
        })
    }

    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Detect faces and, for each, eyes within the face crop.
    ///
    /// Faces are returned in classifier order; eyes are translated into
    /// frame coordinates.
    pub fn detect_faces(
        &self,
        buffer: &PixelBuffer,
        params: &DetectionParameters,
    ) -> Result<Vec<FaceDetection>, PipelineError> {
        let regions = detector::detect(buffer, self.faces.as_ref(), params)
            .map_err(|e| PipelineError::at(Stage::Detect, e))?;

        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            let eyes = match &self.eyes {
                Some(eyes) => self.locate_eyes(buffer, &region, eyes.as_ref())?,
                None => Vec::new(),
            };
            faces.push(FaceDetection { region, eyes });
        }
        Ok(faces)
    }

    fn locate_eyes(
        &self,
        buffer: &PixelBuffer,
        face: &Region,
        eyes: &dyn Classifier,
    ) -> Result<Vec<Region>, PipelineError> {
        let Some(clipped) = composer::intersect(face, buffer.width(), buffer.height()) else {
            return Ok(Vec::new());
        };
        let crop = composer::crop(buffer, &clipped).map_err(|e| PipelineError::at(Stage::Compose, e))?;
        let local = detector::detect(&crop, eyes, &self.eye_params)
            .map_err(|e| PipelineError::at(Stage::Detect, e))?;
        composer::translate(&local, clipped.offset()).map_err(|e| PipelineError::at(Stage::Compose, e))
    }

    /// Process a single frame. The input buffer is never modified.
    pub fn run_once(
        &self,
        buffer: &PixelBuffer,
        params: &DetectionParameters,
        mode: AnalysisMode,
    ) -> Result<PipelineOutput, PipelineError> {
        buffer.ensure_supported().map_err(|e| PipelineError::at(Stage::Source, e))?;

        let faces = if mode.wants_geometry() {
            self.detect_faces(buffer, params)?
        } else {
            Vec::new()
        };

        let analysis = if mode.wants_attributes() {
            let analyzer = self
                .analyzer
                .as_ref()
                .ok_or_else(|| PipelineError::at(Stage::Analyze, FailureKind::AnalyzerMissing))?;
            Some(analyzer.analyze(buffer))
        } else {
            None
        };

        let mut annotations: Vec<Annotation> = faces.iter().map(Annotation::from).collect();
        if let Some(outcome) = &analysis {
            if mode == AnalysisMode::Combined {
                // Attribute labels replace the plain "Face" label on the matching face.
                for (i, result) in outcome.results().iter().enumerate() {
                    let labelled = Annotation::from_attributes(i, result);
                    match annotations.iter_mut().find(|a| a.region == result.region) {
                        Some(existing) => existing.labels = labelled.labels,
                        None => annotations.push(labelled),
                    }
                }
            } else {
                annotations.extend(
                    outcome
                        .results()
                        .iter()
                        .enumerate()
                        .map(|(i, r)| Annotation::from_attributes(i, r)),
                );
            }
        }

        let annotated = render::render(buffer, &annotations, &self.render_options)
            .map_err(|e| PipelineError::at(Stage::Render, e))?;

        tracing::debug!(
            ?mode,
            faces = faces.len(),
            attributes = analysis.as_ref().map(|a| a.results().len()),
            degraded = analysis.as_ref().map(AnalysisOutcome::is_degraded),
            skipped = annotated.skipped(),
            "frame processed"
        );

        Ok(PipelineOutput {
            annotated,
            faces,
            analysis,
        })
    }

    /// Lazily process frames from `source` until it is exhausted or `cancel` is set.
    ///
    /// Cancellation is checked before each frame is pulled, so at most the
    /// frame in flight completes after `cancel()`.
    pub fn run_stream<'a, S: FrameSource>(
        &'a self,
        source: S,
        params: DetectionParameters,
        mode: AnalysisMode,
        cancel: CancelToken,
    ) -> PipelineStream<'a, S> {
        PipelineStream {
            pipeline: self,
            source,
            params,
            mode,
            cancel,
            frames: 0,
        }
    }
}

/// Iterator returned by [`Pipeline::run_stream`].
pub struct PipelineStream<'a, S> {
    pipeline: &'a Pipeline,
    source: S,
    params: DetectionParameters,
    mode: AnalysisMode,
    cancel: CancelToken,
    frames: u64,
}

impl<S> PipelineStream<'_, S> {
    /// Frames pulled from the source so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl<S: FrameSource> Iterator for PipelineStream<'_, S> {
    type Item = Result<PipelineOutput, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            tracing::info!(frames = self.frames, "stream cancelled");
            return None;
        }
        let frame = match self.source.next_frame()? {
            Ok(frame) => frame,
            Err(e) => {
                self.frames += 1;
                return Some(Err(PipelineError::at(Stage::Source, FailureKind::Source(e.to_string()))));
            }
        };
        self.frames += 1;
        Some(self.pipeline.run_once(&frame, &self.params, self.mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Region>);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn detect_regions(&self, _gray: &PixelBuffer, _p: &DetectionParameters) -> Result<Vec<Region>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    struct Unloaded;

    impl Classifier for Unloaded {
        fn name(&self) -> &str {
            "unloaded"
        }
        fn is_loaded(&self) -> bool {
            false
        }
        fn detect_regions(&self, _gray: &PixelBuffer, _p: &DetectionParameters) -> Result<Vec<Region>, DetectorError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_startup_refuses_unloaded_classifier() {
        let err = Pipeline::new(Arc::new(Unloaded), None, None).err().unwrap();
        assert_eq!(err.stage, Stage::Startup);
        assert!(matches!(err.source, FailureKind::Detector(DetectorError::ClassifierUnavailable(_))));

        let err = Pipeline::new(Arc::new(Fixed(vec![])), Some(Arc::new(Unloaded)), None).err().unwrap();
        assert_eq!(err.stage, Stage::Startup);
    }

    #[test]
    fn test_eyes_translated_into_frame() {
        let faces = Arc::new(Fixed(vec![Region::new(40, 30, 60, 60)]));
        let eyes = Arc::new(Fixed(vec![Region::new(10, 12, 14, 14)]));
        let pipeline = Pipeline::new(faces, Some(eyes), None).unwrap();
        let frame = PixelBuffer::filled(160, 120, &[90]).unwrap();
        let out = pipeline.run_once(&frame, &DetectionParameters::default(), AnalysisMode::Geometric).unwrap();
        assert_eq!(out.faces[0].eyes, vec![Region::new(50, 42, 14, 14)]);
        assert!(out.analysis.is_none());
    }

    #[test]
    fn test_attributes_without_analyzer() {
        let pipeline = Pipeline::new(Arc::new(Fixed(vec![])), None, None).unwrap();
        let frame = PixelBuffer::filled(8, 8, &[0]).unwrap();
        let err = pipeline
            .run_once(&frame, &DetectionParameters::default(), AnalysisMode::Attributes)
            .err()
            .unwrap();
        assert_eq!(err.stage, Stage::Analyze);
        assert!(matches!(err.source, FailureKind::AnalyzerMissing));
    }

    #[test]
    fn test_rejects_rgba_frame() {
        let pipeline = Pipeline::new(Arc::new(Fixed(vec![])), None, None).unwrap();
        let frame = PixelBuffer::filled(4, 4, &[0, 0, 0, 255]).unwrap();
        let err = pipeline
            .run_once(&frame, &DetectionParameters::default(), AnalysisMode::Geometric)
            .err()
            .unwrap();
        assert_eq!(err.stage, Stage::Source);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Compose.to_string(), "compose");
        let err = PipelineError::at(Stage::Source, FailureKind::Source("device gone".into()));
        assert_eq!(err.to_string(), "source stage failed: frame source: device gone");
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }
}
