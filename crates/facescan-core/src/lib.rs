//! facescan-core — Face detection, region composition, annotation and
//! attribute analysis.
//!
//! Detection runs a multi-scale cascade sweep over luminance buffers; eye
//! sub-detection runs on cropped face regions and is translated back into
//! the parent frame. Attribute analysis goes through a pluggable inference
//! capability (ONNX Runtime models by default) with a degrading fallback.

pub mod analysis;
pub mod buffer;
pub mod cascade;
pub mod composer;
pub mod detector;
mod glyphs;
pub mod labels;
pub mod onnx;
pub mod pipeline;
pub mod render;
pub mod types;

pub use analysis::{AnalysisOutcome, AttributeAnalyzer, AttributeInference, InferenceError};
pub use buffer::{BufferError, PixelBuffer};
pub use cascade::HaarCascade;
pub use composer::ComposeError;
pub use detector::{CascadeDetector, Classifier, DetectorError};
pub use labels::{Emotion, Gender, Race};
pub use onnx::{AttributeModelPaths, OnnxAttributeModel};
pub use pipeline::{
    AnalysisMode, CancelToken, FrameSource, Pipeline, PipelineError, PipelineOutput, Stage,
};
pub use render::{AnnotatedBuffer, Annotation, RenderOptions};
pub use types::{
    AttributeResult, DetectionParameters, FaceDetection, Feature, Offset, Region, Scored,
};
