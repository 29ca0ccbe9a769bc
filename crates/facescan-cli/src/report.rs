//! Human-readable and JSON output for pipeline results.

use facescan_core::{AnalysisOutcome, AttributeResult, FaceDetection, PipelineOutput};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub source: String,
    pub faces: &'a [FaceDetection],
    pub attributes: &'a [AttributeResult],
    /// `full`, `reduced`, `degraded`, or absent when attributes were not requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    /// Regions too small to draw.
    pub skipped: usize,
}

impl<'a> Report<'a> {
    pub fn new(source: impl Into<String>, output: &'a PipelineOutput) -> Self {
        Self {
            source: source.into(),
            faces: &output.faces,
            attributes: output.attributes(),
            outcome: output.analysis.as_ref().map(outcome_name),
            skipped: output.annotated.skipped(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Multi-line summary in the order faces and attributes were reported.
    pub fn details(&self) -> String {
        let mut out = format!("{}\n", self.source);

        if !self.faces.is_empty() || self.outcome.is_none() {
            out.push_str(&format!("  {} face(s) detected\n", self.faces.len()));
        }
        for (i, face) in self.faces.iter().enumerate() {
            let r = face.region;
            out.push_str(&format!(
                "  Face {}: position ({}, {}), size {}x{}, {} eye(s)\n",
                i + 1,
                r.x,
                r.y,
                r.width,
                r.height,
                face.eyes.len()
            ));
        }

        match self.outcome {
            Some("degraded") => out.push_str("  attribute analysis unavailable\n"),
            Some(outcome) => {
                out.push_str(&format!("  attribute analysis: {outcome}\n"));
                for (i, attrs) in self.attributes.iter().enumerate() {
                    out.push_str(&attribute_lines(i, attrs));
                }
            }
            None => {}
        }
        out
    }
}

fn outcome_name(outcome: &AnalysisOutcome) -> &'static str {
    match outcome {
        AnalysisOutcome::Full(_) => "full",
        AnalysisOutcome::Reduced(_) => "reduced",
        AnalysisOutcome::Degraded => "degraded",
    }
}

fn attribute_lines(index: usize, attrs: &AttributeResult) -> String {
    let r = attrs.region;
    let mut out = format!("  Face {} at ({}, {}) {}x{}\n", index + 1, r.x, r.y, r.width, r.height);
    if let Some(age) = attrs.age {
        out.push_str(&format!("    Age: {age}\n"));
    }
    if let Some(g) = &attrs.gender {
        out.push_str(&format!("    Gender: {} ({:.1}%)\n", g.label, g.confidence));
    }
    if let Some(e) = &attrs.emotion {
        out.push_str(&format!("    Emotion: {} ({:.1}%)\n", e.label, e.confidence));
    }
    if let Some(race) = &attrs.race {
        out.push_str(&format!("    Race: {} ({:.1}%)\n", race.label, race.confidence));
    }
    out
}
