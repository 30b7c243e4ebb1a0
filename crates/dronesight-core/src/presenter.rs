//! Human-readable status line for an [`Analysis`].

use crate::pipeline::{Analysis, Stage};

pub const NO_FACE: &str = "No Face Detected";
pub const UNIDENTIFIED: &str = "Face Detected: Unidentified Person";

/// Render an analysis outcome as a single status line.
pub fn status_line(analysis: &Analysis) -> String {
    match analysis {
        Analysis::NoFaceDetected { .. } => NO_FACE.to_string(),
        Analysis::Unidentified { .. } => UNIDENTIFIED.to_string(),
        Analysis::Identified {
            person, confidence, ..
        } => format!(
            "Face Detected: {} ({}%)",
            person.name,
            (confidence * 100.0).round() as u32
        ),
        Analysis::Failed { error, .. } => {
            let stage = match error.stage() {
                Stage::Detect => "Detect",
                Stage::Identify => "Identify",
                Stage::Resolve => "Lookup",
            };
            format!("{stage} failed: {error}")
        }
    }
}
