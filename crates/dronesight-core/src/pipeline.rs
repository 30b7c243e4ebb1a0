//! Capture analysis pipeline: detect → identify → resolve.
//!
//! Each stage is a single remote call bounded by its own timeout. The
//! pipeline stops at the first stage that cannot produce input for the next
//! one and reports why as an [`Analysis`]; it never returns an error.

use crate::client::FaceApiError;
use crate::service::{FaceService, IdentifyOptions};
use crate::types::{DetectedFace, Person};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detect,
    Identify,
    Resolve,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Detect => "detect",
            Stage::Identify => "identify",
            Stage::Resolve => "resolve",
        })
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} timed out after {}ms", .after.as_millis())]
    Timeout { stage: Stage, after: Duration },
    #[error("{stage}: {source}")]
    Api {
        stage: Stage,
        #[source]
        source: FaceApiError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Timeout { stage, .. } | PipelineError::Api { stage, .. } => *stage,
        }
    }
}

/// Outcome of analysing one captured image.
#[derive(Debug)]
pub enum Analysis {
    /// Detect returned no faces, or the detect call itself failed.
    NoFaceDetected { cause: Option<PipelineError> },
    /// At least one face, but no candidate for the first one.
    Unidentified { faces: Vec<DetectedFace> },
    /// The first face matched an enrolled person.
    Identified {
        faces: Vec<DetectedFace>,
        person: Person,
        confidence: f32,
    },
    /// Identify or resolve failed after faces were found.
    Failed {
        faces: Vec<DetectedFace>,
        error: PipelineError,
    },
}

impl Analysis {
    /// Faces found by the detect stage.
    pub fn faces(&self) -> &[DetectedFace] {
        match self {
            Analysis::NoFaceDetected { .. } => &[],
            Analysis::Unidentified { faces }
            | Analysis::Identified { faces, .. }
            | Analysis::Failed { faces, .. } => faces,
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, Analysis::Identified { .. })
    }
}

/// Runs the three-stage face analysis against a [`FaceService`].
#[derive(Clone)]
pub struct FacePipeline {
    service: Arc<dyn FaceService>,
    options: IdentifyOptions,
    stage_timeout: Duration,
}

impl FacePipeline {
    pub fn new(service: Arc<dyn FaceService>, options: IdentifyOptions) -> Self {
        Self {
            service,
            options,
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Analyse a JPEG-encoded capture.
    pub async fn run(&self, jpeg: Vec<u8>) -> Analysis {
        let faces = match self.stage(Stage::Detect, self.service.detect(jpeg)).await {
            Ok(faces) => faces,
            Err(error) => {
                tracing::warn!(%error, "detect failed");
                return Analysis::NoFaceDetected { cause: Some(error) };
            }
        };

        let Some(first) = faces.first() else {
            tracing::info!("no face detected");
            return Analysis::NoFaceDetected { cause: None };
        };
        let face_id = first.face_id;
        tracing::info!(count = faces.len(), %face_id, "faces detected");

        let results = match self
            .stage(Stage::Identify, self.service.identify(&[face_id], &self.options))
            .await
        {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!(%error, "identify failed");
                return Analysis::Failed { faces, error };
            }
        };

        let candidate = results
            .iter()
            .find(|r| r.face_id == face_id)
            .and_then(|r| r.candidates.first())
            .copied();
        let Some(candidate) = candidate else {
            tracing::info!(%face_id, "no candidate above threshold");
            return Analysis::Unidentified { faces };
        };

        let lookup = self
            .service
            .person(&self.options.person_group_id, candidate.person_id);
        match self.stage(Stage::Resolve, lookup).await {
            Ok(person) => {
                tracing::info!(
                    person_id = %person.person_id,
                    name = %person.name,
                    confidence = candidate.confidence,
                    "face identified"
                );
                Analysis::Identified {
                    faces,
                    person,
                    confidence: candidate.confidence,
                }
            }
            Err(error) => {
                tracing::warn!(%error, person_id = %candidate.person_id, "person lookup failed");
                Analysis::Failed { faces, error }
            }
        }
    }

    async fn stage<T, F>(&self, stage: Stage, call: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, FaceApiError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.stage_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(PipelineError::Api { stage, source }),
            Err(_) => Err(PipelineError::Timeout {
                stage,
                after: self.stage_timeout,
            }),
        };
        tracing::debug!(
            %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "stage finished"
        );
        result
    }
}
