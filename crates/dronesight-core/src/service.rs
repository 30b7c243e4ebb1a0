//! The remote calls the analysis pipeline depends on.

use crate::client::FaceApiError;
use crate::types::{DetectedFace, FaceId, IdentifyResult, Person, PersonId};
use async_trait::async_trait;

/// Where and how strictly to identify faces.
#[derive(Debug, Clone)]
pub struct IdentifyOptions {
    pub person_group_id: String,
    pub max_candidates: u32,
    /// Minimum confidence for a candidate to be returned, in [0, 1].
    pub confidence_threshold: f32,
}

impl IdentifyOptions {
    pub fn new(person_group_id: impl Into<String>) -> Self {
        Self {
            person_group_id: person_group_id.into(),
            max_candidates: 1,
            confidence_threshold: 0.7,
        }
    }
}

/// Detect → identify → resolve operations of a face-recognition service.
#[async_trait]
pub trait FaceService: Send + Sync {
    /// Detect faces in a JPEG-encoded image.
    async fn detect(&self, jpeg: Vec<u8>) -> Result<Vec<DetectedFace>, FaceApiError>;

    /// Identify faces against a person group.
    async fn identify(
        &self,
        face_ids: &[FaceId],
        options: &IdentifyOptions,
    ) -> Result<Vec<IdentifyResult>, FaceApiError>;

    /// Fetch a person record by id.
    async fn person(&self, person_group_id: &str, person_id: PersonId) -> Result<Person, FaceApiError>;
}
