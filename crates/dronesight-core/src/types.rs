//! Face API wire types.
//!
//! Field names follow the service's camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Service-generated identifier for a detected face (valid ~24h on the service).
pub type FaceId = Uuid;

/// Identifier of an enrolled person within a person group.
pub type PersonId = Uuid;

/// Face bounding box in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRectangle {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

/// One face returned by the detect call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    pub face_id: FaceId,
    pub face_rectangle: FaceRectangle,
    /// Named landmark points (e.g. "pupilLeft"), present when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_landmarks: Option<BTreeMap<String, LandmarkPoint>>,
}

/// A possible identity for a face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub person_id: PersonId,
    /// Similarity confidence in [0, 1].
    pub confidence: f32,
}

/// Identify result for one submitted face, candidates ordered best-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResult {
    pub face_id: FaceId,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Body of an identify request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest<'a> {
    pub person_group_id: &'a str,
    pub face_ids: &'a [FaceId],
    pub max_num_of_candidates_returned: u32,
    pub confidence_threshold: f32,
}

/// An enrolled person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub person_id: PersonId,
    pub name: String,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub persisted_face_ids: Vec<Uuid>,
}

/// Body for creating a person group or a person.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedEntity<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePersonResponse {
    pub person_id: PersonId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddFaceResponse {
    pub persisted_face_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TrainingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrainingState::NotStarted => "not started",
            TrainingState::Running => "running",
            TrainingState::Succeeded => "succeeded",
            TrainingState::Failed => "failed",
        })
    }
}

/// Person-group training status.
///
/// Timestamps are kept as the service sent them; use the accessors for parsed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStatus {
    pub status: TrainingState,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub last_action_date_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TrainingStatus {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.created_date_time.as_deref()?)
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.last_action_date_time.as_deref()?)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Error payload the service returns with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceErrorBody {
    pub error: ServiceErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
