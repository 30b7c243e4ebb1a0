//! HTTP client for the Face API v1.0 REST surface.
//!
//! Every request carries the subscription key header. Non-2xx responses are
//! decoded into [`FaceApiError::Service`] when the body has the service's
//! `{"error": {...}}` shape.

use crate::service::{FaceService, IdentifyOptions};
use crate::types::{
    AddFaceResponse, CreatePersonResponse, DetectedFace, FaceId, IdentifyRequest, IdentifyResult,
    NamedEntity, Person, PersonId, ServiceErrorBody, TrainingStatus,
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const API_PREFIX: &str = "face/v1.0";
const MAX_GROUP_ID_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum FaceApiError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service error (HTTP {status}): {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    #[error("unexpected HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Connection settings for [`FaceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root, e.g. `https://westus.api.cognitive.microsoft.com`.
    pub endpoint: String,
    pub subscription_key: String,
    /// Ask detect to return landmark points.
    pub return_landmarks: bool,
}

/// Face API client.
#[derive(Clone)]
pub struct FaceClient {
    http: reqwest::Client,
    endpoint: String,
    subscription_key: String,
    return_landmarks: bool,
}

impl std::fmt::Debug for FaceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceClient")
            .field("endpoint", &self.endpoint)
            .field("return_landmarks", &self.return_landmarks)
            .finish_non_exhaustive()
    }
}

impl FaceClient {
    /// Build a client. Fails if the endpoint or subscription key is empty.
    pub fn new(config: ClientConfig) -> Result<Self, FaceApiError> {
        let endpoint = config.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(FaceApiError::Config("endpoint is not set".into()));
        }
        if config.subscription_key.trim().is_empty() {
            return Err(FaceApiError::Config("subscription key is not set".into()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("dronesight/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint,
            subscription_key: config.subscription_key.trim().to_string(),
            return_landmarks: config.return_landmarks,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.endpoint)
    }

    /// Send `request` and decode a JSON body from a 2xx response.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FaceApiError> {
        let response = request
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(service_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send `request` and accept any of the listed statuses, ignoring the body.
    async fn send_expecting(
        &self,
        request: RequestBuilder,
        accepted: &[StatusCode],
    ) -> Result<StatusCode, FaceApiError> {
        let response = request
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .send()
            .await?;
        let status = response.status();
        if accepted.contains(&status) {
            return Ok(status);
        }
        let body = response.bytes().await?;
        Err(service_error(status, &body))
    }

    /// Create a person group. An already existing group is not an error.
    pub async fn create_person_group(
        &self,
        person_group_id: &str,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<(), FaceApiError> {
        validate_group_id(person_group_id)?;
        let request = self
            .http
            .put(self.url(&format!("persongroups/{person_group_id}")))
            .json(&NamedEntity { name, user_data });
        let status = self
            .send_expecting(request, &[StatusCode::OK, StatusCode::CONFLICT])
            .await?;
        if status == StatusCode::CONFLICT {
            tracing::info!(person_group_id, "person group already exists");
        } else {
            tracing::info!(person_group_id, "person group created");
        }
        Ok(())
    }

    /// Create a person in a group, returning the new person id.
    pub async fn create_person(
        &self,
        person_group_id: &str,
        name: &str,
        user_data: Option<&str>,
    ) -> Result<PersonId, FaceApiError> {
        validate_group_id(person_group_id)?;
        let request = self
            .http
            .post(self.url(&format!("persongroups/{person_group_id}/persons")))
            .json(&NamedEntity { name, user_data });
        let created: CreatePersonResponse = self.send_json(request).await?;
        tracing::info!(person_group_id, person_id = %created.person_id, "person created");
        Ok(created.person_id)
    }

    /// Add a face image to a person, returning the persisted face id.
    pub async fn add_person_face(
        &self,
        person_group_id: &str,
        person_id: PersonId,
        image: Vec<u8>,
    ) -> Result<Uuid, FaceApiError> {
        validate_group_id(person_group_id)?;
        let request = self
            .http
            .post(self.url(&format!(
                "persongroups/{person_group_id}/persons/{person_id}/persistedFaces"
            )))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image);
        let added: AddFaceResponse = self.send_json(request).await?;
        tracing::info!(%person_id, persisted_face_id = %added.persisted_face_id, "face added");
        Ok(added.persisted_face_id)
    }

    /// Queue training for a person group.
    pub async fn train(&self, person_group_id: &str) -> Result<(), FaceApiError> {
        validate_group_id(person_group_id)?;
        let request = self
            .http
            .post(self.url(&format!("persongroups/{person_group_id}/train")));
        self.send_expecting(request, &[StatusCode::ACCEPTED]).await?;
        tracing::info!(person_group_id, "training queued");
        Ok(())
    }

    /// Current training status of a person group.
    pub async fn training_status(&self, person_group_id: &str) -> Result<TrainingStatus, FaceApiError> {
        validate_group_id(person_group_id)?;
        let request = self
            .http
            .get(self.url(&format!("persongroups/{person_group_id}/training")));
        self.send_json(request).await
    }
}

#[async_trait]
impl FaceService for FaceClient {
    async fn detect(&self, jpeg: Vec<u8>) -> Result<Vec<DetectedFace>, FaceApiError> {
        tracing::debug!(bytes = jpeg.len(), "detect request");
        let request = self
            .http
            .post(self.url("detect"))
            .query(&[
                ("returnFaceId", "true"),
                (
                    "returnFaceLandmarks",
                    if self.return_landmarks { "true" } else { "false" },
                ),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(jpeg);
        self.send_json(request).await
    }

    async fn identify(
        &self,
        face_ids: &[FaceId],
        options: &IdentifyOptions,
    ) -> Result<Vec<IdentifyResult>, FaceApiError> {
        validate_group_id(&options.person_group_id)?;
        tracing::debug!(faces = face_ids.len(), group = %options.person_group_id, "identify request");
        let request = self.http.post(self.url("identify")).json(&IdentifyRequest {
            person_group_id: &options.person_group_id,
            face_ids,
            max_num_of_candidates_returned: options.max_candidates,
            confidence_threshold: options.confidence_threshold,
        });
        self.send_json(request).await
    }

    async fn person(&self, person_group_id: &str, person_id: PersonId) -> Result<Person, FaceApiError> {
        validate_group_id(person_group_id)?;
        tracing::debug!(%person_id, "person lookup");
        let request = self
            .http
            .get(self.url(&format!("persongroups/{person_group_id}/persons/{person_id}")));
        self.send_json(request).await
    }
}

/// Person group ids: 1–64 chars of lowercase ASCII letters, digits, '-' or '_'.
pub fn validate_group_id(id: &str) -> Result<(), FaceApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_GROUP_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(FaceApiError::Config(format!("invalid person group id: {id:?}")))
    }
}

fn service_error(status: StatusCode, body: &[u8]) -> FaceApiError {
    match serde_json::from_slice::<ServiceErrorBody>(body) {
        Ok(parsed) => FaceApiError::Service {
            status: status.as_u16(),
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => FaceApiError::UnexpectedStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
