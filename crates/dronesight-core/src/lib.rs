//! dronesight-core — Cloud face analysis of captured frames.
//!
//! Talks to a Face API v1.0 service to detect faces, identify the first one
//! against a person group and resolve the matched person's name.

pub mod client;
pub mod pipeline;
pub mod presenter;
pub mod service;
pub mod types;

pub use client::{ClientConfig, FaceApiError, FaceClient};
pub use pipeline::{Analysis, FacePipeline, PipelineError, Stage};
pub use presenter::status_line;
pub use service::{FaceService, IdentifyOptions};
pub use types::{Candidate, DetectedFace, FaceId, IdentifyResult, Person, PersonId, TrainingStatus};
