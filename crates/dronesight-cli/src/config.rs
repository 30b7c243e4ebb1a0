use dronesight_core::{ClientConfig, IdentifyOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0} is not set (config file or DRONESIGHT_{1})")]
    Missing(&'static str, &'static str),
}

/// Runtime configuration: defaults, then the TOML file, then `DRONESIGHT_*` variables.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Face API service root.
    pub endpoint: String,
    /// Subscription key sent with every request.
    pub subscription_key: String,
    /// Person group faces are identified against.
    pub person_group_id: String,
    /// Minimum candidate confidence for identify.
    pub confidence_threshold: f32,
    pub max_candidates: u32,
    /// Per-stage timeout for detect, identify and resolve.
    pub stage_timeout_secs: u64,
    pub return_landmarks: bool,
    /// V4L2 device carrying the drone feed.
    pub camera_device: String,
    /// How long a capture waits for the first frame.
    pub frame_timeout_secs: u64,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://westus.api.cognitive.microsoft.com".to_string(),
            subscription_key: String::new(),
            person_group_id: String::new(),
            confidence_threshold: 0.7,
            max_candidates: 1,
            stage_timeout_secs: 10,
            return_landmarks: true,
            camera_device: "/dev/video0".to_string(),
            frame_timeout_secs: 5,
            jpeg_quality: 100,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("subscription_key", &if self.subscription_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("person_group_id", &self.person_group_id)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("max_candidates", &self.max_candidates)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field("return_landmarks", &self.return_landmarks)
            .field("camera_device", &self.camera_device)
            .field("frame_timeout_secs", &self.frame_timeout_secs)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}

impl Config {
    /// Load from the config file (if present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match config_path(&lookup) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(&lookup);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `DRONESIGHT_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DRONESIGHT_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = lookup("DRONESIGHT_SUBSCRIPTION_KEY") {
            self.subscription_key = v;
        }
        if let Some(v) = lookup("DRONESIGHT_PERSON_GROUP_ID") {
            self.person_group_id = v;
        }
        if let Some(v) = lookup("DRONESIGHT_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        self.confidence_threshold =
            env_parse(lookup, "DRONESIGHT_CONFIDENCE_THRESHOLD", self.confidence_threshold);
        self.max_candidates = env_parse(lookup, "DRONESIGHT_MAX_CANDIDATES", self.max_candidates);
        self.stage_timeout_secs =
            env_parse(lookup, "DRONESIGHT_STAGE_TIMEOUT_SECS", self.stage_timeout_secs);
        self.frame_timeout_secs =
            env_parse(lookup, "DRONESIGHT_FRAME_TIMEOUT_SECS", self.frame_timeout_secs);
        self.jpeg_quality = env_parse(lookup, "DRONESIGHT_JPEG_QUALITY", self.jpeg_quality);
        self.return_landmarks = lookup("DRONESIGHT_RETURN_LANDMARKS")
            .map(|v| v != "0")
            .unwrap_or(self.return_landmarks);
    }

    /// Fail early when the service cannot be reached meaningfully.
    pub fn require_service(&self) -> Result<(), ConfigError> {
        if self.subscription_key.trim().is_empty() {
            return Err(ConfigError::Missing("subscription_key", "SUBSCRIPTION_KEY"));
        }
        if self.person_group_id.trim().is_empty() {
            return Err(ConfigError::Missing("person_group_id", "PERSON_GROUP_ID"));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            subscription_key: self.subscription_key.clone(),
            return_landmarks: self.return_landmarks,
        }
    }

    pub fn identify_options(&self) -> IdentifyOptions {
        IdentifyOptions {
            person_group_id: self.person_group_id.clone(),
            max_candidates: self.max_candidates.max(1),
            confidence_threshold: self.confidence_threshold.clamp(0.0, 1.0),
        }
    }

    /// Per-stage timeout, at least one second.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs.max(1))
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_secs(self.frame_timeout_secs)
    }
}

/// `$DRONESIGHT_CONFIG`, else `$XDG_CONFIG_HOME/dronesight/config.toml`,
/// else `$HOME/.config/dronesight/config.toml`.
fn config_path(lookup: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(explicit) = lookup("DRONESIGHT_CONFIG") {
        return Some(PathBuf::from(explicit));
    }
    let base = lookup("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("dronesight").join("config.toml"))
}

fn env_parse<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
