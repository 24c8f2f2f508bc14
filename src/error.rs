use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("MQTT connection error: {0}")]
    Connection(String),
    #[error("MQTT error: {0}")]
    Mqtt(String),
    #[error("failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Name of the environment variable at fault.
    pub fn var(&self) -> &'static str {
        match self {
            ConfigError::Missing(var) => var,
            ConfigError::Invalid { var, .. } => var,
        }
    }
}

/// A failed poll of the controller. Extraction is all-or-nothing, so any of
/// these discards the whole cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unparsable response body: {0}")]
    Body(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    Schema(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
