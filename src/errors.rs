use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobAlertError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("Embedding provider error: {0}")]
    Provider(String),

    /// Network-level failure raised by a transport that is not reqwest-backed.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Preference store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Task cancelled")]
    Cancelled,
}

pub type JobAlertResult<T> = Result<T, JobAlertError>;
