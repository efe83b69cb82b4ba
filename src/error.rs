//! Error types for Laer.

use thiserror::Error;

/// Kind of record a lookup can miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Chapter,
    Unit,
    Course,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Chapter => write!(f, "chapter"),
            Entity::Unit => write!(f, "unit"),
            Entity::Course => write!(f, "course"),
        }
    }
}

/// Library-level error type for Laer operations.
#[derive(Error, Debug)]
pub enum LaerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("Transcript unavailable: {0}")]
    TranscriptUnavailable(String),

    #[error("Model output did not match the required format: {reason}")]
    GenerationContractViolation { raw_reply: String, reason: String },

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Video source error: {0}")]
    VideoSource(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LaerError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        LaerError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<rusqlite::Error> for LaerError {
    fn from(err: rusqlite::Error) -> Self {
        LaerError::Persistence(err.to_string())
    }
}

/// Result type alias for Laer operations.
pub type Result<T> = std::result::Result<T, LaerError>;
