use thiserror::Error;

/// Application-level error type for the orchestration core.
///
/// Per-provider and per-summarizer failures are absorbed at their own layer
/// and surface as tagged `ProviderResult`s or fallback responses; only
/// configuration errors are allowed to escape to process startup. String
/// payloads keep foreign error types out of the public surface.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    // --- Startup / configuration ---
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    // --- Request/input ---
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    // --- External collaborators ---
    #[error("Provider Error: {0}")]
    ProviderError(String),

    #[error("Provider call timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("Summarizer Error: {0}")]
    SummarizerError(String),

    // --- General/internal ---
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}
