use thiserror::Error;

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while digesting a transcript
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network failure, timeout, or an unreadable model response
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Malformed timestamp or subtitle source
    #[error("Format error: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Whether the error only costs a single chunk's contribution
    pub fn is_chunk_local(&self) -> bool {
        matches!(self, PipelineError::Transport(_) | PipelineError::Api { .. })
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Transport(format!("request timed out: {}", err))
        } else {
            PipelineError::Transport(err.to_string())
        }
    }
}
