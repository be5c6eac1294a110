use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),

    #[error("embedding provider rejected credentials")]
    AuthFailed,

    #[error("embedding provider rate limit reached")]
    RateLimited,

    #[error("embedding provider quota exhausted")]
    QuotaExceeded,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding provider returned {status}: {detail}")]
    Provider { status: u16, detail: String },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse model response: {0}")]
    Parse(String),

    #[error("model call exceeded {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

/// Anything that can go wrong between a question and its answer.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T, E = AnswerError> = std::result::Result<T, E>;
