use crate::error::EmbedError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Maximum input length enforced before the provider call; longer inputs
/// are truncated rather than rejected provider-side.
pub const MAX_EMBED_CHARS: usize = 8_191;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Convert one text into a fixed-dimension vector. No retry policy here;
    /// callers decide what a failure means for them.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// [`Embedder`] backed by the OpenAI embeddings endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EmbedError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(EmbedError::InvalidInput(
                "embedding api key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            dimensions: EMBEDDING_DIMENSIONS,
        })
    }

    pub fn from_env() -> Result<Self, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbedError::InvalidInput("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

pub fn truncate_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((boundary, _)) => &text[..boundary],
        None => text,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let input = truncate_input(text);
        debug!(model = %self.model, input_len = input.len(), "embedding text");

        let request = EmbeddingRequest {
            model: &self.model,
            input,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(OPENAI_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body).ok();
            let code = detail
                .as_ref()
                .and_then(|parsed| parsed.error.code.clone())
                .unwrap_or_default();
            let message = detail
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);

            error!(%status, %message, "embedding request rejected");
            return Err(match status.as_u16() {
                401 | 403 => EmbedError::AuthFailed,
                429 if code == "insufficient_quota" => EmbedError::QuotaExceeded,
                429 => EmbedError::RateLimited,
                other => EmbedError::Provider {
                    status: other,
                    detail: message,
                },
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| EmbedError::Provider {
                status: status.as_u16(),
                detail: "provider returned no embedding data".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_the_length_limit() {
        let long = "a".repeat(MAX_EMBED_CHARS + 500);
        assert_eq!(truncate_input(&long).chars().count(), MAX_EMBED_CHARS);

        let short = "short input";
        assert_eq!(truncate_input(short), short);
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let wide = "é".repeat(MAX_EMBED_CHARS + 10);
        let truncated = truncate_input(&wide);
        assert_eq!(truncated.chars().count(), MAX_EMBED_CHARS);
        assert!(wide.starts_with(truncated));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_network_call() {
        let embedder = OpenAiEmbedder::new("test-key").unwrap();
        let result = embedder.embed("   ").await;
        assert!(matches!(result, Err(EmbedError::InvalidInput(_))));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(OpenAiEmbedder::new("").is_err());
    }
}
