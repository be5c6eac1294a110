use crate::answer::{
    Synthesizer, CHAT_NO_DOCUMENTS, CHAT_NO_MATCHES, EMPTY_QUERY_ANSWER, FAILED_ANSWER,
    QUERY_NO_DOCUMENTS, QUERY_NO_MATCHES, TIMEOUT_ANSWER,
};
use crate::classify::classify;
use crate::deadline::bounded;
use crate::embeddings::Embedder;
use crate::error::{IndexError, ModelError};
use crate::ingest::IngestionPipeline;
use crate::model::ChatModel;
use crate::models::{
    ChatResponse, ChatTurn, DocumentMeta, EngineOptions, IndexStats, IngestReport, QueryResponse,
};
use crate::retrieve::{Retrieval, Retriever};
use crate::traits::VectorIndex;
use std::sync::Arc;
use tracing::error;

/// Root of the retrieval-and-answering pipeline.
///
/// Stateless across calls: the active scope and any chat history arrive as
/// parameters on every request, and every request resolves to a well-formed
/// response within the configured deadline.
pub struct Engine<E, I, M> {
    pipeline: IngestionPipeline<E, I>,
    retriever: Retriever<E, I>,
    synthesizer: Synthesizer<M>,
    index: Arc<I>,
    options: EngineOptions,
}

impl<E, I, M> Engine<E, I, M>
where
    E: Embedder + 'static,
    I: VectorIndex + 'static,
    M: ChatModel + 'static,
{
    pub fn new(embedder: E, index: I, model: M, options: EngineOptions) -> Self {
        let embedder = Arc::new(embedder);
        let index = Arc::new(index);

        Self {
            pipeline: IngestionPipeline::new(
                Arc::clone(&embedder),
                Arc::clone(&index),
                options.clone(),
            ),
            retriever: Retriever::new(Arc::clone(&embedder), Arc::clone(&index), options.clone()),
            synthesizer: Synthesizer::new(Arc::new(model), options.clone()),
            index,
            options,
        }
    }

    /// Index one uploaded document's extracted text.
    pub async fn ingest_document(
        &self,
        document_id: &str,
        extracted_text: &str,
        meta: &DocumentMeta,
    ) -> IngestReport {
        self.pipeline.ingest(document_id, extracted_text, meta).await
    }

    /// Remove every indexed chunk of one document.
    pub async fn remove_document(&self, document_id: &str) -> Result<(), IndexError> {
        self.index.delete_by_document(document_id).await
    }

    pub async fn index_stats(&self) -> Result<IndexStats, IndexError> {
        self.index.stats().await
    }

    /// One-shot question over the active documents.
    pub async fn handle_query(&self, query: &str, active_document_ids: &[String]) -> QueryResponse {
        if query.trim().is_empty() {
            return QueryResponse {
                answer: EMPTY_QUERY_ANSWER.to_string(),
                sources: Vec::new(),
            };
        }

        bounded(
            self.options.request_deadline,
            self.answer_query(query, active_document_ids),
            || QueryResponse {
                answer: TIMEOUT_ANSWER.to_string(),
                sources: Vec::new(),
            },
        )
        .await
    }

    /// One turn of a document-grounded conversation. Prior turns are the
    /// caller's to persist and resupply.
    pub async fn handle_chat_turn(
        &self,
        message: &str,
        prior_turns: &[ChatTurn],
        active_document_ids: &[String],
    ) -> ChatResponse {
        if message.trim().is_empty() {
            return ChatResponse {
                message: EMPTY_QUERY_ANSWER.to_string(),
                sources: Vec::new(),
            };
        }

        bounded(
            self.options.request_deadline,
            self.answer_chat(message, prior_turns, active_document_ids),
            || ChatResponse {
                message: TIMEOUT_ANSWER.to_string(),
                sources: Vec::new(),
            },
        )
        .await
    }

    async fn answer_query(&self, query: &str, active_document_ids: &[String]) -> QueryResponse {
        let retrieval = match self.retriever.retrieve(query, active_document_ids).await {
            Ok(retrieval) => retrieval,
            Err(fault) => {
                error!(%fault, "retrieval failed");
                return QueryResponse {
                    answer: FAILED_ANSWER.to_string(),
                    sources: Vec::new(),
                };
            }
        };

        let results = match retrieval {
            Retrieval::NoActiveDocuments => {
                return QueryResponse {
                    answer: QUERY_NO_DOCUMENTS.to_string(),
                    sources: Vec::new(),
                }
            }
            Retrieval::Matches(results) if results.is_empty() => {
                return QueryResponse {
                    answer: QUERY_NO_MATCHES.to_string(),
                    sources: Vec::new(),
                }
            }
            Retrieval::Matches(results) => results,
        };

        let kind = classify(query);
        match self.synthesizer.answer_query(query, kind, &results).await {
            Ok(response) => response,
            Err(ModelError::DeadlineExceeded(_)) => QueryResponse {
                answer: TIMEOUT_ANSWER.to_string(),
                sources: Vec::new(),
            },
            Err(fault) => {
                error!(%fault, "answer synthesis failed");
                QueryResponse {
                    answer: FAILED_ANSWER.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    async fn answer_chat(
        &self,
        message: &str,
        prior_turns: &[ChatTurn],
        active_document_ids: &[String],
    ) -> ChatResponse {
        let retrieval = match self.retriever.retrieve(message, active_document_ids).await {
            Ok(retrieval) => retrieval,
            Err(fault) => {
                error!(%fault, "retrieval failed");
                return ChatResponse {
                    message: FAILED_ANSWER.to_string(),
                    sources: Vec::new(),
                };
            }
        };

        let results = match retrieval {
            Retrieval::NoActiveDocuments => {
                return ChatResponse {
                    message: CHAT_NO_DOCUMENTS.to_string(),
                    sources: Vec::new(),
                }
            }
            Retrieval::Matches(results) if results.is_empty() => {
                return ChatResponse {
                    message: CHAT_NO_MATCHES.to_string(),
                    sources: Vec::new(),
                }
            }
            Retrieval::Matches(results) => results,
        };

        match self
            .synthesizer
            .answer_chat(message, prior_turns, &results)
            .await
        {
            Ok(response) => response,
            Err(ModelError::DeadlineExceeded(_)) => ChatResponse {
                message: TIMEOUT_ANSWER.to_string(),
                sources: Vec::new(),
            },
            Err(fault) => {
                error!(%fault, "chat synthesis failed");
                ChatResponse {
                    message: FAILED_ANSWER.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }
}
