pub mod answer;
pub mod chunking;
pub mod classify;
pub mod deadline;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod model;
pub mod models;
pub mod retrieve;
pub mod stores;
pub mod traits;

pub use answer::{
    relevance_label, scored_sources, Synthesizer, CHAT_NO_DOCUMENTS, CHAT_NO_MATCHES,
    EMPTY_QUERY_ANSWER, FAILED_ANSWER, QUERY_NO_DOCUMENTS, QUERY_NO_MATCHES, TIMEOUT_ANSWER,
};
pub use chunking::{chunk, ChunkingConfig};
pub use classify::classify;
pub use deadline::bounded;
pub use embeddings::{Embedder, OpenAiEmbedder, EMBEDDING_DIMENSIONS, MAX_EMBED_CHARS};
pub use engine::Engine;
pub use error::{AnswerError, EmbedError, IndexError, ModelError, Result};
pub use ingest::{digest_text, IngestionPipeline};
pub use model::{ChatModel, Message, OpenAiChatModel, Role};
pub use models::{
    sanitize_document_id, scrub_metadata, vector_record_id, ChatResponse, ChatRole, ChatTurn,
    Chunk, DocumentFilter, DocumentKind, DocumentMeta, EngineOptions, IndexStats, IngestReport,
    QueryKind, QueryMatch, QueryResponse, SearchResult, Source, UpsertSummary, VectorRecord,
};
pub use retrieve::{Retrieval, Retriever};
pub use stores::{MemoryIndex, PineconeIndex};
pub use traits::VectorIndex;
