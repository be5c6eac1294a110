use crate::chunking::{chunk, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::EmbedError;
use crate::models::{Chunk, DocumentMeta, EngineOptions, IngestReport, VectorRecord};
use crate::traits::VectorIndex;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Drives one uploaded document through chunk → embed → upsert.
///
/// Embedding fans out with bounded parallelism; the upsert is one batched
/// call. Neither a failed chunk nor a failed upsert aborts the upload flow:
/// the report carries the counts and a soft warning instead.
pub struct IngestionPipeline<E, I> {
    embedder: Arc<E>,
    index: Arc<I>,
    options: EngineOptions,
}

impl<E, I> IngestionPipeline<E, I>
where
    E: Embedder + 'static,
    I: VectorIndex,
{
    pub fn new(embedder: Arc<E>, index: Arc<I>, options: EngineOptions) -> Self {
        Self {
            embedder,
            index,
            options,
        }
    }

    pub async fn ingest(
        &self,
        document_id: &str,
        raw_text: &str,
        meta: &DocumentMeta,
    ) -> IngestReport {
        let checksum = digest_text(raw_text);
        let chunks = chunk(
            raw_text,
            &meta.base_metadata(),
            ChunkingConfig::from(&self.options),
        );
        let chunk_count = chunks.len();

        if chunks.is_empty() {
            info!(document_id, "extracted text produced no chunks");
            return IngestReport {
                document_id: document_id.to_string(),
                chunk_count: 0,
                vector_count: 0,
                failed_chunks: 0,
                checksum,
                ingested_at: Utc::now(),
                index_warning: None,
            };
        }

        let (records, failed_chunks) = self.embed_chunks(document_id, chunks).await;

        let mut index_warning = None;
        let vector_count = if records.is_empty() {
            0
        } else {
            match self.index.upsert(&records).await {
                Ok(summary) => summary.upserted,
                Err(error) => {
                    warn!(document_id, %error, "vector upsert failed; extracted text remains usable");
                    index_warning = Some(error.to_string());
                    0
                }
            }
        };

        info!(
            document_id,
            chunk_count, vector_count, failed_chunks, "document ingested"
        );

        IngestReport {
            document_id: document_id.to_string(),
            chunk_count,
            vector_count,
            failed_chunks,
            checksum,
            ingested_at: Utc::now(),
            index_warning,
        }
    }

    /// Embed chunks with at most `embed_concurrency` requests in flight.
    /// A chunk whose embedding fails is dropped and counted, never written
    /// with a sentinel vector.
    async fn embed_chunks(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> (Vec<VectorRecord>, usize) {
        let limit = self.options.embed_concurrency.max(1);
        let mut tasks: JoinSet<(Chunk, Result<Vec<f32>, EmbedError>)> = JoinSet::new();
        let mut pending = chunks.into_iter();
        let mut records = Vec::new();
        let mut failed = 0usize;

        loop {
            while tasks.len() < limit {
                let Some(next) = pending.next() else { break };
                let embedder = Arc::clone(&self.embedder);
                tasks.spawn(async move {
                    let embedding = embedder.embed(&next.text).await;
                    (next, embedding)
                });
            }

            match tasks.join_next().await {
                Some(Ok((done, Ok(values)))) => {
                    records.push(VectorRecord::for_chunk(document_id, &done, values));
                }
                Some(Ok((done, Err(error)))) => {
                    warn!(
                        document_id,
                        chunk_index = done.chunk_index,
                        %error,
                        "chunk embedding failed; chunk excluded"
                    );
                    failed += 1;
                }
                Some(Err(join_error)) => {
                    warn!(document_id, %join_error, "embedding task aborted");
                    failed += 1;
                }
                None => break,
            }
        }

        // Completion order is arbitrary; position lives in the metadata.
        records.sort_by_key(|record| {
            record
                .metadata
                .get("chunkIndex")
                .and_then(Value::as_u64)
                .unwrap_or(0)
        });

        (records, failed)
    }
}

pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
