use crate::error::IndexError;
use crate::models::{DocumentFilter, IndexStats, QueryMatch, UpsertSummary, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write records, overwriting any existing record with the same id.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<UpsertSummary, IndexError>;

    /// Nearest-neighbor search ordered by descending similarity. When a
    /// filter is given, only records whose `fileName` metadata is in the set
    /// are considered.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<QueryMatch>, IndexError>;

    /// Remove every record belonging to one document.
    async fn delete_by_document(&self, document_id: &str) -> Result<(), IndexError>;

    async fn stats(&self) -> Result<IndexStats, IndexError>;
}
