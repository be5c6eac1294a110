use crate::error::IndexError;
use crate::models::{DocumentFilter, IndexStats, QueryMatch, UpsertSummary, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process cosine-similarity index with the same contract as the hosted
/// backend. Used by tests and local runs; not a durability layer.
#[derive(Debug)]
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn record_file_name(record: &VectorRecord) -> &str {
    record
        .metadata
        .get("fileName")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<UpsertSummary, IndexError> {
        for record in records {
            if record.values.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.values.len(),
                });
            }
        }

        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(UpsertSummary {
            upserted: records.len(),
        })
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&DocumentFilter>,
    ) -> Result<Vec<QueryMatch>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let store = self.records.read().await;
        let mut matches: Vec<QueryMatch> = store
            .values()
            .filter(|record| match filter {
                Some(scope) => scope
                    .file_names
                    .iter()
                    .any(|name| name == record_file_name(record)),
                None => true,
            })
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(&record.values, vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), IndexError> {
        let mut store = self.records.write().await;
        store.retain(|_, record| record_file_name(record) != document_id);
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let store = self.records.read().await;
        Ok(IndexStats {
            total_records: store.len(),
            dimension: self.dimension,
            fullness: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, VectorRecord};
    use serde_json::Map;

    fn record(document_id: &str, chunk_index: usize, values: Vec<f32>) -> VectorRecord {
        let chunk = Chunk {
            text: format!("passage {chunk_index} of {document_id}"),
            chunk_index,
            metadata: Map::new(),
        };
        VectorRecord::for_chunk(document_id, &chunk, values)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let index = MemoryIndex::new(3);
        let first = record("a.pdf", 0, vec![1.0, 0.0, 0.0]);
        index.upsert(&[first.clone()]).await.unwrap();
        index.upsert(&[first]).await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_records, 1);
    }

    #[tokio::test]
    async fn reingesting_overwrites_instead_of_duplicating() {
        let index = MemoryIndex::new(3);
        index
            .upsert(&[record("a.pdf", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(&[record("a.pdf", 0, vec![0.0, 1.0, 0.0])])
            .await
            .unwrap();

        let matches = index.query(&[0.0, 1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].score > 0.99);
    }

    #[tokio::test]
    async fn filter_scopes_matches_to_the_active_set() {
        let index = MemoryIndex::new(3);
        index
            .upsert(&[
                record("a.pdf", 0, vec![1.0, 0.0, 0.0]),
                record("b.pdf", 0, vec![1.0, 0.0, 0.0]),
                record("c.pdf", 0, vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = DocumentFilter {
            file_names: vec!["a.pdf".to_string(), "b.pdf".to_string()],
        };
        let matches = index
            .query(&[1.0, 0.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        for matched in matches {
            let file = matched.metadata["fileName"].as_str().unwrap();
            assert!(file == "a.pdf" || file == "b.pdf");
        }
    }

    #[tokio::test]
    async fn matches_are_ordered_by_descending_similarity() {
        let index = MemoryIndex::new(2);
        index
            .upsert(&[
                record("a.pdf", 0, vec![1.0, 0.0]),
                record("a.pdf", 1, vec![0.7, 0.7]),
                record("a.pdf", 2, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 3, None).await.unwrap();
        let scores: Vec<f32> = matches.iter().map(|m| m.score).collect();
        assert!(scores[0] >= scores[1] && scores[1] >= scores[2]);
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let index = MemoryIndex::new(2);
        index
            .upsert(&[
                record("a.pdf", 0, vec![1.0, 0.0]),
                record("a.pdf", 1, vec![0.0, 1.0]),
                record("b.pdf", 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        index.delete_by_document("a.pdf").await.unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_records, 1);
        let matches = index.query(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(matches[0].metadata["fileName"].as_str().unwrap(), "b.pdf");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = MemoryIndex::new(4);
        let result = index.upsert(&[record("a.pdf", 0, vec![1.0, 0.0])]).await;
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }
}
