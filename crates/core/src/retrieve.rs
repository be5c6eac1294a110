use crate::embeddings::Embedder;
use crate::error::Result;
use crate::models::{DocumentFilter, EngineOptions, SearchResult};
use crate::traits::VectorIndex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one scoped retrieval. An empty active set and an empty match
/// set are different conditions and callers must treat them differently.
#[derive(Debug, Clone)]
pub enum Retrieval {
    NoActiveDocuments,
    Matches(Vec<SearchResult>),
}

pub struct Retriever<E, I> {
    embedder: Arc<E>,
    index: Arc<I>,
    options: EngineOptions,
}

impl<E, I> Retriever<E, I>
where
    E: Embedder,
    I: VectorIndex,
{
    pub fn new(embedder: Arc<E>, index: Arc<I>, options: EngineOptions) -> Self {
        Self {
            embedder,
            index,
            options,
        }
    }

    /// Requested result count grows with the active set so recall stays
    /// proportional as more documents are in scope.
    fn top_k(&self, active_documents: usize) -> usize {
        self.options
            .min_top_k
            .max(self.options.k_per_doc * active_documents)
    }

    pub async fn retrieve(
        &self,
        query: &str,
        active_document_ids: &[String],
    ) -> Result<Retrieval> {
        if active_document_ids.is_empty() {
            debug!("retrieval skipped: no active documents");
            return Ok(Retrieval::NoActiveDocuments);
        }

        let top_k = self.top_k(active_document_ids.len());
        debug!(
            top_k,
            active_documents = active_document_ids.len(),
            "retrieving context"
        );

        let vector = self.embedder.embed(query).await?;
        let filter = DocumentFilter {
            file_names: active_document_ids.to_vec(),
        };
        let matches = self.index.query(&vector, top_k, Some(&filter)).await?;

        let results = matches
            .into_iter()
            .enumerate()
            .map(|(rank, matched)| SearchResult {
                text: matched
                    .metadata
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                file_name: matched
                    .metadata
                    .get("fileName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: matched.score,
                rank,
            })
            .collect();

        Ok(Retrieval::Matches(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, IndexError};
    use crate::models::{IndexStats, QueryMatch, UpsertSummary, VectorRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
    }

    #[derive(Default)]
    struct CapturingIndex {
        calls: AtomicUsize,
        captured_top_k: AtomicUsize,
        captured_filter: Mutex<Option<DocumentFilter>>,
        matches: Vec<QueryMatch>,
    }

    #[async_trait]
    impl VectorIndex for CapturingIndex {
        async fn upsert(&self, _records: &[VectorRecord]) -> Result<UpsertSummary, IndexError> {
            Ok(UpsertSummary { upserted: 0 })
        }

        async fn query(
            &self,
            _vector: &[f32],
            top_k: usize,
            filter: Option<&DocumentFilter>,
        ) -> Result<Vec<QueryMatch>, IndexError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.captured_top_k.store(top_k, Ordering::SeqCst);
            *self.captured_filter.lock().unwrap() = filter.cloned();
            Ok(self.matches.clone())
        }

        async fn delete_by_document(&self, _document_id: &str) -> Result<(), IndexError> {
            Ok(())
        }

        async fn stats(&self) -> Result<IndexStats, IndexError> {
            Ok(IndexStats {
                total_records: 0,
                dimension: 4,
                fullness: 0.0,
            })
        }
    }

    fn retriever(index: Arc<CapturingIndex>) -> (Arc<CountingEmbedder>, Retriever<CountingEmbedder, CapturingIndex>) {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(Arc::clone(&embedder), index, EngineOptions::default());
        (embedder, retriever)
    }

    fn active(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_scope_fails_fast_without_network_calls() {
        let index = Arc::new(CapturingIndex::default());
        let (embedder, retriever) = retriever(Arc::clone(&index));

        let outcome = retriever.retrieve("anything", &[]).await.unwrap();

        assert!(matches!(outcome, Retrieval::NoActiveDocuments));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn top_k_scales_with_the_active_set() {
        let index = Arc::new(CapturingIndex::default());
        let (_, retriever) = retriever(Arc::clone(&index));

        retriever
            .retrieve("q", &active(&["a.pdf"]))
            .await
            .unwrap();
        assert_eq!(index.captured_top_k.load(Ordering::SeqCst), 5);

        retriever
            .retrieve("q", &active(&["a.pdf", "b.pdf", "c.pdf"]))
            .await
            .unwrap();
        assert_eq!(index.captured_top_k.load(Ordering::SeqCst), 15);
    }

    #[tokio::test]
    async fn minimum_top_k_holds_for_small_scopes() {
        let index = Arc::new(CapturingIndex::default());
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let options = EngineOptions {
            k_per_doc: 2,
            ..EngineOptions::default()
        };
        let retriever = Retriever::new(embedder, Arc::clone(&index), options);

        retriever.retrieve("q", &active(&["a.pdf"])).await.unwrap();
        assert_eq!(index.captured_top_k.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn filter_carries_the_active_document_ids() {
        let index = Arc::new(CapturingIndex::default());
        let (_, retriever) = retriever(Arc::clone(&index));

        retriever
            .retrieve("q", &active(&["a.pdf", "b.pdf"]))
            .await
            .unwrap();

        let captured = index.captured_filter.lock().unwrap().clone().unwrap();
        assert_eq!(captured.file_names, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn no_matches_is_an_empty_result_not_an_error() {
        let index = Arc::new(CapturingIndex::default());
        let (_, retriever) = retriever(Arc::clone(&index));

        let outcome = retriever
            .retrieve("q", &active(&["a.pdf"]))
            .await
            .unwrap();

        match outcome {
            Retrieval::Matches(results) => assert!(results.is_empty()),
            Retrieval::NoActiveDocuments => panic!("scope was non-empty"),
        }
    }

    #[tokio::test]
    async fn matches_map_to_ranked_search_results() {
        let index = Arc::new(CapturingIndex {
            matches: vec![
                QueryMatch {
                    id: "a.pdf_0".to_string(),
                    score: 0.92,
                    metadata: json!({"text": "first passage", "fileName": "a.pdf"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                },
                QueryMatch {
                    id: "b.pdf_3".to_string(),
                    score: 0.71,
                    metadata: json!({"text": "second passage", "fileName": "b.pdf"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                },
            ],
            ..CapturingIndex::default()
        });
        let (_, retriever) = retriever(Arc::clone(&index));

        let outcome = retriever
            .retrieve("q", &active(&["a.pdf", "b.pdf"]))
            .await
            .unwrap();

        let Retrieval::Matches(results) = outcome else {
            panic!("expected matches");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "a.pdf");
        assert_eq!(results[0].rank, 0);
        assert_eq!(results[1].text, "second passage");
        assert_eq!(results[1].rank, 1);
    }
}
