use crate::error::IndexError;
use crate::models::{DocumentFilter, IndexStats, QueryMatch, UpsertSummary, VectorRecord};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use url::Url;

/// Client for a serverless Pinecone index, talking to the data-plane HTTP
/// API of one index host.
pub struct PineconeIndex {
    client: Client,
    endpoint: Url,
    api_key: String,
    dimension: usize,
}

impl PineconeIndex {
    pub fn new(
        host: impl AsRef<str>,
        api_key: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        let endpoint = Url::parse(host.as_ref())?;
        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.into(),
            dimension,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, IndexError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(IndexError::BackendResponse {
                backend: "pinecone".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<UpsertSummary, IndexError> {
        if records.is_empty() {
            return Ok(UpsertSummary { upserted: 0 });
        }

        for record in records {
            if record.values.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.values.len(),
                });
            }
        }

        let body = json!({ "vectors": records });
        let parsed = self.post("/vectors/upsert", &body).await?;

        let upserted = parsed
            .pointer("/upsertedCount")
            .and_then(Value::as_u64)
            .unwrap_or(records.len() as u64) as usize;

        Ok(UpsertSummary { upserted })
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

        let mut body = json!({
            "vector": vector,
            "topK": top_k,
            "includeValues": false,
            "includeMetadata": true,
        });
        if let Some(scope) = filter {
            body["filter"] = json!({ "fileName": { "$in": scope.file_names } });
        }

        let parsed = self.post("/query", &body).await?;
        let raw_matches = parsed
            .pointer("/matches")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut matches = Vec::with_capacity(raw_matches.len());
        for raw in raw_matches {
            let id = raw
                .pointer("/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = raw
                .pointer("/score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0) as f32;
            let metadata = raw
                .pointer("/metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(Map::new);

            matches.push(QueryMatch {
                id,
                score,
                metadata,
            });
        }

        Ok(matches)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), IndexError> {
        let body = json!({
            "filter": { "fileName": { "$eq": document_id } }
        });
        self.post("/vectors/delete", &body).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let parsed = self.post("/describe_index_stats", &json!({})).await?;

        let total_records = parsed
            .pointer("/totalRecordCount")
            .or_else(|| parsed.pointer("/totalVectorCount"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let dimension = parsed
            .pointer("/dimension")
            .and_then(Value::as_u64)
            .unwrap_or(self.dimension as u64) as usize;
        let fullness = parsed
            .pointer("/indexFullness")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        Ok(IndexStats {
            total_records,
            dimension,
            fullness,
        })
    }
}
