use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Audio,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub kind: DocumentKind,
    pub page_count: Option<u32>,
    pub duration_secs: Option<f64>,
}

impl DocumentMeta {
    pub fn pdf(page_count: u32) -> Self {
        Self {
            kind: DocumentKind::Pdf,
            page_count: Some(page_count),
            duration_secs: None,
        }
    }

    pub fn audio(duration_secs: f64) -> Self {
        Self {
            kind: DocumentKind::Audio,
            page_count: None,
            duration_secs: Some(duration_secs),
        }
    }

    /// Metadata every chunk of the document inherits.
    pub fn base_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("fileType".to_string(), Value::from(self.kind.as_str()));
        if let Some(pages) = self.page_count {
            metadata.insert("pageCount".to_string(), Value::from(pages));
        }
        if let Some(duration) = self.duration_secs {
            metadata.insert("duration".to_string(), Value::from(duration));
        }
        metadata
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

impl VectorRecord {
    /// Assemble the record written to the index for one embedded chunk.
    ///
    /// The id is `{sanitized document id}_{chunk index}`; `text`, `fileName`
    /// and `chunkIndex` always survive scrubbing so retrieval can rebuild a
    /// result from metadata alone.
    pub fn for_chunk(document_id: &str, chunk: &Chunk, values: Vec<f32>) -> Self {
        let mut metadata = scrub_metadata(&chunk.metadata);
        metadata.insert("text".to_string(), Value::from(chunk.text.clone()));
        metadata.insert("fileName".to_string(), Value::from(document_id));
        metadata.insert("chunkIndex".to_string(), Value::from(chunk.chunk_index));

        Self {
            id: vector_record_id(document_id, chunk.chunk_index),
            values,
            metadata,
        }
    }
}

pub fn vector_record_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}_{}", sanitize_document_id(document_id), chunk_index)
}

/// Map a display file name onto the index id charset.
///
/// ASCII alphanumerics, `-` and `.` pass through; every other character is
/// escaped as `_` plus two hex digits per UTF-8 byte. The escape keeps the
/// mapping injective, so distinct display names never collide on one id.
pub fn sanitize_document_id(document_id: &str) -> String {
    let mut sanitized = String::with_capacity(document_id.len());
    for ch in document_id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            sanitized.push(ch);
        } else {
            let mut buffer = [0u8; 4];
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                sanitized.push('_');
                sanitized.push_str(&format!("{byte:02x}"));
            }
        }
    }
    sanitized
}

/// Drop every metadata value the index cannot persist.
///
/// Only strings, numbers, booleans and all-string arrays survive; nested
/// objects, mixed arrays and nulls are silently discarded.
pub fn scrub_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    metadata
        .iter()
        .filter(|(_, value)| match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
            Value::Array(items) => items.iter().all(Value::is_string),
            _ => false,
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Restricts a query to records whose `fileName` is in the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub upserted: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_records: usize,
    pub dimension: usize,
    pub fullness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub file_name: String,
    pub score: f32,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Specific,
    Vague,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Specific => "specific",
            QueryKind::Vague => "vague",
        }
    }
}

/// Per-file attribution returned with every answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Source {
    /// Specific path: the file's best similarity score.
    Scored { file_name: String, score: f32 },
    /// Vague path: coarse relevance plus how many excerpts fed the prompt.
    Overview {
        file_name: String,
        relevance: String,
        excerpts: usize,
    },
}

impl Source {
    pub fn file_name(&self) -> &str {
        match self {
            Source::Scored { file_name, .. } => file_name,
            Source::Overview { file_name, .. } => file_name,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<Source>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            sources,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub vector_count: usize,
    pub failed_chunks: usize,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
    /// Set when the batched upsert failed; ingestion of the extracted text
    /// itself still counts as a success for the upload flow.
    pub index_warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub k_per_doc: usize,
    pub min_top_k: usize,
    pub history_turns: usize,
    pub excerpts_per_file: usize,
    pub embed_concurrency: usize,
    pub request_deadline: Duration,
    pub model_deadline: Duration,
    pub specific_temperature: f32,
    pub vague_temperature: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            k_per_doc: 5,
            min_top_k: 5,
            history_turns: 3,
            excerpts_per_file: 2,
            embed_concurrency: 8,
            request_deadline: Duration::from_secs(70),
            model_deadline: Duration::from_secs(65),
            specific_temperature: 0.0,
            vague_temperature: 0.7,
        }
    }
}
