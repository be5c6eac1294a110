use crate::models::{Chunk, EngineOptions};
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Boundary preference, largest structural unit first. The final fallback is
/// a raw character split.
const SEPARATORS: [&str; 7] = ["\n\n", "\n", ".", "!", "?", ",", " "];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 200,
        }
    }
}

impl From<&EngineOptions> for ChunkingConfig {
    fn from(value: &EngineOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

/// Split extracted text into overlapping passages.
///
/// Each chunk stays at or under `max_chars`, breaks at the largest boundary
/// that fits, inherits `metadata`, and carries its position as `chunk_index`.
/// Empty or whitespace-only input yields no chunks.
pub fn chunk(text: &str, metadata: &Map<String, Value>, config: ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let segments = split_recursive(text, config.max_chars, config.overlap_chars, &SEPARATORS);
    let merged = merge_with_overlap(segments, config.max_chars, config.overlap_chars);

    merged
        .into_iter()
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            chunk_index,
            metadata: metadata.clone(),
        })
        .collect()
}

/// Break text into segments no longer than `max_chars`, descending through
/// the separator preference only where a piece is still too large.
fn split_recursive(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
    separators: &[&str],
) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }

    let Some((separator, narrower)) = separators.split_first() else {
        return split_by_size(text, max_chars, overlap_chars);
    };

    let pieces = split_keeping_separator(text, separator);
    if pieces.len() <= 1 {
        return split_recursive(text, max_chars, overlap_chars, narrower);
    }

    let mut segments = Vec::new();
    for piece in pieces {
        if piece.len() <= max_chars {
            segments.push(piece.to_string());
        } else {
            segments.extend(split_recursive(piece, max_chars, overlap_chars, narrower));
        }
    }
    segments
}

/// Split at a separator while keeping the separator attached to the
/// preceding piece, so concatenating pieces reproduces the input.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    while let Some(position) = text[start..].find(separator) {
        let end = start + position + separator.len();
        pieces.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

/// Raw character windows, used when no separator exists in an oversized piece.
fn split_by_size(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = max_chars.saturating_sub(overlap_chars).max(1);

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces
}

/// Merge segments into chunks of at most `max_chars`, seeding each new chunk
/// with the trailing segments of the previous one up to `overlap_chars`.
fn merge_with_overlap(segments: Vec<String>, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<String> = VecDeque::new();
    let mut window_len = 0usize;

    for segment in segments {
        if window_len + segment.len() > max_chars && !window.is_empty() {
            chunks.push(window.iter().map(String::as_str).collect::<String>());

            while window_len > overlap_chars
                || (window_len + segment.len() > max_chars && window_len > 0)
            {
                match window.pop_front() {
                    Some(popped) => window_len -= popped.len(),
                    None => break,
                }
            }
        }

        window_len += segment.len();
        window.push_back(segment);
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(String::as_str).collect::<String>());
    }

    chunks
}
