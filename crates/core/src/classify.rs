use crate::models::QueryKind;

/// Phrases that signal a broad, multi-document question rather than a
/// pointed factual one.
const VAGUE_KEYWORDS: [&str; 10] = [
    "overview",
    "summary",
    "about",
    "tell me about",
    "what is",
    "explain",
    "describe",
    "compare",
    "relationship between",
    "difference between",
];

/// Label a query specific or vague by keyword match. Deterministic, no I/O;
/// the label shapes the prompt, not the retrieval.
pub fn classify(query: &str) -> QueryKind {
    let lowered = query.to_lowercase();
    if VAGUE_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
    {
        QueryKind::Vague
    } else {
        QueryKind::Specific
    }
}
