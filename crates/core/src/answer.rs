use crate::error::ModelError;
use crate::model::{ChatModel, Message};
use crate::models::{
    ChatResponse, ChatRole, ChatTurn, EngineOptions, QueryKind, QueryResponse, SearchResult,
    Source,
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

/// Terminal answers that never involve the model.
pub const QUERY_NO_DOCUMENTS: &str =
    "No active files to search through. Please upload or activate some files.";
pub const QUERY_NO_MATCHES: &str =
    "No relevant information was found in the active files for this question.";
pub const CHAT_NO_DOCUMENTS: &str =
    "I don't have access to any documents. Please upload a document first.";
pub const CHAT_NO_MATCHES: &str =
    "I couldn't find any relevant information in the documents for your question.";
pub const TIMEOUT_ANSWER: &str =
    "This request took too long to complete. Try a shorter question or fewer active documents.";
pub const FAILED_ANSWER: &str =
    "Something went wrong while processing your request. Please try again.";
pub const EMPTY_QUERY_ANSWER: &str = "No question was provided. Please enter a question.";

/// Builds the classification-dependent prompt, invokes the model under its
/// own deadline, and condenses retrieved passages into per-file sources.
pub struct Synthesizer<M> {
    model: Arc<M>,
    options: EngineOptions,
}

impl<M> Synthesizer<M>
where
    M: ChatModel,
{
    pub fn new(model: Arc<M>, options: EngineOptions) -> Self {
        Self { model, options }
    }

    pub async fn answer_query(
        &self,
        query: &str,
        kind: QueryKind,
        results: &[SearchResult],
    ) -> Result<QueryResponse, ModelError> {
        debug!(kind = kind.as_str(), results = results.len(), "synthesizing answer");

        match kind {
            QueryKind::Specific => {
                let prompt = specific_prompt(query, results);
                let answer = self
                    .invoke(&[Message::user(prompt)], self.options.specific_temperature)
                    .await?;
                Ok(QueryResponse {
                    answer,
                    sources: scored_sources(results),
                })
            }
            QueryKind::Vague => {
                let grouped = group_by_file(results, Some(self.options.excerpts_per_file));
                let prompt = vague_prompt(query, &grouped);
                let answer = self
                    .invoke(&[Message::user(prompt)], self.options.vague_temperature)
                    .await?;
                Ok(QueryResponse {
                    answer,
                    sources: overview_sources(&grouped),
                })
            }
        }
    }

    pub async fn answer_chat(
        &self,
        message: &str,
        prior_turns: &[ChatTurn],
        results: &[SearchResult],
    ) -> Result<ChatResponse, ModelError> {
        let recent = recent_turns(prior_turns, self.options.history_turns);
        let grouped = group_by_file(results, None);
        let system = chat_system_prompt(&format_history(recent), &grouped);

        // The recent turns ride along twice on purpose: flattened into the
        // system prompt and replayed as real dialogue turns, so the model
        // keeps continuity even when it weighs the transcript sections
        // differently.
        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(Message::system(system));
        for turn in recent {
            messages.push(match turn.role {
                ChatRole::User => Message::user(turn.content.clone()),
                ChatRole::Assistant => Message::assistant(turn.content.clone()),
            });
        }
        messages.push(Message::user(message));

        let answer = self
            .invoke(&messages, self.options.specific_temperature)
            .await?;
        Ok(ChatResponse {
            message: answer,
            sources: scored_sources(results),
        })
    }

    async fn invoke(&self, messages: &[Message], temperature: f32) -> Result<String, ModelError> {
        timeout(
            self.options.model_deadline,
            self.model.complete(messages, temperature),
        )
        .await
        .map_err(|_| ModelError::DeadlineExceeded(self.options.model_deadline))?
    }
}

fn specific_prompt(query: &str, results: &[SearchResult]) -> String {
    let context = results
        .iter()
        .map(|result| format!("[From {}]: {}", result.file_name, result.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the following specific question based only on the provided context.\n\
         If the context doesn't contain enough information, say so.\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Instructions:\n\
         - Answer based only on the provided context\n\
         - Cite specific documents\n\
         - Be precise and direct in your answer"
    )
}

fn vague_prompt(query: &str, grouped: &[(String, Vec<SearchResult>)]) -> String {
    let excerpts = grouped
        .iter()
        .map(|(file_name, results)| {
            let texts = results
                .iter()
                .map(|result| result.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            format!("Document: {file_name}\nContent:\n{texts}")
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are analyzing multiple documents. Here are relevant excerpts:\n\n\
         {excerpts}\n\n\
         Question: {query}\n\n\
         Please provide:\n\
         1. A comprehensive answer using information from ALL provided documents\n\
         2. Key points from each document\n\
         3. Any connections between documents (if applicable)\n\n\
         Note: Ensure you reference ALL documents in your answer."
    )
}

fn chat_system_prompt(history: &str, grouped: &[(String, Vec<SearchResult>)]) -> String {
    let contexts = grouped
        .iter()
        .map(|(file_name, results)| {
            let texts = results
                .iter()
                .map(|result| result.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("Content from {file_name}:\n{texts}")
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let history_section = if history.is_empty() {
        String::new()
    } else {
        format!("Previous Chat Context:\n{history}\n\n")
    };

    format!(
        "You are a helpful AI assistant analyzing multiple documents and maintaining a conversation.\n\n\
         {history_section}\
         Document Contexts:\n{contexts}\n\n\
         Instructions:\n\
         1. Consider content from ALL documents in your response\n\
         2. Compare and contrast information between documents when relevant\n\
         3. Clearly reference which document you're drawing information from\n\
         4. If a document isn't relevant to the query, you can say so\n\
         5. Maintain conversation continuity with the chat history\n\
         6. Keep responses focused and relevant"
    )
}

fn recent_turns(prior_turns: &[ChatTurn], limit: usize) -> &[ChatTurn] {
    let start = prior_turns.len().saturating_sub(limit);
    &prior_turns[start..]
}

fn format_history(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group results per file in first-appearance order, optionally capping each
/// file's contribution.
fn group_by_file(
    results: &[SearchResult],
    per_file_cap: Option<usize>,
) -> Vec<(String, Vec<SearchResult>)> {
    let mut grouped: Vec<(String, Vec<SearchResult>)> = Vec::new();

    for result in results {
        match grouped
            .iter_mut()
            .find(|(file_name, _)| file_name == &result.file_name)
        {
            Some((_, entries)) => {
                if per_file_cap.map_or(true, |cap| entries.len() < cap) {
                    entries.push(result.clone());
                }
            }
            None => grouped.push((result.file_name.clone(), vec![result.clone()])),
        }
    }

    grouped
}

/// One source per file carrying the file's best similarity score.
pub fn scored_sources(results: &[SearchResult]) -> Vec<Source> {
    let mut sources: Vec<Source> = Vec::new();

    for result in results {
        match sources.iter_mut().find(|source| match source {
            Source::Scored { file_name, .. } => file_name == &result.file_name,
            _ => false,
        }) {
            Some(Source::Scored { score, .. }) => {
                if result.score > *score {
                    *score = result.score;
                }
            }
            _ => sources.push(Source::Scored {
                file_name: result.file_name.clone(),
                score: result.score,
            }),
        }
    }

    sources
}

fn overview_sources(grouped: &[(String, Vec<SearchResult>)]) -> Vec<Source> {
    grouped
        .iter()
        .map(|(file_name, results)| {
            let best = results
                .iter()
                .map(|result| result.score)
                .fold(0.0f32, f32::max);
            Source::Overview {
                file_name: file_name.clone(),
                relevance: relevance_label(best).to_string(),
                excerpts: results.len(),
            }
        })
        .collect()
}

pub fn relevance_label(score: f32) -> &'static str {
    if score >= 0.75 {
        "high"
    } else if score >= 0.5 {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingModel {
        reply: &'static str,
        captured: Mutex<Vec<(Vec<Message>, f32)>>,
    }

    impl RecordingModel {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                captured: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(
            &self,
            messages: &[Message],
            temperature: f32,
        ) -> Result<String, ModelError> {
            self.captured
                .lock()
                .unwrap()
                .push((messages.to_vec(), temperature));
            Ok(self.reply.to_string())
        }
    }

    fn result(file_name: &str, text: &str, score: f32, rank: usize) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            file_name: file_name.to_string(),
            score,
            rank,
        }
    }

    fn synthesizer(model: Arc<RecordingModel>) -> Synthesizer<RecordingModel> {
        Synthesizer::new(model, EngineOptions::default())
    }

    #[tokio::test]
    async fn specific_answers_cite_context_and_run_cold() {
        let model = Arc::new(RecordingModel::new("The warranty runs five years."));
        let synth = synthesizer(Arc::clone(&model));
        let results = vec![
            result("manual.pdf", "Warranty: five years.", 0.9, 0),
            result("faq.pdf", "See the manual for warranty terms.", 0.6, 1),
        ];

        let response = synth
            .answer_query("How long is the warranty?", QueryKind::Specific, &results)
            .await
            .unwrap();

        assert_eq!(response.answer, "The warranty runs five years.");

        let captured = model.captured.lock().unwrap();
        let (messages, temperature) = &captured[0];
        assert_eq!(*temperature, 0.0);
        assert!(messages[0].content.contains("[From manual.pdf]: Warranty: five years."));
        assert!(messages[0].content.contains("based only on the provided context"));
    }

    #[tokio::test]
    async fn vague_answers_cap_excerpts_and_run_warm() {
        let model = Arc::new(RecordingModel::new("Both documents cover onboarding."));
        let synth = synthesizer(Arc::clone(&model));
        let results = vec![
            result("a.pdf", "first excerpt", 0.9, 0),
            result("a.pdf", "second excerpt", 0.8, 1),
            result("a.pdf", "third excerpt", 0.7, 2),
            result("b.pdf", "only excerpt", 0.6, 3),
        ];

        let response = synth
            .answer_query("Give me an overview", QueryKind::Vague, &results)
            .await
            .unwrap();

        let captured = model.captured.lock().unwrap();
        let (messages, temperature) = &captured[0];
        assert_eq!(*temperature, 0.7);
        assert!(!messages[0].content.contains("third excerpt"));
        assert!(messages[0].content.contains("reference ALL documents"));

        assert_eq!(
            response.sources,
            vec![
                Source::Overview {
                    file_name: "a.pdf".to_string(),
                    relevance: "high".to_string(),
                    excerpts: 2,
                },
                Source::Overview {
                    file_name: "b.pdf".to_string(),
                    relevance: "medium".to_string(),
                    excerpts: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn scored_sources_keep_one_entry_per_file_with_the_max_score() {
        let results = vec![
            result("a.pdf", "strong match", 0.8, 0),
            result("a.pdf", "weaker match", 0.6, 1),
            result("b.pdf", "other file", 0.5, 2),
        ];

        let sources = scored_sources(&results);
        assert_eq!(
            sources,
            vec![
                Source::Scored {
                    file_name: "a.pdf".to_string(),
                    score: 0.8,
                },
                Source::Scored {
                    file_name: "b.pdf".to_string(),
                    score: 0.5,
                },
            ]
        );
    }

    #[tokio::test]
    async fn chat_replays_recent_turns_as_structured_messages() {
        let model = Arc::new(RecordingModel::new("Continuing the thread."));
        let synth = synthesizer(Arc::clone(&model));
        let history = vec![
            ChatTurn::user("first question"),
            ChatTurn::assistant("first answer", Vec::new()),
            ChatTurn::user("second question"),
            ChatTurn::assistant("second answer", Vec::new()),
        ];
        let results = vec![result("notes.pdf", "passage", 0.7, 0)];

        synth
            .answer_chat("follow-up question", &history, &results)
            .await
            .unwrap();

        let captured = model.captured.lock().unwrap();
        let (messages, _) = &captured[0];

        // System prompt, the last three prior turns, then the new message.
        assert_eq!(messages.len(), 5);
        assert!(messages[0].content.contains("Previous Chat Context:"));
        assert!(messages[0].content.contains("assistant: first answer"));
        assert!(!messages[0].content.contains("first question"));
        assert!(messages[0].content.contains("Content from notes.pdf:"));
        assert_eq!(messages[1].content, "first answer");
        assert_eq!(messages[2].content, "second question");
        assert_eq!(messages[3].content, "second answer");
        assert_eq!(messages[4].content, "follow-up question");
    }

    #[tokio::test]
    async fn chat_without_history_omits_the_transcript_section() {
        let model = Arc::new(RecordingModel::new("Fresh conversation."));
        let synth = synthesizer(Arc::clone(&model));
        let results = vec![result("notes.pdf", "passage", 0.7, 0)];

        synth.answer_chat("hello", &[], &results).await.unwrap();

        let captured = model.captured.lock().unwrap();
        let (messages, _) = &captured[0];
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].content.contains("Previous Chat Context:"));
    }

    struct StalledModel;

    #[async_trait]
    impl ChatModel for StalledModel {
        async fn complete(
            &self,
            _messages: &[Message],
            _temperature: f32,
        ) -> Result<String, ModelError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn model_calls_are_capped_by_their_own_deadline() {
        let synth = Synthesizer::new(Arc::new(StalledModel), EngineOptions::default());
        let results = vec![result("a.pdf", "text", 0.9, 0)];

        let outcome = synth
            .answer_query("what is this", QueryKind::Vague, &results)
            .await;

        assert!(matches!(outcome, Err(ModelError::DeadlineExceeded(_))));
    }
}
