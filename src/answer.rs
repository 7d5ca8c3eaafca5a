//! Grounded question answering.
//!
//! [`Orchestrator::answer`] runs one question through retrieval and the chat
//! model and always hands back something displayable:
//!
//! - `Configuration` and `NotFound` failures are operator mistakes and are
//!   returned as `Err` so the caller can stop and tell the user what to fix.
//! - Every other failure (provider quota, auth, generic, store, I/O) is
//!   turned into a degraded [`AnswerRecord`] whose answer is the user-facing
//!   message for that failure and whose sources are empty.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{ErrorKind, RagError, Result};
use crate::index::{GenerationId, IndexManager};
use crate::llm::{create_chat_provider, ChatMessage, ChatProvider};
use crate::models::{CitedSource, RetrievalResult};
use crate::search::{self, SearchMode};

const SYSTEM_PROMPT: &str = "You are an assistant specialised in the supplied documentation. \
Answer ONLY with information found in the context. \
If the context does not contain enough information, say explicitly that the data is not available. \
Cite your sources by file name and page whenever possible.";

const EMPTY_ANSWER: &str = "The model returned an empty answer.";

const NO_SOURCES: &str = "No context documents were found.";

/// Per-question knobs.
#[derive(Debug, Clone)]
pub struct AnswerOptions {
    pub k: usize,
    pub temperature: f32,
    /// Chat model; the configured default when `None`.
    pub model: Option<String>,
    pub mode: SearchMode,
    /// Generation to query; the latest when `None`.
    pub generation: Option<GenerationId>,
}

impl AnswerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            k: config.retrieval.k,
            temperature: config.llm.temperature,
            model: None,
            mode: config.retrieval.mode,
            generation: None,
        }
    }
}

/// Outcome of one question.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    pub answer: String,
    pub sources: RetrievalResult,
    /// Generation the sources came from, when one was loaded.
    pub generation: Option<GenerationId>,
    /// Failure class when the record is degraded.
    pub error: Option<ErrorKind>,
}

impl AnswerRecord {
    fn degraded(err: &RagError, generation: Option<GenerationId>) -> Self {
        Self {
            answer: err.user_message(),
            sources: Vec::new(),
            generation,
            error: Some(err.kind()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Compact `{i, archivo, pagina}` citations, numbered from 1.
    pub fn cited_sources(&self) -> Vec<CitedSource> {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, s)| CitedSource {
                index: i + 1,
                file: s.chunk.file_name(),
                page: s.chunk.page_display,
            })
            .collect()
    }
}

pub struct Orchestrator {
    index: IndexManager,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    default_model: String,
}

impl Orchestrator {
    pub fn new(
        index: IndexManager,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            IndexManager::new(config.storage.index_dir()),
            create_embedder(config)?,
            create_chat_provider(config)?,
            config.llm.model.clone(),
        ))
    }

    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    /// Answer `question`. See the module docs for the failure policy.
    pub async fn answer(&self, question: &str, opts: &AnswerOptions) -> Result<AnswerRecord> {
        self.chat.ensure_configured()?;

        let handle = match self
            .index
            .load(opts.generation.as_ref(), self.embedder.clone())
            .await
        {
            Ok(handle) => handle,
            Err(e) if e.is_operator_error() => return Err(e),
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "index load failed; answer degraded");
                return Ok(AnswerRecord::degraded(&e, opts.generation.clone()));
            }
        };
        let generation = handle.id().clone();

        let outcome = self.retrieve_and_generate(&handle, question, opts).await;
        handle.close().await;

        match outcome {
            Ok((answer, sources)) => Ok(AnswerRecord {
                answer,
                sources,
                generation: Some(generation),
                error: None,
            }),
            Err(e) if e.is_operator_error() => Err(e),
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "answer degraded");
                Ok(AnswerRecord::degraded(&e, Some(generation)))
            }
        }
    }

    async fn retrieve_and_generate(
        &self,
        handle: &crate::index::IndexHandle,
        question: &str,
        opts: &AnswerOptions,
    ) -> Result<(String, RetrievalResult)> {
        let sources = search::query(handle, question, opts.k, opts.mode).await?;
        let messages = build_messages(&sources, question);
        let model = opts.model.as_deref().unwrap_or(&self.default_model);

        tracing::debug!(model, sources = sources.len(), "calling chat model");
        let answer = self
            .chat
            .complete(&messages, model, opts.temperature)
            .await?;

        let answer = answer.trim();
        let answer = if answer.is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            answer.to_string()
        };
        Ok((answer, sources))
    }
}

/// The context block: chunk texts in rank order, blank-line separated.
pub fn build_context(sources: &RetrievalResult) -> String {
    sources
        .iter()
        .map(|s| s.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instruction plus one user turn carrying context and question.
pub fn build_messages(sources: &RetrievalResult, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{}\n\nQuestion:\n{}",
            build_context(sources),
            question
        )),
    ]
}

/// Render an answer and its numbered source list for the console.
pub fn format_answer(record: &AnswerRecord) -> String {
    let mut lines = vec![
        "=== ANSWER ===".to_string(),
        record.answer.trim().to_string(),
        String::new(),
        "=== SOURCES ===".to_string(),
    ];
    if record.sources.is_empty() {
        lines.push(NO_SOURCES.to_string());
    } else {
        for cited in record.cited_sources() {
            lines.push(format!("[{}] {} (pag. {})", cited.index, cited.file, cited.page));
        }
    }
    lines.join("\n")
}
