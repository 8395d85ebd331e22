
use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::Result;
use crate::chunker::ChunkLimits;
use crate::citations::{Citation, bind_citations};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::{ChatMessage, Generator};
use crate::index::ephemeral::EphemeralIndex;
use crate::index::qdrant::QdrantIndex;
use crate::index::{SearchFilter, SearchHit};
use crate::tokenizer::TokenCounter;

pub const NOT_FOUND_IN_BOOK: &str = "Information not found in the book. Please try rephrasing \
     your question or ask about a different topic covered in the textbook.";

pub const NOT_FOUND_IN_SELECTION: &str = "Information not found in the selected text.";

/// Terminal state of one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Answered {
        answer: String,
        citations: Vec<Citation>,
        /// Passages retrieved for grounding context; fallback citation
        /// rules may cite fewer than were retrieved.
        retrieved: usize,
    },
    /// Retrieval produced nothing above the threshold. Not an error; the
    /// fixed answer ships with zero citations.
    NotFound { answer: String },
}

impl QueryOutcome {
    #[inline]
    pub fn answer(&self) -> &str {
        match self {
            Self::Answered { answer, .. } | Self::NotFound { answer } => answer,
        }
    }

    #[inline]
    pub fn citations(&self) -> &[Citation] {
        match self {
            Self::Answered { citations, .. } => citations,
            Self::NotFound { .. } => &[],
        }
    }

    /// How many passages retrieval supplied for this query.
    #[inline]
    pub fn retrieved_count(&self) -> usize {
        match self {
            Self::Answered { retrieved, .. } => *retrieved,
            Self::NotFound { .. } => 0,
        }
    }
}

/// How a query is scoped, for prompts and the query log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Global,
    SelectedText,
}

impl QueryMode {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::SelectedText => "selected-text",
        }
    }
}

/// Runs the per-query pipeline against injected service handles.
///
/// Holds only borrowed, read-only collaborators; one orchestrator can
/// serve many queries and shares nothing mutable between them.
pub struct Orchestrator<'a> {
    embedder: &'a dyn Embedder,
    index: &'a QdrantIndex,
    generator: &'a dyn Generator,
    tokenizer: &'a dyn TokenCounter,
    limits: ChunkLimits,
    top_k: usize,
    score_threshold: f32,
    system_prompt: String,
}

impl<'a> Orchestrator<'a> {
    #[inline]
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a QdrantIndex,
        generator: &'a dyn Generator,
        tokenizer: &'a dyn TokenCounter,
        config: &Config,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            tokenizer,
            limits: config.chunking,
            top_k: config.retrieval.top_k,
            score_threshold: config.retrieval.score_threshold,
            system_prompt: config.generation.system_prompt.clone(),
        }
    }

    /// Answer a question against the whole indexed corpus.
    #[inline]
    pub fn answer_question(
        &self,
        question: &str,
        filter: &SearchFilter,
    ) -> Result<QueryOutcome> {
        let question = validate_question(question)?;

        let query_vector = self.embedder.embed(question)?;
        let hits = self
            .index
            .search(&query_vector, self.top_k, self.score_threshold, filter)?;

        if hits.is_empty() {
            info!("No passages above threshold for question");
            return Ok(QueryOutcome::NotFound {
                answer: NOT_FOUND_IN_BOOK.to_string(),
            });
        }

        debug!("Retrieved {} passages for question", hits.len());
        self.generate_answer(question, &hits, QueryMode::Global)
    }

    /// Answer a question scoped to a user-selected span of text.
    ///
    /// The selection is chunked and embedded into a query-lifetime index;
    /// the persistent store is never consulted, and citations pointing
    /// outside the `selected-` namespace are discarded.
    #[inline]
    pub fn answer_about_selection(
        &self,
        question: &str,
        selected_text: &str,
    ) -> Result<QueryOutcome> {
        let question = validate_question(question)?;

        let ephemeral =
            EphemeralIndex::build(selected_text, self.limits, self.tokenizer, self.embedder)?;
        let query_vector = self.embedder.embed(question)?;
        // The user chose this text, so every chunk stays in play.
        let hits = ephemeral.search(&query_vector, self.top_k, 0.0);

        if hits.is_empty() {
            warn!("Selection produced no retrievable passages");
            return Ok(QueryOutcome::NotFound {
                answer: NOT_FOUND_IN_SELECTION.to_string(),
            });
        }

        let outcome = self.generate_answer(question, &hits, QueryMode::SelectedText)?;

        match outcome {
            QueryOutcome::Answered {
                answer,
                citations,
                retrieved,
            } => {
                let citations: Vec<Citation> = citations
                    .into_iter()
                    .filter(|c| c.passage_id.starts_with("selected-"))
                    .collect();
                Ok(QueryOutcome::Answered {
                    answer,
                    citations,
                    retrieved,
                })
            }
            not_found @ QueryOutcome::NotFound { .. } => Ok(not_found),
        }
    }

    fn generate_answer(
        &self,
        question: &str,
        hits: &[SearchHit],
        mode: QueryMode,
    ) -> Result<QueryOutcome> {
        let context = format_context(hits);
        let messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(build_user_message(question, &context, mode)),
        ];

        let answer = self.generator.generate(&messages)?;
        let citations = bind_citations(&answer, hits);
        info!(
            "Answer generated ({} chars, {} citations)",
            answer.len(),
            citations.len()
        );

        Ok(QueryOutcome::Answered {
            answer,
            citations,
            retrieved: hits.len(),
        })
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Question cannot be empty").into());
    }
    Ok(trimmed)
}

fn format_context(hits: &[SearchHit]) -> String {
    let mut parts = Vec::with_capacity(hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let mut header = format!("[Source {}] Chapter {}, Section {}", i + 1, hit.chapter, hit.section);
        if let Some(subsection) = &hit.subsection {
            header.push_str(&format!(", Subsection {}", subsection));
        }
        parts.push(format!("{}\n{}\n", header, hit.text));
    }
    parts.join("\n")
}

fn build_user_message(question: &str, context: &str, mode: QueryMode) -> String {
    match mode {
        QueryMode::SelectedText => format!(
            "Based on the following selected text from the textbook, answer the question.\n\n\
             Selected Text:\n{context}\n\n\
             Question: {question}\n\n\
             Answer the question using ONLY information from the selected text above. \
             If the answer is not in the selected text, say 'Information not found in the selected text.'"
        ),
        QueryMode::Global => format!(
            "Based on the following excerpts from the textbook, answer the question.\n\n\
             Context:\n{context}\n\n\
             Question: {question}\n\n\
             Provide a clear answer based on the context. \
             Always cite sources using [Chapter X, Section Y.Z] format. \
             If the answer is not in the context, say 'Information not found in the book.'"
        ),
    }
}
