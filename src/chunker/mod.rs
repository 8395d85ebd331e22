
use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::parser::{Section, parse_sections};
use crate::tokenizer::TokenCounter;

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[.!?])\s+").expect("valid sentence pattern"));

/// Token budgets for passage construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkLimits {
    /// Hard ceiling on tokens per passage.
    pub max_tokens: usize,
    /// Passages below this are merged into their predecessor when possible.
    pub min_tokens: usize,
}

impl Default for ChunkLimits {
    #[inline]
    fn default() -> Self {
        Self {
            max_tokens: 512,
            min_tokens: 50,
        }
    }
}

/// The atomic retrievable unit of text.
///
/// Passages are immutable once created; re-ingestion replaces them by
/// `id` in the index rather than updating in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub token_count: usize,
    pub chapter: u32,
    pub section: String,
    pub subsection: Option<String>,
    pub anchor: String,
    /// 0-based position within the originating section.
    pub sequence_index: usize,
    pub source_document: String,
}

/// Chunk one section into bounded passages.
///
/// A section that fits the budget becomes a single passage with its
/// content unmodified. Larger sections are split at sentence boundaries,
/// then undersized trailing fragments are merged back where the budget
/// allows. Content is never dropped: non-empty input always yields at
/// least one passage.
#[inline]
pub fn chunk_section(
    section: &Section,
    limits: ChunkLimits,
    tokenizer: &dyn TokenCounter,
    source_document: &str,
) -> Vec<Passage> {
    let section_tokens = tokenizer.count(&section.content);
    if section_tokens == 0 {
        return Vec::new();
    }

    let texts = if section_tokens <= limits.max_tokens {
        vec![section.content.clone()]
    } else {
        split_into_chunks(&section.content, limits, tokenizer)
    };

    let passages: Vec<Passage> = texts
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| {
            let token_count = tokenizer.count(&text);
            Passage {
                id: Uuid::new_v4().to_string(),
                text,
                token_count,
                chapter: section.chapter,
                section: section.section_id.clone(),
                subsection: section.subsection_id.clone(),
                anchor: section.anchor.clone(),
                sequence_index,
                source_document: source_document.to_string(),
            }
        })
        .collect();

    if passages.len() > 1 {
        debug!(
            "Section '{}' split into {} passages",
            section.title,
            passages.len()
        );
    }
    passages
}

/// Chunk a complete chapter document into passages.
///
/// Parses the Markdown into sections and chunks each one. A section that
/// produces no passages is skipped without aborting its siblings.
#[inline]
pub fn chunk_chapter(
    markdown: &str,
    chapter: u32,
    source_document: &str,
    limits: ChunkLimits,
    tokenizer: &dyn TokenCounter,
) -> Vec<Passage> {
    let sections = parse_sections(markdown, chapter);
    if sections.is_empty() {
        warn!("No sections found in {}, nothing to ingest", source_document);
        return Vec::new();
    }

    let mut passages = Vec::new();
    for section in &sections {
        passages.extend(chunk_section(section, limits, tokenizer, source_document));
    }

    debug!(
        "Chunked chapter {} into {} passages from {} sections ({})",
        chapter,
        passages.len(),
        sections.len(),
        source_document
    );
    passages
}

/// Split free text into budget-bounded chunk texts.
///
/// Two passes: greedy sentence packing (with word-level hard splits for
/// sentences that alone exceed the budget), then a merge walk that folds
/// undersized non-initial chunks into their predecessor when the result
/// still fits. Predicting merge feasibility during the greedy pack is
/// harder than fixing it up afterwards.
#[inline]
pub fn split_into_chunks(
    text: &str,
    limits: ChunkLimits,
    tokenizer: &dyn TokenCounter,
) -> Vec<String> {
    let chunks = pack_sentences(text, limits.max_tokens, tokenizer);
    merge_undersized(chunks, limits, tokenizer)
}

// Token counts are not additive across joins, so both packers measure the
// joined candidate buffer rather than summing per-piece counts. This keeps
// the hard ceiling exact at the cost of recounting.
fn pack_sentences(text: &str, max_tokens: usize, tokenizer: &dyn TokenCounter) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if tokenizer.count(sentence) > max_tokens {
            // The sentence alone blows the budget; flush and fall back to
            // a hard word-level split, never breaking mid-word.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            pack_words(sentence, max_tokens, tokenizer, &mut chunks);
            continue;
        }

        let candidate = join_piece(&current, sentence);
        if !current.is_empty() && tokenizer.count(&candidate) > max_tokens {
            chunks.push(std::mem::replace(&mut current, sentence.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn pack_words(
    sentence: &str,
    max_tokens: usize,
    tokenizer: &dyn TokenCounter,
    chunks: &mut Vec<String>,
) {
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let candidate = join_piece(&current, word);
        if !current.is_empty() && tokenizer.count(&candidate) > max_tokens {
            chunks.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
}

fn join_piece(current: &str, piece: &str) -> String {
    if current.is_empty() {
        piece.to_string()
    } else {
        format!("{} {}", current, piece)
    }
}

fn merge_undersized(
    chunks: Vec<String>,
    limits: ChunkLimits,
    tokenizer: &dyn TokenCounter,
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if let Some(predecessor) = merged.last_mut() {
            if tokenizer.count(&chunk) < limits.min_tokens {
                let candidate = format!("{} {}", predecessor, chunk);
                if tokenizer.count(&candidate) <= limits.max_tokens {
                    *predecessor = candidate;
                    continue;
                }
                // Merge would overflow; keep the short fragment as an
                // accepted floor violation.
            }
        }
        merged.push(chunk);
    }

    merged
}

fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_BOUNDARY
        .split(text)
        .filter_map(|piece| piece.ok())
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}
