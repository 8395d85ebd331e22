
use tracing::debug;

use super::SearchHit;
use crate::Result;
use crate::chunker::{ChunkLimits, split_into_chunks};
use crate::embeddings::Embedder;
use crate::tokenizer::TokenCounter;

/// Section label carried by every selection-scoped hit.
pub const SELECTED_SECTION: &str = "selected";

/// Query-lifetime index over a user-selected span of text.
///
/// Built fresh for each selection query and dropped afterwards; nothing
/// here touches the persistent store, so selection answers can never
/// leak passages from the full book.
#[derive(Debug)]
pub struct EphemeralIndex {
    entries: Vec<EphemeralEntry>,
}

#[derive(Debug)]
struct EphemeralEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
}

impl EphemeralIndex {
    /// Chunk and embed the selection. Whitespace-only input produces an
    /// empty index rather than an error.
    #[inline]
    pub fn build(
        selection: &str,
        limits: ChunkLimits,
        tokenizer: &dyn TokenCounter,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let texts = split_into_chunks(selection, limits, tokenizer);
        if texts.is_empty() {
            return Ok(Self {
                entries: Vec::new(),
            });
        }

        let vectors = embedder.embed_many(&texts)?;
        let entries = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| EphemeralEntry {
                id: format!("selected-{:03}", i),
                text,
                vector,
            })
            .collect::<Vec<_>>();

        debug!("Built ephemeral index with {} passages", entries.len());
        Ok(Self { entries })
    }

    /// Similarity search over the selection, highest score first.
    ///
    /// Vectors are unit length, so the dot product is cosine similarity.
    /// The threshold is inclusive; a zero threshold keeps every passage
    /// of a short selection in play.
    #[inline]
    pub fn search(&self, vector: &[f32], top_k: usize, score_threshold: f32) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                passage_id: entry.id.clone(),
                score: dot(&entry.vector, vector),
                text: entry.text.clone(),
                chapter: 0,
                section: SELECTED_SECTION.to_string(),
                subsection: None,
                anchor: String::new(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
