
use fancy_regex::Regex;
use itertools::Itertools;
use std::sync::LazyLock;
use tracing::debug;

use crate::index::SearchHit;

/// Inline source markers the generator is prompted to emit, e.g.
/// `[Chapter 3]` or `[chapter 3, Section 3.2]`.
static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[chapter\s+(\d+)(?:,\s*section\s+([\d.]+))?\]")
        .expect("valid citation pattern")
});

/// How many top-scored passages back an answer whose markers resolved to
/// nothing.
const FALLBACK_CITATIONS: usize = 3;

const PREVIEW_CHARS: usize = 200;

/// A resolved link from an answer back to a retrieved passage.
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub passage_id: String,
    pub chapter: u32,
    pub section: String,
    pub anchor: String,
    pub relevance_score: f32,
    pub text_preview: String,
    /// Human-readable label, e.g. `Chapter 3, Section 3.2`.
    pub source: String,
}

#[derive(Debug, PartialEq, Eq)]
struct Marker {
    chapter: u32,
    section: Option<String>,
}

/// Resolve the answer's inline markers against the retrieved passages.
///
/// Each marker is matched to every candidate passage from the chapter it
/// names (and the section, when the marker carries one). Markers that
/// name sources outside the candidate set resolve to nothing. If no
/// marker resolves, the top-scored candidates are cited instead so an
/// answer is never returned without provenance. Duplicate resolutions of
/// the same passage collapse to one citation.
#[inline]
pub fn bind_citations(answer: &str, candidates: &[SearchHit]) -> Vec<Citation> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let markers = extract_markers(answer);
    debug!(
        "Binding {} markers against {} candidates",
        markers.len(),
        candidates.len()
    );

    let mut citations: Vec<Citation> = markers
        .iter()
        .flat_map(|marker| {
            candidates
                .iter()
                .filter(|hit| marker_matches(marker, hit))
                .map(to_citation)
        })
        .collect();

    if citations.is_empty() {
        citations = candidates
            .iter()
            .sorted_by(|a, b| b.score.total_cmp(&a.score))
            .take(FALLBACK_CITATIONS)
            .map(to_citation)
            .collect();
    }

    citations
        .into_iter()
        .unique_by(|c| (c.passage_id.clone(), c.chapter, c.section.clone()))
        .sorted_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score))
        .collect()
}

fn extract_markers(answer: &str) -> Vec<Marker> {
    CITATION_MARKER
        .captures_iter(answer)
        .filter_map(|caps| caps.ok())
        .filter_map(|caps| {
            let chapter = caps.get(1)?.as_str().parse().ok()?;
            let section = caps.get(2).map(|m| m.as_str().to_string());
            Some(Marker { chapter, section })
        })
        .collect()
}

fn marker_matches(marker: &Marker, hit: &SearchHit) -> bool {
    if hit.chapter != marker.chapter {
        return false;
    }
    match &marker.section {
        None => true,
        Some(section) => hit.section == *section,
    }
}

fn to_citation(hit: &SearchHit) -> Citation {
    let source = if hit.passage_id.starts_with("selected-") {
        "Selected text".to_string()
    } else {
        match &hit.subsection {
            Some(subsection) => format!(
                "Chapter {}, Section {}, Subsection {}",
                hit.chapter, hit.section, subsection
            ),
            None => format!("Chapter {}, Section {}", hit.chapter, hit.section),
        }
    };

    Citation {
        passage_id: hit.passage_id.clone(),
        chapter: hit.chapter,
        section: hit.section.clone(),
        anchor: hit.anchor.clone(),
        relevance_score: hit.score,
        text_preview: preview(&hit.text),
        source,
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        text.chars().take(PREVIEW_CHARS).collect()
    }
}
