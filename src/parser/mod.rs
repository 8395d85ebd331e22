
use fancy_regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

use crate::{RagError, Result};

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid heading pattern"));
static ANCHOR_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid anchor pattern"));
static ANCHOR_HYPHENATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").expect("valid anchor pattern"));
static ANCHOR_COLLAPSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("valid anchor pattern"));
static CHAPTER_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ch(?:apter)?-?(\d+)").expect("valid chapter pattern"));
static NUMBERED_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)-").expect("valid chapter pattern"));
static FRONT_MATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)intro|preface|appendix|foreword|prologue|glossary|index|references|bibliography")
        .expect("valid front matter pattern")
});

/// One heading-delimited unit of a source document.
///
/// `section_id` is always the chapter-dotted depth-2 form (e.g. "3.2");
/// headings deeper than level 2 additionally carry a `subsection_id` built
/// from the level-2 counter plus the deeper counters. The subsection path
/// deliberately does not nest under intermediate parents beyond the
/// depth-2 value; that numbering is a fixed contract for citation links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    /// Heading depth, 1 through 6.
    pub level: u8,
    /// Body text with the heading line excluded.
    pub content: String,
    /// 0 means front or back matter.
    pub chapter: u32,
    pub section_id: String,
    pub subsection_id: Option<String>,
    /// URL-safe slug derived from the title.
    pub anchor: String,
}

/// Parse a Markdown document into ordered sections.
///
/// Scans for `#` through `######` headings; each heading starts a new
/// section and flushes the previous one. Sections whose body is empty
/// after trimming are discarded. A document with no headings yields no
/// sections, which callers must treat as nothing to ingest.
#[inline]
pub fn parse_sections(document_text: &str, chapter: u32) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current: Option<Section> = None;
    let mut body_lines: Vec<&str> = Vec::new();
    // counters[d - 1] tracks the running number at heading depth d
    let mut counters = [0u32; 6];

    for line in document_text.lines() {
        let Some(caps) = HEADING.captures(line).ok().flatten() else {
            if current.is_some() {
                body_lines.push(line);
            }
            continue;
        };

        flush_section(&mut sections, current.take(), &body_lines);
        body_lines.clear();

        let level = caps.get(1).map_or(1, |m| m.as_str().len());
        let title = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();

        counters[level - 1] += 1;
        for counter in counters.iter_mut().skip(level) {
            *counter = 0;
        }

        let (section_id, subsection_id) = match level {
            1 => (chapter.to_string(), None),
            2 => (format!("{}.{}", chapter, counters[1]), None),
            _ => {
                let section_id = format!("{}.{}", chapter, counters[1]);
                let path = counters[1..level]
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(".");
                (section_id, Some(format!("{}.{}", chapter, path)))
            }
        };

        let anchor = slugify(&title);
        current = Some(Section {
            title,
            level: level as u8,
            content: String::new(),
            chapter,
            section_id,
            subsection_id,
            anchor,
        });
    }

    flush_section(&mut sections, current, &body_lines);

    debug!("Parsed {} sections from chapter {}", sections.len(), chapter);
    sections
}

fn flush_section(sections: &mut Vec<Section>, section: Option<Section>, body_lines: &[&str]) {
    if let Some(mut section) = section {
        section.content = body_lines.join("\n").trim().to_string();
        if !section.content.is_empty() {
            sections.push(section);
        }
    }
}

/// Derive a URL-safe anchor slug from a section title.
#[inline]
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = ANCHOR_STRIP.replace_all(lowered.trim(), "");
    let hyphenated = ANCHOR_HYPHENATE.replace_all(&stripped, "-");
    let collapsed = ANCHOR_COLLAPSE.replace_all(&hyphenated, "-");
    collapsed.trim_matches('-').to_string()
}

/// Extract a chapter number from a source file path.
///
/// Recognizes `chapter-3.md`, `ch3-basics.md`, and `03-kinematics.md`
/// style names. Front and back matter files (intro, preface, glossary,
/// and similar) map to chapter 0.
#[inline]
pub fn chapter_number_from_path(path: &Path) -> Result<u32> {
    let name = path.to_string_lossy();

    if let Some(chapter) = capture_number(&CHAPTER_FILE, &name) {
        return Ok(chapter);
    }

    if let Some(chapter) = capture_number(&NUMBERED_FILE, &name) {
        return Ok(chapter);
    }

    if FRONT_MATTER.is_match(&name).unwrap_or(false) {
        return Ok(0);
    }

    Err(RagError::Parse(format!(
        "Cannot extract chapter number from file path: {}",
        name
    )))
}

fn capture_number(pattern: &Regex, name: &str) -> Option<u32> {
    pattern
        .captures(name)
        .ok()
        .flatten()
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}
