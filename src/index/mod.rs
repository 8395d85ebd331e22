pub mod ephemeral;
pub mod qdrant;

/// One retrieved passage with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub passage_id: String,
    pub score: f32,
    pub text: String,
    pub chapter: u32,
    pub section: String,
    pub subsection: Option<String>,
    pub anchor: String,
}

/// Metadata constraints applied conjunctively to a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub chapter: Option<u32>,
    pub section: Option<String>,
}

impl SearchFilter {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chapter.is_none() && self.section.is_none()
    }
}
