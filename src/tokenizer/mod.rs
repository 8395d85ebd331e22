#[cfg(test)]
mod tests;

/// Counts tokens in a string using the same scheme as the embedding model.
///
/// The counter is a pure length metric: it never generates tokens, only
/// measures text against the chunker's token budgets. Implementations must
/// be thread-safe so a single instance can be shared across queries.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Deterministic approximation of a WordPiece-style tokenizer.
///
/// English text averages roughly 0.75 words per token, and punctuation
/// tends to split into its own tokens. The approximation is close enough
/// for budget enforcement and requires no model files at runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl TokenCounter for HeuristicTokenizer {
    #[inline]
    fn count(&self, text: &str) -> usize {
        let word_count = text.split_whitespace().count();
        if word_count == 0 {
            return 0;
        }
        let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

        (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
    }
}
