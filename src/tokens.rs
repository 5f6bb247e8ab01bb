//! Token counting capability.
//!
//! Token counts are only a budget metric for compaction. Callers pass a
//! counter explicitly (usually as `Arc<dyn TokenCounter>`) to every component
//! that needs one; there is no shared global encoder.

/// Approximate bytes per token for context estimation
const APPROX_BYTES_PER_TOKEN: usize = 4;

/// Counts tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Byte-length heuristic: one token per four bytes, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl TokenCounter for ApproxTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(APPROX_BYTES_PER_TOKEN)
    }
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_counter_rounds_up() {
        let counter = ApproxTokenCounter;
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("test"), 1);
        assert_eq!(counter.count_tokens("hello"), 2);
        assert_eq!(counter.count_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn test_closure_counter() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.count_tokens("one two three"), 3);
    }
}
