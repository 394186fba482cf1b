//! Shared tokenizer.
//!
//! BM25, graph search and memory recall all split text the same way:
//! lowercase, break on anything that is not a letter, digit or underscore,
//! keep tokens longer than two characters.

/// Tokenize text into lowercase terms longer than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Tokenize and drop repeats, keeping first-seen order.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_and_filters() {
        assert_eq!(
            tokenize("Rust-based DB, v2: fast & safe!"),
            vec!["rust", "based", "fast", "safe"]
        );
    }

    #[test]
    fn test_tokenize_keeps_underscores() {
        assert_eq!(tokenize("snake_case id"), vec!["snake_case"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("a an to").is_empty());
    }

    #[test]
    fn test_tokenize_unique_preserves_order() {
        assert_eq!(tokenize_unique("beta alpha beta gamma alpha"), vec!["beta", "alpha", "gamma"]);
    }
}
