//! Query intent extraction

use crate::config::RetrievalConfig;
use crate::meta::{CategoryFilter, LengthOrder};

/// Minimum length of a token used for keyword matching and guardrails
pub const MIN_KEYWORD_LEN: usize = 3;

/// Lowercased alphanumeric runs of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// What a query asks for, relative to one table's columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub tokens: Vec<String>,
    /// A `shortest` or `longest` request
    pub length_order: Option<LengthOrder>,
    /// Requested category value (e.g. `positive`), lowercased
    pub category: Option<String>,
    pub text_column: Option<String>,
    pub category_column: Option<String>,
}

impl Intent {
    /// Read intent from `query` given the table's `columns`
    pub fn extract(query: &str, columns: &[String], config: &RetrievalConfig) -> Self {
        let tokens = tokenize(query);
        let has = |word: &str| tokens.iter().any(|t| t == word);

        let length_order = if has("shortest") {
            Some(LengthOrder::Shortest)
        } else if has("longest") {
            Some(LengthOrder::Longest)
        } else {
            None
        };

        let category = config
            .category_values
            .iter()
            .map(|v| v.to_lowercase())
            .find(|v| has(v));

        let present = |column: &str| columns.iter().any(|c| c == column).then(|| column.to_string());

        Self {
            length_order,
            category,
            text_column: present(&config.text_column),
            category_column: present(&config.category_column),
            tokens,
        }
    }

    /// Tokens long enough to be matched as keywords, in query order
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for token in &self.tokens {
            if token.len() >= MIN_KEYWORD_LEN && !keywords.contains(token) {
                keywords.push(token.clone());
            }
        }
        keywords
    }

    /// Category constraint that applies to this table, if any
    pub fn category_filter(&self) -> Option<CategoryFilter<'_>> {
        match (&self.category_column, &self.category) {
            (Some(column), Some(value)) => Some(CategoryFilter {
                column: column.as_str(),
                value: value.as_str(),
            }),
            _ => None,
        }
    }

    /// Ordering and text column for the structured length shortcut, when
    /// the query asks for one and the table has the column
    pub fn length_shortcut(&self) -> Option<(LengthOrder, &str)> {
        Some((self.length_order?, self.text_column.as_deref()?))
    }
}

/// Whether `row_text` contains at least `min_matches` of the query tokens
/// (only tokens of at least three characters count). An empty token list passes.
pub fn row_matches_tokens(tokens: &[String], row_text: &str, min_matches: usize) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let lower = row_text.to_lowercase();
    let hits = tokens
        .iter()
        .filter(|t| t.len() >= MIN_KEYWORD_LEN && lower.contains(t.as_str()))
        .count();
    hits >= min_matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Shortest POSITIVE review, id#42!"),
            vec!["shortest", "positive", "review", "id", "42"]
        );
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn test_extract_intent() {
        let config = Config::default().retrieval;
        let intent = Intent::extract(
            "shortest positive review",
            &columns(&["review", "sentiment"]),
            &config,
        );
        assert_eq!(intent.length_order, Some(LengthOrder::Shortest));
        assert_eq!(intent.category.as_deref(), Some("positive"));
        assert_eq!(
            intent.length_shortcut(),
            Some((LengthOrder::Shortest, "review"))
        );
        let filter = intent.category_filter().unwrap();
        assert_eq!(filter.column, "sentiment");
        assert_eq!(filter.value, "positive");
    }

    #[test]
    fn test_intent_without_matching_columns() {
        let config = Config::default().retrieval;
        let intent = Intent::extract("longest negative note", &columns(&["note"]), &config);
        assert_eq!(intent.length_order, Some(LengthOrder::Longest));
        assert_eq!(intent.category.as_deref(), Some("negative"));
        assert!(intent.length_shortcut().is_none());
        assert!(intent.category_filter().is_none());
    }

    #[test]
    fn test_first_configured_category_wins() {
        let config = Config::default().retrieval;
        let intent = Intent::extract(
            "negative or positive",
            &columns(&["review", "sentiment"]),
            &config,
        );
        assert_eq!(intent.category.as_deref(), Some("positive"));
    }

    #[test]
    fn test_keywords_are_deduped() {
        let config = Config::default().retrieval;
        let intent = Intent::extract("the fix is the fix", &[], &config);
        assert_eq!(intent.keywords(), vec!["the", "fix"]);
    }

    #[test]
    fn test_row_matches_tokens() {
        let tokens = tokenize("battery life is bad");
        assert!(row_matches_tokens(&tokens, "review: Battery died | sentiment: negative", 1));
        assert!(!row_matches_tokens(&tokens, "review: Battery died", 2));
        assert!(!row_matches_tokens(&tokens, "review: great screen", 1));
        assert!(row_matches_tokens(&[], "anything", 3));
        // Short tokens never count
        assert!(!row_matches_tokens(&tokenize("is a"), "this is a row", 1));
    }
}
