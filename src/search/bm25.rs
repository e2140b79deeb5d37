//! BM25 ranking primitives
//!
//! Pure term-statistics helpers used by the index cache: tokenization,
//! inverse document frequency, the BM25 scoring function, and snippet
//! extraction. The corpus for IDF purposes is the set of indexed documents
//! that survive the source/project filters of the query at hand.

use std::collections::HashMap;

/// Ranking constants and snippet geometry.
///
/// The defaults are conventional rather than contractual; callers can tune
/// them per cache instance.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Term-frequency saturation constant
    pub k1: f64,
    /// Document-length normalization constant
    pub b: f64,
    /// Characters kept on each side of the first matched token
    pub snippet_radius: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            snippet_radius: 80,
        }
    }
}

/// Lowercased alphanumeric terms of `text`, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(|term| term.to_lowercase())
        .collect()
}

/// Term-frequency map of a token stream.
pub fn term_counts(tokens: &[String]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    counts
}

/// Inverse document frequency of a term appearing in `containing` of
/// `doc_count` documents.
pub fn idf(doc_count: usize, containing: usize) -> f64 {
    let n = doc_count as f64;
    let df = containing as f64;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// BM25 score of one document against the query terms.
///
/// Term frequency saturates under `k1` (doubling a term's frequency never
/// doubles its contribution) and longer documents are normalized down
/// under `b`.
pub fn score(
    params: &SearchParams,
    query_terms: &[String],
    doc_terms: &HashMap<String, u32>,
    doc_len: usize,
    avg_len: f64,
    idfs: &HashMap<String, f64>,
) -> f64 {
    let length_ratio = if avg_len > 0.0 {
        doc_len as f64 / avg_len
    } else {
        1.0
    };

    let mut total = 0.0;
    for term in query_terms {
        let tf = match doc_terms.get(term) {
            Some(&tf) => tf as f64,
            None => continue,
        };
        let idf = idfs.get(term).copied().unwrap_or(0.0);
        let saturated =
            (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b + params.b * length_ratio));
        total += idf * saturated;
    }
    total
}

/// Short excerpt centered on the first matched query term.
///
/// Falls back to the head of the document when nothing matches. Clipped
/// edges are marked with an ellipsis. All slicing is kept on character
/// boundaries.
pub fn snippet(content: &str, query_terms: &[String], radius: usize) -> String {
    if content.is_empty() {
        return String::new();
    }

    let lowered = content.to_lowercase();
    let first_match = query_terms
        .iter()
        .filter_map(|term| lowered.find(term.as_str()).map(|pos| (pos, term.len())))
        .min_by_key(|(pos, _)| *pos);

    let (start, end) = match first_match {
        Some((pos, term_len)) => (
            pos.saturating_sub(radius),
            (pos + term_len + radius).min(lowered.len()),
        ),
        None => (0, (radius * 2).min(lowered.len())),
    };

    // Lowercasing can shift byte offsets for a handful of characters, so
    // clamp to the original string before slicing.
    let start = floor_char_boundary(content, start);
    let end = ceil_char_boundary(content, end);

    let mut excerpt = String::new();
    if start > 0 {
        excerpt.push_str("...");
    }
    excerpt.push_str(content[start..end].trim());
    if end < content.len() {
        excerpt.push_str("...");
    }
    excerpt
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, index: usize) -> usize {
    let mut index = index.min(s.len());
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idfs_for(terms: &[&str], doc_count: usize, df: usize) -> HashMap<String, f64> {
        terms
            .iter()
            .map(|t| (t.to_string(), idf(doc_count, df)))
            .collect()
    }

    #[test]
    fn test_tokenize_splits_and_lowercases() {
        assert_eq!(
            tokenize("Fix the DB-connection bug, please!"),
            vec!["fix", "the", "db", "connection", "bug", "please"]
        );
    }

    #[test]
    fn test_tokenize_empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("--- !!! ...").is_empty());
    }

    #[test]
    fn test_idf_decreases_with_document_frequency() {
        assert!(idf(100, 1) > idf(100, 50));
        assert!(idf(100, 50) > idf(100, 100));
    }

    #[test]
    fn test_higher_term_frequency_scores_at_least_as_high() {
        let params = SearchParams::default();
        let query = vec!["bug".to_string()];
        let idfs = idfs_for(&["bug"], 10, 2);

        let sparse: HashMap<String, u32> = [("bug".to_string(), 1)].into_iter().collect();
        let dense: HashMap<String, u32> = [("bug".to_string(), 4)].into_iter().collect();

        let low = score(&params, &query, &sparse, 100, 100.0, &idfs);
        let high = score(&params, &query, &dense, 100, 100.0, &idfs);
        assert!(high >= low);
    }

    #[test]
    fn test_doubling_term_frequency_never_doubles_score() {
        let params = SearchParams::default();
        let query = vec!["bug".to_string()];
        let idfs = idfs_for(&["bug"], 10, 2);

        for tf in [1u32, 2, 5, 20] {
            let once: HashMap<String, u32> = [("bug".to_string(), tf)].into_iter().collect();
            let twice: HashMap<String, u32> = [("bug".to_string(), tf * 2)].into_iter().collect();
            let base = score(&params, &query, &once, 100, 100.0, &idfs);
            let doubled = score(&params, &query, &twice, 100, 100.0, &idfs);
            assert!(doubled < base * 2.0);
        }
    }

    #[test]
    fn test_longer_documents_are_normalized_down() {
        let params = SearchParams::default();
        let query = vec!["bug".to_string()];
        let idfs = idfs_for(&["bug"], 10, 2);
        let terms: HashMap<String, u32> = [("bug".to_string(), 2)].into_iter().collect();

        let short = score(&params, &query, &terms, 50, 100.0, &idfs);
        let long = score(&params, &query, &terms, 500, 100.0, &idfs);
        assert!(short > long);
    }

    #[test]
    fn test_score_zero_without_matching_terms() {
        let params = SearchParams::default();
        let query = vec!["missing".to_string()];
        let idfs = idfs_for(&["missing"], 10, 1);
        let terms: HashMap<String, u32> = [("other".to_string(), 3)].into_iter().collect();
        assert_eq!(score(&params, &query, &terms, 10, 10.0, &idfs), 0.0);
    }

    #[test]
    fn test_snippet_centers_on_first_match() {
        let content = format!("{} needle {}", "hay ".repeat(100), "stack ".repeat(100));
        let terms = vec!["needle".to_string()];
        let excerpt = snippet(&content, &terms, 20);
        assert!(excerpt.contains("needle"));
        assert!(excerpt.starts_with("..."));
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_snippet_without_match_takes_head() {
        let content = "a short document about nothing in particular";
        let excerpt = snippet(content, &["zebra".to_string()], 80);
        assert_eq!(excerpt, content);
    }

    #[test]
    fn test_snippet_short_document_unmarked() {
        let excerpt = snippet("fix the bug", &["bug".to_string()], 80);
        assert_eq!(excerpt, "fix the bug");
    }

    #[test]
    fn test_snippet_multibyte_safe() {
        let content = format!("{}désastre{}", "é".repeat(60), "à".repeat(60));
        let excerpt = snippet(&content, &["désastre".to_string()], 10);
        assert!(excerpt.contains("désastre"));
    }

    #[test]
    fn test_snippet_case_insensitive_match() {
        let excerpt = snippet("The Database MIGRATION failed", &["migration".to_string()], 80);
        assert!(excerpt.contains("MIGRATION"));
    }
}
