//! Final ordering of the fused result set.
//!
//! Scores are already normalised to `[0, 1]` by each backend, so ranking
//! is a plain sort. The sort is stable: equal scores keep their
//! deduplicated (dispatch) order, which makes the output reproducible.

use std::cmp::Ordering;

use crate::types::SearchResult;

/// Sort by score, highest first, keeping input order among equal scores.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Rank and keep the first `limit` results.
pub fn rank_and_truncate(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    rank(&mut results);
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendType, ResultKind};

    fn make_result(id: &str, score: f64) -> SearchResult {
        SearchResult::new(id, ResultKind::File, id, BackendType::ObjectListing).with_score(score)
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn sorted_by_score_descending() {
        let mut results = vec![make_result("c", 0.5), make_result("a", 1.0), make_result("b", 0.7)];
        rank(&mut results);
        assert_eq!(ids(&results), ["a", "b", "c"]);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let mut results = vec![
            make_result("first", 1.0),
            make_result("low", 0.1),
            make_result("second", 1.0),
            make_result("third", 1.0),
        ];
        rank(&mut results);
        assert_eq!(ids(&results), ["first", "second", "third", "low"]);
    }

    #[test]
    fn truncation_respects_limit() {
        let results: Vec<_> = (0..20)
            .map(|i| make_result(&format!("r{i}"), 1.0 - i as f64 * 0.01))
            .collect();
        let ranked = rank_and_truncate(results, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].id, "r0");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn limit_larger_than_input_keeps_everything() {
        let ranked = rank_and_truncate(vec![make_result("a", 0.3)], 10);
        assert_eq!(ranked.len(), 1);
    }
}
