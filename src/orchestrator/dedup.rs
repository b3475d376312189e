//! Result deduplication across backends.
//!
//! Groups results that refer to the same object or package and keeps only
//! the highest-scored entry per group. The identity of a result is its
//! normalised location, falling back to its logical key and then its id.

use std::collections::HashMap;

use crate::location::normalize_location;
use crate::types::SearchResult;

/// Results after deduplication, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    pub results: Vec<SearchResult>,
    /// How many results were dropped in favour of a better-scored duplicate.
    pub duplicates_removed: usize,
}

/// Identity used to decide whether two results are the same thing.
pub fn dedup_key(result: &SearchResult) -> String {
    if let Some(location) = result.location.as_deref().filter(|l| !l.trim().is_empty()) {
        return format!("location:{}", normalize_location(location));
    }
    if let Some(key) = result.logical_key.as_deref().filter(|k| !k.is_empty()) {
        return format!("key:{key}");
    }
    format!("id:{}", result.id)
}

/// Deduplicate `results`, which must be in dispatch order.
///
/// On a collision the higher score wins; equal scores keep the earlier
/// entry. Each group stays at the position of its first occurrence, so the
/// output depends only on the input order, never on hash iteration order.
pub fn deduplicate(results: Vec<SearchResult>) -> Deduplicated {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<SearchResult> = Vec::with_capacity(results.len());
    let mut duplicates_removed = 0;

    for result in results {
        let key = dedup_key(&result);
        match positions.get(&key) {
            Some(&index) => {
                duplicates_removed += 1;
                if result.score > kept[index].score {
                    kept[index] = result;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(result);
            }
        }
    }

    Deduplicated {
        results: kept,
        duplicates_removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackendType, ResultKind};

    fn make_result(location: &str, backend: BackendType, score: f64) -> SearchResult {
        SearchResult::new(location, ResultKind::File, "title", backend)
            .with_location(location)
            .with_score(score)
    }

    #[test]
    fn unique_locations_pass_through() {
        let deduped = deduplicate(vec![
            make_result("s3://b/a.csv", BackendType::ObjectListing, 1.0),
            make_result("s3://b/b.csv", BackendType::ContentIndex, 0.8),
        ]);
        assert_eq!(deduped.results.len(), 2);
        assert_eq!(deduped.duplicates_removed, 0);
    }

    #[test]
    fn highest_score_kept() {
        let deduped = deduplicate(vec![
            make_result("s3://b/a.csv", BackendType::ObjectListing, 0.5),
            make_result("s3://b/a.csv", BackendType::ContentIndex, 0.9),
        ]);
        assert_eq!(deduped.results.len(), 1);
        assert_eq!(deduped.duplicates_removed, 1);
        assert!((deduped.results[0].score - 0.9).abs() < f64::EPSILON);
        assert_eq!(deduped.results[0].backend, BackendType::ContentIndex);
    }

    #[test]
    fn equal_scores_keep_first_seen() {
        let deduped = deduplicate(vec![
            make_result("s3://b/a.csv", BackendType::CatalogGraph, 1.0),
            make_result("s3://b/a.csv", BackendType::ObjectListing, 1.0),
        ]);
        assert_eq!(deduped.results.len(), 1);
        assert_eq!(deduped.results[0].backend, BackendType::CatalogGraph);
    }

    #[test]
    fn winner_takes_first_occurrence_position() {
        let deduped = deduplicate(vec![
            make_result("s3://b/a.csv", BackendType::CatalogGraph, 0.2),
            make_result("s3://b/z.csv", BackendType::CatalogGraph, 0.3),
            make_result("s3://b/a.csv", BackendType::ContentIndex, 0.9),
        ]);
        let locations: Vec<_> = deduped
            .results
            .iter()
            .map(|r| r.location.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(locations, ["s3://b/a.csv", "s3://b/z.csv"]);
        assert_eq!(deduped.results[0].backend, BackendType::ContentIndex);
    }

    #[test]
    fn normalisation_merges_equivalent_locations() {
        let deduped = deduplicate(vec![
            make_result("S3://Demo/data/a.csv", BackendType::CatalogGraph, 1.0),
            make_result("s3://demo/data/a.csv", BackendType::ObjectListing, 0.4),
        ]);
        assert_eq!(deduped.results.len(), 1);
    }

    #[test]
    fn key_case_is_significant() {
        let deduped = deduplicate(vec![
            make_result("s3://demo/A.csv", BackendType::CatalogGraph, 1.0),
            make_result("s3://demo/a.csv", BackendType::CatalogGraph, 1.0),
        ]);
        assert_eq!(deduped.results.len(), 2);
    }

    #[test]
    fn falls_back_to_logical_key_then_id() {
        let a = SearchResult::new("1", ResultKind::File, "a", BackendType::CatalogGraph)
            .with_logical_key("data/a.csv");
        let b = SearchResult::new("2", ResultKind::File, "a", BackendType::ContentIndex)
            .with_logical_key("data/a.csv");
        let c = SearchResult::new("3", ResultKind::File, "c", BackendType::ContentIndex);
        let d = SearchResult::new("3", ResultKind::File, "c", BackendType::ObjectListing);
        assert_eq!(dedup_key(&a), "key:data/a.csv");
        assert_eq!(dedup_key(&c), "id:3");

        let deduped = deduplicate(vec![a, b, c, d]);
        assert_eq!(deduped.results.len(), 2);
        assert_eq!(deduped.duplicates_removed, 2);
    }

    #[test]
    fn empty_input_returns_empty() {
        let deduped = deduplicate(vec![]);
        assert!(deduped.results.is_empty());
        assert_eq!(deduped.duplicates_removed, 0);
    }
}
