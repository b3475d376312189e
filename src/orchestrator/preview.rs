//! Content previews for file results.
//!
//! Reads the first few bytes of each previewable object and attaches them
//! as display text. A preview that cannot be read is skipped; it never
//! fails the search.

use crate::location::parse_bucket_target;
use crate::storage::ObjectStore;
use crate::types::{ResultKind, SearchResult};

/// Turn raw object bytes into display text.
///
/// Invalid UTF-8 is replaced, and control characters other than newlines
/// and tabs are removed.
pub fn sanitize_preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Attach previews to the first `max_results` file results with `s3://`
/// locations, reading up to `max_bytes` from each. Reads run concurrently.
/// Empty objects get no preview.
pub async fn attach_previews(
    results: Vec<SearchResult>,
    store: &dyn ObjectStore,
    max_bytes: usize,
    max_results: usize,
) -> Vec<SearchResult> {
    let reads = results.iter().enumerate().map(|(index, result)| async move {
        if index >= max_results || result.kind != ResultKind::File {
            return None;
        }
        let target = parse_bucket_target(result.location.as_deref()?)?;
        if target.prefix.is_empty() {
            return None;
        }
        match store.read_head(&target.bucket, &target.prefix, max_bytes).await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(sanitize_preview(&bytes)),
            Err(err) => {
                tracing::debug!(bucket = %target.bucket, error = %err, "content preview skipped");
                None
            }
        }
    });
    let previews = futures::future::join_all(reads).await;

    results
        .into_iter()
        .zip(previews)
        .map(|(result, preview)| match preview {
            Some(text) => result.with_content_preview(text),
            None => result,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryObjectStore, ObjectEntry};
    use crate::types::BackendType;

    fn file(location: &str) -> SearchResult {
        SearchResult::new(location, ResultKind::File, "f", BackendType::ObjectListing)
            .with_location(location)
    }

    fn store() -> MemoryObjectStore {
        let store = MemoryObjectStore::new();
        store.insert_with_body("demo", ObjectEntry::new("a.csv", 20), "id,name\n1,alpha\n");
        store.insert_with_body("demo", ObjectEntry::new("b.bin", 4), vec![0x00, b'o', 0x07, b'k']);
        store
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_preview(b"a\x00b\x1bc\n\td"), "abc\n\td");
        assert_eq!(sanitize_preview(&[0xff, b'x']), "\u{fffd}x");
    }

    #[tokio::test]
    async fn previews_attached_to_readable_files() {
        let results = vec![file("s3://demo/a.csv"), file("s3://demo/b.bin"), file("s3://demo/missing")];
        let previewed = attach_previews(results, &store(), 7, 10).await;
        assert_eq!(previewed[0].content_preview.as_deref(), Some("id,name"));
        assert_eq!(previewed[1].content_preview.as_deref(), Some("ok"));
        assert!(previewed[2].content_preview.is_none());
    }

    #[tokio::test]
    async fn packages_and_results_past_the_cap_are_skipped() {
        let package = SearchResult::new("p", ResultKind::Package, "p", BackendType::CatalogGraph)
            .with_location("quilt+s3://demo#package=team/p");
        let results = vec![package, file("s3://demo/a.csv"), file("s3://demo/a.csv")];
        let previewed = attach_previews(results, &store(), 100, 2).await;
        assert!(previewed[0].content_preview.is_none());
        assert!(previewed[1].content_preview.is_some());
        assert!(previewed[2].content_preview.is_none());
    }
}
