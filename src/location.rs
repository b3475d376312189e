//! Object-storage locations: building, parsing and normalising `s3://` URIs.
//!
//! Locations double as deduplication keys, so equivalent spellings must
//! normalise to the same string. Scheme and bucket are case-insensitive;
//! keys are not.

use url::Url;

use crate::error::SearchError;

/// Build `s3://bucket/key`.
pub fn s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{}", key.trim_start_matches('/'))
}

/// Bucket and key prefix named by a bucket-scope target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTarget {
    pub bucket: String,
    pub prefix: String,
}

/// Parse a bucket-scope target.
///
/// Accepts `s3://bucket`, `s3://bucket/some/prefix/` and bare `bucket` or
/// `bucket/prefix`. Returns `None` for an empty target or a non-s3 URI.
pub fn parse_bucket_target(target: &str) -> Option<BucketTarget> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let rest = match target.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("s3") => rest,
        Some(_) => return None,
        None => target,
    };
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return None;
    }
    Some(BucketTarget {
        bucket: bucket.to_lowercase(),
        prefix: prefix.to_owned(),
    })
}

/// Bucket and package name named by a package-scope target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageTarget {
    pub bucket: String,
    pub name: String,
}

/// Parse a package-scope target.
///
/// Accepts `quilt+s3://bucket#package=team/name` (an `@hash` or `:tag`
/// suffix on the name is dropped) and `bucket/team/name`, optionally with an
/// `s3://` scheme. Returns `None` when no bucket or package name can be read.
pub fn parse_package_target(target: &str) -> Option<PackageTarget> {
    let target = target.trim();
    let (bucket, name) = match target.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("quilt+s3") => {
            let (bucket, fragment) = rest.split_once('#')?;
            let name = fragment
                .split('&')
                .find_map(|param| param.strip_prefix("package="))?;
            let name = name.split(['@', ':']).next().unwrap_or(name);
            (bucket.trim_end_matches('/'), name)
        }
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("s3") => rest.split_once('/')?,
        Some(_) => return None,
        None => target.split_once('/')?,
    };
    let name = name.trim_matches('/');
    if bucket.is_empty() || name.is_empty() {
        return None;
    }
    Some(PackageTarget {
        bucket: bucket.to_lowercase(),
        name: name.to_owned(),
    })
}

/// The package a package-scope target names, or `None` for an empty target
/// (every package).
///
/// # Errors
///
/// Returns [`SearchError::InvalidRequest`] for a non-empty target that names
/// no package.
pub fn package_scope_target(target: &str) -> Result<Option<PackageTarget>, SearchError> {
    if target.trim().is_empty() {
        return Ok(None);
    }
    parse_package_target(target).map(Some).ok_or_else(|| {
        SearchError::InvalidRequest(format!(
            "package scope needs a bucket/package or quilt+s3://bucket#package=name target, got '{target}'"
        ))
    })
}

/// Normalise a location for deduplication comparison.
///
/// Applies the following transformations:
///
/// 1. Lowercase scheme and host (bucket); the path (key) is preserved as-is.
/// 2. Sort query parameters alphabetically by key.
/// 3. Drop an empty query string.
///
/// Fragments are kept: package locations carry their identity there.
/// If the input cannot be parsed as a URL, it is returned trimmed.
///
/// # Examples
///
/// ```
/// use unisearch::location::normalize_location;
///
/// let a = normalize_location("S3://Demo-Bucket/data/Report.csv?versionId=2&a=1");
/// let b = normalize_location("s3://demo-bucket/data/Report.csv?a=1&versionId=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_location(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = Url::parse(trimmed) else {
        return trimmed.to_owned();
    };

    // Non-special schemes such as s3 keep host case, so lowercase it here.
    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        let _ = parsed.set_host(Some(&host));
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        params.sort();
        parsed.query_pairs_mut().clear().extend_pairs(params);
    }

    parsed.to_string()
}
