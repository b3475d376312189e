//! Free-text query analysis.
//!
//! Turns a query plus scope into a [`QueryAnalysis`]: keywords, recognised
//! file extensions, structured filters parsed from size and date phrases,
//! a coarse query type, a deterministic backend ordering and a confidence
//! value. Everything here is pure.
//!
//! Recognised filter phrases:
//!
//! ```text
//! larger|bigger|greater|more|over|above [than] <n><unit>   → size_gt
//! smaller|less|under|below [than] <n><unit>                → size_lt
//! > | >= | < | <= <n><unit>                                → size_gt / size_lt
//! after|since|newer than|created after <date>              → created_after
//! before|until|older than|created before <date>            → created_before
//! *.ext | .ext | name.ext                                 → extension
//! ```
//!
//! A bare known extension word (`csv`, `log`) counts towards
//! `file_extensions` and confidence but never becomes an extension filter.
//!
//! Units are B, KB, MB, GB, TB (1024-based); dates are `YYYY`, `YYYY-MM` or
//! `YYYY-MM-DD` and resolve to the start of that period in UTC.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::types::{
    normalize_extension, BackendType, QueryAnalysis, QueryType, Scope, SearchFilters,
};

/// Extensions recognised as bare words or as the suffix of a file name.
const KNOWN_EXTENSIONS: &[&str] = &[
    "csv", "tsv", "json", "jsonl", "parquet", "txt", "md", "pdf", "png", "jpg", "jpeg", "gif",
    "tif", "tiff", "h5", "hdf5", "h5ad", "zarr", "nc", "fasta", "fastq", "fa", "fq", "bam", "sam",
    "vcf", "bed", "gz", "zip", "tar", "xlsx", "xls", "ipynb", "py", "html", "xml", "yaml", "yml",
    "log", "avro", "orc", "feather", "arrow", "npy", "npz", "pkl", "loom",
];

const PACKAGE_WORDS: &[&str] = &[
    "package", "packages", "pkg", "dataset", "datasets", "collection", "collections",
];

const METADATA_WORDS: &[&str] = &[
    "metadata", "meta", "tagged", "tag", "tags", "schema", "field", "fields", "where",
    "property", "properties",
];

const FILE_WORDS: &[&str] = &["file", "files", "object", "objects", "document", "documents"];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "in", "on", "for", "with", "to", "from", "by", "at",
    "find", "show", "me", "all", "list", "search", "get", "any", "my", "that", "are", "is",
    "which", "created", "modified", "than", "containing", "named", "called",
];

/// Trimmed from both ends of every token.
const TOKEN_PUNCTUATION: &[char] = &[',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '{', '}', '`'];

/// Baseline confidence with no recognised signals.
const BASE_CONFIDENCE: f64 = 0.3;
/// Confidence added per recognised signal.
const SIGNAL_WEIGHT: f64 = 0.1;
/// Below this, the analysis is treated as ambiguous.
pub const AMBIGUOUS_CONFIDENCE: f64 = 0.5;

fn size_word_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(larger|bigger|greater|more|over|above|smaller|less|under|below)(?:\s+than)?\s+(\d+(?:\.\d+)?)\s*(b|bytes?|kb|kib|mb|mib|gb|gib|tb|tib)\b",
        )
        .ok()
    })
    .as_ref()
}

fn size_symbol_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(>=|<=|>|<)\s*(\d+(?:\.\d+)?)\s*(b|bytes?|kb|kib|mb|mib|gb|gib|tb|tib)\b").ok()
    })
    .as_ref()
}

fn date_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:created\s+|modified\s+)?(after|since|newer\s+than|before|until|older\s+than)\s+(\d{4}(?:-\d{2}(?:-\d{2})?)?)\b",
        )
        .ok()
    })
    .as_ref()
}

/// Apply `on_match` to every capture of `re` in `query` and blank the matched
/// spans out of `residual`.
fn consume<F>(re: Option<&Regex>, query: &str, residual: &mut String, mut on_match: F)
where
    F: FnMut(&regex::Captures<'_>),
{
    let Some(re) = re else {
        return;
    };
    for caps in re.captures_iter(query) {
        on_match(&caps);
    }
    let blanked = re.replace_all(residual.as_str(), " ").into_owned();
    *residual = blanked;
}

/// Lexical scan shared by [`QueryAnalyzer::parse`] and [`extract_keywords`].
#[derive(Debug, Default)]
struct Scan {
    keywords: Vec<String>,
    extensions: Vec<String>,
    /// Extensions written as `*.ext`, `.ext` or `name.ext`.
    explicit_extensions: Vec<String>,
    filters: SearchFilters,
    package_cue: bool,
    metadata_cue: bool,
    file_cue: bool,
    path_like: bool,
}

fn scan(query: &str) -> Scan {
    let mut out = Scan::default();
    let mut residual = query.to_owned();
    let filters = &mut out.filters;

    consume(size_word_regex(), query, &mut residual, |caps| {
        let Some(bytes) = parse_size(&caps[2], &caps[3]) else {
            return;
        };
        match caps[1].to_ascii_lowercase().as_str() {
            "smaller" | "less" | "under" | "below" => filters.size_lt = Some(bytes),
            _ => filters.size_gt = Some(bytes),
        }
    });

    consume(size_symbol_regex(), query, &mut residual, |caps| {
        let Some(bytes) = parse_size(&caps[2], &caps[3]) else {
            return;
        };
        match &caps[1] {
            ">" => filters.size_gt = Some(bytes),
            ">=" => filters.size_gt = Some(bytes.saturating_sub(1)),
            "<" => filters.size_lt = Some(bytes),
            _ => filters.size_lt = Some(bytes.saturating_add(1)),
        }
    });

    consume(date_regex(), query, &mut residual, |caps| {
        let Some(instant) = parse_date(&caps[2]) else {
            return;
        };
        let direction = caps[1].to_ascii_lowercase();
        if direction == "after" || direction == "since" || direction.starts_with("newer") {
            filters.created_after = Some(instant);
        } else {
            filters.created_before = Some(instant);
        }
    });

    for raw in residual.split_whitespace() {
        let token = raw
            .trim_matches(TOKEN_PUNCTUATION)
            .trim_end_matches('.')
            .to_lowercase();
        if token.is_empty() {
            continue;
        }

        // `*.csv` / `.csv`: pure extension tokens, not keywords.
        if token.starts_with("*.") || (token.starts_with('.') && token.len() > 1) {
            let ext = normalize_extension(&token);
            if is_plausible_extension(&ext) {
                push_unique(&mut out.extensions, ext.clone());
                push_unique(&mut out.explicit_extensions, ext);
            }
            continue;
        }

        if PACKAGE_WORDS.contains(&token.as_str()) {
            out.package_cue = true;
            continue;
        }
        if FILE_WORDS.contains(&token.as_str()) {
            out.file_cue = true;
            continue;
        }
        if METADATA_WORDS.contains(&token.as_str()) || token.contains('=') {
            out.metadata_cue = true;
            if !token.contains('=') {
                continue;
            }
        }
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }

        if token.contains('/') {
            out.path_like = true;
        }
        if KNOWN_EXTENSIONS.contains(&token.as_str()) {
            push_unique(&mut out.extensions, token.clone());
        } else if let Some((_, ext)) = token.rsplit_once('.') {
            if KNOWN_EXTENSIONS.contains(&ext) {
                push_unique(&mut out.extensions, ext.to_owned());
                push_unique(&mut out.explicit_extensions, ext.to_owned());
            }
        }
        push_unique(&mut out.keywords, token);
    }

    for ext in &out.explicit_extensions {
        out.filters = std::mem::take(&mut out.filters).with_extension(ext);
    }
    out
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn is_plausible_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Convert `<number><unit>` into bytes (1024-based units).
fn parse_size(number: &str, unit: &str) -> Option<u64> {
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit.to_ascii_lowercase().as_str() {
        "b" | "byte" | "bytes" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "tb" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    let bytes = (value * multiplier).round();
    (bytes.is_finite() && bytes >= 0.0 && bytes <= u64::MAX as f64).then_some(bytes as u64)
}

/// Resolve `YYYY`, `YYYY-MM` or `YYYY-MM-DD` to the start of that period.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let mut parts = text.split('-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next().map_or(Some(1), |m| m.parse().ok())?;
    let day: u32 = parts.next().map_or(Some(1), |d| d.parse().ok())?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Search terms for a query, with stopwords, type words and filter phrases removed.
///
/// Backends use this so their term handling agrees with the analyzer's.
pub fn extract_keywords(query: &str) -> Vec<String> {
    scan(query).keywords
}

/// Deterministic free-text query analyzer.
///
/// Holds the backend registration order used to break ties between equally
/// preferred backends.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    backend_order: Vec<BackendType>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self {
            backend_order: BackendType::all().to_vec(),
        }
    }
}

impl QueryAnalyzer {
    /// Analyzer that breaks ties by the given registration order.
    ///
    /// Backend types missing from `order` follow in canonical order.
    pub fn with_backend_order<I>(order: I) -> Self
    where
        I: IntoIterator<Item = BackendType>,
    {
        let mut backend_order: Vec<BackendType> = Vec::new();
        for backend in order.into_iter().chain(BackendType::all().iter().copied()) {
            if !backend_order.contains(&backend) {
                backend_order.push(backend);
            }
        }
        Self { backend_order }
    }

    /// Analyze `query` within `scope` / `target`.
    pub fn parse(&self, query: &str, scope: Scope, target: &str) -> QueryAnalysis {
        let scan = scan(query);

        let query_type = if scope == Scope::Package || scan.package_cue {
            QueryType::Package
        } else if scan.metadata_cue {
            QueryType::Metadata
        } else if !scan.extensions.is_empty() || scan.path_like || scan.file_cue {
            QueryType::File
        } else if scope == Scope::Bucket {
            QueryType::File
        } else {
            QueryType::Global
        };

        let signals = scan.extensions.len()
            + scan.filters.len()
            + usize::from(scan.package_cue)
            + usize::from(scan.metadata_cue)
            + usize::from(scan.file_cue)
            + usize::from(scan.path_like)
            + usize::from(scope != Scope::Global)
            + usize::from(!target.trim().is_empty());
        let confidence = confidence_for(signals);
        if confidence < AMBIGUOUS_CONFIDENCE {
            tracing::debug!(signals, confidence, "ambiguous query, using best-effort backend order");
        }

        QueryAnalysis {
            query_type,
            confidence,
            keywords: scan.keywords,
            file_extensions: scan.extensions,
            filters: scan.filters,
            suggested_backends: self.suggest(scope, query_type),
        }
    }

    /// Order backends by preference for this scope, ties by registration order.
    fn suggest(&self, scope: Scope, query_type: QueryType) -> Vec<BackendType> {
        let priority = |backend: BackendType| -> u8 {
            match (scope, backend) {
                (Scope::Bucket, BackendType::ObjectListing) => 2,
                (Scope::Bucket, _) => 1,
                (Scope::Package | Scope::Catalog, BackendType::ObjectListing) => 0,
                (Scope::Package | Scope::Catalog, _) => 2,
                (Scope::Global, BackendType::ObjectListing) if query_type == QueryType::Package => 0,
                (Scope::Global, _) => 1,
            }
        };
        let mut ordered = self.backend_order.clone();
        // Stable: equal priorities keep registration order.
        ordered.sort_by_key(|backend| std::cmp::Reverse(priority(*backend)));
        ordered
    }
}

/// Confidence for a signal count: non-decreasing, capped at 1.0.
pub fn confidence_for(signals: usize) -> f64 {
    (BASE_CONFIDENCE + SIGNAL_WEIGHT * signals as f64).min(1.0)
}
