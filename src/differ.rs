//! Response Differ.
//!
//! Computes a line-based similarity ratio between two response bodies
//! after stripping per-request dynamic content (CSRF tokens, session
//! ids, timestamps, large numbers, hex runs, UUIDs) that would
//! otherwise make two structurally identical pages look different.
//!
//! The regex table is compiled once via `once_cell::sync::Lazy` and
//! shared read-only across worker threads, so the dynamic-content
//! patterns never get recompiled per request.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::HttpResponse;
use crate::signatures::find_sql_errors;

static DYNAMIC_CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // CSRF tokens: name="csrf_token" value="...", csrfmiddlewaretoken=..., etc.
        Regex::new(r#"(?i)csrf[a-z_-]*["']?\s*[:=]\s*["']?[a-zA-Z0-9+/=_-]{8,}"#).unwrap(),
        // Common session id cookies/params.
        Regex::new(r"(?i)PHPSESSID=[a-zA-Z0-9]+").unwrap(),
        Regex::new(r"(?i)JSESSIONID=[a-zA-Z0-9]+").unwrap(),
        Regex::new(r"(?i)\bsess_[a-zA-Z0-9_-]{6,}\b").unwrap(),
        // ISO-8601 timestamps.
        Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?").unwrap(),
        // 10-13 digit numbers (unix timestamps, millisecond timestamps, ids).
        Regex::new(r"\b\d{10,13}\b").unwrap(),
        // 32+ character hex runs (hashes, tokens).
        Regex::new(r"\b[a-fA-F0-9]{32,}\b").unwrap(),
        // UUIDs.
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap(),
    ]
});

fn strip_dynamic_content(text: &str) -> String {
    let mut out = text.to_string();
    for pattern in DYNAMIC_CONTENT_PATTERNS.iter() {
        out = pattern.replace_all(&out, "").into_owned();
    }
    out
}

/// Line-based similarity between two byte strings in [0, 1], symmetric
/// within rounding. Both empty → 1.0; exactly one empty → 0.0.
pub fn ratio(a: &[u8], b: &[u8]) -> f64 {
    let text_a = String::from_utf8_lossy(a);
    let text_b = String::from_utf8_lossy(b);

    let stripped_a = strip_dynamic_content(&text_a);
    let stripped_b = strip_dynamic_content(&text_b);

    if stripped_a == stripped_b {
        return 1.0;
    }

    let lines_a: Vec<&str> = stripped_a.split('\n').collect();
    let lines_b: Vec<&str> = stripped_b.split('\n').collect();

    let a_empty = stripped_a.is_empty();
    let b_empty = stripped_b.is_empty();
    if a_empty && b_empty {
        return 1.0;
    }
    if a_empty || b_empty {
        return 0.0;
    }

    let matches = count_matching_lines(&lines_a, &lines_b);
    (2.0 * matches as f64) / (lines_a.len() + lines_b.len()) as f64
}

/// Greedy one-pass bipartite match: walks `lines_a`, consuming one
/// occurrence of an equal, not-yet-consumed line from `lines_b` for
/// each match. Equivalent to a multiset intersection count, which is
/// insensitive to line reordering but still penalizes any line whose
/// content actually changed.
fn count_matching_lines(lines_a: &[&str], lines_b: &[&str]) -> usize {
    let mut available: HashMap<&str, usize> = HashMap::new();
    for line in lines_b {
        *available.entry(line).or_insert(0) += 1;
    }

    let mut matches = 0;
    for line in lines_a {
        if let Some(count) = available.get_mut(line) {
            if *count > 0 {
                *count -= 1;
                matches += 1;
            }
        }
    }
    matches
}

pub fn is_different(a: &[u8], b: &[u8], threshold: f64) -> bool {
    ratio(a, b) < threshold
}

/// A structured breakdown of the differences between two responses,
/// used by reporting and debugging rather than by the detection
/// decision itself.
#[derive(Debug, Clone)]
pub struct DiffDetails {
    pub status_code_changed: bool,
    pub content_length_delta: i64,
    pub body_ratio: f64,
    pub header_diffs: HashMap<String, (String, String)>,
    pub keyword_matches: Vec<String>,
}

pub fn diff_details(a: &HttpResponse, b: &HttpResponse) -> DiffDetails {
    let status_code_changed = a.status != b.status;
    let content_length_delta = b.body.len() as i64 - a.body.len() as i64;
    let body_ratio = ratio(&a.body, &b.body);

    let mut header_diffs = HashMap::new();
    let mut header_names: Vec<&String> = a.headers.keys().chain(b.headers.keys()).collect();
    header_names.sort();
    header_names.dedup();

    for name in header_names {
        let value_a = a
            .headers
            .get(name)
            .map(|v| v.join(", "))
            .unwrap_or_default();
        let value_b = b
            .headers
            .get(name)
            .map(|v| v.join(", "))
            .unwrap_or_default();
        if value_a != value_b {
            header_diffs.insert(name.clone(), (value_a, value_b));
        }
    }

    let mut keyword_matches = Vec::new();
    for (dbms, matched) in find_sql_errors(&b.body_str()) {
        for m in matched {
            keyword_matches.push(format!("[{}] {}", dbms, m));
        }
    }

    DiffDetails {
        status_code_changed,
        content_length_delta,
        body_ratio,
        header_diffs,
        keyword_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bodies_are_ratio_one() {
        assert!((ratio(b"hello world", b"hello world") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn both_empty_is_one() {
        assert!((ratio(b"", b"") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn one_empty_is_zero() {
        assert!((ratio(b"", b"something") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn ratio_is_symmetric() {
        let a = b"line one\nline two\nline three";
        let b = b"line one\nDIFFERENT\nline three\nextra";
        assert!((ratio(a, b) - ratio(b, a)).abs() < 1e-3);
    }

    #[test]
    fn ratio_is_bounded() {
        let a = b"foo\nbar\nbaz";
        let b = b"qux\nquux\ncorge\ngrault";
        let r = ratio(a, b);
        assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn dynamic_tokens_are_stripped_before_comparison() {
        let a = format!("Welcome back!\ncsrf_token=\"{}\"\n", "a".repeat(20));
        let b = format!("Welcome back!\ncsrf_token=\"{}\"\n", "b".repeat(20));
        assert!((ratio(a.as_bytes(), b.as_bytes()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn is_different_respects_threshold() {
        let a = b"Welcome!\nNo items found.";
        let b = b"Welcome!\nNo items found.";
        assert!(!is_different(a, b, 0.98));
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            elapsed: std::time::Duration::from_millis(5),
            url: "https://x.test/".to_string(),
            protocol: "HTTP/1.1".to_string(),
        }
    }

    #[test]
    fn diff_details_flags_status_and_keyword_changes() {
        let a = response(200, "Welcome!");
        let b = response(500, "You have an error in your SQL syntax near '1'");
        let details = diff_details(&a, &b);
        assert!(details.status_code_changed);
        assert!(details.content_length_delta > 0);
        assert!(details.keyword_matches.iter().any(|m| m.starts_with("[MySQL]")));
    }

    #[test]
    fn diff_details_reports_header_changes() {
        let mut a = response(200, "same body");
        a.headers.insert("X-Powered-By".to_string(), vec!["PHP/8.1".to_string()]);
        let b = response(200, "same body");
        let details = diff_details(&a, &b);
        let (value_a, value_b) = details.header_diffs.get("X-Powered-By").unwrap();
        assert_eq!(value_a, "PHP/8.1");
        assert_eq!(value_b, "");
    }
}
