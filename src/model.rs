//! Core data model shared by every pipeline stage.
//!
//! `ScanTarget` is built once by the caller and enriched once by the
//! parameter parser; everything downstream treats it and its parameter
//! list as immutable, per the lifecycle rules.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a parameter was found in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamLocation {
    Query,
    Body,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Query => "query",
            ParamLocation::Body => "body",
        }
    }
}

/// The inferred type of a parameter's original value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Integer,
    Float,
    String,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::String => "string",
        }
    }

    /// Strictly matches `-?[0-9]+` / `-?[0-9]+\.[0-9]+`; everything else
    /// is `String`.
    pub fn infer(value: &str) -> Self {
        let is_int = {
            let mut chars = value.chars();
            match chars.next() {
                Some('-') => chars.clone().next().is_some() && chars.all(|c| c.is_ascii_digit()),
                Some(c) if c.is_ascii_digit() => chars.all(|c| c.is_ascii_digit()),
                _ => false,
            }
        };
        if is_int {
            return ParamType::Integer;
        }

        let is_float = {
            let body = value.strip_prefix('-').unwrap_or(value);
            if let Some((int_part, frac_part)) = body.split_once('.') {
                !int_part.is_empty()
                    && !frac_part.is_empty()
                    && int_part.chars().all(|c| c.is_ascii_digit())
                    && frac_part.chars().all(|c| c.is_ascii_digit())
            } else {
                false
            }
        };
        if is_float {
            ParamType::Float
        } else {
            ParamType::String
        }
    }
}

/// One injectable candidate: a name/value pair at a given location with
/// an inferred type. Multiple values for the same key produce multiple
/// `Parameter` entries (§3 invariant, Open Question (a)).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    pub location: ParamLocation,
    pub param_type: ParamType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>, location: ParamLocation) -> Self {
        let value = value.into();
        let param_type = ParamType::infer(&value);
        Parameter {
            name: name.into(),
            value,
            location,
            param_type,
        }
    }
}

/// The request under test, plus the parameters extracted from it.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub body: String,
    pub content_type: Option<String>,
    pub parameters: Vec<Parameter>,
}

impl ScanTarget {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        ScanTarget {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            body: String::new(),
            content_type: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.body = body.into();
        self.content_type = Some(content_type.into());
        self
    }
}

/// An immutable HTTP response as returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
    pub url: String,
    pub protocol: String,
}

impl HttpResponse {
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-parameter heuristic probe outcome (§3, §4.5).
#[derive(Debug, Clone)]
pub struct HeuristicResult {
    pub parameter: Parameter,
    pub baseline: HttpResponse,
    pub causes_error: bool,
    pub dynamic_content: bool,
    pub error_signatures: HashMap<String, Vec<String>>,
    pub page_ratio: f64,
    pub is_injectable: bool,
}

/// The five DBMS targets this engine reasons about, plus aliases
/// resolved at the registry boundary (§4.4, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dbms {
    MySQL,
    PostgreSQL,
    MSSQL,
    Oracle,
    SQLite,
}

impl Dbms {
    pub const ALL: [Dbms; 5] = [
        Dbms::MySQL,
        Dbms::PostgreSQL,
        Dbms::MSSQL,
        Dbms::Oracle,
        Dbms::SQLite,
    ];

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Dbms::MySQL => "MySQL",
            Dbms::PostgreSQL => "PostgreSQL",
            Dbms::MSSQL => "MSSQL",
            Dbms::Oracle => "Oracle",
            Dbms::SQLite => "SQLite",
        }
    }

    /// Resolve a canonical name or common alias (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mysql" => Some(Dbms::MySQL),
            "postgres" | "postgresql" => Some(Dbms::PostgreSQL),
            "sqlserver" | "mssql" => Some(Dbms::MSSQL),
            "oracle" => Some(Dbms::Oracle),
            "sqlite" => Some(Dbms::SQLite),
            _ => None,
        }
    }
}

/// Identification of the underlying DBMS, with confidence in [0,1].
/// Confidence below 0.7 means "not identified" (§3 invariant iv).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbmsInfo {
    pub name: Dbms,
    pub version: Option<String>,
    pub banner: Option<String>,
    pub confidence: f64,
}

impl DbmsInfo {
    pub const IDENTIFIED_THRESHOLD: f64 = 0.7;

    pub fn is_identified(&self) -> bool {
        self.confidence >= Self::IDENTIFIED_THRESHOLD
    }
}

/// A severity bucket derived from confidence (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Severity::Critical
        } else if confidence >= 0.7 {
            Severity::High
        } else if confidence >= 0.5 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// One confirmed (or refuted) finding produced by a technique detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub parameter: Parameter,
    pub technique: String,
    pub dbms: Option<Dbms>,
    pub injectable: bool,
    pub confidence: f64,
    pub evidence: String,
    pub payload: String,
    pub severity: Option<Severity>,
}

/// A non-fatal error recorded during the scan, attributed to the
/// parameter/technique pair that produced it where known (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanIssue {
    pub parameter: Option<String>,
    pub technique: Option<String>,
    pub message: String,
}

/// The final aggregated scan output.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub target_url: String,
    pub target_method: String,
    pub vulnerabilities: Vec<Vulnerability>,
    pub dbms: Option<DbmsInfo>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub request_count: u64,
    pub errors: Vec<ScanIssue>,
}

impl ScanResult {
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn affected_parameters(&self) -> usize {
        let mut names: Vec<&str> = self
            .vulnerabilities
            .iter()
            .filter(|v| v.injectable)
            .map(|v| v.parameter.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}
