//! Report rendering.
//!
//! Two formats: a stable-ish JSON schema for machine consumption and a
//! box-drawing text report for terminal use, with output colored by
//! severity.

use colored::Colorize;
use serde::Serialize;
use serde_json::json;

use crate::model::ScanResult;

const SCHEMA_VERSION: &str = "1.0";
const TOOL_NAME: &str = "sqleech";

#[derive(Serialize)]
struct ParameterView<'a> {
    name: &'a str,
    location: &'static str,
    #[serde(rename = "type")]
    param_type: &'static str,
}

pub fn to_json(result: &ScanResult) -> serde_json::Value {
    let vulnerabilities: Vec<_> = result
        .vulnerabilities
        .iter()
        .map(|v| {
            json!({
                "parameter": ParameterView {
                    name: &v.parameter.name,
                    location: v.parameter.location.as_str(),
                    param_type: v.parameter.param_type.as_str(),
                },
                "technique": v.technique,
                "dbms": v.dbms.map(|d| d.canonical_name()),
                "payload": v.payload,
                "confidence": v.confidence,
                "severity": v.severity.map(|s| s.as_str()),
                "evidence": v.evidence,
            })
        })
        .collect();

    let errors: Vec<_> = result
        .errors
        .iter()
        .map(|e| {
            json!({
                "parameter": e.parameter,
                "technique": e.technique,
                "message": e.message,
            })
        })
        .collect();

    json!({
        "schema_version": SCHEMA_VERSION,
        "tool": TOOL_NAME,
        "target": {
            "url": result.target_url,
            "method": result.target_method,
        },
        "dbms": result.dbms.as_ref().map(|d| json!({
            "name": d.name.canonical_name(),
            "version": d.version,
        })),
        "scan": {
            "start_time": result.start_time.to_rfc3339(),
            "end_time": result.end_time.to_rfc3339(),
            "duration_seconds": result.duration_seconds(),
            "total_requests": result.request_count,
        },
        "vulnerabilities": vulnerabilities,
        "summary": {
            "total_vulnerabilities": result.vulnerabilities.iter().filter(|v| v.injectable).count(),
            "affected_parameters": result.affected_parameters(),
        },
        "errors": errors,
    })
}

pub fn to_json_string(result: &ScanResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&to_json(result))
}

fn severity_color(severity: &str, text: &str) -> colored::ColoredString {
    match severity {
        "CRITICAL" => text.bright_red().bold(),
        "HIGH" => text.red(),
        "MEDIUM" => text.yellow(),
        _ => text.bright_black(),
    }
}

const RULE: &str = "──────────────────────────────────────────────────────────";

pub fn to_text(result: &ScanResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("┌{}\n", RULE));
    out.push_str("│ sqleech scan report\n");
    out.push_str(&format!("│ target : {} {}\n", result.target_method, result.target_url));
    match &result.dbms {
        Some(d) if d.is_identified() => {
            out.push_str(&format!(
                "│ dbms   : {} (confidence {:.2}){}\n",
                d.name.canonical_name(),
                d.confidence,
                d.version.as_ref().map(|v| format!(" — {}", v)).unwrap_or_default()
            ));
        }
        _ => out.push_str("│ dbms   : not identified\n"),
    }
    out.push_str(&format!(
        "│ scan   : {:.2}s, {} request(s)\n",
        result.duration_seconds(),
        result.request_count
    ));
    out.push_str(&format!("├{}\n", RULE));

    let injectable: Vec<_> = result.vulnerabilities.iter().filter(|v| v.injectable).collect();
    if injectable.is_empty() {
        out.push_str("│ no injectable parameters found\n");
    } else {
        for v in &injectable {
            let severity = v.severity.map(|s| s.as_str()).unwrap_or("LOW");
            out.push_str(&format!(
                "│ {} [{}] {} via {} (confidence {:.2})\n",
                severity_color(severity, &format!("[{}]", severity)),
                v.parameter.location.as_str(),
                v.parameter.name,
                v.technique,
                v.confidence
            ));
            out.push_str(&format!("│   evidence: {}\n", v.evidence));
            out.push_str(&format!("│   payload : {}\n", v.payload));
        }
    }

    out.push_str(&format!("├{}\n", RULE));
    out.push_str(&format!(
        "│ summary: {} vulnerability/vulnerabilities across {} parameter(s)\n",
        injectable.len(),
        result.affected_parameters()
    ));

    if !result.errors.is_empty() {
        out.push_str(&format!("├{}\n", RULE));
        out.push_str(&format!("│ {} non-fatal issue(s) recorded\n", result.errors.len()));
    }
    out.push_str(&format!("└{}\n", RULE));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamLocation, ParamType, Parameter, Vulnerability};
    use chrono::Utc;

    fn sample_result() -> ScanResult {
        let now = Utc::now();
        ScanResult {
            target_url: "https://x.test/item?id=1".to_string(),
            target_method: "GET".to_string(),
            vulnerabilities: vec![Vulnerability {
                parameter: Parameter {
                    name: "id".to_string(),
                    value: "1".to_string(),
                    location: ParamLocation::Query,
                    param_type: ParamType::Integer,
                },
                technique: "error-based".to_string(),
                dbms: Some(crate::model::Dbms::MySQL),
                injectable: true,
                confidence: 0.9,
                evidence: "MySQL error signature appeared".to_string(),
                payload: "1' AND EXTRACTVALUE(...)".to_string(),
                severity: Some(crate::model::Severity::Critical),
            }],
            dbms: None,
            start_time: now,
            end_time: now,
            request_count: 12,
            errors: Vec::new(),
        }
    }

    #[test]
    fn json_report_has_expected_top_level_shape() {
        let value = to_json(&sample_result());
        assert_eq!(value["schema_version"], "1.0");
        assert_eq!(value["tool"], "sqleech");
        assert_eq!(value["summary"]["total_vulnerabilities"], 1);
        assert_eq!(value["vulnerabilities"][0]["technique"], "error-based");
    }

    #[test]
    fn text_report_mentions_the_vulnerable_parameter() {
        let text = to_text(&sample_result());
        assert!(text.contains("id"));
        assert!(text.contains("error-based"));
    }
}
