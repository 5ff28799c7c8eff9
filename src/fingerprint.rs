//! Fingerprinter Registry.
//!
//! Two identification paths: a fast path that reads the error-signature
//! map the Heuristic Detector already collected, and a behavioral path
//! that sends a handful of DBMS-specific targeted probes. Every
//! fingerprinting strategy runs and the highest-confidence result wins.

use std::collections::HashMap;

use crate::core::error::ScanOutcome;
use crate::model::{Dbms, DbmsInfo, Parameter, ScanTarget};
use crate::transport::Transport;

/// Fast path: pick the DBMS with the most error-signature matches.
/// Generic is ignored. Ties broken by `Dbms::ALL` order. Confidence is
/// fixed at 0.7 — "identified", not "certain".
pub fn identify_from_errors(error_signatures: &HashMap<String, Vec<String>>) -> Option<DbmsInfo> {
    let mut best: Option<(Dbms, usize)> = None;

    for dbms in Dbms::ALL {
        let count = error_signatures
            .get(dbms.canonical_name())
            .map(|matches| matches.len())
            .unwrap_or(0);
        if count == 0 {
            continue;
        }
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((dbms, count)),
        }
    }

    best.map(|(dbms, _)| DbmsInfo {
        name: dbms,
        version: None,
        banner: None,
        confidence: 0.7,
    })
}

/// Build-number → release-year table used only when the `@@version`
/// banner text itself carries no four-digit year (Open Question c).
const MSSQL_BUILD_YEARS: &[(&str, &str)] = &[
    ("16.0", "2022"),
    ("15.0", "2019"),
    ("14.0", "2017"),
    ("13.0", "2016"),
];

/// A 4-digit run only counts as a release year if it falls in a
/// plausible range; otherwise it's a build/revision number fragment
/// (e.g. the `4298` in `15.0.4298.1`) and must not shadow the
/// build-number fallback table below.
fn is_plausible_year(s: &str) -> bool {
    s.len() == 4
        && s.parse::<u32>()
            .map(|year| (1990..=2100).contains(&year))
            .unwrap_or(false)
}

fn normalize_mssql_banner(raw: &str) -> String {
    if let Some(year) = raw
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| is_plausible_year(s))
    {
        return format!("SQL Server {}", year);
    }

    for (build, year) in MSSQL_BUILD_YEARS {
        if raw.contains(build) {
            return format!("SQL Server {}", year);
        }
    }

    format!("SQL Server ({})", raw.trim())
}

async fn probe_accepted(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
    payload: &str,
) -> bool {
    transport
        .send(target, parameter, payload)
        .await
        .map(|r| r.is_success())
        .unwrap_or(false)
}

async fn fingerprint_mysql(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
) -> ScanOutcome<f64> {
    let mut confidence = 0.0;

    let quote = transport
        .send(target, parameter, &format!("{}'", parameter.value))
        .await?;
    if !crate::signatures::find_sql_errors(&quote.body_str())
        .get("MySQL")
        .map(|m| !m.is_empty())
        .unwrap_or(false)
    {
        return Ok(0.0);
    }
    confidence += 0.7;

    if probe_accepted(transport, target, parameter, &format!("{} AND SLEEP(0)-- -", parameter.value)).await {
        confidence += 0.1;
    }
    if probe_accepted(
        transport,
        target,
        parameter,
        &format!("{} AND @@version IS NOT NULL-- -", parameter.value),
    )
    .await
    {
        confidence += 0.1;
    }
    if probe_accepted(
        transport,
        target,
        parameter,
        &format!("{} AND CONV(10,10,36)='a'-- -", parameter.value),
    )
    .await
    {
        confidence += 0.1;
    }

    Ok(confidence.min(1.0))
}

async fn fingerprint_postgresql(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
) -> ScanOutcome<f64> {
    let mut confidence = 0.0;

    let quote = transport
        .send(target, parameter, &format!("{}'", parameter.value))
        .await?;
    if !crate::signatures::find_sql_errors(&quote.body_str())
        .get("PostgreSQL")
        .map(|m| !m.is_empty())
        .unwrap_or(false)
    {
        return Ok(0.0);
    }
    confidence += 0.7;

    if probe_accepted(
        transport,
        target,
        parameter,
        &format!("{} AND pg_sleep(0) IS NOT NULL-- -", parameter.value),
    )
    .await
    {
        confidence += 0.1;
    }
    if probe_accepted(transport, target, parameter, &format!("{}::int", parameter.value)).await {
        confidence += 0.1;
    }
    if probe_accepted(
        transport,
        target,
        parameter,
        &format!(
            "{} AND CURRENT_SETTING('server_version') IS NOT NULL-- -",
            parameter.value
        ),
    )
    .await
    {
        confidence += 0.1;
    }

    Ok(confidence.min(1.0))
}

async fn fingerprint_mssql(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
) -> ScanOutcome<(f64, Option<String>)> {
    for prefix in ["", "'"] {
        for template in [
            "CONVERT(INT,(@@version))",
            "CAST((@@version) AS INT)",
        ] {
            let payload = format!("{}{} AND 1={}-- -", parameter.value, prefix, template);
            let response = transport.send(target, parameter, &payload).await?;
            let body = response.body_str();
            if body.to_lowercase().contains("conversion failed when converting") {
                if let Some(version) = extract_conversion_error_value(&body) {
                    return Ok((0.92, Some(normalize_mssql_banner(&version))));
                }
                return Ok((0.92, Some("SQL Server (unknown)".to_string())));
            }
        }
    }
    Ok((0.0, None))
}

/// SQL Server's `CONVERT`/`CAST` failure echoes the offending value
/// back in quotes: `Conversion failed when converting the varchar
/// value 'Microsoft SQL Server 2019 ...' to data type int.`
fn extract_conversion_error_value(body: &str) -> Option<String> {
    let start = body.find("value '")? + "value '".len();
    let rest = &body[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// Runs the behavioral path across all known DBMS fingerprinters and
/// returns the single highest-confidence identification.
pub async fn identify_behavioral(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
) -> ScanOutcome<Option<DbmsInfo>> {
    let mut best: Option<DbmsInfo> = None;

    let mysql_confidence = fingerprint_mysql(transport, target, parameter).await?;
    if mysql_confidence >= DbmsInfo::IDENTIFIED_THRESHOLD {
        best = Some(DbmsInfo {
            name: Dbms::MySQL,
            version: None,
            banner: None,
            confidence: mysql_confidence,
        });
    }

    let pg_confidence = fingerprint_postgresql(transport, target, parameter).await?;
    if pg_confidence >= DbmsInfo::IDENTIFIED_THRESHOLD
        && best.as_ref().map(|b| pg_confidence > b.confidence).unwrap_or(true)
    {
        best = Some(DbmsInfo {
            name: Dbms::PostgreSQL,
            version: None,
            banner: None,
            confidence: pg_confidence,
        });
    }

    let (mssql_confidence, mssql_banner) = fingerprint_mssql(transport, target, parameter).await?;
    if mssql_confidence >= DbmsInfo::IDENTIFIED_THRESHOLD
        && best
            .as_ref()
            .map(|b| mssql_confidence > b.confidence)
            .unwrap_or(true)
    {
        best = Some(DbmsInfo {
            name: Dbms::MSSQL,
            version: mssql_banner.clone(),
            banner: mssql_banner,
            confidence: mssql_confidence,
        });
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_picks_the_dbms_with_most_matches() {
        let mut signatures = HashMap::new();
        signatures.insert("MySQL".to_string(), vec!["err1".to_string()]);
        signatures.insert(
            "PostgreSQL".to_string(),
            vec!["err1".to_string(), "err2".to_string()],
        );
        signatures.insert("Generic".to_string(), vec!["g1".to_string(), "g2".to_string(), "g3".to_string()]);

        let info = identify_from_errors(&signatures).unwrap();
        assert_eq!(info.name, Dbms::PostgreSQL);
        assert!((info.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn no_signatures_yields_none() {
        assert!(identify_from_errors(&HashMap::new()).is_none());
    }

    #[test]
    fn mssql_banner_extracts_four_digit_year() {
        let banner = normalize_mssql_banner("Microsoft SQL Server 2019 (RTM) - 15.0.2000.5");
        assert_eq!(banner, "SQL Server 2019");
    }

    #[test]
    fn mssql_banner_falls_back_to_build_number_table() {
        let banner = normalize_mssql_banner("build 15.0.4298.1");
        assert_eq!(banner, "SQL Server 2019");
    }

    #[test]
    fn conversion_error_value_is_extracted() {
        let body = "Conversion failed when converting the varchar value 'Microsoft SQL Server 2022' to data type int.";
        assert_eq!(
            extract_conversion_error_value(body).unwrap(),
            "Microsoft SQL Server 2022"
        );
    }
}
