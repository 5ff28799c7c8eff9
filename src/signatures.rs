//! Error-Signature Matcher.
//!
//! Matches response bodies against a substring catalog keyed by DBMS,
//! so the Fingerprinter's fast path and the error-based technique can
//! ask "which DBMS does this error belong to" instead of just "is this
//! an error".

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// One pattern catalog entry: a DBMS name (or "Generic") paired with the
/// lower-cased substrings that identify it. Substring matching (rather
/// than full regex) keeps this both fast and trivially case-insensitive
/// once the haystack is lower-cased once per call.
static ERROR_CATALOG: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    vec![
        (
            "MySQL",
            vec![
                "you have an error in your sql syntax",
                "warning: mysql",
                "mysqlclient.",
                "com.mysql.jdbc",
                "mysql_fetch_array()",
                "mysql_fetch_assoc()",
                "mysql_num_rows()",
                "unknown column",
                "check the manual that corresponds to your mysql server version",
                "xpath syntax error",
            ],
        ),
        (
            "PostgreSQL",
            vec![
                "pg_query()",
                "pg_exec()",
                "postgresql query failed",
                "org.postgresql.util.psqlexception",
                "syntax error at or near",
                "invalid input syntax for",
                "error:  column",
            ],
        ),
        (
            "MSSQL",
            vec![
                "microsoft sql server",
                "sqlserverexception",
                "unclosed quotation mark after the character string",
                "incorrect syntax near",
                "conversion failed when converting",
                "system.data.sqlclient.sqlexception",
            ],
        ),
        (
            "Oracle",
            vec![
                "ora-00933",
                "ora-01756",
                "ora-00936",
                "ora-06512",
                "oracle.jdbc.driver",
                "quoted string not properly terminated",
            ],
        ),
        (
            "SQLite",
            vec![
                "sqlite3::sqliteexception",
                "sqlite_error",
                "sqlite.exception",
                "near \"\": syntax error",
                "unrecognized token:",
            ],
        ),
        (
            "Generic",
            vec![
                "sql syntax",
                "sql error",
                "database error",
                "query failed",
                "odbc driver",
                "jdbc driver",
            ],
        ),
    ]
});

/// Classify `body` against the error-signature catalog. Case-insensitive,
/// deduplicated per DBMS, Generic retained even when a specific DBMS
/// also matched. An empty body yields an empty map.
pub fn find_sql_errors(body: &str) -> HashMap<String, Vec<String>> {
    let mut found: HashMap<String, Vec<String>> = HashMap::new();
    if body.is_empty() {
        return found;
    }

    let lower = body.to_lowercase();

    for (dbms, patterns) in ERROR_CATALOG.iter() {
        let mut matched: Vec<String> = Vec::new();
        for pattern in patterns {
            if lower.contains(pattern) {
                let seen = matched.iter().any(|m: &String| m.eq_ignore_ascii_case(pattern));
                if !seen {
                    matched.push((*pattern).to_string());
                }
            }
        }
        if !matched.is_empty() {
            found.insert((*dbms).to_string(), matched);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_yields_empty_map() {
        assert!(find_sql_errors("").is_empty());
    }

    #[test]
    fn matches_are_case_insensitive() {
        let found = find_sql_errors("You Have An Error In Your SQL Syntax near...");
        assert!(found.contains_key("MySQL"));
    }

    #[test]
    fn is_idempotent() {
        let body = "ERROR:  syntax error at or near \"'\"";
        let first = find_sql_errors(body);
        let second = find_sql_errors(body);
        assert_eq!(first.len(), second.len());
        assert!(first.contains_key("PostgreSQL"));
    }

    #[test]
    fn generic_kept_alongside_specific() {
        let found = find_sql_errors("Database error: you have an error in your sql syntax");
        assert!(found.contains_key("MySQL"));
        assert!(found.contains_key("Generic"));
    }

    #[test]
    fn duplicate_matches_are_deduplicated() {
        let found = find_sql_errors(
            "unclosed quotation mark after the character string ... unclosed quotation mark after the character string",
        );
        assert_eq!(found.get("MSSQL").unwrap().len(), 1);
    }
}
