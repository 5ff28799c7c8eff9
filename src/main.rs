//! `sqleech` CLI. A thin `clap`-driven adapter around the library in
//! `lib.rs`:
//! it builds a `ScanTarget` and a `ScanConfig` from flags, runs the
//! `Scanner`, and renders the result. Banner, `clap` derive
//! `Cli`/`Commands`, `tracing-subscriber` `EnvFilter` wired to
//! `--verbose` — the `scan` and `scope` subcommands are the only
//! concerns this binary carries.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqleech::cli::banner::display_banner;
use sqleech::core::config::{ScanConfig, TechniqueKind};
use sqleech::model::{Dbms, ScanTarget};
use sqleech::report;
use sqleech::scanner::Scanner;
use sqleech::session_store::SessionStore;
use sqleech::transport::{ReqwestTransport, Transport};

const DEFAULT_CONFIG_PATH: &str = "sqleech.toml";

#[derive(Parser)]
#[command(name = "sqleech")]
#[command(about = "Automated SQL injection detection engine for authorized security testing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a single HTTP request for SQL injection.
    Scan {
        /// Target URL, including the query string to test.
        #[arg(long)]
        url: String,

        /// HTTP method.
        #[arg(long, default_value = "GET")]
        method: String,

        /// Request body (form-urlencoded unless overridden by -H).
        #[arg(long)]
        data: Option<String>,

        /// `name=value` cookie; may be repeated.
        #[arg(long = "cookie")]
        cookies: Vec<String>,

        /// `Name: value` request header; may be repeated.
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Upstream proxy URL (e.g. http://127.0.0.1:8080).
        #[arg(long)]
        proxy: Option<String>,

        /// Per-request timeout, in seconds.
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Upgrade the target URL's scheme to https.
        #[arg(long)]
        force_ssl: bool,

        /// Send a randomized User-Agent header.
        #[arg(long)]
        random_agent: bool,

        /// Write the report to this path instead of stdout.
        #[arg(long)]
        output: Option<String>,

        /// Report format.
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Force identification to a specific DBMS (MySQL, PostgreSQL, MSSQL, Oracle, SQLite).
        #[arg(long)]
        dbms: Option<String>,

        /// Restrict to specific techniques: comma-separated E (error-based), B (boolean-blind), T (time-based).
        #[arg(long, value_delimiter = ',')]
        technique: Option<Vec<char>>,

        /// Bypass heuristic filtering and test every parameter with every technique.
        #[arg(long)]
        force_test: bool,

        /// Worker pool size.
        #[arg(long, default_value_t = 10)]
        threads: usize,

        /// Persist/resume scan state at this path.
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage the authorized-target scope enforced before every scan.
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },
}

#[derive(Subcommand)]
enum ScopeAction {
    /// Authorize a target (IP, CIDR, hostname, or `*.`-wildcard domain).
    Add { target: String },
    /// Remove a target from the authorized scope.
    Remove { target: String },
    /// List authorized targets.
    List,
    /// Check whether a target is in scope.
    Check { target: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let show_banner = args.len() == 1
        || args.iter().any(|a| a == "--help" || a == "-h" || a == "help");
    if show_banner {
        display_banner();
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sqleech={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Scan {
            url,
            method,
            data,
            cookies,
            headers,
            proxy,
            timeout,
            force_ssl,
            random_agent,
            output,
            format,
            dbms,
            technique,
            force_test,
            threads,
            session,
        } => {
            run_scan(ScanArgs {
                url,
                method,
                data,
                cookies,
                headers,
                proxy,
                timeout,
                force_ssl,
                random_agent,
                output,
                format,
                dbms,
                technique,
                force_test,
                threads,
                session,
            })
            .await
        }
        Commands::Scope { action } => handle_scope(action),
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }

    Ok(())
}

struct ScanArgs {
    url: String,
    method: String,
    data: Option<String>,
    cookies: Vec<String>,
    headers: Vec<String>,
    proxy: Option<String>,
    timeout: u64,
    force_ssl: bool,
    random_agent: bool,
    output: Option<String>,
    format: ReportFormat,
    dbms: Option<String>,
    technique: Option<Vec<char>>,
    force_test: bool,
    threads: usize,
    session: Option<String>,
}

const RANDOM_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Picks a pseudo-random entry using the process id and current time as
/// a seed — good enough to vary the header across invocations without
/// pulling in a `rand` dependency.
fn pick_random_user_agent() -> &'static str {
    let seed = std::process::id() as u64 ^ std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    RANDOM_USER_AGENTS[(seed as usize) % RANDOM_USER_AGENTS.len()]
}

async fn run_scan(args: ScanArgs) -> Result<()> {
    let mut config = ScanConfig::load_or_default(DEFAULT_CONFIG_PATH)
        .context("failed to load sqleech config")?;

    config.threads = args.threads;
    config.timeout_seconds = args.timeout;
    config.force_test = args.force_test;
    if args.proxy.is_some() {
        config.proxy = args.proxy.clone();
    }

    if let Some(hint) = &args.dbms {
        if Dbms::from_name(hint).is_none() {
            bail!("unknown DBMS hint '{hint}'");
        }
        config.dbms_hint = Some(hint.clone());
    }

    if let Some(flags) = &args.technique {
        let mut kinds = Vec::new();
        for flag in flags {
            match TechniqueKind::from_flag(*flag) {
                Some(kind) => kinds.push(kind),
                None => bail!("unknown technique flag '{flag}' (expected one of E, B, T)"),
            }
        }
        if kinds.is_empty() {
            bail!("--technique given with no recognized flags");
        }
        config.techniques = Some(kinds);
    }

    let url = if args.force_ssl {
        upgrade_to_https(&args.url)
    } else {
        args.url.clone()
    };

    let host = url::host_of(&url).context("failed to parse target URL")?;
    let scope_configured = !config.scope.list_targets().is_empty();
    if scope_configured && !config.scope.is_in_scope(&host) {
        bail!(
            "target host '{host}' is not in the authorized scope; add it with `sqleech scope add {host}`"
        );
    }

    let mut target = ScanTarget::new(url, args.method);

    for cookie in &args.cookies {
        if let Some((name, value)) = cookie.split_once('=') {
            target = target.with_cookie(name.trim(), value.trim());
        } else {
            bail!("invalid --cookie value '{cookie}', expected name=value");
        }
    }

    let mut explicit_content_type: Option<String> = None;
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("invalid -H value '{header}', expected 'Name: value'"))?;
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-type") {
            explicit_content_type = Some(value.to_string());
            continue;
        }
        target = target.with_header(name, value);
    }

    if args.random_agent {
        let agent = pick_random_user_agent();
        info!(user_agent = agent, "using randomized User-Agent");
        target = target.with_header("User-Agent", agent);
    }

    if let Some(body) = args.data {
        let content_type = explicit_content_type
            .clone()
            .unwrap_or_else(|| "application/x-www-form-urlencoded".to_string());
        target = target.with_body(body, content_type);
    } else if let Some(content_type) = explicit_content_type {
        target.content_type = Some(content_type);
    }

    let transport = Arc::new(
        ReqwestTransport::new(config.timeout_seconds, config.follow_redirects, config.proxy.as_deref())
            .context("failed to build HTTP transport")?,
    );
    if let Some(per_second) = config.rate_limit_per_sec {
        transport.set_rate_limit(Some(per_second));
    }

    let cancellation = CancellationToken::new();
    let ctrl_c_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "cancelling scan...".yellow());
            ctrl_c_token.cancel();
        }
    });

    let session_store = args
        .session
        .as_ref()
        .map(|path| SessionStore::load(path))
        .transpose()
        .context("failed to load session store")?;

    let scanner = Scanner::new(transport, config, cancellation);
    let progress: Box<dyn Fn(&str) + Send + Sync> =
        Box::new(|msg: &str| eprintln!("{} {msg}", "→".blue()));

    let scan_result = scanner.run(target, Some(progress)).await?;

    if let Some(store) = &session_store {
        store.record(&scan_result).context("failed to persist session")?;
    }

    let rendered = match args.format {
        ReportFormat::Text => report::to_text(&scan_result),
        ReportFormat::Json => report::to_json_string(&scan_result)
            .context("failed to serialize report as JSON")?,
    };

    match args.output {
        Some(path) => {
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create output file '{path}'"))?;
            file.write_all(rendered.as_bytes())
                .with_context(|| format!("failed to write output file '{path}'"))?;
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn upgrade_to_https(url: &str) -> String {
    url.strip_prefix("http://")
        .map(|rest| format!("https://{rest}"))
        .unwrap_or_else(|| url.to_string())
}

/// Minimal host extraction: enough for the scope guard, without pulling
/// in a dedicated URL-parsing crate just for this one field.
mod url {
    pub fn host_of(raw: &str) -> anyhow::Result<String> {
        let without_scheme = raw
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(raw);
        let authority = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or(without_scheme);
        let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
        let host = host.split(':').next().unwrap_or(host);
        if host.is_empty() {
            anyhow::bail!("could not determine host from URL '{raw}'");
        }
        Ok(host.to_string())
    }
}

fn handle_scope(action: ScopeAction) -> Result<()> {
    let config = ScanConfig::load_or_default(DEFAULT_CONFIG_PATH)?;

    match action {
        ScopeAction::Add { target } => {
            config.scope.add_target(&target)?;
            config.save(DEFAULT_CONFIG_PATH)?;
            println!("{} added '{}' to the authorized scope", "✓".green(), target);
        }
        ScopeAction::Remove { target } => {
            config.scope.remove_target(&target)?;
            config.save(DEFAULT_CONFIG_PATH)?;
            println!("{} removed '{}' from the authorized scope", "✓".green(), target);
        }
        ScopeAction::List => {
            let targets = config.scope.list_targets();
            if targets.is_empty() {
                println!("no authorized targets configured (scope is unrestricted)");
            } else {
                println!("{}", "authorized targets:".bright_blue());
                for target in targets {
                    println!("  {target}");
                }
            }
        }
        ScopeAction::Check { target } => {
            if config.scope.list_targets().is_empty() || config.scope.is_in_scope(&target) {
                println!("{} '{}' is in scope", "✓".green(), target);
            } else {
                println!("{} '{}' is NOT in scope", "✗".red(), target);
            }
        }
    }

    Ok(())
}
