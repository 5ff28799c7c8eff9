use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::scope::ScopeManager;

/// Which of the three technique families are enabled for a scan. All
/// three run by default; `--technique E,B,T` on the CLI narrows this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TechniqueKind {
    ErrorBased,
    BooleanBlind,
    TimeBased,
}

impl TechniqueKind {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag.to_ascii_uppercase() {
            'E' => Some(TechniqueKind::ErrorBased),
            'B' => Some(TechniqueKind::BooleanBlind),
            'T' => Some(TechniqueKind::TimeBased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub sleep_seconds: u64,
    pub tolerance: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sleep_seconds: 5,
            tolerance: 0.7,
        }
    }
}

/// Scan-time configuration. Populated from an optional TOML file via
/// [`ScanConfig::load_or_default`] and then overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub threads: usize,
    pub timeout_seconds: u64,
    pub follow_redirects: bool,
    pub dbms_hint: Option<String>,
    pub techniques: Option<Vec<TechniqueKind>>,
    pub force_test: bool,
    pub timing: TimingConfig,
    pub proxy: Option<String>,
    pub rate_limit_per_sec: Option<u32>,
    #[serde(skip)]
    pub scope: Arc<ScopeManager>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigFile {
    threads: usize,
    timeout_seconds: u64,
    follow_redirects: bool,
    dbms_hint: Option<String>,
    force_test: bool,
    timing: TimingConfig,
    proxy: Option<String>,
    rate_limit_per_sec: Option<u32>,
    scope: ScopeFile,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScopeFile {
    authorized_targets: Vec<String>,
}

impl ScanConfig {
    /// Load config from file, or use defaults if the file doesn't exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let file: ConfigFile = toml::from_str(&contents).context("Failed to parse config file")?;
        let scope = Arc::new(ScopeManager::new(file.scope.authorized_targets));

        Ok(ScanConfig {
            threads: file.threads,
            timeout_seconds: file.timeout_seconds,
            follow_redirects: file.follow_redirects,
            dbms_hint: file.dbms_hint,
            techniques: None,
            force_test: file.force_test,
            timing: file.timing,
            proxy: file.proxy,
            rate_limit_per_sec: file.rate_limit_per_sec,
            scope,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = ConfigFile {
            threads: self.threads,
            timeout_seconds: self.timeout_seconds,
            follow_redirects: self.follow_redirects,
            dbms_hint: self.dbms_hint.clone(),
            force_test: self.force_test,
            timing: self.timing.clone(),
            proxy: self.proxy.clone(),
            rate_limit_per_sec: self.rate_limit_per_sec,
            scope: ScopeFile {
                authorized_targets: self.scope.list_targets(),
            },
        };

        let contents = toml::to_string_pretty(&file).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            threads: 10,
            timeout_seconds: 30,
            follow_redirects: false,
            dbms_hint: None,
            techniques: None,
            force_test: false,
            timing: TimingConfig::default(),
            proxy: None,
            rate_limit_per_sec: None,
            scope: Arc::new(ScopeManager::new(vec![])),
        }
    }
}
