//! Scanner orchestration.
//!
//! Ties every other component together: parse parameters, send the
//! baseline, run heuristics, identify the DBMS, dispatch
//! (parameter, technique) jobs to the Worker Pool, and aggregate the
//! results into a `ScanResult`.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::config::{ScanConfig, TechniqueKind};
use crate::core::error::{ScanError, ScanOutcome};
use crate::fingerprint;
use crate::heuristic;
use crate::model::{DbmsInfo, ScanIssue, ScanResult, ScanTarget};
use crate::params;
use crate::techniques::{all_detectors, TechniqueDetector};
use crate::transport::Transport;
use crate::worker::{Job, WorkerOutput, WorkerPool};

/// Invoked with a short human-readable line after each notable step,
/// keeping the scanner decoupled from any particular console library.
pub type ProgressCallback<'a> = Box<dyn Fn(&str) + Send + Sync + 'a>;

fn technique_enabled(kind: &TechniqueKind, name: &str) -> bool {
    matches!(
        (kind, name),
        (TechniqueKind::ErrorBased, "error-based")
            | (TechniqueKind::BooleanBlind, "boolean-blind")
            | (TechniqueKind::TimeBased, "time-based")
    )
}

pub struct Scanner {
    transport: Arc<dyn Transport>,
    config: ScanConfig,
    cancellation: CancellationToken,
}

impl Scanner {
    pub fn new(transport: Arc<dyn Transport>, config: ScanConfig, cancellation: CancellationToken) -> Self {
        Scanner {
            transport,
            config,
            cancellation,
        }
    }

    pub async fn run(
        &self,
        mut target: ScanTarget,
        progress: Option<ProgressCallback<'_>>,
    ) -> ScanOutcome<ScanResult> {
        let progress = progress.unwrap_or_else(|| Box::new(|_: &str| {}));
        let start_time = Utc::now();
        let mut errors: Vec<ScanIssue> = Vec::new();

        target.parameters = params::parse(
            &target.url,
            &target.body,
            target.content_type.as_deref(),
        );
        progress(&format!("parsed {} parameter(s)", target.parameters.len()));

        if target.parameters.is_empty() {
            warn!("no parameters found on target; nothing to scan");
            return Ok(ScanResult {
                target_url: target.url.clone(),
                target_method: target.method.clone(),
                vulnerabilities: Vec::new(),
                dbms: None,
                start_time,
                end_time: Utc::now(),
                request_count: self.transport.stats().0,
                errors,
            });
        }

        let baseline_parameter = target.parameters[0].clone();
        let baseline = self
            .transport
            .send(&target, &baseline_parameter, &baseline_parameter.value)
            .await?;

        progress("running heuristic detection");
        let mut heuristic_results = Vec::with_capacity(target.parameters.len());
        for parameter in &target.parameters {
            if self.cancellation.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            match heuristic::run(self.transport.as_ref(), &target, parameter).await {
                Ok(result) => {
                    heuristic_results.push(result);
                }
                Err(err) => {
                    errors.push(ScanIssue {
                        parameter: Some(parameter.name.clone()),
                        technique: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        let dbms = self.identify_dbms(&target, &baseline_parameter, &heuristic_results).await?;
        if let Some(info) = &dbms {
            progress(&format!(
                "identified DBMS: {} (confidence {:.2})",
                info.name.canonical_name(),
                info.confidence
            ));
        } else {
            progress("DBMS not identified");
        }

        let candidates: Vec<_> = heuristic_results
            .iter()
            .filter(|h| h.is_injectable || self.config.force_test)
            .map(|h| h.parameter.clone())
            .collect();
        progress(&format!("{} candidate parameter(s) selected", candidates.len()));

        let detectors: Vec<Arc<dyn TechniqueDetector>> = all_detectors()
            .into_iter()
            .filter(|d| {
                self.config
                    .techniques
                    .as_ref()
                    .map(|kinds| kinds.iter().any(|k| technique_enabled(k, d.name())))
                    .unwrap_or(true)
            })
            .map(Arc::from)
            .collect();

        let baseline = Arc::new(baseline);
        let transport = self.transport.clone();
        let target = Arc::new(target);

        let pool = WorkerPool::start(
            self.config.threads,
            transport,
            target.clone(),
            self.cancellation.clone(),
            self.config.timing.sleep_seconds,
            self.config.timing.tolerance,
        );

        for parameter in candidates {
            for detector in &detectors {
                if self.cancellation.is_cancelled() {
                    break;
                }
                let job = Job {
                    parameter: parameter.clone(),
                    technique: detector.clone(),
                    baseline: baseline.clone(),
                    dbms: dbms.as_ref().map(|d| d.name),
                };
                if pool.submit(job).await.is_err() {
                    break;
                }
            }
        }

        let outputs = pool.close().await;
        let request_count = self.transport.stats().0;

        let mut vulnerabilities = Vec::new();
        for output in outputs {
            match output {
                WorkerOutput::Vulnerability(v) => vulnerabilities.push(v),
                WorkerOutput::Issue(issue) => errors.push(issue),
            }
        }

        info!(
            vulnerabilities = vulnerabilities.len(),
            requests = request_count,
            "scan complete"
        );

        Ok(ScanResult {
            target_url: target.url.clone(),
            target_method: target.method.clone(),
            vulnerabilities,
            dbms,
            start_time,
            end_time: Utc::now(),
            request_count,
            errors,
        })
    }

    async fn identify_dbms(
        &self,
        target: &ScanTarget,
        first_parameter: &crate::model::Parameter,
        heuristic_results: &[crate::model::HeuristicResult],
    ) -> ScanOutcome<Option<DbmsInfo>> {
        if let Some(hint) = &self.config.dbms_hint {
            if let Some(dbms) = crate::model::Dbms::from_name(hint) {
                return Ok(Some(DbmsInfo {
                    name: dbms,
                    version: None,
                    banner: None,
                    confidence: 1.0,
                }));
            }
        }

        let mut merged_signatures: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        for result in heuristic_results {
            for (dbms, matches) in &result.error_signatures {
                let entry = merged_signatures.entry(dbms.clone()).or_default();
                for m in matches {
                    if !entry.iter().any(|e: &String| e.eq_ignore_ascii_case(m)) {
                        entry.push(m.clone());
                    }
                }
            }
        }
        if let Some(info) = fingerprint::identify_from_errors(&merged_signatures) {
            return Ok(Some(info));
        }

        fingerprint::identify_behavioral(self.transport.as_ref(), target, first_parameter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technique_enabled_maps_kinds_to_names() {
        assert!(technique_enabled(&TechniqueKind::ErrorBased, "error-based"));
        assert!(!technique_enabled(&TechniqueKind::ErrorBased, "time-based"));
    }
}
