//! Technique Detectors.
//!
//! Three pluggable detectors sharing one small async contract, run by
//! the Worker Pool.

pub mod boolean_blind;
pub mod error_based;
pub mod time_based;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::ScanOutcome;
use crate::model::{Dbms, HttpResponse, Parameter, ScanTarget};
use crate::transport::Transport;

/// What a detector needs to run one probe sequence, bundled so adding a
/// field never changes every call site.
pub struct DetectionContext<'a> {
    pub transport: &'a dyn Transport,
    pub target: &'a ScanTarget,
    pub parameter: &'a Parameter,
    pub baseline: &'a HttpResponse,
    pub dbms: Option<Dbms>,
    pub cancellation: CancellationToken,
    pub sleep_seconds: u64,
    pub tolerance: f64,
}

/// The outcome of running one technique against one parameter.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub injectable: bool,
    pub confidence: f64,
    pub technique: String,
    pub evidence: String,
    pub payload: String,
}

impl DetectionResult {
    pub fn not_injectable(technique: &str) -> Self {
        DetectionResult {
            injectable: false,
            confidence: 0.0,
            technique: technique.to_string(),
            evidence: "no decisive difference observed".to_string(),
            payload: String::new(),
        }
    }
}

#[async_trait]
pub trait TechniqueDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    async fn detect(&self, ctx: &DetectionContext<'_>) -> ScanOutcome<DetectionResult>;
}

pub fn all_detectors() -> Vec<Box<dyn TechniqueDetector>> {
    vec![
        Box::new(error_based::ErrorBasedDetector),
        Box::new(boolean_blind::BooleanBlindDetector),
        Box::new(time_based::TimeBasedDetector),
    ]
}
