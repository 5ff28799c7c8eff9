//! Worker Pool.
//!
//! A fixed pool of workers drains a bounded job queue and publishes
//! `Vulnerability` records onto a bounded result queue, with explicit
//! queue capacities and per-job panic isolation via `catch_unwind` so
//! one misbehaving technique detector can't take down the whole scan.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::core::error::ScanError;
use crate::model::{Dbms, HttpResponse, Parameter, ScanIssue, ScanTarget, Severity, Vulnerability};
use crate::techniques::{DetectionContext, TechniqueDetector};
use crate::transport::Transport;

/// One unit of work: a parameter, a technique to try against it, the
/// baseline response to diff against, and the identified DBMS (if any).
pub struct Job {
    pub parameter: Parameter,
    pub technique: Arc<dyn TechniqueDetector>,
    pub baseline: Arc<HttpResponse>,
    pub dbms: Option<Dbms>,
}

/// Either a successful finding or a non-fatal issue recorded instead.
pub enum WorkerOutput {
    Vulnerability(Vulnerability),
    Issue(ScanIssue),
}

pub struct WorkerPool {
    job_tx: mpsc::Sender<Job>,
    result_rx: mpsc::Receiver<WorkerOutput>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks sharing `transport`/`target`/`cancellation`.
    /// Queue capacity is `2 * workers` for both job and result queues.
    pub fn start(
        workers: usize,
        transport: Arc<dyn Transport>,
        target: Arc<ScanTarget>,
        cancellation: CancellationToken,
        sleep_seconds: u64,
        tolerance: f64,
    ) -> Self {
        let capacity = (2 * workers).max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<WorkerOutput>(capacity);

        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let mut handles = Vec::with_capacity(workers);

        for _worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let transport = transport.clone();
            let target = target.clone();
            let cancellation = cancellation.clone();

            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };

                    if cancellation.is_cancelled() {
                        continue;
                    }

                    if let Some(output) =
                        run_job(&*transport, &target, &cancellation, sleep_seconds, tolerance, job).await
                    {
                        if result_tx.send(output).await.is_err() {
                            break;
                        }
                    }
                }
                drop(result_tx);
            });
            handles.push(handle);
        }

        drop(result_tx);

        WorkerPool {
            job_tx,
            result_rx,
            handles,
        }
    }

    /// Blocks when the job queue is full (back-pressure, per §4.8).
    pub async fn submit(&self, job: Job) -> Result<(), Job> {
        self.job_tx.send(job).await.map_err(|e| e.0)
    }

    /// Closes the job queue, waits for every worker, then drains any
    /// remaining results. Call this once all jobs have been submitted.
    pub async fn close(mut self) -> Vec<WorkerOutput> {
        drop(self.job_tx);
        for handle in self.handles {
            let _ = handle.await;
        }

        let mut outputs = Vec::new();
        while let Some(output) = self.result_rx.recv().await {
            outputs.push(output);
        }
        outputs
    }
}

/// Runs one job to completion. Returns `None` when the technique ran
/// to a normal, non-injectable conclusion — per §4.8 step 4 a record is
/// only published "when Injectable is true", and §7 reserves
/// `ScanResult.Errors` for actual errors, not negative results.
async fn run_job(
    transport: &dyn Transport,
    target: &ScanTarget,
    cancellation: &CancellationToken,
    sleep_seconds: u64,
    tolerance: f64,
    job: Job,
) -> Option<WorkerOutput> {
    let ctx = DetectionContext {
        transport,
        target,
        parameter: &job.parameter,
        baseline: &job.baseline,
        dbms: job.dbms,
        cancellation: cancellation.clone(),
        sleep_seconds,
        tolerance,
    };

    let technique = job.technique.clone();
    let parameter_name = job.parameter.name.clone();

    let outcome = AssertUnwindSafe(technique.detect(&ctx)).catch_unwind().await;

    match outcome {
        Ok(Ok(result)) => {
            if !result.injectable {
                return None;
            }
            let severity = Severity::from_confidence(result.confidence);
            Some(WorkerOutput::Vulnerability(Vulnerability {
                parameter: job.parameter,
                technique: result.technique,
                dbms: job.dbms,
                injectable: true,
                confidence: result.confidence,
                evidence: result.evidence,
                payload: result.payload,
                severity: Some(severity),
            }))
        }
        Ok(Err(ScanError::Cancelled)) => Some(WorkerOutput::Issue(ScanIssue {
            parameter: Some(parameter_name),
            technique: Some(job.technique.name().to_string()),
            message: "cancelled".to_string(),
        })),
        Ok(Err(err)) => {
            warn!(parameter = %parameter_name, technique = job.technique.name(), error = %err, "technique returned an error");
            Some(WorkerOutput::Issue(ScanIssue {
                parameter: Some(parameter_name),
                technique: Some(job.technique.name().to_string()),
                message: err.to_string(),
            }))
        }
        Err(panic) => {
            let message = panic_message(&panic);
            let panic_error = ScanError::PanicInTechnique {
                technique: job.technique.name().to_string(),
                parameter: parameter_name.clone(),
                message,
            };
            error!(parameter = %parameter_name, technique = job.technique.name(), error = %panic_error, "technique panicked");
            Some(WorkerOutput::Issue(ScanIssue {
                parameter: Some(parameter_name),
                technique: Some(job.technique.name().to_string()),
                message: panic_error.to_string(),
            }))
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
