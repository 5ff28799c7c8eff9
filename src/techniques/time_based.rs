//! Time-based technique detector.
//!
//! Sends a TRUE-conditioned sleep payload and a FALSE-conditioned
//! counterpart built from the DBMS Knowledge Base's `if_then_else` and
//! `sleep_fn` (`SLEEP`, `pg_sleep`, `WAITFOR DELAY`, ...), and compares
//! elapsed duration against a threshold derived from the baseline's own
//! latency plus a configurable tolerance.

use async_trait::async_trait;

use crate::core::error::{ScanError, ScanOutcome};
use crate::dbms::{candidate_boundaries, dialect};
use crate::model::{Dbms, ParamType};

use super::{DetectionContext, DetectionResult, TechniqueDetector};

pub struct TimeBasedDetector;

#[async_trait]
impl TechniqueDetector for TimeBasedDetector {
    fn name(&self) -> &'static str {
        "time-based"
    }

    fn priority(&self) -> i32 {
        2
    }

    async fn detect(&self, ctx: &DetectionContext<'_>) -> ScanOutcome<DetectionResult> {
        let candidates: Vec<Dbms> = match ctx.dbms {
            Some(dbms) => vec![dbms],
            None => Dbms::ALL.to_vec(),
        };

        let is_string_context = matches!(ctx.parameter.param_type, ParamType::String);
        let threshold = ctx.baseline.elapsed.as_secs_f64() + ctx.tolerance * ctx.sleep_seconds as f64;

        for dbms in candidates {
            if ctx.cancellation.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let dialect = dialect(dbms);
            let sleep_expr = (dialect.sleep_fn)(ctx.sleep_seconds);

            for boundary in candidate_boundaries(is_string_context, dbms) {
                if ctx.cancellation.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }

                let true_core = (dialect.if_then_else)("1=1", &sleep_expr, "0");
                let false_core = (dialect.if_then_else)("1=2", &sleep_expr, "0");

                let true_payload = format!(
                    "{}{}{}{}",
                    ctx.parameter.value, boundary.prefix, true_core, boundary.suffix
                );
                let false_payload = format!(
                    "{}{}{}{}",
                    ctx.parameter.value, boundary.prefix, false_core, boundary.suffix
                );

                let true_response = ctx
                    .transport
                    .send(ctx.target, ctx.parameter, &true_payload)
                    .await?;
                let true_elapsed = true_response.elapsed.as_secs_f64();

                if true_elapsed < threshold {
                    continue;
                }

                let false_response = ctx
                    .transport
                    .send(ctx.target, ctx.parameter, &false_payload)
                    .await?;
                let false_elapsed = false_response.elapsed.as_secs_f64();

                if false_elapsed < threshold {
                    let margin = (true_elapsed - threshold).max(0.0);
                    let confidence = (0.7 + 0.3 * (margin / ctx.sleep_seconds as f64).min(1.0)).min(1.0);
                    return Ok(DetectionResult {
                        injectable: true,
                        confidence,
                        technique: self.name().to_string(),
                        evidence: format!(
                            "TRUE payload took {:.2}s (threshold {:.2}s) while FALSE payload took {:.2}s",
                            true_elapsed, threshold, false_elapsed
                        ),
                        payload: true_payload,
                    });
                }
            }
        }

        Ok(DetectionResult::not_injectable(self.name()))
    }
}
