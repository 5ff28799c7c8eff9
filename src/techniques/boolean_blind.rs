//! Boolean-blind technique detector.
//!
//! Builds a TRUE-evaluating and a FALSE-evaluating payload within the
//! same candidate boundary, compares each against the baseline with the
//! Response Differ, and declares the parameter injectable when the
//! TRUE response reads as "same page" and the FALSE response reads as
//! "different page". Tries every candidate boundary rather than
//! assuming one fixed literal form.

use async_trait::async_trait;

use crate::core::error::{ScanError, ScanOutcome};
use crate::dbms::{candidate_boundaries, Boundary};
use crate::differ::ratio;
use crate::model::{Dbms, ParamType};

use super::{DetectionContext, DetectionResult, TechniqueDetector};

const BOOLEAN_THRESHOLD: f64 = 0.98;

fn render(boundary: &Boundary, predicate: &str) -> String {
    format!("{}OR {}{}", boundary.prefix, predicate, boundary.suffix)
}

pub struct BooleanBlindDetector;

#[async_trait]
impl TechniqueDetector for BooleanBlindDetector {
    fn name(&self) -> &'static str {
        "boolean-blind"
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn detect(&self, ctx: &DetectionContext<'_>) -> ScanOutcome<DetectionResult> {
        let is_string_context = matches!(ctx.parameter.param_type, ParamType::String);
        let dbms_for_boundaries = ctx.dbms.unwrap_or(Dbms::MySQL);

        for boundary in candidate_boundaries(is_string_context, dbms_for_boundaries) {
            if ctx.cancellation.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let true_core = render(&boundary, "1=1");
            let false_core = render(&boundary, "1=2");

            let true_payload = format!("{}{}", ctx.parameter.value, true_core);
            let false_payload = format!("{}{}", ctx.parameter.value, false_core);

            let true_response = ctx
                .transport
                .send(ctx.target, ctx.parameter, &true_payload)
                .await?;

            if ctx.cancellation.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let false_response = ctx
                .transport
                .send(ctx.target, ctx.parameter, &false_payload)
                .await?;

            let true_ratio = ratio(&ctx.baseline.body, &true_response.body);
            let false_ratio = ratio(&ctx.baseline.body, &false_response.body);

            if true_ratio >= BOOLEAN_THRESHOLD && false_ratio < BOOLEAN_THRESHOLD {
                let gap = (true_ratio - false_ratio).clamp(0.0, 1.0);
                let confidence = (0.7 + 0.3 * gap).min(1.0);
                return Ok(DetectionResult {
                    injectable: true,
                    confidence,
                    technique: self.name().to_string(),
                    evidence: format!(
                        "TRUE payload matched baseline (ratio {:.2}) while FALSE payload diverged (ratio {:.2})",
                        true_ratio, false_ratio
                    ),
                    payload: true_payload,
                });
            }
        }

        Ok(DetectionResult::not_injectable(self.name()))
    }
}
