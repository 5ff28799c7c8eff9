//! Error-based technique detector.
//!
//! Substitutes a version-leak expression into the target DBMS's
//! error-payload templates, wraps the result in a candidate boundary,
//! and checks whether the probe response carries an error signature
//! for that DBMS that the baseline did not already carry. The literal
//! payload strings are assembled from the DBMS Knowledge Base rather
//! than hard-coded here.

use async_trait::async_trait;

use crate::core::error::{ScanError, ScanOutcome};
use crate::dbms::payload::{fill_query_template, PayloadBuilder};
use crate::dbms::{candidate_boundaries, dialect};
use crate::model::{Dbms, ParamType};
use crate::signatures::find_sql_errors;

use super::{DetectionContext, DetectionResult, TechniqueDetector};

pub struct ErrorBasedDetector;

#[async_trait]
impl TechniqueDetector for ErrorBasedDetector {
    fn name(&self) -> &'static str {
        "error-based"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn detect(&self, ctx: &DetectionContext<'_>) -> ScanOutcome<DetectionResult> {
        let candidates: Vec<Dbms> = match ctx.dbms {
            Some(dbms) => vec![dbms],
            None => Dbms::ALL.to_vec(),
        };

        let is_string_context = matches!(ctx.parameter.param_type, ParamType::String);
        let baseline_errors = find_sql_errors(&ctx.baseline.body_str());

        for dbms in candidates {
            if ctx.cancellation.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            let dialect = dialect(dbms);
            let baseline_had_error = baseline_errors
                .get(dbms.canonical_name())
                .map(|m| !m.is_empty())
                .unwrap_or(false);

            for template in dialect.error_payload_templates {
                for boundary in candidate_boundaries(is_string_context, dbms) {
                    if ctx.cancellation.is_cancelled() {
                        return Err(ScanError::Cancelled);
                    }

                    let query = dialect.version_expr;
                    let core = fill_query_template(template, query);
                    let builder = PayloadBuilder::new(boundary, core);
                    let payload_value = format!("{}{}", ctx.parameter.value, builder.raw());

                    let response = ctx
                        .transport
                        .send(ctx.target, ctx.parameter, &payload_value)
                        .await?;

                    let probe_errors = find_sql_errors(&response.body_str());
                    let matched = probe_errors
                        .get(dbms.canonical_name())
                        .map(|m| !m.is_empty())
                        .unwrap_or(false);

                    if matched && !baseline_had_error {
                        return Ok(DetectionResult {
                            injectable: true,
                            confidence: 0.9,
                            technique: self.name().to_string(),
                            evidence: format!(
                                "{} error signature appeared in probe response but not baseline",
                                dbms.canonical_name()
                            ),
                            payload: payload_value,
                        });
                    }
                }
            }
        }

        Ok(DetectionResult::not_injectable(self.name()))
    }
}
