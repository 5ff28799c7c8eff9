//! Heuristic Detector.
//!
//! Runs a fixed probe sequence per parameter — baseline, a quote probe
//! that should break SQL syntax, a boolean-true probe, a boolean-false
//! probe, and (integer parameters only) a numeric-overflow probe — and
//! combines their outcomes into a single `HeuristicResult` used to
//! decide whether a parameter is worth running the (expensive)
//! technique detectors against. The baseline-then-compare shape mirrors
//! a differential probe pattern seen elsewhere in this crate for
//! boolean-blind detection; here the comparison logic lives in the
//! shared `differ` module and the probe set is fixed and small rather
//! than an open-ended payload list.

use crate::core::error::ScanOutcome;
use crate::differ::{is_different, ratio};
use crate::model::{HeuristicResult, HttpResponse, ParamType, Parameter, ScanTarget};
use crate::signatures::find_sql_errors;
use crate::transport::Transport;

/// Ratio below which two responses are considered meaningfully
/// different.
pub const DIFFERENCE_THRESHOLD: f64 = 0.98;

fn quote_probe(parameter: &Parameter) -> String {
    format!("{}'", parameter.value)
}

fn boolean_true_probe(parameter: &Parameter) -> String {
    match parameter.param_type {
        ParamType::Integer => format!("{} AND 1=1", parameter.value),
        _ => format!("{}' AND '1'='1", parameter.value),
    }
}

fn boolean_false_probe(parameter: &Parameter) -> String {
    match parameter.param_type {
        ParamType::Integer => format!("{} AND 1=2", parameter.value),
        _ => format!("{}' AND '1'='2", parameter.value),
    }
}

fn integer_overflow_probe(parameter: &Parameter) -> String {
    format!("{}99999999999", parameter.value)
}

/// Runs the probe sequence for a single parameter against `target` and
/// classifies the result. Every probe's error (transport failure or
/// cancellation) propagates and aborts detection for this parameter,
/// per §4.5 ("failure of any probe aborts detection for that parameter
/// with a propagated error"); the scanner is responsible for recording
/// the propagated error as a non-fatal `ScanIssue` and continuing with
/// the remaining parameters.
pub async fn run(
    transport: &dyn Transport,
    target: &ScanTarget,
    parameter: &Parameter,
) -> ScanOutcome<HeuristicResult> {
    let baseline = transport
        .send(target, parameter, &parameter.value)
        .await?;

    let quote_response = transport
        .send(target, parameter, &quote_probe(parameter))
        .await?;
    let true_response = transport
        .send(target, parameter, &boolean_true_probe(parameter))
        .await?;
    let false_response = transport
        .send(target, parameter, &boolean_false_probe(parameter))
        .await?;
    if parameter.param_type == ParamType::Integer {
        transport
            .send(target, parameter, &integer_overflow_probe(parameter))
            .await?;
    }

    let causes_error = !find_sql_errors(&quote_response.body_str()).is_empty();

    let dynamic_content = is_different(&baseline.body, &false_response.body, DIFFERENCE_THRESHOLD);

    let true_ratio_ok = !is_different(&baseline.body, &true_response.body, DIFFERENCE_THRESHOLD);
    let false_ratio_differs = is_different(&baseline.body, &false_response.body, DIFFERENCE_THRESHOLD);
    let boolean_injectable = true_ratio_ok && false_ratio_differs;

    let page_ratio = ratio(&baseline.body, &quote_response.body);

    let error_signatures = find_sql_errors(&quote_response.body_str());

    let is_injectable = causes_error || boolean_injectable;

    Ok(HeuristicResult {
        parameter: parameter.clone(),
        baseline,
        causes_error,
        dynamic_content,
        error_signatures,
        page_ratio,
        is_injectable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core::error::ScanOutcome;
    use crate::model::{ParamLocation, ParamType};

    struct ScriptedTransport {
        calls: AtomicUsize,
        responses: Vec<&'static str>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            _target: &ScanTarget,
            _parameter: &Parameter,
            _payload: &str,
        ) -> ScanOutcome<HttpResponse> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = self.responses[index.min(self.responses.len() - 1)];
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: body.as_bytes().to_vec(),
                elapsed: std::time::Duration::from_millis(10),
                url: "https://x.test/".to_string(),
                protocol: "HTTP/1.1".to_string(),
            })
        }

        fn stats(&self) -> (u64, u64) {
            (0, 0)
        }
    }

    fn param() -> Parameter {
        Parameter {
            name: "id".to_string(),
            value: "1".to_string(),
            location: ParamLocation::Query,
            param_type: ParamType::Integer,
        }
    }

    #[tokio::test]
    async fn error_probe_marks_causes_error() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            responses: vec![
                "Welcome",                                          // baseline
                "You have an error in your SQL syntax near '1''\"", // quote probe
                "Welcome",                                          // true
                "Welcome",                                          // false
                "Welcome",                                          // overflow
            ],
        };
        let target = ScanTarget::new("https://x.test/item?id=1", "GET");
        let result = run(&transport, &target, &param()).await.unwrap();
        assert!(result.causes_error);
        assert!(result.is_injectable);
    }

    #[tokio::test]
    async fn boolean_probes_detect_blind_injection() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            responses: vec![
                "Welcome\nItem: Widget",    // baseline
                "Welcome\nItem: Widget",    // quote probe (no error)
                "Welcome\nItem: Widget",    // true -> same as baseline
                "Welcome\nNo item found.",  // false -> differs
                "Welcome\nItem: Widget",    // overflow
            ],
        };
        let target = ScanTarget::new("https://x.test/item?id=1", "GET");
        let result = run(&transport, &target, &param()).await.unwrap();
        assert!(!result.causes_error);
        assert!(result.is_injectable);
    }

    #[tokio::test]
    async fn unaffected_parameter_is_not_injectable() {
        let transport = ScriptedTransport {
            calls: AtomicUsize::new(0),
            responses: vec!["Welcome\nItem: Widget"; 5],
        };
        let target = ScanTarget::new("https://x.test/item?id=1", "GET");
        let result = run(&transport, &target, &param()).await.unwrap();
        assert!(!result.is_injectable);
    }
}
