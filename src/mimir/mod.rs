use crate::probe::result::RunResults;
use crate::probe::summary::{Status, aggregate};
use prompb::TimeSeries;

pub mod client;
pub mod prompb;

const JOB_LABEL: &str = "job";
const METHOD_LABEL: &str = "method";
const TARGET_LABEL: &str = "target";
const ENDPOINT_LABEL: &str = "endpoint";
const PHASE_LABEL: &str = "phase";
const PROBE_SUCCESS_METRIC: &str = "probe_success";
const PROBE_ATTEMPTS_TOTAL_METRIC: &str = "probe_attempts_total";
const PROBE_ATTEMPTS_SUCCESSFUL_METRIC: &str = "probe_attempts_successful";
const PROBE_PHASE_DURATION_METRIC: &str = "probe_phase_duration_seconds";

const PROBE_JOB: &str = "sniprobe";

/// Creates the metrics of a run, one group per method and endpoint:
///    - `probe_success`: 1.0 when every attempt succeeded, 0.0 otherwise.
///    - `probe_attempts_total`: Number of attempts made.
///    - `probe_attempts_successful`: Number of attempts without error.
///    - `probe_phase_duration_seconds`: Average duration of the transport, tls and ttfb phases
///      over the successful attempts, only present when at least one attempt succeeded.
///
/// All samples share one timestamp.
pub fn create_run_metrics(results: &RunResults, timestamp_ms: i64) -> Vec<TimeSeries> {
    let mut metrics = Vec::new();

    for (method, per_endpoint) in results.iter() {
        for result in per_endpoint {
            let summary = aggregate(result);
            let endpoint = result.endpoint.to_string();
            let labels = [
                (JOB_LABEL, PROBE_JOB),
                (METHOD_LABEL, method),
                (TARGET_LABEL, result.sni.as_str()),
                (ENDPOINT_LABEL, endpoint.as_str()),
            ];
            let series = |name: &str, value: f64| {
                client::create_time_series(name, &labels, value, Some(timestamp_ms))
            };

            let success = match summary.status() {
                Status::Success => 1.0,
                Status::Partial | Status::Failed => 0.0,
            };
            metrics.push(series(PROBE_SUCCESS_METRIC, success));
            metrics.push(series(
                PROBE_ATTEMPTS_TOTAL_METRIC,
                summary.total_attempts as f64,
            ));
            metrics.push(series(
                PROBE_ATTEMPTS_SUCCESSFUL_METRIC,
                summary.success_count as f64,
            ));

            if summary.success_count == 0 {
                continue;
            }
            let phases = [
                (summary.avg_transport, "transport"),
                (summary.avg_tls, "tls"),
                (summary.avg_ttfb, "ttfb"),
            ];
            for (duration, phase) in phases {
                let mut phase_labels = labels.to_vec();
                phase_labels.push((PHASE_LABEL, phase));
                metrics.push(client::create_time_series(
                    PROBE_PHASE_DURATION_METRIC,
                    &phase_labels,
                    duration.as_secs_f64(),
                    Some(timestamp_ms),
                ));
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::probe::context::ContextError;
    use crate::probe::result::{AttemptResult, MethodEndpointResult};

    fn label<'a>(series: &'a TimeSeries, name: &str) -> Option<&'a str> {
        series
            .labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    fn results() -> RunResults {
        let ok = AttemptResult {
            transport: Duration::from_millis(10),
            tls_handshake: Duration::from_millis(20),
            ttfb: Duration::from_millis(30),
            ..Default::default()
        };
        let mut partial = MethodEndpointResult::new("example.com", "192.0.2.1:443".parse().unwrap(), 2);
        partial.attempts.push(ok);
        partial
            .attempts
            .push(AttemptResult::default().failed(ContextError::DeadlineExceeded));

        let mut failed = MethodEndpointResult::new("example.com", "192.0.2.1:443".parse().unwrap(), 1);
        failed
            .attempts
            .push(AttemptResult::default().failed(ContextError::DeadlineExceeded));

        let mut results = RunResults::default();
        results.record("Default - TCP - TLS 1.3", vec![partial]);
        results.record("Native - TCP - TLS", vec![failed]);
        results
    }

    #[test]
    fn test_partial_method_metrics() {
        let metrics = create_run_metrics(&results(), 1_000);
        let partial: Vec<&TimeSeries> = metrics
            .iter()
            .filter(|series| label(series, METHOD_LABEL) == Some("Default - TCP - TLS 1.3"))
            .collect();
        assert_eq!(partial.len(), 6);

        let success = partial
            .iter()
            .find(|series| label(series, "__name__") == Some(PROBE_SUCCESS_METRIC))
            .unwrap();
        assert_eq!(success.samples[0].value, 0.0);
        assert_eq!(success.samples[0].timestamp, 1_000);
        assert_eq!(label(success, JOB_LABEL), Some(PROBE_JOB));
        assert_eq!(label(success, TARGET_LABEL), Some("example.com"));
        assert_eq!(label(success, ENDPOINT_LABEL), Some("192.0.2.1:443"));

        let tls = partial
            .iter()
            .find(|series| label(series, PHASE_LABEL) == Some("tls"))
            .unwrap();
        assert!((tls.samples[0].value - 0.020).abs() < 1e-9);
    }

    #[test]
    fn test_failed_method_has_no_phase_durations() {
        let metrics = create_run_metrics(&results(), 1_000);
        let failed: Vec<&TimeSeries> = metrics
            .iter()
            .filter(|series| label(series, METHOD_LABEL) == Some("Native - TCP - TLS"))
            .collect();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|series| label(series, PHASE_LABEL).is_none()));
    }

    #[test]
    fn test_empty_run_has_no_metrics() {
        assert!(create_run_metrics(&RunResults::default(), 0).is_empty());
    }
}
