//! Prometheus metrics exposition
//!
//! - `oauth_requests_total` (counter): labels `endpoint`, `outcome`
//! - `oauth_request_duration_seconds` (histogram): label `endpoint`
//! - `oauth_errors_total` (counter): label `problem`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "oauth_request_duration_seconds";

/// Handshakes touch the store and do one HMAC or RSA check, so the range
/// stops well short of a second.
const DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed protocol request.
///
/// `outcome` is `ok` or the OAuth problem code of the failure.
pub fn record_request(endpoint: &'static str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "oauth_requests_total",
        "endpoint" => endpoint,
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "endpoint" => endpoint).record(duration_secs);
}

/// Record a refused request by its OAuth problem code.
pub fn record_error(problem: &'static str) {
    metrics::counter!("oauth_errors_total", "problem" => problem).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Isolated recorder so tests never race on the global one.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("initiate", "ok", 0.01);
        record_error("nonce_used");
    }

    #[test]
    fn record_request_increments_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("initiate", "ok", 0.002);
        record_request("token", "verifier_invalid", 0.004);

        let output = handle.render();
        assert!(output.contains("oauth_requests_total"));
        assert!(output.contains("endpoint=\"initiate\""));
        assert!(output.contains("outcome=\"ok\""));
        assert!(output.contains("outcome=\"verifier_invalid\""));
        assert!(
            output.contains("oauth_request_duration_seconds_bucket"),
            "histogram must render _bucket lines"
        );
    }

    #[test]
    fn record_error_carries_problem_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_error("signature_invalid");
        record_error("signature_invalid");
        record_error("nonce_used");

        let output = handle.render();
        assert!(output.contains("oauth_errors_total{problem=\"signature_invalid\"} 2"));
        assert!(output.contains("problem=\"nonce_used\""));
    }

    #[test]
    fn histogram_buckets_are_ascending() {
        assert!(DURATION_BUCKETS.windows(2).all(|w| w[0] < w[1]));
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);
        record_request("verify", "ok", 0.003);
        assert!(handle.render().contains("le=\"0.005\""));
    }
}
