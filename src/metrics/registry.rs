use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` macros can be used anywhere in
/// the crate. The `PrometheusHandle` is kept only to render `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe every metric.
    /// Fails if a recorder is already installed in this process.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )?
            .install_recorder()?;

        // request path
        describe_counter!(
            "api_requests_received_total",
            Unit::Count,
            "Requests that entered the middleware chain"
        );
        describe_counter!(
            "api_responses_sent_total",
            Unit::Count,
            "Responses written, labelled by status code"
        );
        describe_histogram!(
            "api_request_duration_seconds",
            Unit::Seconds,
            "Time from request arrival to response"
        );
        describe_counter!(
            "api_panics_recovered_total",
            Unit::Count,
            "Handler panics converted into 500 responses"
        );

        // rate limiting
        describe_counter!(
            "api_rate_limit_allowed_total",
            Unit::Count,
            "Requests admitted by the rate limiter"
        );
        describe_counter!(
            "api_rate_limit_rejected_total",
            Unit::Count,
            "Requests rejected by the rate limiter"
        );
        describe_gauge!(
            "api_rate_limit_clients",
            Unit::Count,
            "Client identities currently tracked by the rate limiter"
        );

        // auth
        describe_counter!(
            "api_auth_failures_total",
            Unit::Count,
            "Authentication and authorization rejections, labelled by reason"
        );

        // connections
        describe_gauge!(
            "api_connections_active",
            Unit::Count,
            "Open downstream connections"
        );
        describe_counter!(
            "api_connections_total",
            Unit::Count,
            "Accept attempts, labelled by outcome"
        );

        Ok(Self { handle })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
