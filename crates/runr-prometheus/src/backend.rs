use std::sync::Arc;

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder, proto::MetricFamily};

use runr_core::{ExitOutcome, JobPoll, JobSource, MetricsBackend};

const NAMESPACE: &str = "runr";

/// Prometheus metrics backend.
///
/// ## Label cardinality
/// All labels are bounded:
/// - `source`: "store", "router", "network"
/// - `outcome`: "job", "no_job", "unhealthy" for requests; "success", "failure", "start_failed", "timeout" for exits
/// - `op`: "request", "list", "update", "remove"
/// - `scheme`: "grpc", "grpcs", "ws", "wss"
/// - `result`: "ok", "error"
#[derive(Clone)]
pub struct PrometheusMetrics {
    job_requests: CounterVec,
    store_ops: CounterVec,
    router_dials: CounterVec,
    child_exits: CounterVec,
    registry: Arc<Registry>,
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, prometheus::Error> {
    let c = CounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

#[inline]
fn result_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

impl PrometheusMetrics {
    /// Create a backend registering into `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            job_requests: counter(
                &registry,
                "job_requests_total",
                "Job request ticks by answering source and outcome",
                &["source", "outcome"],
            )?,
            store_ops: counter(
                &registry,
                "store_operations_total",
                "Job store operations",
                &["op", "result"],
            )?,
            router_dials: counter(
                &registry,
                "router_dials_total",
                "New job router connections by scheme",
                &["scheme", "result"],
            )?,
            child_exits: counter(
                &registry,
                "child_exits_total",
                "Wrapped process terminations",
                &["outcome"],
            )?,
            registry,
        })
    }

    /// Create a backend with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    /// Snapshot every metric family for encoding.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, ready to serve on `/metrics`.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Underlying registry, for registering extra metrics alongside.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_job_request(&self, source: JobSource, poll: &JobPoll) {
        self.job_requests
            .with_label_values(&[source.as_label(), poll.as_label()])
            .inc();
    }

    fn record_store_op(&self, op: &'static str, ok: bool) {
        self.store_ops.with_label_values(&[op, result_label(ok)]).inc();
    }

    fn record_router_dial(&self, scheme: &str, ok: bool) {
        self.router_dials
            .with_label_values(&[scheme, result_label(ok)])
            .inc();
    }

    fn record_child_exit(&self, outcome: ExitOutcome) {
        self.child_exits.with_label_values(&[outcome.as_label()]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use runr_model::JobResponse;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("metric {name} not found"))
    }

    #[test]
    fn job_requests_are_split_by_source_and_outcome() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_job_request(JobSource::Router, &JobPoll::NoJob);
        metrics.record_job_request(JobSource::Router, &JobPoll::NoJob);
        metrics.record_job_request(JobSource::Store, &JobPoll::Job(Box::new(JobResponse::default())));

        let families = metrics.gather();
        let requests = family(&families, "runr_job_requests_total");
        assert_eq!(requests.get_metric().len(), 2);
    }

    #[test]
    fn store_ops_track_errors_separately() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_store_op("update", true);
        metrics.record_store_op("update", false);
        metrics.record_store_op("remove", true);

        let families = metrics.gather();
        assert_eq!(family(&families, "runr_store_operations_total").get_metric().len(), 3);
    }

    #[test]
    fn text_exposition_contains_labels() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_router_dial("grpcs", false);
        metrics.record_child_exit(ExitOutcome::Timeout);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"runr_router_dials_total{result="error",scheme="grpcs"} 1"#), "{text}");
        assert!(text.contains(r#"runr_child_exits_total{outcome="timeout"} 1"#), "{text}");
    }

    #[test]
    fn can_use_custom_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = PrometheusMetrics::new_with_registry(registry.clone()).unwrap();

        metrics.record_child_exit(ExitOutcome::Success);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn registering_twice_in_one_registry_fails() {
        let registry = Arc::new(Registry::new());
        PrometheusMetrics::new_with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::new_with_registry(registry).is_err());
    }
}
