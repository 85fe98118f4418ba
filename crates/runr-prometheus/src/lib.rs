//! Prometheus backend for runr metrics.
//!
//! [`PrometheusMetrics`] implements [`runr_core::MetricsBackend`]; hand it to
//! the job manager, the router client and the wrapper, then serve
//! [`PrometheusMetrics::encode_text`] from whatever HTTP server the binary
//! runs.
//!
//! ## Metrics
//! - `runr_job_requests_total{source, outcome}` - Counter
//! - `runr_store_operations_total{op, result}` - Counter
//! - `runr_router_dials_total{scheme, result}` - Counter
//! - `runr_child_exits_total{outcome}` - Counter
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
