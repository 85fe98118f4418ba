use std::{ffi::OsString, sync::Arc};

use anyhow::{Context, bail};
use axum::{Router, extract::State, http::StatusCode, http::header, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use runr_core::MetricsHandle;
use runr_observe::{LoggerConfig, init_logger};
use runr_prometheus::PrometheusMetrics;
use runr_wrapper::{ControlAddr, ControlListener, Wrapper, serve};

const ENV_PREFIX: &str = "RUNR";
const DEFAULT_WRAPPER_LISTEN: &str = "unix:///tmp/runr-wrapper.sock";

async fn metrics_handler(State(metrics): State<Arc<PrometheusMetrics>>) -> impl IntoResponse {
    match metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            e.to_string(),
        ),
    }
}

async fn serve_metrics(
    addr: String,
    metrics: Arc<PrometheusMetrics>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding metrics listener on {addr}"))?;
    info!(addr = %addr, "serving /metrics");

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Cancel `token` on the first SIGINT or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                        _ = term.recv() => info!("received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for SIGTERM");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received interrupt");
        }
        token.cancel();
    });
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // 1) logger
    let cfg = LoggerConfig::from_env(ENV_PREFIX)?;
    init_logger(&cfg)?;

    // 2) command line
    let mut argv = std::env::args_os().skip(1);
    let Some(command) = argv.next() else {
        bail!("usage: runr-agentd <command> [args...]");
    };
    let args: Vec<OsString> = argv.collect();

    // 3) metrics
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let handle: MetricsHandle = metrics.clone();

    // 4) wrapper + control plane
    let wrapper = Arc::new(Wrapper::new(command, args).with_metrics(handle));
    let listen = std::env::var(format!("{ENV_PREFIX}_WRAPPER_LISTEN"))
        .unwrap_or_else(|_| DEFAULT_WRAPPER_LISTEN.to_string());
    let addr = ControlAddr::parse(&listen)?;
    let listener = ControlListener::bind(&addr)
        .await
        .with_context(|| format!("binding control plane on {addr}"))?;
    info!(addr = %addr, "control plane listening");

    let shutdown = CancellationToken::new();
    let control = tokio::spawn(serve(listener, Arc::clone(&wrapper), shutdown.clone()));

    let metrics_task = std::env::var(format!("{ENV_PREFIX}_METRICS_LISTEN"))
        .ok()
        .filter(|s| !s.is_empty())
        .map(|addr| tokio::spawn(serve_metrics(addr, metrics, shutdown.clone())));

    // 5) run until the child exits or we are told to stop
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());
    let result = wrapper.run(cancel).await;

    shutdown.cancel();
    match control.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "control plane failed"),
        Err(e) => error!(error = %e, "control plane task panicked"),
    }
    if let Some(task) = metrics_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "metrics server failed"),
            Err(e) => error!(error = %e, "metrics task panicked"),
        }
    }

    result?;
    let reason = wrapper.failure_reason();
    if !reason.is_empty() {
        bail!("wrapped process failed: {reason}");
    }
    info!("wrapped process finished");
    Ok(())
}
