use tracing_subscriber::{
    Layer, Registry, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::logger::{LoggerConfig, LoggerError, LoggerFormat, LoggerResult, object::LoggerUtcMicros};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Install the subscriber for `cfg` as the global default.
pub(crate) fn install(cfg: &LoggerConfig) -> LoggerResult<()> {
    let output = output_layer::<Registry>(cfg)?;
    tracing_subscriber::registry()
        .with(output.with_filter(cfg.level.to_env_filter()))
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)
}

fn output_layer<S>(cfg: &LoggerConfig) -> LoggerResult<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.should_use_color())
            .with_target(cfg.with_targets)
            .with_timer(LoggerUtcMicros)
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(LoggerUtcMicros)
            .boxed(),
        LoggerFormat::Journald => journald_layer()?,
    };
    Ok(layer)
}

#[cfg(target_os = "linux")]
fn journald_layer<S>() -> LoggerResult<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_journald::layer()
        .map(|layer| layer.boxed())
        .map_err(|e| LoggerError::JournaldInitFailed(e.to_string()))
}

#[cfg(not(target_os = "linux"))]
fn journald_layer<S>() -> LoggerResult<BoxedLayer<S>>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_reports_already_initialized() {
        let cfg = LoggerConfig {
            use_color: false,
            ..Default::default()
        };

        let first = install(&cfg);
        let second = install(&cfg);

        // Another test in this binary may have installed a default first.
        assert!(first.is_ok() || matches!(first, Err(LoggerError::AlreadyInitialized)));
        assert!(matches!(second, Err(LoggerError::AlreadyInitialized)));
    }

    #[test]
    fn json_layer_builds_without_a_terminal() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Json,
            ..Default::default()
        };
        assert!(output_layer::<Registry>(&cfg).is_ok());
    }
}
