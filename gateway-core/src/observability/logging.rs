use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the process-wide subscriber: `RUST_LOG`-style filtering with the
/// configured level as fallback, JSON output with file/line locations and
/// flattened event fields.
///
/// Span export is not wired here; completed call spans are handed to a
/// [`SpanSink`](crate::grpc::SpanSink) by the tracing interceptor.
pub fn init_tracing(service_name: &str, log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true),
        )
        .init();

    tracing::info!(service = service_name, "Logging initialized");
}
