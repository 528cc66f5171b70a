use tokio::task::JoinHandle;
use tracing::Subscriber;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build a tracing subscriber without installing it globally, so tests can
/// build one per run (and swap the writer for `std::io::sink` when
/// `TEST_LOG` isn't set) without clobbering each other.
pub fn build_telemetry<Sink>(
    name: String,
    default_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", name, default_filter)));

    tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(sink),
    )
}

/// Install a subscriber as the process-wide default. Call exactly once per
/// process.
pub fn register_telemetry(subscriber: impl Subscriber + Send + Sync) {
    subscriber.init();
}

/// Run a blocking closure on the blocking thread pool while keeping the
/// current tracing span attached, so log lines emitted from password
/// hashing (the main blocking workload in this crate) still carry
/// request-scoped fields.
pub fn spawn_blocking_with_tracing<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || current_span.in_scope(f))
}
