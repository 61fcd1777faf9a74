use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. Mirrors the role of the
/// teacher's `logger` module: called exactly once, at process start,
/// before anything else logs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
