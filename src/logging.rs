use tracing_subscriber::{EnvFilter, fmt};

/// Installs the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
