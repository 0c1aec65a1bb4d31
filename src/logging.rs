use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `verbosity`.
///
/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_tracing(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(verbosity))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
