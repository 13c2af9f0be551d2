use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber writing to stderr. Returns a guard
/// that must be kept alive for the lifetime of the process; dropping it
/// flushes any buffered output.
pub fn setup_logging() -> impl Drop {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
	LogGuard
}

struct LogGuard;

impl Drop for LogGuard {
	fn drop(&mut self) {}
}
