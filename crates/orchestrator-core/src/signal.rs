use tokio::signal::unix::{SignalKind, signal};

/// Resolves once the process receives SIGINT or SIGTERM. Intended to be
/// passed straight to `axum::serve(..).with_graceful_shutdown(..)`.
pub async fn shutdown() {
	let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::select! {
		_ = term.recv() => {
			tracing::info!("received SIGTERM, shutting down");
		}
		_ = ctrl_c => {
			tracing::info!("received SIGINT, shutting down");
		}
	}
}
