use std::fmt;

/// Build metadata baked in at compile time, surfaced on `--version` and in
/// the management `/healthz` payload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
	pub version: &'static str,
	pub rust_version: &'static str,
	pub target: &'static str,
}

impl BuildInfo {
	pub fn new() -> Self {
		BuildInfo {
			version: env!("CARGO_PKG_VERSION"),
			rust_version: env!("CARGO_PKG_RUST_VERSION"),
			target: std::env::consts::ARCH,
		}
	}
}

impl Default for BuildInfo {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for BuildInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"version.BuildInfo{{Version:\"{}\", RustVersion:\"{}\", Arch:\"{}\"}}",
			self.version, self.rust_version, self.target
		)
	}
}
