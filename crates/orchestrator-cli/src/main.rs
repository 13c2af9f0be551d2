//! Bootstrap binary: parses CLI args, loads config, and runs the server.
//! Grounded in the teacher's `agentgateway-app/src/main.rs` — a thin clap
//! wrapper around `parse_config` plus a `--validate-only` short-circuit —
//! generalized to also run the ambient management listener alongside the
//! client-facing API.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use cloudorch::config::Config;
use cloudorch_core::version::BuildInfo;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
	/// Use config from a literal string of YAML/JSON.
	#[arg(short, long, value_name = "config")]
	config: Option<String>,

	/// Use config from a file.
	#[arg(short, long, value_name = "file")]
	file: Option<PathBuf>,

	/// Parse and validate config, then exit without serving.
	#[arg(long)]
	validate_only: bool,

	/// Print version and exit.
	#[arg(short = 'V', long = "version")]
	version: bool,
}

fn main() -> anyhow::Result<()> {
	let _log_flush = cloudorch_core::telemetry::setup_logging();
	let args = Args::parse();

	if args.version {
		println!("{}", BuildInfo::new());
		return Ok(());
	}

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
	let contents = match (&args.config, &args.file) {
		(Some(_), Some(_)) => anyhow::bail!("only one of --config or --file may be given"),
		(Some(config), None) => Some(config.clone()),
		(None, Some(file)) => Some(std::fs::read_to_string(file).map_err(|e| anyhow::anyhow!("reading {}: {e}", file.display()))?),
		(None, None) => None,
	};

	let config = match contents {
		Some(contents) => cloudorch::config::parse_config(&contents)?,
		None => cloudorch::config::load_config()?,
	};

	if args.validate_only {
		println!("Configuration is valid!");
		return Ok(());
	}

	serve(config).await
}

async fn serve(config: Config) -> anyhow::Result<()> {
	info!("version: {}", BuildInfo::new());

	let port = config.port;
	let state = cloudorch::build_app_state(&config);
	let app = cloudorch::http::router(state);
	let addr = SocketAddr::from(([0, 0, 0, 0], port));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("listening on {addr}");

	let readiness = cloudorch::management::Readiness::default();
	readiness.mark_ready();
	let mgmt_app = cloudorch::management::router(prometheus_client::registry::Registry::default(), readiness);
	let mgmt_addr = SocketAddr::from(([0, 0, 0, 0], port.saturating_add(1)));
	let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;
	info!("management listening on {mgmt_addr}");

	let main_server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(cloudorch_core::signal::shutdown());
	let mgmt_server = axum::serve(mgmt_listener, mgmt_app).with_graceful_shutdown(cloudorch_core::signal::shutdown());

	tokio::try_join!(main_server, mgmt_server)?;
	Ok(())
}
