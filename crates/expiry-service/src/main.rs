//! Main entry point for the order expiry service.
//!
//! Serves the expire-orders and setup-cron functions over HTTP, or runs
//! either operation once from the command line.

use clap::{Parser, Subcommand};
use expiry_config::Config;
use expiry_core::{event_bus, ExpiryEngine, Invocation};
use std::path::PathBuf;
use std::sync::Arc;

mod factory_registry;
mod server;

/// Command-line arguments for the order expiry service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
	/// Run the HTTP API server (default)
	Serve,
	/// Expire overdue orders once and exit
	Expire {
		/// Mark the run as triggered by the scheduler
		#[arg(long)]
		scheduled: bool,
	},
	/// Install or replace the recurring expiration job and exit
	Register,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(factory_registry::build_engine_from_config(config)?);
	tokio::spawn(event_bus::log_failures(engine.event_bus().subscribe()));

	run(args.command.unwrap_or(Command::Serve), engine).await
}

async fn run(command: Command, engine: Arc<ExpiryEngine>) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Serve => {
			let api_config = engine
				.config()
				.api
				.clone()
				.filter(|api| api.enabled)
				.ok_or("API server is not enabled; set [api] enabled = true or use `expire` / `register`")?;

			server::start_server(api_config, engine).await?;
			tracing::info!("Stopped order expiry service");
		},
		Command::Expire { scheduled } => {
			let outcome = engine.worker().run(Invocation::new(scheduled)).await?;
			tracing::info!(
				marked = ?outcome.marked,
				stats = ?outcome.stats,
				"{}",
				outcome.message()
			);
		},
		Command::Register => {
			let outcome = engine.registrar().register().await?;
			tracing::info!(
				job = %outcome.job_name,
				schedule = %outcome.schedule,
				"{}",
				outcome.message()
			);
		},
	}
	Ok(())
}
