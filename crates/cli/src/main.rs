use clap::Parser;
use gateway_cli::cli::Cli;
use gateway_cli::config::GatewayConfig;
use gateway_cli::{logging, server};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let mut config = GatewayConfig::load(cli.config.as_deref())?;
	config.apply(&cli);
	server::run(config).await
}
