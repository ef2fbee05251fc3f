use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "devtools-gateway")]
#[command(about = "Multiplexing gateway for remote-debugging targets")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (default: $XDG_CONFIG_HOME/devtools-gateway/config.json)
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Port the gateway listens on
	#[arg(short, long)]
	pub port: Option<u16>,

	/// Address the listener binds to
	#[arg(long, value_name = "HOST")]
	pub bind: Option<String>,

	/// Host name written into rewritten target URLs
	#[arg(long, value_name = "HOST")]
	pub public_host: Option<String>,

	/// Disable device discovery
	#[arg(long)]
	pub no_devices: bool,

	/// Port of the device enumeration proxy
	#[arg(long, value_name = "PORT")]
	pub proxy_port: Option<u16>,

	/// Path to the device enumeration proxy executable
	#[arg(long, value_name = "FILE")]
	pub proxy_executable: Option<PathBuf>,

	/// Serve targets from a JSON listing file
	#[arg(long, value_name = "FILE")]
	pub fixture: Option<PathBuf>,

	/// Add a backend listing, e.g. chrome=http://127.0.0.1:9222/json (repeatable)
	#[arg(long = "backend", value_name = "ID=URL", value_parser = parse_backend)]
	pub backends: Vec<(String, String)>,
}

fn parse_backend(raw: &str) -> Result<(String, String), String> {
	let (id, url) = raw
		.split_once('=')
		.ok_or_else(|| format!("expected ID=URL, got `{raw}`"))?;
	if id.is_empty() || url.is_empty() {
		return Err(format!("expected ID=URL, got `{raw}`"));
	}
	Ok((id.to_string(), url.to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_repeated_backends() {
		let cli = Cli::try_parse_from([
			"devtools-gateway",
			"-vv",
			"--port",
			"9100",
			"--backend",
			"chrome=http://127.0.0.1:9222/json",
			"--backend",
			"edge=http://127.0.0.1:9223/json",
			"--no-devices",
		])
		.unwrap();

		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.port, Some(9100));
		assert!(cli.no_devices);
		assert_eq!(
			cli.backends,
			vec![
				("chrome".to_string(), "http://127.0.0.1:9222/json".to_string()),
				("edge".to_string(), "http://127.0.0.1:9223/json".to_string()),
			]
		);
	}

	#[test]
	fn rejects_malformed_backend() {
		assert!(Cli::try_parse_from(["devtools-gateway", "--backend", "chrome"]).is_err());
		assert!(Cli::try_parse_from(["devtools-gateway", "--backend", "=http://x"]).is_err());
	}
}
