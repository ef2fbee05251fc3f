use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

/// Filter used when `RUST_LOG` is unset.
fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only
	// 1 (-v) = info for the gateway, warn for HTTP and socket internals
	// 2+ (-vv) = debug for everything
	match verbosity {
		0 => "warn",
		1 => "info,hyper=warn,reqwest=warn,tungstenite=warn,tokio_tungstenite=warn",
		_ => "debug",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filters_parse_at_every_level() {
		for verbosity in 0..4 {
			assert!(default_filter(verbosity).parse::<EnvFilter>().is_ok());
		}
		assert_eq!(default_filter(7), "debug");
	}
}
