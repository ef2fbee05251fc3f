//! Gateway configuration: JSON file merged with command-line overrides.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use gateway::Timeouts;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Namespace id of the device collection under the root.
pub const DEVICE_NAMESPACE: &str = "ios";
/// Namespace id of the fixture adapter under the root.
pub const FIXTURE_NAMESPACE: &str = "fixture";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
	pub port: u16,
	pub bind_host: String,
	/// Host written into rewritten URLs; clients must be able to reach it.
	pub public_host: String,
	pub poll_interval_ms: u64,
	pub timeouts: Timeouts,
	pub devices: DeviceConfig,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub backends: Vec<BackendConfig>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fixture: Option<FixtureConfig>,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			port: 9000,
			bind_host: "127.0.0.1".to_string(),
			public_host: "localhost".to_string(),
			poll_interval_ms: 5000,
			timeouts: Timeouts::default(),
			devices: DeviceConfig::default(),
			backends: Vec::new(),
			fixture: None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
	pub enabled: bool,
	pub proxy_port: u16,
	/// Overrides the platform lookup of the enumeration proxy.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub executable: Option<PathBuf>,
}

impl Default for DeviceConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			proxy_port: 9221,
			executable: None,
		}
	}
}

/// A statically configured backend listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
	pub id: String,
	pub list_url: String,
	/// Launched on start and relaunched on refresh.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub executable: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixtureConfig {
	pub path: PathBuf,
	#[serde(default = "default_fixture_count")]
	pub count: usize,
}

fn default_fixture_count() -> usize {
	gateway::fixture::DEFAULT_REPLICAS
}

impl GatewayConfig {
	/// Loads `explicit`, or the default config file when it exists, or defaults.
	pub fn load(explicit: Option<&Path>) -> Result<Self> {
		match explicit {
			Some(path) => load_json(path),
			None => {
				let path = default_path();
				if path.exists() { load_json(&path) } else { Ok(Self::default()) }
			}
		}
	}

	/// Applies command-line overrides on top of file values.
	pub fn apply(&mut self, cli: &Cli) {
		if let Some(port) = cli.port {
			self.port = port;
		}
		if let Some(bind) = &cli.bind {
			self.bind_host = bind.clone();
		}
		if let Some(host) = &cli.public_host {
			self.public_host = host.clone();
		}
		if cli.no_devices {
			self.devices.enabled = false;
		}
		if let Some(port) = cli.proxy_port {
			self.devices.proxy_port = port;
		}
		if let Some(executable) = &cli.proxy_executable {
			self.devices.executable = Some(executable.clone());
		}
		if let Some(path) = &cli.fixture {
			self.fixture = Some(FixtureConfig {
				path: path.clone(),
				count: self.fixture.as_ref().map_or_else(default_fixture_count, |f| f.count),
			});
		}
		for (id, url) in &cli.backends {
			self.backends.retain(|backend| &backend.id != id);
			self.backends.push(BackendConfig {
				id: id.clone(),
				list_url: url.clone(),
				executable: None,
				args: Vec::new(),
			});
		}
	}

	/// Rejects child ids that would collide or break address decoding.
	pub fn validate(&self) -> Result<()> {
		let mut seen = HashSet::new();
		let reserved = self
			.devices
			.enabled
			.then_some(DEVICE_NAMESPACE)
			.into_iter()
			.chain(self.fixture.as_ref().map(|_| FIXTURE_NAMESPACE));

		for id in reserved.chain(self.backends.iter().map(|b| b.id.as_str())) {
			if id.is_empty() || id.contains('/') {
				bail!("invalid backend id `{id}`: must be non-empty and contain no '/'");
			}
			if !seen.insert(id) {
				bail!("duplicate backend id `{id}`");
			}
		}
		if self.poll_interval_ms == 0 {
			bail!("pollIntervalMs must be positive");
		}
		Ok(())
	}

	/// Base of every rewritten session URL.
	pub fn proxy_base(&self) -> String {
		format!("ws://{}:{}", self.public_host, self.port)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}

/// `$XDG_CONFIG_HOME/devtools-gateway/config.json`, falling back to `~/.config`.
pub fn default_path() -> PathBuf {
	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
		.unwrap_or_else(|| PathBuf::from("."));
	config_home.join("devtools-gateway").join("config.json")
}

fn load_json(path: &Path) -> Result<GatewayConfig> {
	let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
	serde_json::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	fn write_config(contents: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(contents.as_bytes()).unwrap();
		file
	}

	#[test]
	fn partial_file_keeps_defaults() {
		let file = write_config(
			r#"{
				"port": 9100,
				"timeouts": {"request": 250},
				"devices": {"enabled": false},
				"backends": [{"id": "chrome", "listUrl": "http://127.0.0.1:9222/json"}],
				"fixture": {"path": "targets.json"}
			}"#,
		);
		let config = GatewayConfig::load(Some(file.path())).unwrap();

		assert_eq!(config.port, 9100);
		assert_eq!(config.bind_host, "127.0.0.1");
		assert_eq!(config.timeouts.request, Duration::from_millis(250));
		assert_eq!(config.timeouts.overall, Duration::from_millis(1500));
		assert!(!config.devices.enabled);
		assert_eq!(config.devices.proxy_port, 9221);
		assert_eq!(config.backends[0].id, "chrome");
		assert!(config.backends[0].args.is_empty());
		assert_eq!(config.fixture.as_ref().unwrap().count, 10);
		assert_eq!(config.proxy_base(), "ws://localhost:9100");
	}

	#[test]
	fn malformed_explicit_file_is_an_error() {
		let file = write_config("{ not json");
		let err = GatewayConfig::load(Some(file.path())).unwrap_err();
		assert!(err.to_string().contains("Failed to parse config"));

		assert!(GatewayConfig::load(Some(Path::new("/definitely/missing.json"))).is_err());
	}

	#[test]
	fn flags_override_file_values() {
		let mut config = GatewayConfig {
			backends: vec![BackendConfig {
				id: "chrome".into(),
				list_url: "http://127.0.0.1:9222/json".into(),
				executable: None,
				args: Vec::new(),
			}],
			..GatewayConfig::default()
		};
		let cli = Cli {
			port: Some(9300),
			no_devices: true,
			proxy_port: Some(9400),
			fixture: Some(PathBuf::from("fixture.json")),
			backends: vec![("chrome".into(), "http://127.0.0.1:9333/json".into())],
			..Cli::default()
		};

		config.apply(&cli);

		assert_eq!(config.port, 9300);
		assert!(!config.devices.enabled);
		assert_eq!(config.devices.proxy_port, 9400);
		assert_eq!(config.fixture.as_ref().unwrap().path, PathBuf::from("fixture.json"));
		assert_eq!(config.backends.len(), 1);
		assert_eq!(config.backends[0].list_url, "http://127.0.0.1:9333/json");
	}

	#[test]
	fn colliding_ids_are_rejected() {
		let backend = |id: &str| BackendConfig {
			id: id.into(),
			list_url: "http://127.0.0.1:9222/json".into(),
			executable: None,
			args: Vec::new(),
		};

		let config = GatewayConfig {
			backends: vec![backend(DEVICE_NAMESPACE)],
			..GatewayConfig::default()
		};
		assert!(config.validate().is_err());

		let config = GatewayConfig {
			backends: vec![backend("a/b")],
			..GatewayConfig::default()
		};
		assert!(config.validate().is_err());

		let config = GatewayConfig {
			backends: vec![backend("chrome"), backend("edge")],
			..GatewayConfig::default()
		};
		assert!(config.validate().is_ok());
	}
}
