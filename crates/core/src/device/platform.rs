//! Locating and configuring the device enumeration proxy.

use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};
use crate::process::ProcessSpec;

/// Name of the enumeration helper executable.
pub const PROXY_EXECUTABLE: &str = "ios_webkit_debug_proxy";

/// Number of per-device ports reserved after the listing port.
pub const DEVICE_PORT_SPAN: u16 = 100;

/// Resolved launch parameters of the enumeration proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
	pub executable: PathBuf,
	/// Port of the device listing endpoint.
	pub port: u16,
	pub args: Vec<String>,
}

impl ProxySettings {
	pub fn process_spec(&self) -> ProcessSpec {
		ProcessSpec::new(&self.executable, self.args.clone())
	}

	/// Device listing endpoint served by the proxy.
	pub fn list_url(&self) -> String {
		format!("http://127.0.0.1:{}/json", self.port)
	}
}

/// Resolves the proxy executable, preferring an explicit `override_path`.
pub fn locate_proxy_executable(override_path: Option<&Path>) -> Result<PathBuf> {
	if let Some(path) = override_path {
		return if path.exists() {
			Ok(path.to_path_buf())
		} else {
			Err(GatewayError::ExecutableNotFound(path.display().to_string()))
		};
	}

	for candidate in proxy_candidates() {
		if candidate.is_absolute() {
			if candidate.exists() {
				return Ok(candidate);
			}
		} else if let Ok(found) = which::which(&candidate) {
			return Ok(found);
		}
	}

	Err(GatewayError::ExecutableNotFound(format!(
		"{PROXY_EXECUTABLE} (install it or pass its path explicitly)"
	)))
}

fn proxy_candidates() -> Vec<PathBuf> {
	if cfg!(target_os = "windows") {
		let mut candidates = vec![PathBuf::from(format!("{PROXY_EXECUTABLE}.exe"))];
		if let Ok(app_data) = std::env::var("APPDATA") {
			// Bundled by the vs-libimobile npm package.
			candidates.push(
				PathBuf::from(app_data)
					.join("npm")
					.join("node_modules")
					.join("vs-libimobile")
					.join("lib")
					.join(format!("{PROXY_EXECUTABLE}.exe")),
			);
		}
		candidates
	} else {
		vec![
			PathBuf::from(PROXY_EXECUTABLE),
			PathBuf::from("/usr/local/bin").join(PROXY_EXECUTABLE),
			PathBuf::from("/opt/homebrew/bin").join(PROXY_EXECUTABLE),
			PathBuf::from("/usr/bin").join(PROXY_EXECUTABLE),
		]
	}
}

/// Assembles proxy arguments: the listing port plus a per-device port range
/// directly above it.
pub fn build_proxy_settings(executable: PathBuf, port: u16) -> Result<ProxySettings> {
	let first = port
		.checked_add(1)
		.ok_or_else(|| GatewayError::InvalidConfig(format!("proxy port {port} leaves no device ports")))?;
	let last = first
		.checked_add(DEVICE_PORT_SPAN)
		.ok_or_else(|| GatewayError::InvalidConfig(format!("device port range above {port} overflows")))?;

	Ok(ProxySettings {
		executable,
		port,
		args: vec!["--no-frontend".to_string(), format!("--config=null:{port},:{first}-{last}")],
	})
}
