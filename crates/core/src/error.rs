use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
	/// A managed process is already running (or starting) for this adapter.
	#[error("process already started")]
	AlreadyStarted,

	#[error("failed to spawn {}: {source}", .program.display())]
	Spawn {
		program: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The process died before the startup grace window elapsed.
	#[error("{} exited during startup ({status})", .program.display())]
	ExitedEarly { program: PathBuf, status: String },

	#[error("executable not found: {0}")]
	ExecutableNotFound(String),

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("discovery request failed: {0}")]
	Http(#[from] reqwest::Error),

	#[error("unexpected status {0}")]
	Status(reqwest::StatusCode),

	#[error("timeout after {ms}ms waiting for: {what}")]
	Timeout { ms: u64, what: String },

	#[error("empty response body")]
	EmptyBody,

	#[error("response body is not a JSON array")]
	NotAnArray,

	#[error("invalid target descriptor: {0}")]
	InvalidDescriptor(String),

	#[error("invalid device record: {0}")]
	InvalidDevice(String),

	#[error("session bridge failed: {0}")]
	Bridge(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl GatewayError {
	/// True for failures of the backend rather than of the caller's input.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			GatewayError::Http(_)
				| GatewayError::Status(_)
				| GatewayError::Timeout { .. }
				| GatewayError::EmptyBody
				| GatewayError::NotAnArray
				| GatewayError::Json(_)
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeout_message_names_operation() {
		let err = GatewayError::Timeout {
			ms: 1500,
			what: "http://127.0.0.1:9222/json".into(),
		};
		assert_eq!(err.to_string(), "timeout after 1500ms waiting for: http://127.0.0.1:9222/json");
		assert!(err.is_transient());
	}

	#[test]
	fn lifecycle_failures_are_not_transient() {
		assert!(!GatewayError::AlreadyStarted.is_transient());
		let err = GatewayError::ExitedEarly {
			program: PathBuf::from("/usr/bin/proxy"),
			status: "exit status: 1".into(),
		};
		assert_eq!(err.to_string(), "/usr/bin/proxy exited during startup (exit status: 1)");
	}
}
