//! Timing knobs shared by every adapter in a tree.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds on the suspension points of adapter operations.
///
/// | Field           | Default  |
/// |-----------------|----------|
/// | `request`       | 1000 ms  |
/// | `overall`       | 1500 ms  |
/// | `startup_grace` | 200 ms   |
/// | `refresh_delay` | 300 ms   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeouts {
	/// Per-request timeout of a discovery HTTP call.
	#[serde(with = "millis")]
	pub request: Duration,
	/// Upper bound of a whole discovery call, body read included.
	#[serde(with = "millis")]
	pub overall: Duration,
	/// Window during which an exiting managed process counts as a failed start.
	#[serde(with = "millis")]
	pub startup_grace: Duration,
	/// Pause between terminating and relaunching a managed process on refresh.
	#[serde(with = "millis")]
	pub refresh_delay: Duration,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			request: Duration::from_millis(1000),
			overall: Duration::from_millis(1500),
			startup_grace: Duration::from_millis(200),
			refresh_delay: Duration::from_millis(300),
		}
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
