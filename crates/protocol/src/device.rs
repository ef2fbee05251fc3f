//! Device records reported by the device enumeration backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One attached device (physical or simulator).
///
/// `url` is the `host:port` the enumeration helper assigned to the device's own
/// target listing. `version` is not reported by the backend; the gateway fills it
/// with the normalized OS version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
	pub device_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub device_name: Option<String>,
	#[serde(default, rename = "deviceOSVersion", skip_serializing_if = "Option::is_none")]
	pub device_os_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
