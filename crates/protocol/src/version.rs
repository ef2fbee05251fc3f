use serde::{Deserialize, Serialize};

/// `/json/version` response served by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "Browser")]
	pub browser: String,
	#[serde(rename = "Protocol-Version")]
	pub protocol_version: String,
	#[serde(rename = "User-Agent")]
	pub user_agent: String,
}

impl VersionInfo {
	pub fn gateway(version: &str) -> Self {
		Self {
			browser: format!("devtools-gateway/{version}"),
			protocol_version: "1.2".to_string(),
			user_agent: format!("devtools-gateway/{version}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serializes_with_devtools_field_names() {
		let value = serde_json::to_value(VersionInfo::gateway("1.0.0")).unwrap();
		assert_eq!(value["Browser"], "devtools-gateway/1.0.0");
		assert_eq!(value["Protocol-Version"], "1.2");
	}
}
