//! Target descriptors as served by a remote-debugging `/json` listing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind assigned to descriptors that do not report one.
pub const DEFAULT_TARGET_KIND: &str = "page";

/// One debuggable target.
///
/// Backends report the identity and human fields; the gateway fills in
/// `adapterType` and `metadata` and replaces both URLs so they route back through
/// its own namespace. Unknown backend fields are preserved in [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub web_socket_debugger_url: Option<String>,
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub favicon_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub devtools_frontend_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub adapter_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<Value>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl TargetDescriptor {
	/// Identity used as the target id: `id`, falling back to the last path segment
	/// of the backend socket URL (`ws://host:9222/devtools/page/AB12` -> `AB12`).
	///
	/// Empty strings do not count as identity, and neither does a socket URL without
	/// a path, so the backend address never becomes a public id.
	pub fn identity(&self) -> Option<&str> {
		self.id
			.as_deref()
			.filter(|id| !id.is_empty())
			.or_else(|| self.web_socket_debugger_url.as_deref().and_then(socket_path_tail))
	}

	/// Kind of the target, defaulting to [`DEFAULT_TARGET_KIND`].
	pub fn kind(&self) -> &str {
		self.kind.as_deref().unwrap_or(DEFAULT_TARGET_KIND)
	}
}

fn socket_path_tail(url: &str) -> Option<&str> {
	let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
	let (_, path) = rest.split_once('/')?;
	let path = path.split(['?', '#']).next().unwrap_or_default();
	path.rsplit('/').find(|segment| !segment.is_empty())
}
