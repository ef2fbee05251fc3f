//! The adapter contract shared by leaves, collections, and fixtures.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_protocol::TargetDescriptor;
use serde_json::Value;

use crate::bridge::ClientHandle;
use crate::error::Result;
use crate::session::Session;

/// Caller-supplied metadata for a discovery call.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Metadata {
	#[default]
	None,
	/// Attached to every descriptor, at every level of the tree.
	Shared(Value),
	/// Entry `n` goes to the `n`th child of a collection, in registry order.
	PerChild(Vec<Option<Value>>),
}

impl Metadata {
	/// Value a leaf attaches to its own descriptors.
	pub fn value(&self) -> Option<Value> {
		match self {
			Metadata::Shared(value) => Some(value.clone()),
			Metadata::None | Metadata::PerChild(_) => None,
		}
	}

	/// Metadata handed to the child at `index`.
	pub fn for_child(&self, index: usize) -> Metadata {
		match self {
			Metadata::None => Metadata::None,
			Metadata::Shared(value) => Metadata::Shared(value.clone()),
			Metadata::PerChild(entries) => match entries.get(index) {
				Some(Some(value)) => Metadata::Shared(value.clone()),
				_ => Metadata::None,
			},
		}
	}
}

/// A unit that can enumerate and bridge debuggable targets.
///
/// Only [`start`](Self::start) reports failure; every other operation degrades to an
/// empty or absent result and logs the cause.
#[async_trait]
pub trait Adapter: Send + Sync {
	/// Namespace id of this adapter within its parent.
	fn id(&self) -> &str;

	/// Launches the managed process, if any.
	async fn start(&self) -> Result<()>;

	/// Terminates the managed process and drops live sessions. Idempotent.
	async fn stop(&self);

	/// Polls the backend and returns rewritten descriptors. Never fails.
	async fn discover_targets(&self, metadata: Metadata) -> Vec<TargetDescriptor>;

	/// Opens or reuses the session for `target_id`.
	async fn connect(&self, target_id: &str, client: ClientHandle) -> Option<Arc<Session>>;

	/// Forwards one client frame to the session for `target_id`, dropping it on failure.
	async fn forward(&self, target_id: &str, message: String);

	/// Relaunches the managed process, if any.
	async fn refresh(&self);
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn per_child_metadata_is_positional() {
		let metadata = Metadata::PerChild(vec![Some(json!({"n": 0})), None, Some(json!({"n": 2}))]);
		assert_eq!(metadata.for_child(0), Metadata::Shared(json!({"n": 0})));
		assert_eq!(metadata.for_child(1), Metadata::None);
		assert_eq!(metadata.for_child(2), Metadata::Shared(json!({"n": 2})));
		assert_eq!(metadata.for_child(3), Metadata::None);
		assert_eq!(metadata.value(), None);
	}

	#[test]
	fn shared_metadata_reaches_every_child() {
		let metadata = Metadata::Shared(json!("m"));
		assert_eq!(metadata.for_child(5), Metadata::Shared(json!("m")));
		assert_eq!(metadata.value(), Some(json!("m")));
	}
}
