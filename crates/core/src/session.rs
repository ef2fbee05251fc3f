use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gateway_protocol::TargetDescriptor;
use serde_json::Value;

use crate::bridge::{ClientHandle, Target};
use crate::error::Result;

/// Unique identifier for a bridged session.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A live bridge between one client socket and one target's real backend endpoint.
///
/// Owned by the adapter that discovered the target; at most one exists per target id.
pub struct Session {
	id: SessionId,
	target_id: String,
	descriptor: TargetDescriptor,
	bridge: Arc<dyn Target>,
}

impl Session {
	/// Wraps `bridge` for `target_id`. `descriptor` is the un-rewritten descriptor.
	pub fn new(target_id: impl Into<String>, descriptor: TargetDescriptor, bridge: Arc<dyn Target>) -> Self {
		Self {
			id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
			target_id: target_id.into(),
			descriptor,
			bridge,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	/// The original descriptor, including the real backend endpoint.
	pub fn descriptor(&self) -> &TargetDescriptor {
		&self.descriptor
	}

	/// Metadata attached at discovery time (device record for device targets).
	pub fn metadata(&self) -> Option<&Value> {
		self.descriptor.metadata.as_ref()
	}

	pub fn forward(&self, message: String) -> Result<()> {
		self.bridge.forward(message)
	}

	pub fn rebind_client(&self, client: ClientHandle) {
		self.bridge.rebind_client(client);
	}

	pub fn close(&self) {
		self.bridge.close();
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("target_id", &self.target_id)
			.finish_non_exhaustive()
	}
}
