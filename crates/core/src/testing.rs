//! Test doubles for exercising adapters without live backend sockets.
//!
//! [`RecordingConnector`] stands in for [`WsConnector`](crate::bridge::WsConnector):
//! it counts backend connections and hands out [`RecordingTarget`]s that record
//! forwarded frames and client rebinds.
//!
//! ```ignore
//! let connector = RecordingConnector::new();
//! let adapter = BackendAdapter::new(ns, "ws://localhost:9000").with_connector(connector.clone());
//! // ... discover, connect twice ...
//! assert_eq!(connector.connection_count(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::bridge::{ClientHandle, ClientSlot, Target, TargetConnector, TargetEvent, TargetEvents, rebind_slot};
use crate::error::{GatewayError, Result};

/// Connector that records every backend connection it is asked to open.
#[derive(Default)]
pub struct RecordingConnector {
	endpoints: Mutex<Vec<String>>,
	targets: Mutex<Vec<Arc<RecordingTarget>>>,
	failing: AtomicBool,
}

impl RecordingConnector {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Makes every subsequent `connect` fail.
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn connection_count(&self) -> usize {
		self.endpoints.lock().len()
	}

	/// Backend endpoints connected to, in order.
	pub fn endpoints(&self) -> Vec<String> {
		self.endpoints.lock().clone()
	}

	pub fn targets(&self) -> Vec<Arc<RecordingTarget>> {
		self.targets.lock().clone()
	}
}

impl TargetConnector for RecordingConnector {
	fn connect(&self, endpoint: &str, client: ClientHandle, events: TargetEvents) -> Result<Arc<dyn Target>> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(GatewayError::Bridge(format!("refused connection to {endpoint}")));
		}
		self.endpoints.lock().push(endpoint.to_string());
		let target = Arc::new(RecordingTarget::new(client, events));
		self.targets.lock().push(Arc::clone(&target));
		Ok(target as Arc<dyn Target>)
	}
}

/// Bridge double that records traffic instead of opening a socket.
pub struct RecordingTarget {
	client: ClientSlot,
	events: TargetEvents,
	forwarded: Mutex<Vec<String>>,
	rebinds: AtomicUsize,
	closed: AtomicBool,
}

impl RecordingTarget {
	fn new(client: ClientHandle, events: TargetEvents) -> Self {
		Self {
			client: Mutex::new(Some(client)),
			events,
			forwarded: Mutex::new(Vec::new()),
			rebinds: AtomicUsize::new(0),
			closed: AtomicBool::new(false),
		}
	}

	/// Frames forwarded toward the backend, in order.
	pub fn forwarded(&self) -> Vec<String> {
		self.forwarded.lock().clone()
	}

	pub fn rebind_count(&self) -> usize {
		self.rebinds.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Simulates a backend frame arriving for the currently bound client.
	pub fn push_to_client(&self, message: &str) -> bool {
		self.client
			.lock()
			.as_ref()
			.is_some_and(|client| client.send(message.to_string()))
	}

	/// Simulates the backend side emitting a lifecycle event. `Closed` releases the
	/// bound client the way a finished bridge does.
	pub fn emit(&self, event: TargetEvent) {
		if event == TargetEvent::Closed {
			self.client.lock().take();
		}
		let _ = self.events.send(event);
	}
}

impl Target for RecordingTarget {
	fn forward(&self, message: String) -> Result<()> {
		if self.is_closed() {
			return Err(GatewayError::Bridge("target closed".into()));
		}
		self.forwarded.lock().push(message);
		Ok(())
	}

	fn rebind_client(&self, client: ClientHandle) {
		rebind_slot(&self.client, client);
		self.rebinds.fetch_add(1, Ordering::SeqCst);
	}

	fn close(&self) {
		if !self.closed.swap(true, Ordering::SeqCst) {
			self.client.lock().take();
			let _ = self.events.send(TargetEvent::Closed);
		}
	}
}
