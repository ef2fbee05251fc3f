//! Per-session socket bridge between one client and one backend target.
//!
//! The adapters only see the [`Target`] / [`TargetConnector`] contract. [`WsConnector`]
//! is the production implementation: it opens the backend socket lazily in a spawned
//! task, queues client frames until the socket is open, and delivers backend frames
//! to whichever client handle is bound at the time.
//!
//! A bridge holds the only sender of its bound client's channel. Replacing or
//! releasing the handle ends that client's receiver, which is how the socket
//! writer learns the session is over.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};

/// Outbound half of a client socket: frames pushed here reach the client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
	tx: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
	/// Creates a handle together with the receiver the socket writer drains.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	/// Pushes a frame to the client. Returns `false` once the client is gone.
	pub fn send(&self, message: String) -> bool {
		self.tx.send(message).is_ok()
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Lifecycle notifications emitted by a bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvent {
	Error(String),
	/// Terminal; no further events follow.
	Closed,
}

pub type TargetEvents = mpsc::UnboundedSender<TargetEvent>;

/// A live bridge to one backend target.
pub trait Target: Send + Sync {
	/// Queues a client frame for the backend.
	fn forward(&self, message: String) -> Result<()>;

	/// Points backend-to-client traffic at a new client socket, releasing the old one.
	///
	/// A bridge that has already closed releases `client` immediately.
	fn rebind_client(&self, client: ClientHandle);

	/// Tears the bridge down; a [`TargetEvent::Closed`] follows and the bound client
	/// is released.
	fn close(&self);
}

/// Client slot shared between a bridge handle and its socket task. `None` once the
/// bridge has finished.
pub(crate) type ClientSlot = Mutex<Option<ClientHandle>>;

/// Binds `client` unless the bridge has finished.
pub(crate) fn rebind_slot(slot: &ClientSlot, client: ClientHandle) {
	if let Some(bound) = slot.lock().as_mut() {
		*bound = client;
	}
}

/// Builds bridges to real backend endpoints.
pub trait TargetConnector: Send + Sync {
	/// Opens a bridge to `endpoint` for `client`. Lifecycle events go to `events`.
	///
	/// Must not block: connection establishment happens after this returns.
	fn connect(&self, endpoint: &str, client: ClientHandle, events: TargetEvents) -> Result<Arc<dyn Target>>;
}

/// WebSocket bridge built on `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl TargetConnector for WsConnector {
	fn connect(&self, endpoint: &str, client: ClientHandle, events: TargetEvents) -> Result<Arc<dyn Target>> {
		if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
			return Err(GatewayError::Bridge(format!("not a socket URL: {endpoint}")));
		}
		let runtime = tokio::runtime::Handle::try_current()
			.map_err(|e| GatewayError::Bridge(format!("no async runtime: {e}")))?;

		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (close_tx, close_rx) = oneshot::channel();
		let client = Arc::new(Mutex::new(Some(client)));

		runtime.spawn(run_bridge(
			endpoint.to_string(),
			outbound_rx,
			Arc::clone(&client),
			events,
			close_rx,
		));

		Ok(Arc::new(WsTarget {
			outbound: outbound_tx,
			client,
			close: Mutex::new(Some(close_tx)),
		}))
	}
}

struct WsTarget {
	outbound: mpsc::UnboundedSender<String>,
	client: Arc<ClientSlot>,
	close: Mutex<Option<oneshot::Sender<()>>>,
}

impl Target for WsTarget {
	fn forward(&self, message: String) -> Result<()> {
		self.outbound
			.send(message)
			.map_err(|_| GatewayError::Bridge("backend socket closed".into()))
	}

	fn rebind_client(&self, client: ClientHandle) {
		rebind_slot(&self.client, client);
	}

	fn close(&self) {
		if let Some(close) = self.close.lock().take() {
			let _ = close.send(());
		}
	}
}

async fn run_bridge(
	endpoint: String,
	mut outbound: mpsc::UnboundedReceiver<String>,
	client: Arc<ClientSlot>,
	events: TargetEvents,
	close: oneshot::Receiver<()>,
) {
	pump(&endpoint, &mut outbound, &client, &events, close).await;
	// Ends the bound client's stream before anyone hears about the closure.
	client.lock().take();
	let _ = events.send(TargetEvent::Closed);
}

async fn pump(
	endpoint: &str,
	outbound: &mut mpsc::UnboundedReceiver<String>,
	client: &ClientSlot,
	events: &TargetEvents,
	mut close: oneshot::Receiver<()>,
) {
	let stream = tokio::select! {
		result = connect_async(endpoint) => match result {
			Ok((stream, _)) => stream,
			Err(err) => {
				warn!(target = "gw.bridge", endpoint = %endpoint, error = %err, "backend socket failed to open");
				let _ = events.send(TargetEvent::Error(err.to_string()));
				return;
			}
		},
		_ = &mut close => return,
	};

	debug!(target = "gw.bridge", endpoint = %endpoint, "backend socket open");
	let (mut backend_tx, mut backend_rx) = stream.split();

	loop {
		tokio::select! {
			message = outbound.recv() => {
				let Some(text) = message else { break };
				if let Err(err) = backend_tx.send(Message::Text(text)).await {
					let _ = events.send(TargetEvent::Error(err.to_string()));
					break;
				}
			}
			frame = backend_rx.next() => match frame {
				Some(Ok(Message::Text(text))) => deliver(client, text),
				Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
					Ok(text) => deliver(client, text),
					Err(_) => debug!(target = "gw.bridge", endpoint = %endpoint, "dropping non-utf8 binary frame"),
				},
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					let _ = events.send(TargetEvent::Error(err.to_string()));
					break;
				}
			},
			_ = &mut close => {
				let _ = backend_tx.send(Message::Close(None)).await;
				break;
			}
		}
	}

	debug!(target = "gw.bridge", endpoint = %endpoint, "backend socket closed");
}

fn deliver(client: &ClientSlot, text: String) {
	// A detached client may rebind later; frames in between are dropped.
	if let Some(client) = client.lock().as_ref() {
		client.send(text);
	}
}
