//! Leaf adapter owning one backend listing endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use gateway_protocol::{DEFAULT_TARGET_KIND, TargetDescriptor};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, Metadata};
use crate::address::Namespace;
use crate::bridge::{ClientHandle, TargetConnector, TargetEvent, WsConnector};
use crate::config::Timeouts;
use crate::discovery::fetch_json_array;
use crate::error::{GatewayError, Result};
use crate::process::{ManagedProcess, ProcessSlot, ProcessSpec, StartReservation};
use crate::rewrite::{session_url, viewer_url};
use crate::session::{Session, SessionId};

type SessionMap = Arc<Mutex<HashMap<String, Arc<Session>>>>;

const EVENT_CAPACITY: usize = 64;

/// Session lifecycle notification re-emitted by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
	SessionError { target_id: String, message: String },
	SessionClosed { target_id: String },
}

/// Adapter for a single backend exposing a `/json`-style target listing.
///
/// Discovered descriptors are kept un-rewritten in a registry so `connect` can reach
/// the real backend socket; at most one session exists per target id.
pub struct BackendAdapter {
	namespace: Namespace,
	proxy_base: String,
	list_url: Option<String>,
	process_spec: Option<ProcessSpec>,
	timeouts: Timeouts,
	http: reqwest::Client,
	connector: Arc<dyn TargetConnector>,
	descriptors: Mutex<HashMap<String, TargetDescriptor>>,
	sessions: SessionMap,
	process: Mutex<ProcessSlot>,
	events: broadcast::Sender<AdapterEvent>,
}

impl BackendAdapter {
	/// Creates an adapter at `namespace` whose public URLs start with `proxy_base`
	/// (e.g. `ws://localhost:9000`).
	pub fn new(namespace: Namespace, proxy_base: impl Into<String>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			namespace,
			proxy_base: proxy_base.into(),
			list_url: None,
			process_spec: None,
			timeouts: Timeouts::default(),
			http: reqwest::Client::new(),
			connector: Arc::new(WsConnector),
			descriptors: Mutex::new(HashMap::new()),
			sessions: Arc::new(Mutex::new(HashMap::new())),
			process: Mutex::new(ProcessSlot::Idle),
			events,
		}
	}

	/// Sets the listing endpoint polled by discovery.
	pub fn with_list_url(mut self, url: impl Into<String>) -> Self {
		self.list_url = Some(url.into());
		self
	}

	/// Sets the executable launched by `start` and relaunched by `refresh`.
	pub fn with_process(mut self, spec: ProcessSpec) -> Self {
		self.process_spec = Some(spec);
		self
	}

	pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
		self.timeouts = timeouts;
		self
	}

	pub fn with_connector(mut self, connector: Arc<dyn TargetConnector>) -> Self {
		self.connector = connector;
		self
	}

	pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
		self.http = http;
		self
	}

	pub fn namespace(&self) -> &Namespace {
		&self.namespace
	}

	pub fn proxy_base(&self) -> &str {
		&self.proxy_base
	}

	pub fn timeouts(&self) -> &Timeouts {
		&self.timeouts
	}

	pub fn connector(&self) -> Arc<dyn TargetConnector> {
		Arc::clone(&self.connector)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
		self.events.subscribe()
	}

	pub fn session_count(&self) -> usize {
		self.sessions.lock().len()
	}

	/// Pid of the managed process, if one is running.
	pub fn process_id(&self) -> Option<u32> {
		match &*self.process.lock() {
			ProcessSlot::Running(process) => process.pid(),
			_ => None,
		}
	}

	/// Launches `spec` as this adapter's managed process.
	///
	/// Fails with [`GatewayError::AlreadyStarted`] while another process is starting or
	/// running; the existing process is left untouched.
	pub async fn spawn_process(&self, spec: &ProcessSpec) -> Result<()> {
		let reservation = StartReservation::acquire(&self.process).ok_or(GatewayError::AlreadyStarted)?;
		let process = ManagedProcess::spawn(spec, self.timeouts.startup_grace).await?;

		if let Err(mut process) = reservation.complete(process) {
			// Stopped while the grace window was running.
			process.terminate();
			debug!(target = "gw.adapter", adapter = %self.namespace.path(), "discarding process started after stop");
		}
		Ok(())
	}

	/// Validates and rewrites raw listing entries, recording the originals.
	///
	/// Entries that fail to deserialize or carry no identity are skipped.
	pub(crate) fn register_targets(&self, raw: Vec<Value>, metadata: Option<Value>) -> Vec<TargetDescriptor> {
		let mut rewritten = Vec::with_capacity(raw.len());
		let mut registry = self.descriptors.lock();

		for item in raw {
			let (target_id, original) = match self.prepare(item, metadata.as_ref()) {
				Ok(prepared) => prepared,
				Err(err) => {
					debug!(target = "gw.adapter", adapter = %self.namespace.path(), error = %err, "skipping listing entry");
					continue;
				}
			};

			let mut public = original.clone();
			let url = session_url(&self.proxy_base, &self.namespace, &target_id);
			public.devtools_frontend_url = Some(viewer_url(&url));
			public.web_socket_debugger_url = Some(url);

			registry.insert(target_id, original);
			rewritten.push(public);
		}

		rewritten
	}

	fn prepare(&self, raw: Value, metadata: Option<&Value>) -> Result<(String, TargetDescriptor)> {
		let mut descriptor: TargetDescriptor =
			serde_json::from_value(raw).map_err(|e| GatewayError::InvalidDescriptor(e.to_string()))?;
		let target_id = descriptor
			.identity()
			.map(str::to_owned)
			.ok_or_else(|| GatewayError::InvalidDescriptor("missing id and webSocketDebuggerUrl".into()))?;

		descriptor.id = Some(target_id.clone());
		descriptor.adapter_type = Some(self.namespace.adapter_type());
		descriptor.kind.get_or_insert_with(|| DEFAULT_TARGET_KIND.to_string());
		descriptor.metadata = metadata.cloned();
		Ok((target_id, descriptor))
	}

	fn open_session(&self, target_id: &str, descriptor: TargetDescriptor, client: ClientHandle) -> Result<Arc<Session>> {
		let endpoint = descriptor
			.web_socket_debugger_url
			.clone()
			.filter(|url| !url.is_empty())
			.ok_or_else(|| GatewayError::InvalidDescriptor(format!("target {target_id} has no backend socket URL")))?;

		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let bridge = self.connector.connect(&endpoint, client, events_tx)?;
		let session = Arc::new(Session::new(target_id, descriptor, bridge));

		tokio::spawn(watch_session(
			Arc::downgrade(&self.sessions),
			self.namespace.path().to_string(),
			target_id.to_string(),
			session.id(),
			events_rx,
			self.events.clone(),
		));

		Ok(session)
	}

	fn close_sessions(&self) {
		let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, session)| session).collect();
		for session in sessions {
			session.close();
		}
	}
}

#[async_trait]
impl Adapter for BackendAdapter {
	fn id(&self) -> &str {
		self.namespace.id()
	}

	async fn start(&self) -> Result<()> {
		match &self.process_spec {
			Some(spec) => self.spawn_process(spec).await,
			None => Ok(()),
		}
	}

	async fn stop(&self) {
		let previous = std::mem::take(&mut *self.process.lock());
		if let ProcessSlot::Running(mut process) = previous {
			process.terminate();
			info!(target = "gw.adapter", adapter = %self.namespace.path(), "stopped managed process");
		}
		self.close_sessions();
	}

	async fn discover_targets(&self, metadata: Metadata) -> Vec<TargetDescriptor> {
		let Some(url) = self.list_url.as_deref() else {
			return Vec::new();
		};

		match fetch_json_array(&self.http, url, &self.timeouts).await {
			Ok(raw) => self.register_targets(raw, metadata.value()),
			Err(err) => {
				if err.is_transient() {
					debug!(target = "gw.adapter", adapter = %self.namespace.path(), url, error = %err, "discovery failed");
				} else {
					warn!(target = "gw.adapter", adapter = %self.namespace.path(), url, error = %err, "discovery failed");
				}
				Vec::new()
			}
		}
	}

	async fn connect(&self, target_id: &str, client: ClientHandle) -> Option<Arc<Session>> {
		if target_id.is_empty() {
			warn!(target = "gw.adapter", adapter = %self.namespace.path(), "connect without target id");
			return None;
		}

		let Some(descriptor) = self.descriptors.lock().get(target_id).cloned() else {
			warn!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, "connect to unknown target");
			return None;
		};

		// Lookup and insert under one guard so concurrent connects share one backend socket.
		let mut sessions = self.sessions.lock();
		if let Some(existing) = sessions.get(target_id) {
			debug!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, "rebinding existing session");
			existing.rebind_client(client);
			return Some(Arc::clone(existing));
		}

		match self.open_session(target_id, descriptor, client) {
			Ok(session) => {
				info!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, session = session.id(), "session opened");
				sessions.insert(target_id.to_string(), Arc::clone(&session));
				Some(session)
			}
			Err(err) => {
				warn!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, error = %err, "failed to open session");
				None
			}
		}
	}

	async fn forward(&self, target_id: &str, message: String) {
		let session = self.sessions.lock().get(target_id).cloned();
		let Some(session) = session else {
			warn!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, "no session; dropping frame");
			return;
		};
		if let Err(err) = session.forward(message) {
			warn!(target = "gw.adapter", adapter = %self.namespace.path(), target_id, error = %err, "dropping frame");
		}
	}

	async fn refresh(&self) {
		let Some(spec) = &self.process_spec else {
			return;
		};

		let previous = {
			let mut slot = self.process.lock();
			if !slot.is_running() {
				return;
			}
			std::mem::take(&mut *slot)
		};
		if let ProcessSlot::Running(mut process) = previous {
			process.terminate();
		}

		tokio::time::sleep(self.timeouts.refresh_delay).await;

		match self.spawn_process(spec).await {
			Ok(()) => info!(target = "gw.adapter", adapter = %self.namespace.path(), "managed process relaunched"),
			Err(err) => warn!(target = "gw.adapter", adapter = %self.namespace.path(), error = %err, "refresh failed"),
		}
	}
}

async fn watch_session(
	sessions: Weak<Mutex<HashMap<String, Arc<Session>>>>,
	adapter: String,
	target_id: String,
	session_id: SessionId,
	mut events: mpsc::UnboundedReceiver<TargetEvent>,
	notify: broadcast::Sender<AdapterEvent>,
) {
	while let Some(event) = events.recv().await {
		match event {
			TargetEvent::Error(message) => {
				warn!(target = "gw.adapter", adapter = %adapter, target_id = %target_id, error = %message, "session error");
				let _ = notify.send(AdapterEvent::SessionError {
					target_id: target_id.clone(),
					message,
				});
			}
			TargetEvent::Closed => break,
		}
	}

	if let Some(sessions) = sessions.upgrade() {
		let mut sessions = sessions.lock();
		if sessions.get(&target_id).is_some_and(|s| s.id() == session_id) {
			sessions.remove(&target_id);
		}
	}
	debug!(target = "gw.adapter", adapter = %adapter, target_id = %target_id, session = session_id, "session closed");
	let _ = notify.send(AdapterEvent::SessionClosed { target_id });
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::testing::RecordingConnector;

	fn adapter(connector: Arc<RecordingConnector>) -> BackendAdapter {
		BackendAdapter::new(Namespace::root().child("chrome"), "ws://localhost:9000").with_connector(connector)
	}

	fn listing() -> Vec<Value> {
		vec![
			json!({"id": "AB12", "title": "Example", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/AB12"}),
			json!({"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ZZ"}),
			json!({"title": "no identity"}),
			json!("not an object"),
		]
	}

	#[test]
	fn rewrites_valid_entries_and_skips_invalid_ones() {
		let adapter = adapter(RecordingConnector::new());
		let targets = adapter.register_targets(listing(), Some(json!({"device": "d1"})));

		assert_eq!(targets.len(), 2);
		let first = &targets[0];
		assert_eq!(first.id.as_deref(), Some("AB12"));
		assert_eq!(first.kind(), "page");
		assert_eq!(first.adapter_type.as_deref(), Some("_chrome"));
		assert_eq!(first.metadata, Some(json!({"device": "d1"})));
		assert_eq!(first.web_socket_debugger_url.as_deref(), Some("ws://localhost:9000/chrome/AB12"));
		assert!(first.devtools_frontend_url.as_deref().unwrap().ends_with("ws=localhost:9000/chrome/AB12"));

		// The socket URL's last path segment stands in when no id is reported.
		assert_eq!(targets[1].id.as_deref(), Some("ZZ"));
		assert_eq!(targets[1].web_socket_debugger_url.as_deref(), Some("ws://localhost:9000/chrome/ZZ"));
	}

	#[test]
	fn rewritten_urls_never_leak_the_backend() {
		let adapter = adapter(RecordingConnector::new());
		let targets = adapter.register_targets(listing(), None);
		assert_eq!(targets.len(), 2);
		for target in targets {
			let ws = target.web_socket_debugger_url.unwrap();
			let viewer = target.devtools_frontend_url.unwrap();
			assert!(!ws.contains("9222"), "{ws}");
			assert!(!viewer.contains("127.0.0.1:9222"), "{viewer}");
		}
	}

	#[tokio::test]
	async fn connect_reuses_the_live_session() {
		let connector = RecordingConnector::new();
		let adapter = adapter(connector.clone());
		adapter.register_targets(listing(), None);

		let (first_client, _first_rx) = ClientHandle::channel();
		let (second_client, mut second_rx) = ClientHandle::channel();
		let first = adapter.connect("AB12", first_client).await.unwrap();
		let second = adapter.connect("AB12", second_client).await.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(connector.connection_count(), 1);
		assert_eq!(connector.endpoints(), vec!["ws://127.0.0.1:9222/devtools/page/AB12"]);

		let target = &connector.targets()[0];
		assert_eq!(target.rebind_count(), 1);
		assert!(target.push_to_client("{\"id\":1}"));
		assert_eq!(second_rx.recv().await.as_deref(), Some("{\"id\":1}"));
	}

	#[tokio::test]
	async fn connect_to_unknown_or_empty_target_is_none() {
		let connector = RecordingConnector::new();
		let adapter = adapter(connector.clone());
		adapter.register_targets(listing(), None);

		let (client, _rx) = ClientHandle::channel();
		assert!(adapter.connect("missing", client.clone()).await.is_none());
		assert!(adapter.connect("", client).await.is_none());
		assert_eq!(connector.connection_count(), 0);
	}

	#[tokio::test]
	async fn bridge_failure_yields_no_session() {
		let connector = RecordingConnector::new();
		connector.set_failing(true);
		let adapter = adapter(connector);
		adapter.register_targets(listing(), None);

		let (client, _rx) = ClientHandle::channel();
		assert!(adapter.connect("AB12", client).await.is_none());
		assert_eq!(adapter.session_count(), 0);
	}

	#[tokio::test]
	async fn forward_reaches_the_session_and_drops_unknown_targets() {
		let connector = RecordingConnector::new();
		let adapter = adapter(connector.clone());
		adapter.register_targets(listing(), None);

		let (client, _rx) = ClientHandle::channel();
		adapter.connect("AB12", client).await.unwrap();
		adapter.forward("AB12", "{\"id\":1}".into()).await;
		adapter.forward("missing", "{\"id\":2}".into()).await;

		assert_eq!(connector.targets()[0].forwarded(), vec!["{\"id\":1}"]);
	}

	#[tokio::test]
	async fn closed_sessions_leave_the_registry() {
		let connector = RecordingConnector::new();
		let adapter = adapter(connector.clone());
		adapter.register_targets(listing(), None);
		let mut events = adapter.subscribe();

		let (client, _rx) = ClientHandle::channel();
		let first = adapter.connect("AB12", client.clone()).await.unwrap();
		connector.targets()[0].emit(TargetEvent::Closed);

		assert_eq!(
			events.recv().await.unwrap(),
			AdapterEvent::SessionClosed { target_id: "AB12".into() }
		);
		assert_eq!(adapter.session_count(), 0);

		let second = adapter.connect("AB12", client).await.unwrap();
		assert_ne!(first.id(), second.id());
		assert_eq!(connector.connection_count(), 2);
	}

	#[tokio::test]
	async fn stop_closes_sessions() {
		let connector = RecordingConnector::new();
		let adapter = adapter(connector.clone());
		adapter.register_targets(listing(), None);

		let (client, _rx) = ClientHandle::channel();
		adapter.connect("AB12", client).await.unwrap();
		adapter.stop().await;
		adapter.stop().await;

		assert_eq!(adapter.session_count(), 0);
		assert!(connector.targets()[0].is_closed());
	}

	#[tokio::test]
	async fn without_list_url_discovery_is_empty() {
		let adapter = adapter(RecordingConnector::new());
		assert!(adapter.discover_targets(Metadata::None).await.is_empty());
		assert!(adapter.start().await.is_ok());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn second_spawn_is_rejected_and_keeps_the_first_process() {
		let adapter = adapter(RecordingConnector::new()).with_timeouts(Timeouts {
			startup_grace: std::time::Duration::from_millis(50),
			..Timeouts::default()
		});
		let spec = ProcessSpec::new("sleep", ["5"]);

		adapter.spawn_process(&spec).await.unwrap();
		let pid = adapter.process_id();
		assert!(pid.is_some());

		let err = adapter.spawn_process(&spec).await.unwrap_err();
		assert!(matches!(err, GatewayError::AlreadyStarted));
		assert_eq!(adapter.process_id(), pid);

		adapter.stop().await;
		assert_eq!(adapter.process_id(), None);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn cancelled_start_releases_the_process_slot() {
		let adapter = adapter(RecordingConnector::new())
			.with_timeouts(Timeouts {
				startup_grace: std::time::Duration::from_millis(300),
				..Timeouts::default()
			})
			.with_process(ProcessSpec::new("sleep", ["5"]));

		let cancelled = tokio::time::timeout(std::time::Duration::from_millis(50), adapter.start()).await;
		assert!(cancelled.is_err());
		assert_eq!(adapter.process_id(), None);

		adapter.start().await.unwrap();
		assert!(adapter.process_id().is_some());
		adapter.stop().await;
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn stop_during_grace_window_discards_the_new_process() {
		let adapter = Arc::new(
			adapter(RecordingConnector::new())
				.with_timeouts(Timeouts {
					startup_grace: std::time::Duration::from_millis(300),
					..Timeouts::default()
				})
				.with_process(ProcessSpec::new("sleep", ["5"])),
		);

		let starting = tokio::spawn({
			let adapter = Arc::clone(&adapter);
			async move { adapter.start().await }
		});
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		adapter.stop().await;

		assert!(starting.await.unwrap().is_ok());
		assert_eq!(adapter.process_id(), None);

		// The slot is free again for a fresh start.
		adapter.start().await.unwrap();
		assert!(adapter.process_id().is_some());
		adapter.stop().await;
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn failed_relaunch_is_swallowed_and_frees_the_slot() {
		let dir = tempfile::tempdir().unwrap();
		let marker = dir.path().join("launched");
		// Runs once; every later launch exits inside the grace window.
		let script = format!(
			"if [ -e '{0}' ]; then exit 1; fi; touch '{0}'; exec sleep 5",
			marker.display()
		);
		let adapter = adapter(RecordingConnector::new())
			.with_timeouts(Timeouts {
				startup_grace: std::time::Duration::from_millis(100),
				refresh_delay: std::time::Duration::from_millis(10),
				..Timeouts::default()
			})
			.with_process(ProcessSpec::new("sh", ["-c".to_string(), script]));

		adapter.start().await.unwrap();
		assert!(adapter.process_id().is_some());

		adapter.refresh().await;
		assert_eq!(adapter.process_id(), None);

		// Nothing is left holding the slot.
		adapter.spawn_process(&ProcessSpec::new("sleep", ["5"])).await.unwrap();
		assert!(adapter.process_id().is_some());
		adapter.stop().await;
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn refresh_relaunches_the_managed_process() {
		let adapter = adapter(RecordingConnector::new())
			.with_timeouts(Timeouts {
				startup_grace: std::time::Duration::from_millis(50),
				refresh_delay: std::time::Duration::from_millis(10),
				..Timeouts::default()
			})
			.with_process(ProcessSpec::new("sleep", ["5"]));

		adapter.start().await.unwrap();
		let before = adapter.process_id();
		adapter.refresh().await;
		let after = adapter.process_id();

		assert!(after.is_some());
		assert_ne!(before, after);
		adapter.stop().await;
	}
}
