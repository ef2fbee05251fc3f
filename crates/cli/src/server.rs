//! HTTP/WebSocket front of the gateway.
//!
//! `/json` and `/json/list` serve the discovered targets, `/json/version` a static
//! payload, `/refresh` relaunches managed processes. Any other path upgraded to a
//! WebSocket is an inbound session address routed through the adapter tree.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use gateway::device::{DeviceCollectionBuilder, build_proxy_settings, locate_proxy_executable};
use gateway::{Adapter, BackendAdapter, ClientHandle, Collection, FixtureAdapter, Metadata, Namespace, ProcessSpec};
use gateway_protocol::{TargetDescriptor, VersionInfo};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::{DEVICE_NAMESPACE, FIXTURE_NAMESPACE, GatewayConfig};

#[derive(Clone)]
struct AppState {
	root: Arc<Collection>,
	shutdown: watch::Receiver<bool>,
}

/// Builds the adapter tree described by `config`.
///
/// A missing device proxy disables device discovery instead of failing startup.
pub fn build_root(config: &GatewayConfig) -> Arc<Collection> {
	let proxy_base = config.proxy_base();
	let root = Collection::new(BackendAdapter::new(Namespace::root(), proxy_base.clone()).with_timeouts(config.timeouts));

	for backend in &config.backends {
		let mut leaf = BackendAdapter::new(root.child_namespace(&backend.id), proxy_base.clone())
			.with_list_url(backend.list_url.clone())
			.with_timeouts(config.timeouts);
		if let Some(executable) = &backend.executable {
			leaf = leaf.with_process(ProcessSpec::new(executable, backend.args.clone()));
		}
		root.add_child(Arc::new(leaf));
	}

	if config.devices.enabled {
		let settings = locate_proxy_executable(config.devices.executable.as_deref())
			.and_then(|executable| build_proxy_settings(executable, config.devices.proxy_port));
		match settings {
			Ok(settings) => {
				let (devices, _binder) =
					DeviceCollectionBuilder::from_proxy(root.child_namespace(DEVICE_NAMESPACE), proxy_base.clone(), &settings)
						.with_timeouts(config.timeouts)
						.build();
				root.add_child(Arc::new(devices));
			}
			Err(err) => warn!(target = "gw.server", error = %err, "device discovery disabled"),
		}
	}

	if let Some(fixture) = &config.fixture {
		let inner = BackendAdapter::new(root.child_namespace(FIXTURE_NAMESPACE), proxy_base).with_timeouts(config.timeouts);
		root.add_child(Arc::new(FixtureAdapter::new(inner, &fixture.path).with_replicas(fixture.count)));
	}

	Arc::new(root)
}

pub fn router(root: Arc<Collection>, shutdown: watch::Receiver<bool>) -> Router {
	Router::new()
		.route("/json", get(list_targets))
		.route("/json/list", get(list_targets))
		.route("/json/version", get(version))
		.route("/refresh", get(refresh))
		.fallback(session_socket)
		.with_state(AppState { root, shutdown })
}

/// Polls discovery on `root` so registries are warm before clients connect.
pub fn spawn_target_fetcher(root: Arc<Collection>, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let targets = root.discover_targets(Metadata::None).await;
			debug!(target = "gw.server", count = targets.len(), "targets polled");
		}
	})
}

/// Runs the gateway until Ctrl+C, then stops every adapter.
pub async fn run(config: GatewayConfig) -> Result<()> {
	config.validate()?;

	let addr: SocketAddr = format!("{}:{}", config.bind_host, config.port)
		.parse()
		.with_context(|| format!("Invalid host/port combination: {}:{}", config.bind_host, config.port))?;
	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind gateway to {addr}"))?;

	let root = build_root(&config);
	root.start().await?;
	let fetcher = spawn_target_fetcher(Arc::clone(&root), config.poll_interval());

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	info!(target = "gw.server", %addr, proxy_base = %config.proxy_base(), "gateway listening");

	let result = axum::serve(listener, router(Arc::clone(&root), shutdown_rx).into_make_service())
		.with_graceful_shutdown(async move {
			if let Err(err) = tokio::signal::ctrl_c().await {
				warn!(target = "gw.server", error = %err, "failed to listen for Ctrl+C");
				std::future::pending::<()>().await;
			}
			info!(target = "gw.server", "shutting down");
			let _ = shutdown_tx.send(true);
		})
		.await
		.context("Gateway server error");

	fetcher.abort();
	root.stop().await;
	result
}

async fn list_targets(State(state): State<AppState>) -> Json<Vec<TargetDescriptor>> {
	Json(state.root.discover_targets(Metadata::None).await)
}

async fn version() -> Json<VersionInfo> {
	Json(VersionInfo::gateway(env!("CARGO_PKG_VERSION")))
}

async fn refresh(State(state): State<AppState>) -> StatusCode {
	state.root.refresh().await;
	StatusCode::NO_CONTENT
}

async fn session_socket(
	State(state): State<AppState>,
	uri: Uri,
	ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
	match ws {
		Ok(ws) => {
			let address = uri.path().to_string();
			ws.on_upgrade(move |socket| bridge_client(socket, state, address))
		}
		Err(_) => StatusCode::NOT_FOUND.into_response(),
	}
}

async fn bridge_client(mut socket: WebSocket, state: AppState, address: String) {
	let (client, outbound) = ClientHandle::channel();
	let Some(session) = state.root.connect(&address, client).await else {
		info!(target = "gw.server", address = %address, "no target at address");
		let _ = socket.send(Message::Close(None)).await;
		return;
	};
	info!(target = "gw.server", address = %address, session = session.id(), "client attached");

	let mut outbound = UnboundedReceiverStream::new(outbound);
	let (mut ws_tx, mut ws_rx) = socket.split();

	// The outbound stream ends when the session's bridge closes or another client
	// takes the session over; either way this client is done.
	let mut send_task = tokio::spawn(async move {
		while let Some(text) = outbound.next().await {
			if ws_tx.send(Message::Text(text.into())).await.is_err() {
				return;
			}
		}
		let _ = ws_tx.send(Message::Close(None)).await;
	});

	let mut shutdown = state.shutdown.clone();
	loop {
		tokio::select! {
			_ = &mut send_task => {
				debug!(target = "gw.server", address = %address, session = session.id(), "session released");
				break;
			}
			message = ws_rx.next() => match message {
				Some(Ok(Message::Text(text))) => state.root.forward(&address, text.as_str().to_owned()).await,
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					warn!(target = "gw.server", address = %address, error = %err, "client websocket error");
					break;
				}
			},
			_ = shutdown.changed() => break,
		}
	}

	send_task.abort();
	info!(target = "gw.server", address = %address, session = session.id(), "client detached");
}
