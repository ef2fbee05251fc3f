//! Loopback fake backends shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use gateway::Timeouts;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const PROXY_BASE: &str = "ws://localhost:9000";

/// Serves `app` on an ephemeral loopback port.
pub async fn serve(app: Router) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		axum::serve(listener, app).await.unwrap();
	});
	addr
}

/// `/json` answering with a fixed status and raw body.
pub async fn raw_listing(status: StatusCode, body: &'static str) -> SocketAddr {
	serve(Router::new().route("/json", get(move || async move { (status, body) }))).await
}

/// `/json` answering with a JSON value.
pub async fn listing(body: Value) -> SocketAddr {
	serve(Router::new().route(
		"/json",
		get(move || {
			let body = body.clone();
			async move { Json(body) }
		}),
	))
	.await
}

/// `/json` that never answers within any test timeout.
pub async fn hanging_listing() -> SocketAddr {
	serve(Router::new().route(
		"/json",
		get(|| async {
			tokio::time::sleep(Duration::from_secs(30)).await;
			"[]"
		}),
	))
	.await
}

pub fn list_url(addr: SocketAddr) -> String {
	format!("http://{addr}/json")
}

/// Listing entry for a page served by a backend at `backend`.
pub fn page(id: &str, title: &str, backend: SocketAddr) -> Value {
	json!({
		"id": id,
		"type": "page",
		"title": title,
		"url": "https://example.com/",
		"webSocketDebuggerUrl": format!("ws://{backend}/devtools/page/{id}"),
		"devtoolsFrontendUrl": format!("/devtools/inspector.html?ws={backend}/devtools/page/{id}"),
	})
}

pub fn fast_timeouts() -> Timeouts {
	Timeouts {
		request: Duration::from_millis(300),
		overall: Duration::from_millis(500),
		startup_grace: Duration::from_millis(50),
		refresh_delay: Duration::from_millis(10),
	}
}

/// WebSocket backend echoing text frames; counts accepted connections.
pub async fn echo_backend() -> (SocketAddr, Arc<AtomicUsize>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let accepted = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&accepted);

	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			counter.fetch_add(1, Ordering::SeqCst);
			tokio::spawn(async move {
				let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
					return;
				};
				while let Some(Ok(message)) = socket.next().await {
					if message.is_text() && socket.send(message).await.is_err() {
						break;
					}
				}
			});
		}
	});

	(addr, accepted)
}
