//! Discovery against live loopback listings.

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use gateway::{Adapter, BackendAdapter, Metadata, Namespace};
use serde_json::json;

use common::*;

fn leaf(url: String) -> BackendAdapter {
	BackendAdapter::new(Namespace::root().child("chrome"), PROXY_BASE)
		.with_list_url(url)
		.with_timeouts(fast_timeouts())
}

#[tokio::test]
async fn malformed_listings_yield_nothing() {
	let cases = [
		(StatusCode::INTERNAL_SERVER_ERROR, r#"[{"id": "1"}]"#),
		(StatusCode::NOT_FOUND, ""),
		(StatusCode::OK, ""),
		(StatusCode::OK, "<html>not json</html>"),
		(StatusCode::OK, r#"{"id": "1"}"#),
		(StatusCode::OK, "42"),
	];

	for (status, body) in cases {
		let addr = raw_listing(status, body).await;
		let targets = leaf(list_url(addr)).discover_targets(Metadata::None).await;
		assert!(targets.is_empty(), "status {status} body {body:?} produced {targets:?}");
	}
}

#[tokio::test]
async fn unreachable_backend_yields_nothing() {
	let targets = leaf("http://127.0.0.1:9/json".into()).discover_targets(Metadata::None).await;
	assert!(targets.is_empty());
}

#[tokio::test]
async fn slow_backend_is_cut_off() {
	let addr = hanging_listing().await;
	let started = Instant::now();
	let targets = leaf(list_url(addr)).discover_targets(Metadata::None).await;

	assert!(targets.is_empty());
	assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn healthy_listing_is_rewritten() {
	let backend = "127.0.0.1:9222".parse().unwrap();
	let addr = listing(json!([
		page("AB12", "Example", backend),
		{"title": "no identity"},
		{"id": "CD34", "title": "Worker", "type": "service_worker"},
	]))
	.await;

	let targets = leaf(list_url(addr))
		.discover_targets(Metadata::Shared(json!({"origin": "test"})))
		.await;

	assert_eq!(targets.len(), 2);
	assert_eq!(targets[0].id.as_deref(), Some("AB12"));
	assert_eq!(targets[0].web_socket_debugger_url.as_deref(), Some("ws://localhost:9000/chrome/AB12"));
	assert!(!targets[0].devtools_frontend_url.as_deref().unwrap().contains("9222"));
	assert_eq!(targets[0].adapter_type.as_deref(), Some("_chrome"));
	assert_eq!(targets[0].metadata, Some(json!({"origin": "test"})));
	assert_eq!(targets[1].kind(), "service_worker");
	assert_eq!(targets[1].web_socket_debugger_url.as_deref(), Some("ws://localhost:9000/chrome/CD34"));
}
