//! File-backed stand-in for a live backend.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_protocol::TargetDescriptor;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{Adapter, Metadata};
use crate::backend::BackendAdapter;
use crate::bridge::ClientHandle;
use crate::discovery::parse_json_array;
use crate::error::Result;
use crate::session::Session;

/// Replicas produced per discovery call unless configured otherwise.
pub const DEFAULT_REPLICAS: usize = 10;

/// Leaf adapter whose listing comes from a JSON file.
///
/// The file holds a target listing; discovery cycles through its entries to produce
/// a fixed number of replicas with ids `{id}-{n}`. Everything else behaves exactly
/// like the wrapped [`BackendAdapter`].
pub struct FixtureAdapter {
	inner: BackendAdapter,
	path: PathBuf,
	replicas: usize,
}

impl FixtureAdapter {
	pub fn new(inner: BackendAdapter, path: impl Into<PathBuf>) -> Self {
		Self {
			inner,
			path: path.into(),
			replicas: DEFAULT_REPLICAS,
		}
	}

	pub fn with_replicas(mut self, replicas: usize) -> Self {
		self.replicas = replicas;
		self
	}

	async fn load(&self) -> Result<Vec<Value>> {
		let body = tokio::fs::read_to_string(&self.path).await?;
		let entries = parse_json_array(&body)?;
		Ok(replicate(&entries, self.replicas))
	}
}

fn replicate(entries: &[Value], count: usize) -> Vec<Value> {
	entries
		.iter()
		.cycle()
		.take(count)
		.enumerate()
		.map(|(index, entry)| {
			let mut entry = entry.clone();
			if let Some(fields) = entry.as_object_mut() {
				let base = fields.get("id").and_then(Value::as_str).unwrap_or("fixture").to_string();
				fields.insert("id".into(), Value::String(format!("{base}-{index}")));
			}
			entry
		})
		.collect()
}

#[async_trait]
impl Adapter for FixtureAdapter {
	fn id(&self) -> &str {
		self.inner.id()
	}

	async fn start(&self) -> Result<()> {
		self.inner.start().await
	}

	async fn stop(&self) {
		self.inner.stop().await;
	}

	async fn discover_targets(&self, metadata: Metadata) -> Vec<TargetDescriptor> {
		match self.load().await {
			Ok(raw) => self.inner.register_targets(raw, metadata.value()),
			Err(err) => {
				debug!(target = "gw.adapter", path = %self.path.display(), error = %err, "fixture unreadable");
				Vec::new()
			}
		}
	}

	async fn connect(&self, target_id: &str, client: ClientHandle) -> Option<Arc<Session>> {
		self.inner.connect(target_id, client).await
	}

	async fn forward(&self, target_id: &str, message: String) {
		self.inner.forward(target_id, message).await;
	}

	async fn refresh(&self) {
		self.inner.refresh().await;
	}
}
