//! Composite adapter: named children under one namespace.
//!
//! Fan-out operations (`start`, `discover_targets`, `refresh`) spawn one task per
//! child and join on all of them; a child that fails or panics contributes nothing
//! and never cancels its siblings. Results are concatenated in registry order.
//! `stop` walks children sequentially, still isolating each in its own task.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use gateway_protocol::TargetDescriptor;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::adapter::{Adapter, Metadata};
use crate::address::{Namespace, parse_address, rooted};
use crate::backend::{AdapterEvent, BackendAdapter};
use crate::bridge::ClientHandle;
use crate::error::Result;
use crate::session::Session;

/// Insertion-ordered map of child adapters. Children are never removed.
#[derive(Default)]
pub struct ChildRegistry {
	children: RwLock<Vec<(String, Arc<dyn Adapter>)>>,
}

impl ChildRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `adapter` under its own id. Returns `false` if the id is taken.
	pub fn insert(&self, adapter: Arc<dyn Adapter>) -> bool {
		let mut children = self.children.write();
		if children.iter().any(|(id, _)| id == adapter.id()) {
			return false;
		}
		children.push((adapter.id().to_string(), adapter));
		true
	}

	pub fn contains(&self, id: &str) -> bool {
		self.children.read().iter().any(|(child, _)| child == id)
	}

	pub fn get(&self, id: &str) -> Option<Arc<dyn Adapter>> {
		self.children
			.read()
			.iter()
			.find(|(child, _)| child == id)
			.map(|(_, adapter)| Arc::clone(adapter))
	}

	/// Children in registry order, detached from the lock.
	pub fn snapshot(&self) -> Vec<(String, Arc<dyn Adapter>)> {
		self.children.read().clone()
	}

	pub fn ids(&self) -> Vec<String> {
		self.children.read().iter().map(|(id, _)| id.clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.children.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.children.read().is_empty()
	}
}

/// Hook run at the start of every discovery call on a collection.
///
/// May register new children; returns per-call metadata keyed by child id, which
/// replaces the caller-supplied metadata for the fan-out.
#[async_trait]
pub trait DiscoveryPolicy: Send + Sync {
	async fn prepare(&self, children: &ChildRegistry) -> HashMap<String, Value>;
}

/// Hook run on every session a collection routes a connection to.
pub trait SessionBinder: Send + Sync {
	fn bind(&self, session: &Arc<Session>);
}

/// Adapter aggregating named children. Its own base adapter takes part in every
/// fan-out ahead of the children.
pub struct Collection {
	base: BackendAdapter,
	children: ChildRegistry,
	discovery: Option<Arc<dyn DiscoveryPolicy>>,
	binder: Option<Arc<dyn SessionBinder>>,
}

impl Collection {
	pub fn new(base: BackendAdapter) -> Self {
		Self {
			base,
			children: ChildRegistry::new(),
			discovery: None,
			binder: None,
		}
	}

	pub fn with_discovery_policy(mut self, policy: Arc<dyn DiscoveryPolicy>) -> Self {
		self.discovery = Some(policy);
		self
	}

	pub fn with_session_binder(mut self, binder: Arc<dyn SessionBinder>) -> Self {
		self.binder = Some(binder);
		self
	}

	pub fn namespace(&self) -> &Namespace {
		self.base.namespace()
	}

	/// Namespace a child registered under `id` lives at.
	pub fn child_namespace(&self, id: &str) -> Namespace {
		self.base.namespace().child(id)
	}

	pub fn base(&self) -> &BackendAdapter {
		&self.base
	}

	pub fn children(&self) -> &ChildRegistry {
		&self.children
	}

	/// Registers `child`. Returns `false` if its id is already taken.
	pub fn add_child(&self, child: Arc<dyn Adapter>) -> bool {
		let added = self.children.insert(child);
		if !added {
			warn!(target = "gw.collection", collection = %self.namespace().path(), "duplicate child id ignored");
		}
		added
	}

	pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
		self.base.subscribe()
	}

	fn route<'a>(&self, address: &'a str) -> Option<(Arc<dyn Adapter>, &'a str)> {
		let Some((child_id, remainder)) = parse_address(address) else {
			warn!(target = "gw.collection", collection = %self.namespace().path(), address, "undecodable address");
			return None;
		};
		match self.children.get(child_id) {
			Some(child) => Some((child, remainder)),
			None => {
				warn!(target = "gw.collection", collection = %self.namespace().path(), child = child_id, "unknown child");
				None
			}
		}
	}
}

#[async_trait]
impl Adapter for Collection {
	fn id(&self) -> &str {
		self.base.id()
	}

	async fn start(&self) -> Result<()> {
		let children = self.children.snapshot();
		let handles: Vec<_> = children
			.iter()
			.map(|(_, child)| {
				let child = Arc::clone(child);
				tokio::spawn(async move { child.start().await })
			})
			.collect();

		let (own, outcomes) = tokio::join!(self.base.start(), join_all(handles));

		if let Err(err) = own {
			warn!(target = "gw.collection", collection = %self.namespace().path(), error = %err, "start failed");
		}
		for ((id, _), outcome) in children.iter().zip(outcomes) {
			match outcome {
				Ok(Ok(())) => debug!(target = "gw.collection", collection = %self.namespace().path(), child = %id, "child started"),
				Ok(Err(err)) => warn!(target = "gw.collection", collection = %self.namespace().path(), child = %id, error = %err, "child failed to start"),
				Err(err) => warn!(target = "gw.collection", collection = %self.namespace().path(), child = %id, error = %err, "child start task failed"),
			}
		}
		Ok(())
	}

	async fn stop(&self) {
		self.base.stop().await;
		// One child at a time, each in its own task so a panic cannot skip the rest.
		for (id, child) in self.children.snapshot() {
			if let Err(err) = tokio::spawn(async move { child.stop().await }).await {
				warn!(target = "gw.collection", collection = %self.namespace().path(), child = %id, error = %err, "child stop task failed");
			}
		}
	}

	async fn discover_targets(&self, metadata: Metadata) -> Vec<TargetDescriptor> {
		let prepared = match &self.discovery {
			Some(policy) => Some(policy.prepare(&self.children).await),
			None => None,
		};

		let children = self.children.snapshot();
		let handles: Vec<_> = children
			.iter()
			.enumerate()
			.map(|(index, (id, child))| {
				let child_metadata = match &prepared {
					Some(by_id) => by_id.get(id).cloned().map_or(Metadata::None, Metadata::Shared),
					None => metadata.for_child(index),
				};
				let child = Arc::clone(child);
				tokio::spawn(async move { child.discover_targets(child_metadata).await })
			})
			.collect();

		let (mut targets, outcomes) = tokio::join!(self.base.discover_targets(metadata.clone()), join_all(handles));

		for ((id, _), outcome) in children.iter().zip(outcomes) {
			match outcome {
				Ok(mut found) => targets.append(&mut found),
				Err(err) => warn!(target = "gw.collection", collection = %self.namespace().path(), child = %id, error = %err, "child discovery task failed"),
			}
		}
		targets
	}

	async fn connect(&self, address: &str, client: ClientHandle) -> Option<Arc<Session>> {
		let address = rooted(address);
		let (child, remainder) = self.route(&address)?;
		let session = child.connect(remainder, client).await?;
		if let Some(binder) = &self.binder {
			binder.bind(&session);
		}
		Some(session)
	}

	async fn forward(&self, address: &str, message: String) {
		let address = rooted(address);
		if let Some((child, remainder)) = self.route(&address) {
			child.forward(remainder, message).await;
		}
	}

	async fn refresh(&self) {
		let handles: Vec<_> = self
			.children
			.snapshot()
			.into_iter()
			.map(|(_, child)| tokio::spawn(async move { child.refresh().await }))
			.collect();

		let (_, outcomes) = tokio::join!(self.base.refresh(), join_all(handles));
		for outcome in outcomes {
			if let Err(err) = outcome {
				warn!(target = "gw.collection", collection = %self.namespace().path(), error = %err, "child refresh task failed");
			}
		}
	}
}
