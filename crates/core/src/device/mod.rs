//! Device-backed collection: children appear as devices attach.
//!
//! Every discovery call first polls the enumeration proxy, normalizes each device's
//! OS version, and creates a leaf adapter for devices seen for the first time. The
//! device record then rides along as per-call metadata of that device's child, so
//! every target carries its device. Children of devices that disappear are kept.

mod platform;
mod version;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_protocol::DeviceRecord;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::address::Namespace;
use crate::backend::BackendAdapter;
use crate::bridge::{TargetConnector, WsConnector};
use crate::collection::{ChildRegistry, Collection, DiscoveryPolicy};
use crate::config::Timeouts;
use crate::discovery::fetch_json_array;
use crate::error::{GatewayError, Result};
use crate::process::ProcessSpec;

pub use platform::{DEVICE_PORT_SPAN, PROXY_EXECUTABLE, ProxySettings, build_proxy_settings, locate_proxy_executable};
pub use version::{
	OS_VERSION_KEY, PassThroughFactory, ProtocolBinder, ProtocolGeneration, ProtocolTranslator, TranslatorFactory,
	select_generation,
};

/// OS version assumed when the enumeration backend reports none.
pub const FALLBACK_OS_VERSION: &str = "9.3.0";

const SIMULATOR_PREFIX: &str = "SIMULATOR";

/// Parses one enumeration entry and fills in its normalized `version`.
pub fn normalize_device(raw: Value) -> Result<DeviceRecord> {
	let mut device: DeviceRecord =
		serde_json::from_value(raw).map_err(|e| GatewayError::InvalidDevice(e.to_string()))?;
	if device.device_id.is_empty() {
		return Err(GatewayError::InvalidDevice("empty deviceId".into()));
	}

	let reported = device.device_os_version.as_deref().filter(|v| !v.is_empty());
	let version = if device.device_id.starts_with(SIMULATOR_PREFIX) {
		FALLBACK_OS_VERSION
	} else if let Some(reported) = reported {
		reported
	} else {
		warn!(
			target = "gw.device",
			device = %device.device_id,
			fallback = FALLBACK_OS_VERSION,
			"device reports no OS version; protocol compatibility may suffer"
		);
		FALLBACK_OS_VERSION
	};
	device.version = Some(version.to_string());
	Ok(device)
}

/// Port of the device's own target listing, parsed from its `host:port` url.
pub fn device_port(device: &DeviceRecord) -> Result<u16> {
	let url = device
		.url
		.as_deref()
		.filter(|url| !url.is_empty())
		.ok_or_else(|| GatewayError::InvalidDevice(format!("device {} has no url", device.device_id)))?;
	let (_, port) = url
		.trim_end_matches('/')
		.rsplit_once(':')
		.ok_or_else(|| GatewayError::InvalidDevice(format!("device url {url} has no port")))?;
	port.parse()
		.map_err(|_| GatewayError::InvalidDevice(format!("device url {url} has an invalid port")))
}

/// Discovery policy attaching one leaf adapter per enumerated device.
pub struct DevicePolicy {
	parent: Namespace,
	proxy_base: String,
	list_url: String,
	timeouts: Timeouts,
	http: reqwest::Client,
	connector: Arc<dyn TargetConnector>,
}

impl DevicePolicy {
	async fn enumerate(&self) -> Vec<DeviceRecord> {
		let raw = match fetch_json_array(&self.http, &self.list_url, &self.timeouts).await {
			Ok(raw) => raw,
			Err(err) => {
				debug!(target = "gw.device", url = %self.list_url, error = %err, "device enumeration failed");
				return Vec::new();
			}
		};

		raw.into_iter()
			.filter_map(|entry| match normalize_device(entry) {
				Ok(device) => Some(device),
				Err(err) => {
					warn!(target = "gw.device", error = %err, "skipping device");
					None
				}
			})
			.collect()
	}

	async fn attach(&self, child_id: &str, device: &DeviceRecord, children: &ChildRegistry) -> Result<()> {
		let port = device_port(device)?;
		let adapter = Arc::new(
			BackendAdapter::new(self.parent.child(child_id), self.proxy_base.clone())
				.with_list_url(format!("http://127.0.0.1:{port}/json"))
				.with_timeouts(self.timeouts)
				.with_http_client(self.http.clone())
				.with_connector(Arc::clone(&self.connector)),
		);
		adapter.start().await?;

		if children.insert(adapter.clone()) {
			info!(target = "gw.device", device = %device.device_id, child = child_id, port, "device attached");
		} else {
			// Another discovery call attached it first.
			adapter.stop().await;
		}
		Ok(())
	}
}

#[async_trait]
impl DiscoveryPolicy for DevicePolicy {
	async fn prepare(&self, children: &ChildRegistry) -> HashMap<String, Value> {
		let mut metadata = HashMap::new();

		for device in self.enumerate().await {
			let child_id = format!("{}_{}", self.parent.id(), device.device_id);
			if !children.contains(&child_id) {
				if let Err(err) = self.attach(&child_id, &device, children).await {
					// Retried on the next discovery call.
					warn!(target = "gw.device", device = %device.device_id, error = %err, "failed to attach device");
					continue;
				}
			}
			match serde_json::to_value(&device) {
				Ok(record) => {
					metadata.insert(child_id, record);
				}
				Err(err) => warn!(target = "gw.device", device = %device.device_id, error = %err, "unserializable device record"),
			}
		}

		metadata
	}
}

/// Builds the collection for one device enumeration backend.
pub struct DeviceCollectionBuilder {
	namespace: Namespace,
	proxy_base: String,
	list_url: String,
	process: Option<ProcessSpec>,
	timeouts: Timeouts,
	connector: Arc<dyn TargetConnector>,
	translators: Arc<dyn TranslatorFactory>,
}

impl DeviceCollectionBuilder {
	/// Enumerates devices from `list_url` without managing a proxy process.
	pub fn new(namespace: Namespace, proxy_base: impl Into<String>, list_url: impl Into<String>) -> Self {
		Self {
			namespace,
			proxy_base: proxy_base.into(),
			list_url: list_url.into(),
			process: None,
			timeouts: Timeouts::default(),
			connector: Arc::new(WsConnector),
			translators: Arc::new(PassThroughFactory),
		}
	}

	/// Enumerates devices through a managed proxy launched with `settings`.
	pub fn from_proxy(namespace: Namespace, proxy_base: impl Into<String>, settings: &ProxySettings) -> Self {
		let mut builder = Self::new(namespace, proxy_base, settings.list_url());
		builder.process = Some(settings.process_spec());
		builder
	}

	pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
		self.timeouts = timeouts;
		self
	}

	pub fn with_connector(mut self, connector: Arc<dyn TargetConnector>) -> Self {
		self.connector = connector;
		self
	}

	pub fn with_translators(mut self, translators: Arc<dyn TranslatorFactory>) -> Self {
		self.translators = translators;
		self
	}

	/// Returns the collection together with the binder holding its translators.
	pub fn build(self) -> (Collection, Arc<ProtocolBinder>) {
		let http = reqwest::Client::new();

		let mut base = BackendAdapter::new(self.namespace.clone(), self.proxy_base.clone())
			.with_timeouts(self.timeouts)
			.with_http_client(http.clone())
			.with_connector(Arc::clone(&self.connector));
		if let Some(process) = self.process {
			base = base.with_process(process);
		}

		let policy = DevicePolicy {
			parent: self.namespace,
			proxy_base: self.proxy_base,
			list_url: self.list_url,
			timeouts: self.timeouts,
			http,
			connector: self.connector,
		};
		let binder = Arc::new(ProtocolBinder::new(self.translators));

		let collection = Collection::new(base)
			.with_discovery_policy(Arc::new(policy))
			.with_session_binder(binder.clone());
		(collection, binder)
	}
}
