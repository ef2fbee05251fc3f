//! Per-session protocol generation selection.
//!
//! A session routed to a device is bound to a translator once, on first sight, using
//! the OS version recorded in the device metadata. The binding is never reselected.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::collection::SessionBinder;
use crate::error::Result;
use crate::session::{Session, SessionId};

/// Device-record key holding the normalized OS version.
pub const OS_VERSION_KEY: &str = "version";

/// Backend protocol generations with distinct message shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolGeneration {
	Legacy,
	Middle,
	Newest,
}

/// Picks the generation for a device OS version such as `"12.1"` or `"9.3.0"`.
///
/// Newest from 12.2 on, legacy up to major 8, middle for everything else including
/// versions that do not parse.
pub fn select_generation(version: &str) -> ProtocolGeneration {
	match major_minor(version) {
		Some((major, minor)) if major > 12 || (major == 12 && minor >= 2) => ProtocolGeneration::Newest,
		Some((major, _)) if major <= 8 => ProtocolGeneration::Legacy,
		_ => ProtocolGeneration::Middle,
	}
}

fn major_minor(version: &str) -> Option<(u64, u64)> {
	let mut parts = version.trim().split('.');
	let major = parts.next()?.parse().ok()?;
	let minor = match parts.next() {
		Some(minor) => minor.parse().ok()?,
		None => 0,
	};
	Some((major, minor))
}

/// Adapts protocol traffic for one backend generation. Bound 1:1 to a session.
pub trait ProtocolTranslator: Send + Sync {
	fn generation(&self) -> ProtocolGeneration;
}

/// Builds translators for newly seen sessions.
pub trait TranslatorFactory: Send + Sync {
	fn create(&self, generation: ProtocolGeneration, session: &Session) -> Result<Arc<dyn ProtocolTranslator>>;
}

/// Factory producing translators that leave traffic untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughFactory;

impl TranslatorFactory for PassThroughFactory {
	fn create(&self, generation: ProtocolGeneration, _session: &Session) -> Result<Arc<dyn ProtocolTranslator>> {
		Ok(Arc::new(PassThrough(generation)))
	}
}

struct PassThrough(ProtocolGeneration);

impl ProtocolTranslator for PassThrough {
	fn generation(&self) -> ProtocolGeneration {
		self.0
	}
}

struct Binding {
	session: Weak<Session>,
	translator: Arc<dyn ProtocolTranslator>,
}

/// Session binder selecting a translator from the session's device metadata.
pub struct ProtocolBinder {
	factory: Arc<dyn TranslatorFactory>,
	bindings: Mutex<HashMap<SessionId, Binding>>,
}

impl ProtocolBinder {
	pub fn new(factory: Arc<dyn TranslatorFactory>) -> Self {
		Self {
			factory,
			bindings: Mutex::new(HashMap::new()),
		}
	}

	/// Translator bound to a live session.
	pub fn translator_for(&self, session: SessionId) -> Option<Arc<dyn ProtocolTranslator>> {
		self.bindings
			.lock()
			.get(&session)
			.filter(|binding| binding.session.strong_count() > 0)
			.map(|binding| Arc::clone(&binding.translator))
	}

	fn translator(&self, session: &Session) -> Option<Arc<dyn ProtocolTranslator>> {
		let version = session
			.metadata()
			.and_then(|metadata| metadata.get(OS_VERSION_KEY))
			.and_then(Value::as_str);
		let generation = match version {
			Some(version) => select_generation(version),
			None => {
				warn!(target = "gw.device", session = session.id(), "session has no device version");
				ProtocolGeneration::Middle
			}
		};

		match self.factory.create(generation, session) {
			Ok(translator) => return Some(translator),
			Err(err) => warn!(target = "gw.device", session = session.id(), ?generation, error = %err, "translator selection failed"),
		}
		if generation == ProtocolGeneration::Middle {
			return None;
		}
		match self.factory.create(ProtocolGeneration::Middle, session) {
			Ok(translator) => Some(translator),
			Err(err) => {
				warn!(target = "gw.device", session = session.id(), error = %err, "fallback translator failed");
				None
			}
		}
	}
}

impl Default for ProtocolBinder {
	fn default() -> Self {
		Self::new(Arc::new(PassThroughFactory))
	}
}

impl SessionBinder for ProtocolBinder {
	fn bind(&self, session: &Arc<Session>) {
		let mut bindings = self.bindings.lock();
		bindings.retain(|_, binding| binding.session.strong_count() > 0);
		if bindings.contains_key(&session.id()) {
			return;
		}

		// Without a translator the session still bridges raw traffic.
		let Some(translator) = self.translator(session) else {
			return;
		};
		debug!(target = "gw.device", session = session.id(), generation = ?translator.generation(), "translator bound");
		bindings.insert(
			session.id(),
			Binding {
				session: Arc::downgrade(session),
				translator,
			},
		);
	}
}
