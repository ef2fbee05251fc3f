//! Namespace paths and inbound address decoding.
//!
//! Every adapter sits at a namespace path (`/ios/ios_4a3b`), the `/`-joined ids of
//! its ancestors. A public session URL is `{proxy base}{namespace path}/{target id}`;
//! inbound addresses are the same string minus the proxy base, peeled one segment
//! per collection level by [`parse_address`].

/// Position of an adapter within the collection tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
	id: String,
	path: String,
}

impl Namespace {
	/// The unnamed root of a tree; its path is empty.
	pub fn root() -> Self {
		Self {
			id: String::new(),
			path: String::new(),
		}
	}

	/// Namespace of a child registered under `id`.
	pub fn child(&self, id: &str) -> Self {
		Self {
			id: id.to_string(),
			path: format!("{}/{}", self.path, id),
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	/// Type tag stamped on descriptors discovered under this namespace.
	pub fn adapter_type(&self) -> String {
		self.path.replace('/', "_")
	}
}

/// Splits an address into `(child id, remainder)`.
///
/// The child id runs from offset 1 up to the next `/`; the remainder is everything
/// after that slash, verbatim. Returns `None` when there is no second slash or either
/// piece is empty.
pub fn parse_address(address: &str) -> Option<(&str, &str)> {
	let rest = address.get(1..)?;
	let (child, remainder) = rest.split_once('/')?;
	if child.is_empty() || remainder.is_empty() {
		return None;
	}
	Some((child, remainder))
}

/// Re-roots a remainder handed down by a parent collection so it decodes the same
/// way a top-level address does.
pub fn rooted(address: &str) -> std::borrow::Cow<'_, str> {
	if address.starts_with('/') {
		std::borrow::Cow::Borrowed(address)
	} else {
		std::borrow::Cow::Owned(format!("/{address}"))
	}
}
