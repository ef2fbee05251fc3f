//! Public URL construction for rewritten descriptors.

use crate::address::Namespace;

/// DevTools frontend page that receives the proxied socket address in `ws=`.
pub const VIEWER_TEMPLATE: &str = "https://chrome-devtools-frontend.appspot.com/serve_file/@fcea73228632975e052eb90fcf6cd1752d3b42b4/inspector.html?experiments=true&remoteFrontend=screencast&ws=";

/// `{proxy base}{namespace path}/{target id}`
pub fn session_url(proxy_base: &str, namespace: &Namespace, target_id: &str) -> String {
	format!("{proxy_base}{}/{target_id}", namespace.path())
}

/// Viewer URL embedding `session_url` without its socket scheme.
pub fn viewer_url(session_url: &str) -> String {
	let address = session_url
		.strip_prefix("ws://")
		.or_else(|| session_url.strip_prefix("wss://"))
		.unwrap_or(session_url);
	format!("{VIEWER_TEMPLATE}{address}")
}
