//! Bounded HTTP polling of `/json`-style listing endpoints.

use serde_json::Value;

use crate::config::Timeouts;
use crate::error::{GatewayError, Result};

/// Fetches `url` and returns its body as a JSON array.
///
/// The request itself is bounded by `timeouts.request`; the whole call, body read
/// included, by `timeouts.overall`. A late response to a call that already timed
/// out is dropped with the request future.
pub async fn fetch_json_array(client: &reqwest::Client, url: &str, timeouts: &Timeouts) -> Result<Vec<Value>> {
	let request = async {
		let response = client.get(url).timeout(timeouts.request).send().await?;
		if !response.status().is_success() {
			return Err(GatewayError::Status(response.status()));
		}
		let body = response.text().await?;
		parse_json_array(&body)
	};

	tokio::time::timeout(timeouts.overall, request)
		.await
		.map_err(|_| GatewayError::Timeout {
			ms: timeouts.overall.as_millis() as u64,
			what: url.to_string(),
		})?
}

/// Parses a listing body, rejecting empty, non-JSON, and non-array bodies.
pub fn parse_json_array(body: &str) -> Result<Vec<Value>> {
	if body.trim().is_empty() {
		return Err(GatewayError::EmptyBody);
	}
	match serde_json::from_str::<Value>(body)? {
		Value::Array(items) => Ok(items),
		_ => Err(GatewayError::NotAnArray),
	}
}
