//! JSON-RPC readiness polling.

use fork_types::{ChainId, ForkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// How long and how often to poll an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
	pub timeout: Duration,
	pub interval: Duration,
}

impl Default for ReadinessOptions {
	fn default() -> Self {
		Self {
			timeout: Duration::from_millis(100_000),
			interval: Duration::from_millis(1_000),
		}
	}
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
	jsonrpc: &'static str,
	id: u64,
	method: &'a str,
	params: [(); 0],
}

#[derive(Deserialize)]
struct JsonRpcResponse {
	result: Option<String>,
	error: Option<serde_json::Value>,
}

/// Polls `url` with `eth_chainId` until it answers with a result.
///
/// Transport failures and JSON-RPC error responses both count as "not ready
/// yet". Returns the chain id the endpoint reports, or a timeout error once
/// `options.timeout` has elapsed.
pub async fn wait_for_network(url: &str, options: &ReadinessOptions) -> Result<ChainId, ForkError> {
	let client = http_client(url)?;
	let timeout_ms = options.timeout.as_millis() as u64;

	let poll = async {
		let mut attempts: u32 = 0;
		loop {
			attempts += 1;
			match request_quantity(&client, url, "eth_chainId").await {
				Ok(chain_id) => {
					info!(url, chain_id, attempts, "Network is ready");
					return ChainId(chain_id);
				}
				Err(e) => debug!(url, attempts, "Network not ready yet: {}", e),
			}
			tokio::time::sleep(options.interval).await;
		}
	};

	tokio::time::timeout(options.timeout, poll).await.map_err(|_| {
		ForkError::timeout(
			timeout_ms,
			Some(&format!(
				"Network at {} did not become ready within {}ms",
				url, timeout_ms
			)),
		)
	})
}

/// Fetches the latest block number from `url` with a single request.
pub async fn fetch_block_number(url: &str) -> Result<u64, ForkError> {
	let client = http_client(url)?;
	request_quantity(&client, url, "eth_blockNumber")
		.await
		.map_err(|e| ForkError::network_with_source(url, "Failed to fetch latest block number", e))
}

fn http_client(url: &str) -> Result<reqwest::Client, ForkError> {
	reqwest::Client::builder()
		.timeout(REQUEST_TIMEOUT)
		.build()
		.map_err(|e| ForkError::network_with_source(url, "Failed to build HTTP client", e))
}

async fn request_quantity(client: &reqwest::Client, url: &str, method: &str) -> Result<u64, String> {
	let request = JsonRpcRequest {
		jsonrpc: "2.0",
		id: 1,
		method,
		params: [],
	};

	let response: JsonRpcResponse = client
		.post(url)
		.json(&request)
		.send()
		.await
		.map_err(|e| e.to_string())?
		.error_for_status()
		.map_err(|e| e.to_string())?
		.json()
		.await
		.map_err(|e| e.to_string())?;

	if let Some(error) = response.error {
		return Err(format!("RPC error: {}", error));
	}

	let result = response
		.result
		.ok_or_else(|| "Response has no result".to_string())?;
	parse_quantity(&result)
}

fn parse_quantity(value: &str) -> Result<u64, String> {
	let digits = value
		.strip_prefix("0x")
		.ok_or_else(|| format!("Expected hex quantity, got {}", value))?;
	u64::from_str_radix(digits, 16).map_err(|e| format!("Invalid hex quantity {}: {}", value, e))
}
