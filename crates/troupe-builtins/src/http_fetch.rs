//! HTTP fetch tool. Makes GET requests to public hosts.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use troupe_core::{ToolCall, ToolResult, TroupeResult};
use troupe_tools::{Tool, ToolDescriptor};

const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB

/// Fetches the body of a URL via HTTP GET.
///
/// Only `http`/`https` schemes are allowed and private/internal hosts are
/// rejected. The registry's per-call timeout applies on top of the client's
/// own request timeout.
pub struct HttpFetchTool {
    descriptor: ToolDescriptor,
    client: reqwest::Client,
}

impl HttpFetchTool {
    /// Creates the fetch tool with a bounded client.
    pub fn new() -> TroupeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| troupe_core::TroupeError::Http(e.to_string()))?;

        Ok(Self {
            descriptor: ToolDescriptor {
                name: "http_fetch".to_string(),
                description: "Fetch the content of a URL via HTTP GET.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The URL to fetch"
                        }
                    },
                    "required": ["url"]
                }),
            },
            client,
        })
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> TroupeResult<ToolResult> {
        let url = call.arguments["url"].as_str().unwrap_or_default().to_string();
        if url.is_empty() {
            return Ok(ToolResult::error(&call.id, "Missing 'url' argument"));
        }

        let parsed = match reqwest::Url::parse(&url) {
            Ok(u) => u,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Invalid URL '{url}': {e}"),
                ));
            }
        };

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Unsupported scheme '{scheme}'. Only http/https allowed."),
                ));
            }
        }

        if let Some(host) = parsed.host_str() {
            if is_private_host(host) {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Access denied: '{host}' resolves to a private/internal address"),
                ));
            }
        }

        info!(url = %url, "HTTP fetch");

        let response = match self.client.get(parsed).send().await {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("HTTP request failed: {e}"),
                ));
            }
        };

        let status = response.status().as_u16();
        let body_bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                return Ok(ToolResult::error(
                    &call.id,
                    format!("Failed to read response body: {e}"),
                ));
            }
        };

        if body_bytes.len() > MAX_RESPONSE_SIZE {
            return Ok(ToolResult::error(
                &call.id,
                format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    body_bytes.len(),
                    MAX_RESPONSE_SIZE
                ),
            ));
        }

        let result = serde_json::json!({
            "status": status,
            "body": String::from_utf8_lossy(&body_bytes),
            "size": body_bytes.len(),
        });

        if (200..400).contains(&status) {
            Ok(ToolResult::success(&call.id, result.to_string()))
        } else {
            Ok(ToolResult::error(&call.id, result.to_string()))
        }
    }
}

/// Check if a host points at a private/internal network address.
fn is_private_host(host: &str) -> bool {
    let private_patterns = [
        "localhost",
        "127.",
        "10.",
        "192.168.",
        "169.254.",
        "0.0.0.0",
        "[::1]",
        "metadata.google",
        "metadata.aws",
    ];

    let host_lower = host.to_lowercase();
    if private_patterns
        .iter()
        .any(|p| host_lower.starts_with(p) || host_lower == *p)
    {
        return true;
    }

    // 172.16.0.0/12
    if let Some(rest) = host_lower.strip_prefix("172.") {
        if let Some(second) = rest.split('.').next() {
            if let Ok(n) = second.parse::<u8>() {
                return (16..=31).contains(&n);
            }
        }
    }

    false
}
