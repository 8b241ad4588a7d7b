use std::time::Instant;

use gitrama_core::ToolError;

use crate::{Invocation, Invoker, Program, ToolOutput};

/// Proxies invocations to the hosted Gitrama API: `POST <base>/v1/<tool>`
/// with the invocation's parameters as the JSON body.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self, tool: &str) -> String {
        format!("{}/v1/{tool}", self.base_url)
    }
}

#[async_trait::async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, inv: &Invocation) -> Result<ToolOutput, ToolError> {
        if inv.program != Program::Gtr {
            return Err(ToolError::external(
                format!("{} cannot be run over HTTP", inv.tool),
                None,
            ));
        }
        let url = self.endpoint(inv.tool);
        let start = Instant::now();
        tracing::debug!(id = %inv.id, tool = inv.tool, %url, "posting");

        let mut req = self
            .client
            .post(&url)
            .timeout(inv.timeout)
            .header("X-Gitrama-Invocation", &inv.id)
            .json(&inv.params);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            let msg = if e.is_timeout() {
                format!(
                    "Request timed out after {}s: POST {url}",
                    inv.timeout.as_secs()
                )
            } else {
                format!("request to {url} failed: {e}")
            };
            ToolError::external(msg, None)
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::external(format!("reading response from {url}: {e}"), None))?;
        tracing::info!(
            id = %inv.id,
            tool = inv.tool,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "api call finished"
        );

        if status.is_success() {
            Ok(ToolOutput {
                stdout: body.trim().to_string(),
                stderr: String::new(),
                exit_code: None,
            })
        } else {
            Err(ToolError::external(
                error_message(status, &body),
                Some(i32::from(status.as_u16())),
            ))
        }
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

/// Prefer the API's `error`/`message` field, fall back to the raw body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    match from_json {
        Some(m) => m,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("HTTP {status}"),
    }
}
