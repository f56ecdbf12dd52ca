//! HTTP client for node management APIs.

use crate::{
    AgentRequest, AgentResponse, Node, SyncError, SyncResult,
    core::domain::model::agent_response::CODE_FAILURE,
};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{CONTENT_TYPE, HeaderValue},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transport settings for node calls.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentClientConfig {
    /// Upper bound for one request, connect included.
    pub request_timeout: Duration,
    /// Nodes are operator-controlled and commonly use self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
        }
    }
}

/// A single authenticated call to a node.
///
/// Implementations never fail: every problem is folded into the returned
/// envelope so that callers branch on `code` alone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn call(
        &self,
        node: &Node,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> AgentResponse;
}

/// `reqwest`-backed [`NodeApi`].
///
/// Adds the node's `apikey` header when one is configured and always sends
/// `Content-Type: application/json`. There are no retries at this layer.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http_client: Client,
}

impl AgentClient {
    /// Creates a new `AgentClient`.
    ///
    /// # Errors
    /// Returns `SyncError::Connection` if the HTTP client cannot be built.
    pub fn new(config: &AgentClientConfig) -> SyncResult<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        Ok(Self { http_client })
    }

    async fn execute_request(&self, node: &Node, request: AgentRequest) -> AgentResponse {
        let url = node.address.endpoint(&request.path, &request.query);

        let mut req_builder = self
            .http_client
            .request(request.method.clone(), url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &node.api_key {
            req_builder = req_builder.header("apikey", api_key.expose());
        }

        if let Some(body) = &request.body {
            req_builder = req_builder.json(body);
        }

        let response = match req_builder.send().await {
            Ok(response) => response,
            Err(e) => return AgentResponse::failure(format!("request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return AgentResponse::failure(format!("API error ({}): {}", status, error_text));
        }

        match response.json::<AgentResponse>().await {
            Ok(envelope) => envelope,
            Err(e) => AgentResponse {
                code: CODE_FAILURE,
                msg: format!("failed to parse response: {}", e),
                data: serde_json::Value::Null,
            },
        }
    }
}

#[async_trait]
impl NodeApi for AgentClient {
    async fn call(
        &self,
        node: &Node,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> AgentResponse {
        let path = request.path.clone();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => AgentResponse::cancelled(),
            response = self.execute_request(node, request) => response,
        };

        if !response.is_success() {
            tracing::debug!(
                node = %node.name,
                path = %path,
                code = response.code,
                msg = %response.msg,
                "node call did not succeed"
            );
        }
        response
    }
}
