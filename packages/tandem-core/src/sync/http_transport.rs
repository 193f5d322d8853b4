//! [`SessionTransport`] over the authority's HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ErrorBody, TandemError, TandemResult};
use crate::protocol_constants::HTTP_CLIENT_TIMEOUT_SECS;
use crate::session::{CommandRequest, SessionSnapshot};

use super::transport::SessionTransport;

#[derive(Deserialize)]
struct CountResponse {
    count: usize,
}

/// Talks to a remote session authority.
#[derive(Clone)]
pub struct HttpSessionTransport {
    client: Client,
    base_url: String,
}

impl HttpSessionTransport {
    /// Creates a transport for the authority at `base_url` (e.g. `http://host:49400`).
    pub fn new(base_url: &str) -> TandemResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| TandemError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Creates a transport sharing an existing client (connection pooling).
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, group_id: &str, action: &str) -> String {
        format!("{}/api/sessions/{}/{}", self.base_url, group_id, action)
    }
}

/// Decodes a success body, or rebuilds the authority's error.
async fn decode<T: DeserializeOwned>(response: Response) -> TandemResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let text = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(TandemError::from_body(body)),
        Err(_) => Err(TandemError::Network(format!(
            "HTTP {}: {}",
            status.as_u16(),
            text
        ))),
    }
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    async fn discover(&self) -> TandemResult<usize> {
        let response = self.client.get(self.url("/api/sessions/count")).send().await?;
        Ok(decode::<CountResponse>(response).await?.count)
    }

    async fn create(&self, member_id: &str) -> TandemResult<SessionSnapshot> {
        let response = self
            .client
            .post(self.url("/api/sessions"))
            .json(&json!({ "memberId": member_id }))
            .send()
            .await?;
        decode(response).await
    }

    async fn join(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot> {
        let response = self
            .client
            .post(self.session_url(group_id, "join"))
            .json(&json!({ "memberId": member_id }))
            .send()
            .await?;
        decode(response).await
    }

    async fn leave(&self, group_id: &str, member_id: &str) -> TandemResult<()> {
        let response = self
            .client
            .post(self.session_url(group_id, "leave"))
            .json(&json!({ "memberId": member_id }))
            .send()
            .await?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn fetch_snapshot(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot> {
        let url = Url::parse_with_params(
            &self.session_url(group_id, "snapshot"),
            &[("memberId", member_id)],
        )
        .map_err(|e| TandemError::InvalidRequest(format!("bad authority URL: {}", e)))?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    async fn submit(
        &self,
        group_id: &str,
        request: &CommandRequest,
    ) -> TandemResult<SessionSnapshot> {
        log::debug!(
            "[HttpTransport] {} -> {} (base v{:?})",
            request.command.name(),
            group_id,
            request.state_version
        );
        let response = self
            .client
            .post(self.session_url(group_id, "commands"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}
