//! Remote sync endpoint.
//!
//! The server side is opaque: it accepts a JSON snapshot and answers with a
//! status. Any 2xx is success. Other statuses become
//! [`FormError::SyncRejected`] with the body kept for display, transport
//! failures become [`FormError::Network`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::shared::error::{FormError, FormResult};
use crate::shared::record::RecordKey;

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Where synced snapshots go
#[async_trait]
pub trait SyncEndpoint: Send + Sync + std::fmt::Debug {
    /// Push one snapshot; `Ok` only when the server accepted it
    async fn push(&self, key: &RecordKey, payload: &Value) -> FormResult<()>;
}

/// `POST <url>` with the snapshot as the JSON body
#[derive(Debug, Clone)]
pub struct HttpSyncEndpoint {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpSyncEndpoint {
    pub fn new(url: impl Into<String>) -> FormResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every push
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SyncEndpoint for HttpSyncEndpoint {
    async fn push(&self, key: &RecordKey, payload: &Value) -> FormResult<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("X-Form-Id", &key.form_id)
            .json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FormError::network(format!("Network error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(FormError::SyncRejected {
            status: status.as_u16(),
            body,
        })
    }
}
