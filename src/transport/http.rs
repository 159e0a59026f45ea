//! HTTP pull transport backed by the dashboard REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::Endpoints;
use crate::errors::TransportError;
use crate::transport::PullTransport;
use crate::types::StatusPayload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpPullTransport {
    client: Client,
    endpoints: Endpoints,
}

impl HttpPullTransport {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    /// Use a preconfigured client (proxies, custom TLS).
    pub fn with_client(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl PullTransport for HttpPullTransport {
    async fn fetch_status(
        &self,
        entity_id: &str,
        token: &str,
    ) -> Result<StatusPayload, TransportError> {
        let url = self.endpoints.status_url(entity_id);
        debug!(%url, "Fetching bot status");

        let response = self
            .client
            .get(url.as_str())
            .bearer_auth(token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized);
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
            });
        }

        let payload = response
            .json::<StatusPayload>()
            .await
            .map_err(TransportError::from)?;
        Ok(payload)
    }
}
