//! reqwest-backed transport

use super::{HttpMethod, Transport, TransportRequest, TransportResponse};
use crate::config::AggregatorSettings;
use crate::error::{AggregatorError, Result, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Pooled HTTP transport shared by all adapters.
///
/// Created explicitly before the first aggregation and released with
/// [`HttpTransport::close`]; requests after close fail with
/// [`TransportError::Closed`].
pub struct HttpTransport {
    http: RwLock<Option<Client>>,
}

impl HttpTransport {
    pub fn new(settings: &AggregatorSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| AggregatorError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http: RwLock::new(Some(http)),
        })
    }

    /// Drop the underlying connection pool
    pub fn close(&self) {
        if self.http.write().take().is_some() {
            debug!("HTTP transport closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.read().is_none()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_request(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        // Client is an Arc internally; clone it out so the lock is not held across await
        let http = self.http.read().clone().ok_or(TransportError::Closed)?;

        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        let mut builder = match request.method {
            HttpMethod::Get => http.get(url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();

        debug!("{} -> {} ({} bytes)", request.url, status, body.len());
        Ok(TransportResponse { status, body })
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.close();
    }
}
