//! Mock transport for testing
//!
//! Provides canned responses keyed by URL path for:
//! - Unit tests without network calls
//! - Adapter tests that inspect signed requests
//! - Dry runs of the aggregation pipeline

use super::{Transport, TransportRequest, TransportResponse};
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// In-memory transport with scripted responses
#[derive(Default)]
pub struct StubTransport {
    responses: HashMap<String, TransportResponse>,
    latency: Duration,
    failure: Option<TransportError>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to any URL ending with `path`
    pub fn with_response(mut self, path: &str, response: TransportResponse) -> Self {
        self.responses.insert(path.to_string(), response);
        self
    }

    pub fn with_json(self, path: &str, body: serde_json::Value) -> Self {
        self.with_response(path, TransportResponse::ok(body.to_string()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every request with the given error
    pub fn with_failure(mut self, error: TransportError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    fn lookup(&self, url: &str) -> Option<&TransportResponse> {
        self.responses
            .iter()
            .filter(|(path, _)| url.ends_with(path.as_str()))
            .max_by_key(|(path, _)| path.len())
            .map(|(_, resp)| resp)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send_request(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        Ok(self
            .lookup(&request.url)
            .cloned()
            .unwrap_or_else(|| TransportResponse::new(404, "not found")))
    }
}
