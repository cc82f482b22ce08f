//! [`RoundTrip`] over a `reqwest` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use tracing::trace;

use crate::call::{CallRequest, CallResponse, Method, RoundTrip};
use crate::error::{TransportError, TransportResult};

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Io(e.to_string())
    }
}

/// Sends requests through a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestRoundTrip {
    client: Client,
}

impl ReqwestRoundTrip {
    /// Builds a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { client })
    }

    /// Uses an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoundTrip for ReqwestRoundTrip {
    async fn round_trip(&self, request: &CallRequest) -> TransportResult<CallResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;

        trace!(method = %request.method, url = %request.url, status, len = body.len(), "Round trip");
        Ok(CallResponse::new(status, body.to_vec()))
    }
}
