//! Request and response types and the [`RoundTrip`] seam.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{TransportError, TransportResult};

/// HTTP method of a [`CallRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// An outbound request with an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CallRequest {
    /// Creates a request without headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds an `Authorization: Bearer` header.
    pub fn bearer_auth(self, token: impl fmt::Display) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> TransportResult<Self> {
        let body =
            serde_json::to_vec(value).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }
}

/// A response as received from the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl CallResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Performs one request/response exchange, without retries.
#[async_trait]
pub trait RoundTrip: Send + Sync + 'static {
    /// Sends `request` and returns whatever the upstream answered.
    ///
    /// Non-2xx statuses are responses, not errors.
    async fn round_trip(&self, request: &CallRequest) -> TransportResult<CallResponse>;
}

#[async_trait]
impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    async fn round_trip(&self, request: &CallRequest) -> TransportResult<CallResponse> {
        (**self).round_trip(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Login {
        user: String,
    }

    #[test]
    fn test_request_builder() {
        let req = CallRequest::post("http://parser/grades")
            .bearer_auth("t0k")
            .json(&Login {
                user: "alice".into(),
            })
            .unwrap();

        assert_eq!(req.method, Method::Post);
        assert_eq!(
            req.headers,
            vec![
                ("Authorization".to_string(), "Bearer t0k".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]
        );
        assert_eq!(req.body, br#"{"user":"alice"}"#);
    }

    #[test]
    fn test_response_helpers() {
        let resp = CallResponse::new(200, r#"{"user":"bob"}"#);
        assert!(resp.is_success());
        assert_eq!(
            resp.json::<Login>().unwrap(),
            Login {
                user: "bob".into()
            }
        );
        assert!(!CallResponse::new(400, "").is_success());
        assert_eq!(CallResponse::new(500, "oops").text(), "oops");
    }
}
