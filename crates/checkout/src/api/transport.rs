//! HTTP transport seam.
//!
//! The pipeline talks to the network through the [`Transport`] trait so that
//! the single-flight refresh logic can be exercised against a scripted fake.
//! Production code uses [`ReqwestTransport`].

use std::future::Future;

use reqwest::{Method, StatusCode};
use thiserror::Error;

use crate::config::CommerceConfig;

/// Errors raised below the JSON:API layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The transport could not issue the request at all.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// An outbound HTTP request, fully assembled by the pipeline.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Header name/value pairs; names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// An HTTP response reduced to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Header name/value pairs; names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Look up a response header by (case-insensitive) name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Sends assembled HTTP requests.
pub trait Transport: Send + Sync {
    /// Send a request and collect the full response body.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        (**self).send(request)
    }
}

/// Production transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the configured timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(config: &CommerceConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        // Body is captured as text first so decode failures can be logged
        // with the offending payload.
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status: StatusCode::OK,
            headers: vec![("x-csrf-token".to_string(), "abc123".to_string())],
            body: String::new(),
        };
        assert_eq!(response.header("X-CSRF-Token"), Some("abc123"));
        assert_eq!(response.header("x-csrf-token"), Some("abc123"));
        assert_eq!(response.header("x-other"), None);
    }
}
