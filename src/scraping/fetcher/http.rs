//! HTTP seam
//!
//! The fetcher talks to the network through `HttpClient` so tests can
//! script responses. `ReqwestClient` is the production implementation.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::FetchConfig;

/// Network failure below the HTTP status layer
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Timeouts, resets, truncated bodies: worth retrying
    #[error("transient network error: {0}")]
    Transient(String),
    /// DNS, TLS, malformed requests, oversize bodies: never retried
    #[error("network error: {0}")]
    Fatal(String),
}

/// A completed HTTP exchange, whatever its status
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: Url,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("text/html")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Server-requested delay from `Retry-After`
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after").and_then(super::retry::parse_retry_after)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed client with a cookie jar and compressed transfer
pub struct ReqwestClient {
    client: reqwest::Client,
    max_content_size: usize,
}

impl ReqwestClient {
    pub fn new(config: &FetchConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.request_concurrency.max(1))
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| TransportError::Fatal(e.to_string()))?;

        Ok(Self {
            client,
            max_content_size: config.max_content_size,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_body() || e.is_decode() {
        return TransportError::Transient(e.to_string());
    }
    if e.is_connect() {
        // Resolver failures surface as connect errors; they will not heal on retry
        let message = format!("{:?}", e).to_lowercase();
        if message.contains("dns") || message.contains("resolve") || message.contains("certificate") {
            return TransportError::Fatal(e.to_string());
        }
        return TransportError::Transient(e.to_string());
    }
    if e.is_request() {
        return TransportError::Transient(e.to_string());
    }
    TransportError::Fatal(e.to_string())
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url.as_str());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        if let Some(len) = response.content_length() {
            if len as usize > self.max_content_size {
                return Err(TransportError::Fatal(format!("content too large: {} bytes", len)));
            }
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;
        if body.len() > self.max_content_size {
            return Err(TransportError::Fatal(format!(
                "content too large: {} bytes",
                body.len()
            )));
        }

        Ok(HttpResponse {
            status,
            final_url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status: 503,
            final_url: Url::parse("https://example.com/").unwrap(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = response(&[("Content-Type", "text/html; charset=utf-8"), ("Retry-After", "7")]);
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(resp.retry_after(), Some(Duration::from_secs(7)));
        assert!(!resp.is_success());
    }

    #[test]
    fn test_missing_content_type_defaults_to_html() {
        assert_eq!(response(&[]).content_type(), "text/html");
        assert_eq!(response(&[]).retry_after(), None);
    }
}
