//! Injectable HTTP capability and the default reqwest-backed implementation.
//!
//! The client never talks to `reqwest` directly; everything goes through
//! [`HttpTransport`] so hosts can substitute their own stack (proxying,
//! instrumentation, tests). One transport instance is safely shared across
//! many sessions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::error::{ClientError, Result};

/// Minimal response view the session protocol needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP capability injected into the client.
///
/// Implementations must carry no per-session state; sessions own their
/// identifiers and keys, the transport only moves bytes.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse>;

    async fn post(&self, url: &str, body: String, headers: &[(String, String)])
        -> Result<HttpResponse>;
}

/// Default transport backed by a pooled `reqwest::Client` with a bounded
/// request timeout and JSON content negotiation.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| {
                ClientError::TransportError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/poll")
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .get(&format!("{}/poll", server.url()), &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"data":[]}"#);
    }

    #[tokio::test]
    async fn post_forwards_body_and_extra_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/register")
            .match_header("authorization", "tok-123")
            .match_body(r#"{"correlation-id":"abc"}"#)
            .with_status(200)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .post(
                &format!("{}/register", server.url()),
                r#"{"correlation-id":"abc"}"#.to_string(),
                &[("Authorization".to_string(), "tok-123".to_string())],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn non_success_statuses_are_returned_not_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/poll")
            .with_status(502)
            .create_async()
            .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .get(&format!("{}/poll", server.url()), &[])
            .await
            .unwrap();
        assert_eq!(response.status, 502);
    }
}
