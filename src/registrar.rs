//! The register/poll/deregister exchanges for one session.
//!
//! All three calls share the injected transport and carry the bearer token
//! when one is configured. Exact JSON field names are wire contract; the
//! server validates the public key PEM structurally, so it is sent with its
//! internal newlines intact.

use std::sync::Arc;

use log::{debug, info};
use serde_json::json;

use crate::error::{ClientError, Result};
use crate::session::PollResponse;
use crate::transport::HttpTransport;

#[derive(Clone)]
pub struct SessionRegistrar {
    transport: Arc<dyn HttpTransport>,
    server_url: String,
    token: Option<String>,
}

impl SessionRegistrar {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        server_url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            server_url,
            token,
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        match &self.token {
            Some(token) => vec![("Authorization".to_string(), token.clone())],
            None => Vec::new(),
        }
    }

    /// Registers the session. Success is exactly HTTP 200; registering the
    /// same correlation ID twice is a server-side concern and comes back as
    /// whatever status the server chooses.
    pub async fn register(
        &self,
        public_key_pem: &str,
        secret_key: &str,
        correlation_id: &str,
    ) -> Result<()> {
        let url = format!("{}/register", self.server_url);
        let body = json!({
            "public-key": public_key_pem,
            "secret-key": secret_key,
            "correlation-id": correlation_id,
        })
        .to_string();

        debug!("registering correlation id {} at {}", correlation_id, url);
        let response = self.transport.post(&url, body, &self.headers()).await?;
        if response.status != 200 {
            return Err(ClientError::RegistrationFailed {
                status: response.status,
            });
        }
        info!("registered correlation id {}", correlation_id);
        Ok(())
    }

    /// One poll call; returns the recorded envelopes and the session's
    /// wrapped AES key (which the server may rotate between calls).
    pub async fn poll(&self, correlation_id: &str, secret_key: &str) -> Result<PollResponse> {
        let url = format!(
            "{}/poll?id={}&secret={}",
            self.server_url, correlation_id, secret_key
        );
        let response = self.transport.get(&url, &self.headers()).await?;
        if response.status != 200 {
            return Err(ClientError::TransportError(format!(
                "poll returned status {}",
                response.status
            )));
        }
        let parsed: PollResponse = serde_json::from_str(&response.body)?;
        debug!(
            "poll for {} returned {} record(s)",
            correlation_id,
            parsed.data.len()
        );
        Ok(parsed)
    }

    /// Tears down the server-side registration. Best-effort: callers surface
    /// the error but never block session teardown on it.
    pub async fn deregister(&self, correlation_id: &str, secret_key: &str) -> Result<()> {
        let url = format!("{}/deregister", self.server_url);
        let body = json!({
            "correlationID": correlation_id,
            "secretKey": secret_key,
        })
        .to_string();

        let response = self.transport.post(&url, body, &self.headers()).await?;
        if response.status != 200 {
            return Err(ClientError::TransportError(format!(
                "deregister returned status {}",
                response.status
            )));
        }
        info!("deregistered correlation id {}", correlation_id);
        Ok(())
    }
}
