//! Client configuration surface.
//!
//! Every knob is optional: `ClientOptions::default()` talks to the public
//! collaborator host with the documented defaults. Setters consume and
//! return `self` so options read as a chain.

use std::sync::Arc;
use std::time::Duration;

use crate::session::SessionInfo;
use crate::transport::HttpTransport;

pub const DEFAULT_SERVER_URL: &str = "https://oast.pro";
pub const DEFAULT_CORRELATION_ID_LENGTH: usize = 20;
pub const DEFAULT_SECRET_KEY_LENGTH: usize = 36;
pub const DEFAULT_NONCE_LENGTH: usize = 13;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL of the collaborator server.
    pub server_url: String,
    /// Bearer token for the Authorization header; a uuid-v4 token is
    /// generated when absent.
    pub token: Option<String>,
    pub correlation_id_length: usize,
    pub secret_key_length: usize,
    /// Length of the per-call nonce appended to derived probe subdomains.
    pub correlation_id_nonce_length: usize,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    /// Injected HTTP capability; a [`crate::transport::ReqwestTransport`]
    /// is built when absent.
    pub transport: Option<Arc<dyn HttpTransport>>,
    /// Previously exported session to re-attach to instead of registering.
    pub session_info: Option<SessionInfo>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            correlation_id_length: DEFAULT_CORRELATION_ID_LENGTH,
            secret_key_length: DEFAULT_SECRET_KEY_LENGTH,
            correlation_id_nonce_length: DEFAULT_NONCE_LENGTH,
            poll_interval: DEFAULT_POLL_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            transport: None,
            session_info: None,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn set_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_correlation_id_length(mut self, length: usize) -> Self {
        self.correlation_id_length = length;
        self
    }

    pub fn set_secret_key_length(mut self, length: usize) -> Self {
        self.secret_key_length = length;
        self
    }

    pub fn set_nonce_length(mut self, length: usize) -> Self {
        self.correlation_id_nonce_length = length;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn set_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn set_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn set_session_info(mut self, session_info: SessionInfo) -> Self {
        self.session_info = Some(session_info);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let options = ClientOptions::default();
        assert_eq!(options.server_url, "https://oast.pro");
        assert_eq!(options.correlation_id_length, 20);
        assert_eq!(options.correlation_id_nonce_length, 13);
        assert_eq!(options.poll_interval, Duration::from_millis(5000));
        assert_eq!(options.http_timeout, Duration::from_secs(10));
        assert!(options.token.is_none());
        assert!(options.session_info.is_none());
    }

    #[test]
    fn setters_chain() {
        let options = ClientOptions::new()
            .set_server_url("https://x.test")
            .set_token("tok")
            .set_poll_interval(Duration::from_millis(100))
            .set_nonce_length(8);
        assert_eq!(options.server_url, "https://x.test");
        assert_eq!(options.token.as_deref(), Some("tok"));
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert_eq!(options.correlation_id_nonce_length, 8);
    }
}
