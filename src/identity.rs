//! Correlation identity: the public session identifier, the secret proving
//! ownership of it, and probe subdomain derivation.

use std::fmt;

use rand::Rng;

use crate::error::{ClientError, Result};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Identity a session registers with the collaborator server.
///
/// The correlation ID is a security boundary: anyone who can predict it can
/// read the session's interactions, so both strings come from a
/// cryptographically secure random source.
#[derive(Clone)]
pub struct CorrelationIdentity {
    server_host: String,
    correlation_id: Option<String>,
    secret_key: Option<String>,
}

impl CorrelationIdentity {
    /// An empty identity bound to a server host; call [`generate`] before
    /// deriving URLs.
    ///
    /// [`generate`]: CorrelationIdentity::generate
    pub fn new(server_host: impl Into<String>) -> Self {
        Self {
            server_host: server_host.into(),
            correlation_id: None,
            secret_key: None,
        }
    }

    /// Rebuilds an identity from persisted session parts (re-attachment).
    pub fn from_parts(
        server_host: impl Into<String>,
        correlation_id: String,
        secret_key: String,
    ) -> Self {
        Self {
            server_host: server_host.into(),
            correlation_id: Some(correlation_id),
            secret_key: Some(secret_key),
        }
    }

    /// Generates the correlation ID and secret key as fixed-length
    /// lowercase-alphanumeric strings.
    pub fn generate(&mut self, id_length: usize, secret_length: usize) {
        self.correlation_id = Some(random_lowercase_id(id_length));
        self.secret_key = Some(random_lowercase_id(secret_length));
    }

    pub fn correlation_id(&self) -> Result<&str> {
        self.correlation_id
            .as_deref()
            .ok_or(ClientError::NotRegistered)
    }

    pub fn secret_key(&self) -> Result<&str> {
        self.secret_key.as_deref().ok_or(ClientError::NotRegistered)
    }

    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    /// Derives a fresh probe subdomain `{correlationID}{nonce}.{serverHost}`.
    ///
    /// The nonce is regenerated per call, so concurrently outstanding probes
    /// stay distinguishable while the shared prefix correlates them back to
    /// this session.
    pub fn derive_url(&self, nonce_length: usize) -> Result<String> {
        let correlation_id = self.correlation_id()?;
        let nonce = random_lowercase_id(nonce_length);
        Ok(format!("{}{}.{}", correlation_id, nonce, self.server_host))
    }
}

impl fmt::Debug for CorrelationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationIdentity")
            .field("server_host", &self.server_host)
            .field("correlation_id", &self.correlation_id)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Fixed-length lowercase-alphanumeric string from the thread-local CSPRNG.
fn random_lowercase_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
