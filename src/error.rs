//! Typed error surface for the client.
//!
//! One enum covers the whole crate so callers can match on failure classes
//! instead of string-scraping. Conversions from the underlying transport and
//! serialization errors keep `?` usable throughout.

use std::fmt;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone)]
pub enum ClientError {
    /// The cryptographic provider (system RNG) could not be reached.
    CryptoUnavailable(String),

    /// Key-pair generation or encoding failed.
    KeyGenerationFailed(String),

    /// The server answered `/register` with a non-200 status.
    RegistrationFailed { status: u16 },

    /// Network-level failure: connect error, timeout, or an unexpected
    /// status on poll/deregister. Never fatal to a running poll loop.
    TransportError(String),

    /// Asymmetric unwrap or symmetric decryption of a payload failed.
    DecryptionFailed(String),

    /// An operation that needs a correlation identity ran before one existed.
    NotRegistered,

    /// A lifecycle operation was attempted from a state that forbids it.
    /// This is a programmer error, surfaced synchronously.
    InvalidState {
        current: SessionState,
        attempted: &'static str,
    },

    /// The server returned a body the client could not parse.
    Serialization(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::CryptoUnavailable(msg) => {
                write!(f, "crypto provider unavailable: {}", msg)
            }
            ClientError::KeyGenerationFailed(msg) => {
                write!(f, "key generation failed: {}", msg)
            }
            ClientError::RegistrationFailed { status } => {
                write!(f, "registration rejected with status {}", status)
            }
            ClientError::TransportError(msg) => write!(f, "transport error: {}", msg),
            ClientError::DecryptionFailed(msg) => write!(f, "decryption failed: {}", msg),
            ClientError::NotRegistered => write!(f, "no correlation identity generated yet"),
            ClientError::InvalidState { current, attempted } => {
                write!(f, "cannot {} while session is {}", attempted, current)
            }
            ClientError::Serialization(msg) => write!(f, "malformed server response: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::TransportError(format!("request timed out: {}", err))
        } else {
            ClientError::TransportError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for ClientError {
    fn from(err: base64::DecodeError) -> Self {
        ClientError::DecryptionFailed(format!("invalid base64: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_failure_class() {
        let err = ClientError::RegistrationFailed { status: 403 };
        assert!(err.to_string().contains("403"));

        let err = ClientError::InvalidState {
            current: SessionState::Closed,
            attempted: "start",
        };
        assert_eq!(err.to_string(), "cannot start while session is closed");
    }

    #[test]
    fn serde_json_errors_map_to_serialization() {
        let bad: std::result::Result<crate::session::PollResponse, _> =
            serde_json::from_str("not json");
        let err: ClientError = bad.unwrap_err().into();
        assert!(matches!(err, ClientError::Serialization(_)));
    }

    #[test]
    fn base64_errors_map_to_decryption_failed() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let err: ClientError = STANDARD.decode("!!!").unwrap_err().into();
        assert!(matches!(err, ClientError::DecryptionFailed(_)));
    }
}
