//! Two-stage payload unwrap: RSA-OAEP unwraps the per-message AES key,
//! then AES-CFB decrypts the envelope body.
//!
//! Payload sizes and counts are unbounded while asymmetric decryption is
//! expensive and size-limited, so each interaction arrives under a fresh
//! symmetric key that was wrapped exactly once.

use std::sync::Arc;

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::Decryptor;

use crate::crypto::KeyExchange;
use crate::error::{ClientError, Result};

/// Leading bytes of every envelope: the CFB initialization vector.
pub const IV_LENGTH: usize = 16;

/// Decrypts interaction envelopes with the session key pair.
#[derive(Clone)]
pub struct MessageDecryptor {
    keys: Arc<KeyExchange>,
}

impl MessageDecryptor {
    pub fn new(keys: Arc<KeyExchange>) -> Self {
        Self { keys }
    }

    /// Decrypts one interaction envelope.
    ///
    /// `wrapped_key` is the base64 RSA-wrapped AES key; `envelope` is base64
    /// `IV || ciphertext`. Returns the UTF-8 plaintext. An empty result is
    /// reported as `DecryptionFailed` because it is indistinguishable from a
    /// corrupt key or IV.
    pub fn decrypt(&self, wrapped_key: &str, envelope: &str) -> Result<String> {
        let wrapped = STANDARD.decode(wrapped_key)?;
        let aes_key = self.keys.decrypt(&wrapped)?;

        let blob = STANDARD.decode(envelope)?;
        if blob.len() <= IV_LENGTH {
            return Err(ClientError::DecryptionFailed(format!(
                "envelope too short: {} bytes",
                blob.len()
            )));
        }
        let (iv, ciphertext) = blob.split_at(IV_LENGTH);

        let mut plaintext = ciphertext.to_vec();
        cfb_decrypt(&aes_key, iv, &mut plaintext)?;

        let text = String::from_utf8(plaintext).map_err(|e| {
            ClientError::DecryptionFailed(format!("plaintext is not UTF-8: {}", e))
        })?;
        if text.is_empty() {
            return Err(ClientError::DecryptionFailed(
                "decryption produced an empty message".to_string(),
            ));
        }
        Ok(text)
    }
}

/// The unwrapped key's width selects the AES variant; any other width means
/// the asymmetric stage produced garbage.
fn cfb_decrypt(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    match key.len() {
        16 => Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|e| ClientError::DecryptionFailed(e.to_string()))?
            .decrypt(buf),
        24 => Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|e| ClientError::DecryptionFailed(e.to_string()))?
            .decrypt(buf),
        32 => Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|e| ClientError::DecryptionFailed(e.to_string()))?
            .decrypt(buf),
        other => {
            return Err(ClientError::DecryptionFailed(format!(
                "unsupported AES key length: {} bytes",
                other
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testutil::{seal_envelope, sealed_message, shared_keys, wrap_key};
    use rand::Rng;

    #[test]
    fn round_trips_for_arbitrary_ivs() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let message = r#"{"protocol":"dns","unique-id":"abc"}"#;

        for _ in 0..8 {
            let mut rng = rand::thread_rng();
            let aes_key: [u8; 32] = rng.gen();
            let iv: [u8; 16] = rng.gen();
            let wrapped = wrap_key(&keys, &aes_key);
            let envelope = seal_envelope(&aes_key, &iv, message.as_bytes());
            assert_eq!(decryptor.decrypt(&wrapped, &envelope).unwrap(), message);
        }
    }

    #[test]
    fn supports_all_three_key_widths() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let iv = [7u8; 16];

        for width in [16usize, 24, 32] {
            let aes_key = vec![42u8; width];
            let wrapped = wrap_key(&keys, &aes_key);
            // seal by hand per width
            let mut buf = b"hit".to_vec();
            match width {
                16 => cfb_mode::Encryptor::<Aes128>::new_from_slices(&aes_key, &iv)
                    .unwrap()
                    .encrypt(&mut buf),
                24 => cfb_mode::Encryptor::<Aes192>::new_from_slices(&aes_key, &iv)
                    .unwrap()
                    .encrypt(&mut buf),
                _ => cfb_mode::Encryptor::<Aes256>::new_from_slices(&aes_key, &iv)
                    .unwrap()
                    .encrypt(&mut buf),
            }
            let envelope = STANDARD.encode([iv.as_slice(), buf.as_slice()].concat());
            assert_eq!(decryptor.decrypt(&wrapped, &envelope).unwrap(), "hit");
        }
    }

    #[test]
    fn corrupt_wrapped_key_is_decryption_failed() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let (_, envelope) = sealed_message(&keys, "payload");

        let bogus = STANDARD.encode([1u8; 256]);
        let err = decryptor.decrypt(&bogus, &envelope).unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailed(_)));
    }

    #[test]
    fn unexpected_key_width_is_rejected() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let wrapped = wrap_key(&keys, &[9u8; 10]);
        let envelope = STANDARD.encode([0u8; 32]);
        let err = decryptor.decrypt(&wrapped, &envelope).unwrap_err();
        assert!(err.to_string().contains("unsupported AES key length"));
    }

    #[test]
    fn short_envelope_is_rejected() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let (wrapped, _) = sealed_message(&keys, "payload");

        let short = STANDARD.encode([0u8; IV_LENGTH]);
        let err = decryptor.decrypt(&wrapped, &short).unwrap_err();
        assert!(err.to_string().contains("envelope too short"));
    }

    #[test]
    fn empty_plaintext_is_ambiguous_and_fails() {
        // An envelope that decrypts to zero bytes must not surface as an
        // empty message.
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys.clone());
        let aes_key = [3u8; 32];
        let iv = [5u8; 16];
        let wrapped = wrap_key(&keys, &aes_key);
        // 17-byte blob: IV plus one ciphertext byte that decrypts to garbage
        // is the smallest accepted envelope; a 16-byte blob (IV only, empty
        // ciphertext) must be rejected outright.
        let envelope = seal_envelope(&aes_key, &iv, b"");
        let err = decryptor.decrypt(&wrapped, &envelope).unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailed(_)));
    }

    #[test]
    fn invalid_base64_is_decryption_failed() {
        let keys = shared_keys();
        let decryptor = MessageDecryptor::new(keys);
        let err = decryptor.decrypt("%%%", "also not base64").unwrap_err();
        assert!(matches!(err, ClientError::DecryptionFailed(_)));
    }
}
