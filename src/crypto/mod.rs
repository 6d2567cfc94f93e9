//! Hybrid crypto for the session protocol: RSA-OAEP key exchange plus
//! AES-CFB payload decryption.

pub mod decryptor;
pub mod key_exchange;

pub use decryptor::MessageDecryptor;
pub use key_exchange::KeyExchange;
