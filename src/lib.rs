//! Client library for out-of-band interaction-detection servers.
//!
//! A session registers an RSA public key together with a generated
//! correlation identity, then polls the server on a fixed schedule for
//! encrypted interaction records and decrypts them locally. The server
//! never sees the private key; everything it stores is opaque to anyone
//! without it.
//!
//! ```no_run
//! use interact_client::{ClientOptions, InteractClient};
//!
//! #[tokio::main]
//! async fn main() -> interact_client::Result<()> {
//!     let client = InteractClient::builder(ClientOptions::new(), |interaction| {
//!         println!("got {:?} interaction", interaction.protocol);
//!     })
//!     .build()?;
//!
//!     client.start().await?;
//!     println!("probe URL: {}", client.derive_url()?);
//!     // ... wait for out-of-band traffic ...
//!     client.stop();
//!     client.close().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod registrar;
pub mod session;
pub mod transport;

pub use client::{InteractClient, InteractClientBuilder};
pub use config::ClientOptions;
pub use error::{ClientError, Result};
pub use session::{Interaction, SessionInfo, SessionState};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
