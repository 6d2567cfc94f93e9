//! The polling engine: lifecycle state machine, registration handshake and
//! the timer-driven poll loop.
//!
//! One `InteractClient` is one session. The surrounding host may run many
//! sessions concurrently; nothing here is shared module-level state, and the
//! transport is the only cross-session resource.

use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ClientOptions;
use crate::crypto::{KeyExchange, MessageDecryptor};
use crate::error::{ClientError, Result};
use crate::identity::CorrelationIdentity;
use crate::registrar::SessionRegistrar;
use crate::session::{Interaction, SessionInfo, SessionState};
use crate::transport::{HttpTransport, ReqwestTransport};

/// Required delivery callback; receives each decrypted interaction in
/// server order.
pub type InteractionCallback = Arc<dyn Fn(Interaction) + Send + Sync>;

/// Optional pre-delivery hook applied before the delivery callback.
pub type InteractionTransform = Arc<dyn Fn(Interaction) -> Interaction + Send + Sync>;

/// Optional observer fired on every lifecycle transition.
pub type StateListener = Arc<dyn Fn(SessionState) + Send + Sync>;

/// Client for an out-of-band interaction-detection server.
///
/// Lifecycle is `Idle -> Polling -> Idle -> Closed`, driven by [`start`],
/// [`stop`] and [`close`]; `Closed` is terminal.
///
/// [`start`]: InteractClient::start
/// [`stop`]: InteractClient::stop
/// [`close`]: InteractClient::close
#[derive(Clone)]
pub struct InteractClient {
    inner: Arc<Inner>,
}

pub struct InteractClientBuilder {
    options: ClientOptions,
    on_interaction: InteractionCallback,
    transform: Option<InteractionTransform>,
    on_state_change: Option<StateListener>,
}

struct Inner {
    options: ClientOptions,
    transport: Arc<dyn HttpTransport>,
    state: Mutex<SessionState>,
    session: Mutex<Option<Arc<Session>>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<CancellationToken>,
    /// Held for the duration of one poll cycle; guarantees at most one
    /// in-flight cycle per session.
    cycle_lock: AsyncMutex<()>,
    /// Serializes start/close so no interleaved registration or teardown
    /// can observe a half-built session.
    lifecycle: AsyncMutex<()>,
    on_interaction: InteractionCallback,
    transform: Option<InteractionTransform>,
    on_state_change: Option<StateListener>,
}

/// Everything owned by one registered session: keys, identity, registrar.
struct Session {
    identity: CorrelationIdentity,
    registrar: SessionRegistrar,
    decryptor: MessageDecryptor,
    info: SessionInfo,
}

impl InteractClient {
    pub fn builder<F>(options: ClientOptions, on_interaction: F) -> InteractClientBuilder
    where
        F: Fn(Interaction) + Send + Sync + 'static,
    {
        InteractClientBuilder {
            options,
            on_interaction: Arc::new(on_interaction),
            transform: None,
            on_state_change: None,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().unwrap()
    }

    /// Immutable snapshot of the registered session, if any. Suitable for
    /// persisting and later re-attaching via
    /// [`ClientOptions::set_session_info`].
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.inner
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.info.clone())
    }

    /// Fresh probe subdomain for this session; `NotRegistered` before the
    /// first successful start.
    pub fn derive_url(&self) -> Result<String> {
        let session = self
            .inner
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::NotRegistered)?;
        session
            .identity
            .derive_url(self.inner.options.correlation_id_nonce_length)
    }

    /// Generates or restores the session keys, registers with the server
    /// and enters `Polling` with the recurring schedule running.
    ///
    /// Fails without touching the state when registration does not succeed;
    /// there is no "registered but idle" half-state.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let current = self.state();
        if current != SessionState::Idle {
            return Err(ClientError::InvalidState {
                current,
                attempted: "start",
            });
        }

        let existing = self.inner.session.lock().unwrap().clone();
        let session = match existing {
            Some(session) => session,
            None => {
                let session = self.inner.establish().await?;
                *self.inner.session.lock().unwrap() = Some(session.clone());
                session
            }
        };

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().unwrap() = cancel.clone();
        self.inner.set_state(SessionState::Polling);

        let handle = tokio::spawn(Inner::poll_loop(self.inner.clone(), session, cancel));
        *self.inner.poll_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Runs exactly one poll cycle, serialized against the schedule.
    /// Returns the number of interactions delivered. Legal only while
    /// `Polling`; transport errors surface to the caller here instead of
    /// being swallowed by the loop.
    pub async fn poll_once(&self) -> Result<usize> {
        let current = self.state();
        if current != SessionState::Polling {
            return Err(ClientError::InvalidState {
                current,
                attempted: "poll",
            });
        }
        let session = self
            .inner
            .session
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::NotRegistered)?;

        let _cycle = self.inner.cycle_lock.lock().await;
        self.inner.poll_and_deliver(&session).await
    }

    /// Cancels the polling schedule and returns to `Idle`. No-op outside
    /// `Polling`. Guaranteed to prevent any scheduled-but-not-started cycle
    /// from running, and safe to call from inside the delivery callback.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state != SessionState::Polling {
            return;
        }
        self.inner.cancel.lock().unwrap().cancel();
        self.inner.poll_task.lock().unwrap().take();
        *state = SessionState::Idle;
        drop(state);

        self.inner.notify_state(SessionState::Idle);
        info!("polling stopped");
    }

    /// Deregisters (best-effort) and enters the terminal `Closed` state.
    ///
    /// Legal from `Idle` only; a polling session must be stopped first.
    /// A deregistration failure is returned so callers can surface it, but
    /// the session still ends up `Closed`.
    pub async fn close(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let current = self.state();
        match current {
            SessionState::Polling => {
                return Err(ClientError::InvalidState {
                    current,
                    attempted: "close",
                })
            }
            SessionState::Closed => return Ok(()),
            SessionState::Idle => {}
        }

        let session = self.inner.session.lock().unwrap().clone();
        let result = match session {
            Some(session) => {
                let correlation_id = session.identity.correlation_id()?;
                let secret_key = session.identity.secret_key()?;
                match session.registrar.deregister(correlation_id, secret_key).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!("deregistration failed: {}", e);
                        Err(e)
                    }
                }
            }
            None => Ok(()),
        };

        self.inner.set_state(SessionState::Closed);
        result
    }
}

impl InteractClientBuilder {
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Interaction) -> Interaction + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn on_state_change<F>(mut self, listener: F) -> Self
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(listener));
        self
    }

    pub fn build(self) -> Result<InteractClient> {
        let transport: Arc<dyn HttpTransport> = match self.options.transport.clone() {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.options.http_timeout)?),
        };
        Ok(InteractClient {
            inner: Arc::new(Inner {
                options: self.options,
                transport,
                state: Mutex::new(SessionState::Idle),
                session: Mutex::new(None),
                poll_task: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                cycle_lock: AsyncMutex::new(()),
                lifecycle: AsyncMutex::new(()),
                on_interaction: self.on_interaction,
                transform: self.transform,
                on_state_change: self.on_state_change,
            }),
        })
    }
}

impl Inner {
    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap() = next;
        self.notify_state(next);
    }

    fn notify_state(&self, state: SessionState) {
        if let Some(listener) = &self.on_state_change {
            listener(state);
        }
    }

    /// Builds the session: re-attach from persisted info when provided,
    /// otherwise generate keys and register.
    async fn establish(&self) -> Result<Arc<Session>> {
        if let Some(info) = self.options.session_info.clone() {
            let keys = Arc::new(KeyExchange::from_private_key_pem(&info.private_key)?);
            let host = server_host(&info.server_url)?;
            let identity = CorrelationIdentity::from_parts(
                host,
                info.correlation_id.clone(),
                info.secret_key.clone(),
            );
            let registrar = SessionRegistrar::new(
                self.transport.clone(),
                info.server_url.clone(),
                Some(info.token.clone()),
            );
            info!("re-attached to session {}", info.correlation_id);
            return Ok(Arc::new(Session {
                identity,
                registrar,
                decryptor: MessageDecryptor::new(keys),
                info,
            }));
        }

        let keys = tokio::task::spawn_blocking(KeyExchange::generate)
            .await
            .map_err(|e| {
                ClientError::KeyGenerationFailed(format!("key generation task failed: {}", e))
            })??;
        let keys = Arc::new(keys);

        let host = server_host(&self.options.server_url)?;
        let mut identity = CorrelationIdentity::new(host);
        identity.generate(
            self.options.correlation_id_length,
            self.options.secret_key_length,
        );

        let token = self
            .options
            .token
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let registrar = SessionRegistrar::new(
            self.transport.clone(),
            self.options.server_url.clone(),
            Some(token.clone()),
        );

        let public_key_pem = keys.public_key_pem()?;
        let correlation_id = identity.correlation_id()?.to_string();
        let secret_key = identity.secret_key()?.to_string();
        registrar
            .register(&public_key_pem, &secret_key, &correlation_id)
            .await?;

        let info = SessionInfo {
            server_url: self.options.server_url.clone(),
            token,
            correlation_id,
            secret_key,
            public_key: public_key_pem,
            private_key: keys.private_key_pem()?,
        };
        Ok(Arc::new(Session {
            identity,
            registrar,
            decryptor: MessageDecryptor::new(keys),
            info,
        }))
    }

    /// The recurring schedule. Ticks that land while a cycle (scheduled or
    /// manual) is still in flight are skipped, never queued, so cycle N's
    /// deliveries always complete before cycle N+1 begins.
    async fn poll_loop(inner: Arc<Inner>, session: Arc<Session>, cancel: CancellationToken) {
        let period = inner.options.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("polling loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match inner.cycle_lock.try_lock() {
                        Ok(_guard) => {
                            if let Err(e) = inner.poll_and_deliver(&session).await {
                                // never fatal; the loop continues at the
                                // next interval
                                error!("poll cycle failed: {}", e);
                            }
                        }
                        Err(_) => debug!("previous poll cycle still in flight, skipping tick"),
                    }
                }
            }
        }
    }

    /// One poll cycle: fetch the batch, decrypt each record, deliver in
    /// server order. A record that fails to decrypt is dropped with a
    /// warning; the rest of the batch is unaffected.
    async fn poll_and_deliver(&self, session: &Session) -> Result<usize> {
        let correlation_id = session.identity.correlation_id()?;
        let secret_key = session.identity.secret_key()?;
        let response = session.registrar.poll(correlation_id, secret_key).await?;
        if response.data.is_empty() {
            return Ok(0);
        }
        let aes_key = response.aes_key.as_deref().ok_or_else(|| {
            ClientError::DecryptionFailed("server returned data without an AES key".to_string())
        })?;

        let mut delivered = 0usize;
        for envelope in &response.data {
            match unwrap_record(&session.decryptor, aes_key, envelope) {
                Ok(interaction) => {
                    self.deliver(interaction);
                    delivered += 1;
                }
                Err(e) => warn!("dropping undecryptable interaction record: {}", e),
            }
        }
        debug!("poll cycle delivered {} interaction(s)", delivered);
        Ok(delivered)
    }

    fn deliver(&self, interaction: Interaction) {
        let interaction = match &self.transform {
            Some(transform) => transform(interaction),
            None => interaction,
        };
        (self.on_interaction)(interaction);
    }
}

fn unwrap_record(
    decryptor: &MessageDecryptor,
    aes_key: &str,
    envelope: &str,
) -> Result<Interaction> {
    let plaintext = decryptor.decrypt(aes_key, envelope)?;
    let interaction: Interaction = serde_json::from_str(&plaintext)?;
    Ok(interaction)
}

fn server_host(server_url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(server_url).map_err(|e| {
        ClientError::TransportError(format!("invalid server URL {}: {}", server_url, e))
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| ClientError::TransportError(format!("server URL {} has no host", server_url)))
}
