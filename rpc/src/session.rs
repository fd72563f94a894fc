//! The session owns the "one live transport" invariant.
//!
//! An [`RpcSession`] holds at most one supervised process / channel pair.
//! `init()` replaces the pair and performs the mandatory `initialize`
//! handshake; `recover()` is the epoch-guarded re-init the gateway uses so
//! that two simultaneous faults produce one respawn, not two. The session is
//! an explicitly constructed object shared via `Arc` by its owner — there is
//! no ambient singleton.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, watch};

use crate::channel::{LogTrace, MessageChannel, TraceSink};
use crate::error::RpcError;
use crate::supervisor::{CliConfig, ProcessHandle, ServerProcess};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the session sits in its lifecycle. Published over a watch channel;
/// observers always see the latest state, and every transition is observed
/// at least once by a subscriber that polls between transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Client identity sent in the `initialize` handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub client_name: String,
    pub client_version: String,
    pub bootstrap_token: String,
    pub timeout: Duration,
}

impl HandshakeConfig {
    #[must_use]
    pub fn new(
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        bootstrap_token: impl Into<String>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            client_version: client_version.into(),
            bootstrap_token: bootstrap_token.into(),
            timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

/// Streams (plus the process, when there is a real one) a launcher produced.
pub struct ServerIo {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub process: Option<ProcessHandle>,
}

pub type LaunchFuture<'a> = Pin<Box<dyn Future<Output = Result<ServerIo, RpcError>> + Send + 'a>>;

/// Seam between the session and process creation. Production uses
/// [`CliLauncher`]; tests inject in-memory transports.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self) -> LaunchFuture<'_>;
}

/// Launches the real CLI via the supervisor.
pub struct CliLauncher {
    config: CliConfig,
}

impl CliLauncher {
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }
}

impl ServerLauncher for CliLauncher {
    fn launch(&self) -> LaunchFuture<'_> {
        Box::pin(async move {
            let spawned = ServerProcess::spawn(&self.config)?;
            Ok(ServerIo {
                reader: Box::new(spawned.stdout),
                writer: Box::new(spawned.stdin),
                process: Some(spawned.handle),
            })
        })
    }
}

/// The current process/channel pair. All mutation happens under the
/// transport lock, which doubles as the single in-flight init guard.
struct Transport {
    channel: Option<Arc<MessageChannel>>,
    process: Option<ProcessHandle>,
    next_epoch: u64,
}

pub struct RpcSession {
    launcher: Box<dyn ServerLauncher>,
    handshake: HandshakeConfig,
    trace: Arc<dyn TraceSink>,
    transport: Mutex<Transport>,
    state_tx: watch::Sender<SessionState>,
}

impl RpcSession {
    #[must_use]
    pub fn new(handshake: HandshakeConfig, launcher: Box<dyn ServerLauncher>) -> Self {
        Self::with_trace(handshake, launcher, Arc::new(LogTrace))
    }

    #[must_use]
    pub fn with_trace(
        handshake: HandshakeConfig,
        launcher: Box<dyn ServerLauncher>,
        trace: Arc<dyn TraceSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Uninitialized);
        Self {
            launcher,
            handshake,
            trace,
            transport: Mutex::new(Transport {
                channel: None,
                process: None,
                next_epoch: 1,
            }),
            state_tx,
        }
    }

    /// Tear down any previous transport and establish a fresh one,
    /// handshake included. Serialized: concurrent callers queue on the
    /// transport lock and each sees a consistent pair.
    pub async fn init(&self) -> Result<(), RpcError> {
        let mut transport = self.transport.lock().await;
        self.init_locked(&mut transport).await
    }

    /// Epoch-guarded re-init. Re-establishes the transport only if the
    /// channel the caller saw fail is still the current one; a concurrent
    /// fault that already recovered makes this a no-op.
    pub async fn recover(&self, observed_epoch: u64) -> Result<(), RpcError> {
        let mut transport = self.transport.lock().await;
        if let Some(channel) = &transport.channel
            && channel.epoch() != observed_epoch
        {
            tracing::debug!(
                observed_epoch,
                current_epoch = channel.epoch(),
                "transport already recovered by a concurrent caller"
            );
            return Ok(());
        }
        self.init_locked(&mut transport).await
    }

    async fn init_locked(&self, transport: &mut Transport) -> Result<(), RpcError> {
        self.state_tx.send_replace(SessionState::Initializing);

        if let Some(old) = transport.channel.take() {
            old.dispose().await;
        }
        if let Some(old) = transport.process.take() {
            old.kill().await;
        }

        let result = self.establish(transport).await;
        match &result {
            Ok(()) => {
                self.state_tx.send_replace(SessionState::Ready);
                tracing::info!("rpc session ready");
            }
            Err(e) => {
                self.state_tx.send_replace(SessionState::Closed);
                tracing::warn!(error = %e, "rpc session init failed");
            }
        }
        result
    }

    async fn establish(&self, transport: &mut Transport) -> Result<(), RpcError> {
        let io = self.launcher.launch().await?;

        let epoch = transport.next_epoch;
        transport.next_epoch += 1;
        let channel = Arc::new(MessageChannel::open(
            io.reader,
            io.writer,
            epoch,
            self.trace.clone(),
        ));

        let handshake_result = Self::request_on(
            &channel,
            "initialize",
            Some(serde_json::json!({
                "clientName": self.handshake.client_name,
                "clientVersion": self.handshake.client_version,
                "bootstrapToken": self.handshake.bootstrap_token,
            })),
            self.handshake.timeout,
        )
        .await;

        match handshake_result {
            Ok(reply) => {
                tracing::debug!(%reply, "rpc handshake accepted");
                transport.channel = Some(channel);
                transport.process = io.process;
                Ok(())
            }
            Err(e) => {
                channel.dispose().await;
                if let Some(process) = io.process {
                    process.kill().await;
                }
                Err(RpcError::Handshake(e.to_string()))
            }
        }
    }

    /// Issue one request on the current channel under `budget`.
    /// Fails fast with `NotInitialized` before any successful `init()`.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        budget: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let channel = {
            let transport = self.transport.lock().await;
            transport
                .channel
                .clone()
                .ok_or(RpcError::NotInitialized)?
        };
        Self::request_on(&channel, method, params, budget).await
    }

    async fn request_on(
        channel: &MessageChannel,
        method: &str,
        params: Option<serde_json::Value>,
        budget: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let call = channel.request(method, params).await?;
        match tokio::time::timeout(budget, call.rx).await {
            Ok(Ok(result)) => result,
            // Slot dropped without a verdict; treat as closure.
            Ok(Err(_)) => Err(RpcError::ChannelClosed),
            Err(_) => {
                // Remove the slot so the late response, if any, is discarded.
                channel.discard(call.id).await;
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    budget,
                })
            }
        }
    }

    /// Epoch of the current channel, or `None` before init.
    pub async fn current_epoch(&self) -> Option<u64> {
        let transport = self.transport.lock().await;
        transport.channel.as_ref().map(|c| c.epoch())
    }

    /// True when a channel exists. Liveness is only proven by successful
    /// requests or the handshake, never by this flag.
    pub async fn is_initialized(&self) -> bool {
        self.transport.lock().await.channel.is_some()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Dispose the transport and mark the session closed.
    pub async fn shutdown(&self) {
        let mut transport = self.transport.lock().await;
        if let Some(channel) = transport.channel.take() {
            channel.dispose().await;
        }
        if let Some(process) = transport.process.take() {
            process.kill().await;
        }
        self.state_tx.send_replace(SessionState::Closed);
        tracing::info!("rpc session shut down");
    }
}
