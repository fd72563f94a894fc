//! Transport error taxonomy.
//!
//! The gateway's retry decision is structural: [`RpcError::is_transport_fault`]
//! is the single authority on what counts as a recoverable transport failure.
//! Remote (application-level) errors pass through untouched so callers can
//! classify them by [`RemoteErrorCode`](crate::frame::RemoteErrorCode).

use std::time::Duration;

use thiserror::Error;

use crate::frame::RemoteError;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The CLI executable could not be found or launched.
    #[error("failed to launch rpc server '{command}': {message}")]
    Spawn { command: String, message: String },

    /// The process started but the `initialize` exchange failed.
    #[error("rpc handshake failed: {0}")]
    Handshake(String),

    /// The transport died while the request was in flight.
    #[error("rpc channel closed")]
    ChannelClosed,

    /// No response arrived within the caller's budget.
    #[error("request '{method}' timed out after {budget:?}")]
    Timeout { method: String, budget: Duration },

    /// A structured error response from the server. Never retried.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// A call was made before any successful `init()`.
    #[error("rpc session is not initialized")]
    NotInitialized,
}

impl RpcError {
    /// Whether this failure means the channel itself is unusable and a
    /// one-shot re-init is worth attempting. Matches exactly the set of
    /// conditions the gateway recovers from: channel closure and timeout.
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Timeout { .. })
    }
}
