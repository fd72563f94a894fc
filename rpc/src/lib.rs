//! CLI-backed JSON-RPC transport for the Nimbus IDE extension.
//!
//! Spawns the platform CLI's stdio RPC server, frames requests and
//! responses over its standard streams, and recovers the transport once per
//! fault so callers see a reliable `call(method, params, timeout)` surface.

pub mod codec;
pub mod error;
pub mod frame;

pub(crate) mod channel;

mod gateway;
mod session;
mod supervisor;

#[cfg(test)]
pub(crate) mod testutil;

pub use channel::{Direction, LogTrace, TraceSink};
pub use error::RpcError;
pub use frame::{RemoteError, RemoteErrorCode};
pub use gateway::{DEFAULT_CALL_TIMEOUT, RequestGateway};
pub use session::{
    CliLauncher, HandshakeConfig, LaunchFuture, RpcSession, ServerIo, ServerLauncher, SessionState,
};
pub use supervisor::{CliConfig, ProcessHandle, ServerProcess, SpawnedServer};
