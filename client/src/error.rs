use thiserror::Error;

use nimbus_rpc::RpcError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or remote failure, passed through from the gateway.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The server answered, but the payload did not match the expected
    /// shape. A facade bug or a server/client version skew, never a
    /// transport fault.
    #[error("failed to decode response of '{method}': {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The remote error code, when the failure was a structured server
    /// error. Callers use this to react to auth codes.
    #[must_use]
    pub fn remote_code(&self) -> Option<nimbus_rpc::RemoteErrorCode> {
        match self {
            Self::Rpc(RpcError::Remote(e)) => Some(e.code),
            _ => None,
        }
    }
}
