//! Typed platform client over the `nimbus-rpc` transport.
//!
//! One method per platform operation; each serializes its params, rides
//! [`RequestGateway::call`](nimbus_rpc::RequestGateway), and decodes the
//! JSON envelope into `nimbus-types` records. The transport below stays
//! payload-agnostic; this crate is the only place wire JSON meets Rust
//! types.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use nimbus_client::PlatformClient;
//! use nimbus_rpc::{CliConfig, CliLauncher, HandshakeConfig, RequestGateway, RpcSession};
//!
//! let config: CliConfig = serde_json::from_str(r#"{
//!     "command": "nimbus-cli",
//!     "region": "US",
//!     "environment": "dev",
//!     "bootstrap_token": "tok"
//! }"#)?;
//! let session = Arc::new(RpcSession::new(
//!     HandshakeConfig::new("vscode", "1.0.0", "tok"),
//!     Box::new(CliLauncher::new(config)),
//! ));
//! session.init().await?;
//! let client = PlatformClient::new(Arc::new(RequestGateway::new(session)));
//! let user = client.get_user_info().await?;
//! println!("signed in as {}", user.display_name);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{PlatformClient, RepoAuthorization};
pub use error::ClientError;
