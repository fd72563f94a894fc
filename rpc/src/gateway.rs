//! The gateway makes the transport look reliable to callers.
//!
//! Every call races the session's request against the caller's timeout and
//! applies a one-shot recovery policy: on a transport fault (channel closed
//! or timeout) it re-initializes the session once and re-issues the call.
//! The bound is structural — a counted loop, not a retry flag — so a
//! persistently broken CLI costs each caller at most one respawn attempt.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RpcError;
use crate::session::RpcSession;

/// Per-call budget when the caller does not specify one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Total attempts per call: the original try plus one post-recovery retry.
const MAX_ATTEMPTS: u32 = 2;

pub struct RequestGateway {
    session: Arc<RpcSession>,
}

impl RequestGateway {
    #[must_use]
    pub fn new(session: Arc<RpcSession>) -> Self {
        Self { session }
    }

    /// `call` with the default 60s budget.
    pub async fn call(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        self.call_with_timeout(method, params, DEFAULT_CALL_TIMEOUT)
            .await
    }

    /// Issue one request, recovering the transport at most once.
    ///
    /// Remote errors are never retried; a second-attempt transport fault is
    /// surfaced as-is (`Timeout` stays `Timeout`, closure stays
    /// `ChannelClosed`). A failed recovery (spawn or handshake error)
    /// surfaces immediately.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        budget: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let mut outcome = Err(RpcError::NotInitialized);
        for attempt in 0..MAX_ATTEMPTS {
            let Some(epoch) = self.session.current_epoch().await else {
                return Err(RpcError::NotInitialized);
            };

            outcome = self
                .session
                .send_request(method, params.clone(), budget)
                .await;
            match &outcome {
                Err(e) if e.is_transport_fault() && attempt + 1 < MAX_ATTEMPTS => {
                    tracing::warn!(
                        method,
                        error = %e,
                        "transport fault, attempting one-shot recovery"
                    );
                    self.session.recover(epoch).await?;
                }
                _ => return outcome,
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::session::{HandshakeConfig, SessionState};
    use crate::testutil::{ScriptedLauncher, ServerMode, SharedLauncher};

    fn handshake_config() -> HandshakeConfig {
        let mut config = HandshakeConfig::new("vscode", "1.0.0", "tok");
        config.timeout = Duration::from_millis(300);
        config
    }

    async fn ready_gateway(
        modes: Vec<ServerMode>,
    ) -> (RequestGateway, Arc<RpcSession>, Arc<ScriptedLauncher>) {
        let launcher = Arc::new(ScriptedLauncher::new(modes));
        let session = Arc::new(RpcSession::new(
            handshake_config(),
            Box::new(SharedLauncher(launcher.clone())),
        ));
        session.init().await.unwrap();
        (RequestGateway::new(session.clone()), session, launcher)
    }

    #[tokio::test]
    async fn call_before_init_is_not_initialized() {
        let launcher = Arc::new(ScriptedLauncher::new(vec![]));
        let session = Arc::new(RpcSession::new(
            handshake_config(),
            Box::new(SharedLauncher(launcher.clone())),
        ));
        let gateway = RequestGateway::new(session);

        let err = gateway.call("auth/getUserInfo", None).await.unwrap_err();
        assert!(matches!(err, RpcError::NotInitialized));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn healthy_call_needs_no_recovery() {
        let (gateway, _session, launcher) = ready_gateway(vec![ServerMode::Responsive]).await;

        let value = gateway
            .call("component/getList", Some(serde_json::json!({"projectId": "p-1"})))
            .await
            .unwrap();
        assert_eq!(value["method"], "component/getList");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mid_flight_crash_recovers_once_and_retries() {
        // First server dies on the first real request; its replacement works.
        let (gateway, _session, launcher) =
            ready_gateway(vec![ServerMode::DieAfterHandshake, ServerMode::Responsive]).await;

        let value = gateway
            .call_with_timeout("auth/getUserInfo", None, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(value["method"], "auth/getUserInfo");
        // Exactly two launches total: initial + one respawn.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_triggers_recovery_then_succeeds() {
        let (gateway, _session, launcher) = ready_gateway(vec![
            ServerMode::MuteAfterHandshake,
            ServerMode::Responsive,
        ])
        .await;

        let value = gateway
            .call_with_timeout("build/getList", None, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(value["method"], "build/getList");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanently_broken_transport_fails_after_exactly_one_retry() {
        let (gateway, _session, launcher) = ready_gateway(vec![
            ServerMode::MuteAfterHandshake,
            ServerMode::MuteAfterHandshake,
        ])
        .await;

        let err = gateway
            .call_with_timeout("project/getProjects", None, Duration::from_millis(100))
            .await
            .unwrap_err();
        // Recurring timeout is reported as Timeout, not ChannelClosed.
        assert!(matches!(err, RpcError::Timeout { .. }));
        // Total attempts bounded at 2: initial launch + one respawn.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remote_errors_are_never_retried() {
        // The scripted Responsive server cannot produce remote errors, so
        // drive the classification path directly through the error type.
        let remote = RpcError::Remote(crate::frame::RemoteError {
            code: crate::frame::RemoteErrorCode::Forbidden,
            message: "nope".to_string(),
            data: None,
        });
        assert!(!remote.is_transport_fault());
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_respawn() {
        let (gateway, session, launcher) = ready_gateway(vec![
            ServerMode::MuteAfterHandshake,
            ServerMode::Responsive,
        ])
        .await;
        let gateway = Arc::new(gateway);

        let a = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .call_with_timeout("op/a", None, Duration::from_millis(150))
                    .await
            })
        };
        let b = {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                gateway
                    .call_with_timeout("op/b", None, Duration::from_millis(150))
                    .await
            })
        };

        // Both callers resolve one way or the other; none hang.
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        for outcome in [&ra, &rb] {
            match outcome {
                Ok(_) | Err(RpcError::ChannelClosed | RpcError::Timeout { .. }) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        // Both timeouts fell in the same fault window: one respawn total.
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn failed_recovery_surfaces_handshake_error() {
        // Replacement server never answers the handshake.
        let (gateway, session, launcher) = ready_gateway(vec![
            ServerMode::DieAfterHandshake,
            ServerMode::Mute,
        ])
        .await;

        let err = gateway
            .call_with_timeout("auth/getUserInfo", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Handshake(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_lost_requests_under_forced_disposal() {
        let (gateway, session, _launcher) =
            ready_gateway(vec![ServerMode::MuteAfterHandshake, ServerMode::Mute]).await;
        let gateway = Arc::new(gateway);

        let mut calls = Vec::new();
        for i in 0..8 {
            let gateway = gateway.clone();
            calls.push(tokio::spawn(async move {
                gateway
                    .call_with_timeout(&format!("op/{i}"), None, Duration::from_millis(200))
                    .await
            }));
        }
        // Let the requests register, then force the transport down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.shutdown().await;

        for call in calls {
            // Every invocation resolves with a value or an error; a hang
            // here fails the test by timeout.
            let _ = call.await.unwrap();
        }
    }
}
