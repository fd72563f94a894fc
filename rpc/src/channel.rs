//! Framed request/response/notification channel over a duplex byte stream.
//!
//! A channel owns a reader task and a writer task. Requests are written in
//! the order [`MessageChannel::request`] is called; responses are matched to
//! pending slots purely by correlation id, so they may arrive in any order.
//! [`MessageChannel::dispose`] is idempotent and is the single place that
//! guarantees no pending request is ever silently dropped: every still-open
//! slot is rejected with [`RpcError::ChannelClosed`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::error::RpcError;
use crate::frame::{self, Incoming, Request};

const WRITER_QUEUE_CAPACITY: usize = 64;

/// Which way a traced frame was travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Observer mirror for every frame crossing the channel.
///
/// Implementations must return quickly and must not block: the sink is
/// invoked inline on the read and write paths and must not perturb frame
/// ordering.
pub trait TraceSink: Send + Sync {
    fn frame(&self, direction: Direction, frame: &serde_json::Value);
}

/// Default sink: mirrors frames into `tracing` at trace level.
#[derive(Debug, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn frame(&self, direction: Direction, frame: &serde_json::Value) {
        match direction {
            Direction::Outgoing => tracing::trace!(%frame, "rpc >"),
            Direction::Incoming => tracing::trace!(%frame, "rpc <"),
        }
    }
}

enum WriterCommand {
    Send(Vec<u8>),
    Shutdown,
}

type ResponseSlot = oneshot::Sender<Result<serde_json::Value, RpcError>>;

/// Correlation state. `closed` makes disposal idempotent; ids increase
/// monotonically for the lifetime of the channel and are never reused, so a
/// stale response from before a recovery cannot be misattributed.
struct PendingState {
    next_id: u64,
    slots: HashMap<u64, ResponseSlot>,
    closed: bool,
}

struct ChannelShared {
    pending: Mutex<PendingState>,
    writer_tx: mpsc::Sender<WriterCommand>,
    trace: Arc<dyn TraceSink>,
}

impl ChannelShared {
    /// Close the channel and reject everything still in flight. Safe to call
    /// from the reader task, the writer task, and the session concurrently;
    /// only the first caller does any work.
    async fn dispose(&self) {
        let drained = {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return;
            }
            pending.closed = true;
            pending.slots.drain().collect::<Vec<_>>()
        };

        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "rejecting in-flight requests on channel close");
        }
        for (_, slot) in drained {
            let _ = slot.send(Err(RpcError::ChannelClosed));
        }

        // Writer may already be gone; that is fine.
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
    }
}

/// A request that has been written to the wire and awaits its response.
pub(crate) struct PendingCall {
    pub id: u64,
    pub rx: oneshot::Receiver<Result<serde_json::Value, RpcError>>,
}

pub(crate) struct MessageChannel {
    epoch: u64,
    shared: Arc<ChannelShared>,
    #[allow(dead_code)]
    reader_task: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_task: tokio::task::JoinHandle<()>,
}

impl MessageChannel {
    /// Wire a channel over the server's stdout/stdin. Reading begins
    /// immediately on a background task; this never blocks.
    pub fn open<R, W>(reader: R, writer: W, epoch: u64, trace: Arc<dyn TraceSink>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_QUEUE_CAPACITY);

        let shared = Arc::new(ChannelShared {
            pending: Mutex::new(PendingState {
                next_id: 1,
                slots: HashMap::new(),
                closed: false,
            }),
            writer_tx,
            trace,
        });

        let writer_shared = shared.clone();
        let writer_task = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(body) => {
                        if let Err(e) = writer.write_frame(&body).await {
                            tracing::warn!(error = %e, "rpc write failed, closing channel");
                            writer_shared.dispose().await;
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let reader_shared = shared.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = FrameReader::new(reader);
            loop {
                match reader.read_frame().await {
                    Ok(Some(body)) => Self::handle_body(&reader_shared, &body).await,
                    Ok(None) => {
                        tracing::info!("rpc server closed its output stream");
                        reader_shared.dispose().await;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "rpc read failed, closing channel");
                        reader_shared.dispose().await;
                        break;
                    }
                }
            }
        });

        Self {
            epoch,
            shared,
            reader_task,
            writer_task,
        }
    }

    /// Generation counter assigned by the session; used to ensure at most
    /// one recovery per fault window.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    async fn handle_body(shared: &ChannelShared, body: &[u8]) {
        // A body that is not valid JSON is dropped without killing the
        // channel; only stream-level failures are fatal.
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unparseable rpc frame");
                return;
            }
        };
        shared.trace.frame(Direction::Incoming, &value);

        let Some(incoming) = frame::classify(&value) else {
            tracing::debug!("dropping rpc frame with unrecognized shape");
            return;
        };

        match incoming {
            Incoming::Response { id, result } => {
                let slot = shared.pending.lock().await.slots.remove(&id);
                match slot {
                    Some(slot) => {
                        let _ = slot.send(result.map_err(RpcError::Remote));
                    }
                    None => {
                        // Late reply to a timed-out call, or an id we never
                        // issued. Either way there is nobody to wake.
                        tracing::trace!(id, "discarding response with no pending request");
                    }
                }
            }
            Incoming::ServerRequest { id, method } => {
                tracing::debug!(%method, "rejecting server-initiated request");
                let reply = frame::method_not_found(&id, &method);
                shared.trace.frame(Direction::Outgoing, &reply);
                if let Ok(body) = serde_json::to_vec(&reply) {
                    let _ = shared.writer_tx.send(WriterCommand::Send(body)).await;
                }
            }
            Incoming::Notification { method, .. } => {
                tracing::debug!(%method, "rpc notification received");
            }
        }
    }

    /// Allocate a correlation id, enqueue the request frame, and hand back
    /// the slot the reader task will resolve.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<PendingCall, RpcError> {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut pending = self.shared.pending.lock().await;
            if pending.closed {
                return Err(RpcError::ChannelClosed);
            }
            let id = pending.next_id;
            pending.next_id += 1;
            pending.slots.insert(id, tx);
            id
        };

        let request = Request::new(id, method, params);
        let value = serde_json::to_value(&request).map_err(|e| {
            // Should only happen for non-string map keys; treat as closed
            // rather than poisoning the slot.
            tracing::warn!(error = %e, "failed to serialize rpc request");
            RpcError::ChannelClosed
        })?;
        self.shared.trace.frame(Direction::Outgoing, &value);

        let body = value.to_string().into_bytes();
        if self
            .shared
            .writer_tx
            .send(WriterCommand::Send(body))
            .await
            .is_err()
        {
            // Writer gone: drop the slot we just registered so the map does
            // not leak.
            self.shared.pending.lock().await.slots.remove(&id);
            return Err(RpcError::ChannelClosed);
        }

        Ok(PendingCall { id, rx })
    }

    /// Forget a pending request (after a caller-side timeout) so the late
    /// response, if it ever arrives, finds nothing to resolve.
    pub async fn discard(&self, id: u64) {
        self.shared.pending.lock().await.slots.remove(&id);
    }

    /// Idempotent close; rejects every pending request with `ChannelClosed`.
    pub async fn dispose(&self) {
        self.shared.dispose().await;
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        self.shared.pending.lock().await.closed
    }
}
