//! Scripted in-memory servers for session and gateway tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::{FrameReader, FrameWriter};
use crate::session::{LaunchFuture, ServerIo, ServerLauncher};

/// How a scripted server behaves after accepting the connection.
#[derive(Debug, Clone, Copy)]
pub enum ServerMode {
    /// Answers every request with `{"method": <method>}`.
    Responsive,
    /// Reads frames but never answers anything, handshake included.
    Mute,
    /// Answers the handshake, then goes silent while keeping the stream open.
    MuteAfterHandshake,
    /// Answers the handshake, then drops the stream on the next request,
    /// simulating a mid-flight crash.
    DieAfterHandshake,
}

type SeenRequests = Arc<Mutex<Vec<(String, Option<serde_json::Value>)>>>;

/// Launcher that plays one scripted server per launch. Once the script is
/// exhausted, further launches are `Responsive`.
pub struct ScriptedLauncher {
    modes: Mutex<VecDeque<ServerMode>>,
    pub launches: AtomicUsize,
    seen: SeenRequests,
}

impl ScriptedLauncher {
    pub fn new(modes: Vec<ServerMode>) -> Self {
        Self {
            modes: Mutex::new(modes.into_iter().collect()),
            launches: AtomicUsize::new(0),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Methods of every request any scripted server received, in order.
    pub fn seen_methods(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Params of the most recent `initialize` request.
    pub fn last_initialize_params(&self) -> Option<serde_json::Value> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m == "initialize")
            .and_then(|(_, p)| p.clone())
    }

    fn next_mode(&self) -> ServerMode {
        self.modes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ServerMode::Responsive)
    }
}

impl ServerLauncher for ScriptedLauncher {
    fn launch(&self) -> LaunchFuture<'_> {
        let mode = self.next_mode();
        self.launches.fetch_add(1, Ordering::SeqCst);
        let seen = self.seen.clone();
        Box::pin(async move {
            let (near, far) = tokio::io::duplex(64 * 1024);
            tokio::spawn(run_server(far, mode, seen));
            let (reader, writer) = tokio::io::split(near);
            Ok(ServerIo {
                reader: Box::new(reader),
                writer: Box::new(writer),
                process: None,
            })
        })
    }
}

/// `Box<dyn ServerLauncher>` wrapper that lets the test keep a handle to the
/// launcher for assertions.
pub struct SharedLauncher(pub Arc<ScriptedLauncher>);

impl ServerLauncher for SharedLauncher {
    fn launch(&self) -> LaunchFuture<'_> {
        self.0.launch()
    }
}

async fn run_server(stream: tokio::io::DuplexStream, mode: ServerMode, seen: SeenRequests) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);
    let mut answered_handshake = false;

    while let Ok(Some(body)) = reader.read_frame().await {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
            continue;
        };
        let method = value["method"].as_str().unwrap_or("").to_string();
        seen.lock()
            .unwrap()
            .push((method.clone(), value.get("params").cloned()));

        let Some(id) = value.get("id") else { continue };

        let answer = match mode {
            ServerMode::Responsive => true,
            ServerMode::Mute => false,
            ServerMode::MuteAfterHandshake => !answered_handshake,
            ServerMode::DieAfterHandshake => {
                if answered_handshake {
                    // Crash: drop both stream halves mid-flight.
                    return;
                }
                true
            }
        };
        if !answer {
            continue;
        }

        let reply = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"method": method}
        });
        if writer
            .write_frame(reply.to_string().as_bytes())
            .await
            .is_err()
        {
            return;
        }
        answered_handshake = true;
    }
}
