//! Length-prefixed frame codec for the CLI's stdio protocol.
//!
//! The wire format is `Content-Length: N\r\n\r\n<N body bytes>` — the same
//! header framing vscode-jsonrpc uses, which is safe for payloads with
//! embedded newlines. The reader hands back raw body bytes; JSON parsing
//! happens in the channel so a malformed body can be dropped without
//! tearing the stream down.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single frame body (8 MiB). Large OpenAPI documents fit
/// comfortably; anything bigger is a protocol violation.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Stream-level framing failure. Any of these kills the channel.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("stream error while reading frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame header: {0}")]
    Header(String),
    #[error("frame body of {0} bytes exceeds the {MAX_BODY_BYTES} byte limit")]
    Oversized(usize),
}

/// Reads framed bodies from the server's stdout.
pub struct FrameReader<R> {
    input: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
        }
    }

    /// Read the next frame body. `Ok(None)` means the stream ended cleanly
    /// between frames; EOF inside a header block or body is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        let Some(body_len) = self.read_header_block().await? else {
            return Ok(None);
        };

        if body_len > MAX_BODY_BYTES {
            return Err(CodecError::Oversized(body_len));
        }

        let mut body = vec![0u8; body_len];
        self.input.read_exact(&mut body).await?;
        Ok(Some(body))
    }

    /// Consume header lines up to the blank separator and return the
    /// announced body length, or `None` on clean EOF before any header.
    async fn read_header_block(&mut self) -> Result<Option<usize>, CodecError> {
        let mut body_len: Option<usize> = None;
        let mut line = String::new();
        let mut started = false;

        loop {
            line.clear();
            let n = self.input.read_line(&mut line).await?;
            if n == 0 {
                if started {
                    // A truncated header block is never a clean shutdown,
                    // even if Content-Length was already seen.
                    return Err(CodecError::Header("EOF inside header block".to_string()));
                }
                return Ok(None);
            }
            started = true;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(CodecError::Header(format!("header without colon: {trimmed:?}")));
            };
            if name.eq_ignore_ascii_case("Content-Length") {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    CodecError::Header(format!("bad Content-Length value: {:?}", value.trim()))
                })?;
                body_len = Some(parsed);
            }
            // Other headers (Content-Type) are tolerated and ignored.
        }

        match body_len {
            Some(len) => Ok(Some(len)),
            None => Err(CodecError::Header("missing Content-Length".to_string())),
        }
    }
}

/// Writes framed bodies to the server's stdin.
pub struct FrameWriter<W> {
    output: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Frame and write one body, flushing so the server sees it promptly.
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<(), CodecError> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.output.write_all(header.as_bytes()).await?;
        self.output.write_all(body).await?;
        self.output.flush().await?;
        Ok(())
    }
}
