//! Line-delimited operator channel reader.
//!
//! One request object per line. The reader trims carriage returns, skips
//! stray NUL bytes from serial coupling, drops empty lines, and caps lines
//! at [`MAX_LINE`] bytes (the rest of an oversize line is consumed and the
//! caller emits a `SERIAL_OVERFLOW` error line). If a line fails to parse,
//! the reader retries from the first `{` to shed leading noise; a line
//! that still fails is logged and dropped with no response.

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::request::OperatorRequest;

/// Maximum accepted line length in bytes.
pub const MAX_LINE: usize = 4096;

/// One reader event.
#[derive(Debug)]
pub enum ChannelOutcome {
    /// A parsed request, ready for dispatch.
    Request(OperatorRequest),
    /// A line exceeded [`MAX_LINE`]; the caller answers `SERIAL_OVERFLOW`.
    Overflow,
}

struct RawLine {
    bytes: Vec<u8>,
    oversize: bool,
}

/// Operator channel over any byte stream (serial port, stdin, a test
/// buffer).
pub struct OperatorChannel<R> {
    reader: BufReader<R>,
}

impl<R> OperatorChannel<R>
where
    R: AsyncRead + Unpin,
{
    /// Channel over `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader: BufReader::new(reader) }
    }

    /// Next actionable event. `None` on end of stream or a dead reader.
    pub async fn next(&mut self) -> Option<ChannelOutcome> {
        loop {
            let line = match self.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!(%err, "operator channel read failed");
                    return None;
                },
            };

            if line.oversize {
                warn!("operator line too long, dropping");
                return Some(ChannelOutcome::Overflow);
            }

            let trimmed = line.bytes.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_slice::<OperatorRequest>(trimmed) {
                Ok(request) => return Some(ChannelOutcome::Request(request)),
                Err(parse_err) => {
                    // Tolerate a little leading noise from serial coupling.
                    if let Some(brace) = trimmed.iter().position(|&b| b == b'{').filter(|&p| p > 0)
                        && let Ok(request) =
                            serde_json::from_slice::<OperatorRequest>(&trimmed[brace..])
                    {
                        debug!(stripped = brace, "recovered request after stripping noise");
                        return Some(ChannelOutcome::Request(request));
                    }
                    warn!(%parse_err, "unparseable operator line, dropping");
                },
            }
        }
    }

    /// Read up to the next newline, honoring the NUL/CR rules and the
    /// length cap. `None` at end of stream (a partial trailing line is
    /// discarded, as it was never terminated).
    async fn next_line(&mut self) -> std::io::Result<Option<RawLine>> {
        let mut bytes = Vec::new();
        let mut oversize = false;
        let mut byte = [0u8; 1];
        loop {
            if self.reader.read(&mut byte).await? == 0 {
                return Ok(None);
            }
            match byte[0] {
                b'\n' => return Ok(Some(RawLine { bytes, oversize })),
                0 | b'\r' => {},
                c if bytes.len() < MAX_LINE => bytes.push(c),
                _ => oversize = true,
            }
        }
    }
}
