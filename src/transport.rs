//! Line-oriented transport over TCP or TLS.
//!
//! The stream is split into a buffered reader half (owned by the reader
//! task) and a writer half (owned by the connection loop's writer arm).
//! Inbound lines are length-bounded and rejected on embedded control
//! bytes, except `\x01` which CTCP framing legitimately uses.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{trace, warn};

/// Hard cap on one inbound line, well past anything a sane ircd emits.
pub const MAX_INBOUND_LINE: usize = 16 * 1024;

/// How much of a rejected line is kept for the log.
const PREVIEW_LEN: usize = 240;

/// Probe an idle connection after this long without traffic.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(180);
/// Spacing between unanswered keepalive probes.
const KEEPALIVE_PROBE_GAP: Duration = Duration::from_secs(45);

/// Errors surfaced by [`TransportReader::read_line`].
#[derive(Debug)]
pub enum TransportReadError {
    Io(io::Error),
    LineTooLong { preview: String },
    IllegalControlChar { ch: char, preview: String },
}

impl From<io::Error> for TransportReadError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Read half of a connection.
pub enum TransportReader {
    Tcp(BufReader<tokio::net::tcp::OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Write half of a connection.
pub enum TransportWriter {
    Tcp(tokio::net::tcp::OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

/// Split a plain TCP stream, tuning the socket first.
pub fn split_tcp(stream: TcpStream) -> (TransportReader, TransportWriter) {
    tune_socket(&stream);
    let (read, write) = stream.into_split();
    (
        TransportReader::Tcp(BufReader::new(read)),
        TransportWriter::Tcp(write),
    )
}

/// Split a TLS client stream.
pub fn split_tls(stream: TlsStream<TcpStream>) -> (TransportReader, TransportWriter) {
    tune_socket(stream.get_ref().0);
    let (read, write) = tokio::io::split(stream);
    (
        TransportReader::Tls(BufReader::new(read)),
        TransportWriter::Tls(write),
    )
}

/// Enable keepalive so half-dead connections surface as read errors
/// instead of an eternally silent socket.
fn tune_socket(stream: &TcpStream) {
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_PROBE_GAP);
    if let Err(e) = socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        warn!("could not enable TCP keepalive: {}", e);
    }
}

impl TransportReader {
    /// Read one line, CRLF stripped. `Ok(None)` means the peer closed the
    /// connection.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportReadError> {
        match self {
            TransportReader::Tcp(reader) => next_line(reader).await,
            TransportReader::Tls(reader) => next_line(reader).await,
        }
    }
}

impl TransportWriter {
    /// Write one line, appending CRLF, and flush.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        trace!(target: "raw", ">>> {}", line);
        match self {
            TransportWriter::Tcp(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
                writer.flush().await
            }
            TransportWriter::Tls(writer) => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\r\n").await?;
                writer.flush().await
            }
        }
    }
}

/// Append to the line accumulator, capped at [`MAX_INBOUND_LINE`].
/// Returns false once bytes had to be thrown away.
fn accumulate(acc: &mut Vec<u8>, bytes: &[u8]) -> bool {
    let room = MAX_INBOUND_LINE.saturating_sub(acc.len());
    acc.extend_from_slice(&bytes[..bytes.len().min(room)]);
    bytes.len() <= room
}

fn preview_of(acc: &[u8]) -> String {
    String::from_utf8_lossy(&acc[..acc.len().min(PREVIEW_LEN)]).into_owned()
}

/// Pull the next `\n`-terminated line out of the buffered reader.
///
/// The accumulator is capped: an overlong line is still consumed up to
/// its newline (so the stream stays in sync) but reported as an error
/// carrying a preview of what arrived.
async fn next_line<R>(reader: &mut BufReader<R>) -> Result<Option<String>, TransportReadError>
where
    R: AsyncRead + Unpin,
{
    let mut acc: Vec<u8> = Vec::with_capacity(512);
    let mut complete = true;

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            // EOF between lines is a clean close; mid-line we still hand
            // over what we have.
            if acc.is_empty() && complete {
                return Ok(None);
            }
            break;
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(newline) => {
                complete &= accumulate(&mut acc, &chunk[..newline]);
                reader.consume(newline + 1);
                break;
            }
            None => {
                complete &= accumulate(&mut acc, chunk);
                let eaten = chunk.len();
                reader.consume(eaten);
            }
        }
    }

    if acc.last() == Some(&b'\r') {
        acc.pop();
    }

    if !complete {
        warn!(
            limit = MAX_INBOUND_LINE,
            "dropping inbound line over the length cap"
        );
        return Err(TransportReadError::LineTooLong {
            preview: preview_of(&acc),
        });
    }

    // Reject NUL and other control bytes at the byte level; 0x01 passes
    // so CTCP frames survive.
    if let Some(&bad) = acc.iter().find(|&&b| b == 0x7f || (b < 0x20 && b != 0x01)) {
        return Err(TransportReadError::IllegalControlChar {
            ch: bad as char,
            preview: preview_of(&acc),
        });
    }

    Ok(Some(String::from_utf8_lossy(&acc).into_owned()))
}
