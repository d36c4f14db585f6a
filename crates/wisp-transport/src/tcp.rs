//! TCP transport.
//!
//! A peer id is the `ip:port` of the peer's listening socket. Frames are a
//! 4-byte big-endian length followed by the payload. The first frame a dialer
//! sends is a hello carrying its own peer id, so the acceptor can attribute
//! the connection to the dialer's listening address rather than its ephemeral
//! source port.

use crate::transport::{Connection, FrameSink, Listener, Transport, TransportError, TransportResult};
use crate::{PeerId, MAX_FRAME_SIZE};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};

/// How long an accepted socket may take to present its hello frame
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted hello frame
const MAX_HELLO_SIZE: usize = 256;

/// TCP endpoint
#[derive(Debug)]
pub struct TcpTransport {
    bind_addr: SocketAddr,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Create a transport that will listen on `bind_addr` (port 0 picks a
    /// free port)
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            accept_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self) -> TransportResult<Listener> {
        let mut accept_task = self.accept_task.lock().await;
        if accept_task.is_some() {
            return Err(TransportError::BindFailed(format!(
                "already listening on {}",
                self.bind_addr
            )));
        }

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| TransportError::BindFailed(format!("{}: {e}", self.bind_addr)))?;
        let local = listener.local_addr()?.to_string();

        let (tx, incoming) = mpsc::unbounded_channel();
        *accept_task = Some(tokio::spawn(accept_loop(listener, tx)));

        tracing::info!("TCP transport listening on {}", local);

        Ok(Listener { local, incoming })
    }

    async fn dial(&self, local: &PeerId, remote: &PeerId) -> TransportResult<Connection> {
        let addr: SocketAddr = remote
            .parse()
            .map_err(|_| TransportError::PeerUnavailable(format!("{remote} is not a socket address")))?;

        let mut stream = TcpStream::connect(addr).await.map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
                TransportError::PeerUnavailable(format!("{remote}: {e}"))
            }
            _ => TransportError::ConnectionFailed(format!("{remote}: {e}")),
        })?;
        stream.set_nodelay(true)?;

        write_frame(&mut stream, local.as_bytes()).await?;

        tracing::debug!("TCP connection {} -> {}", local, remote);

        Ok(spawn_connection(stream, remote.clone()))
    }

    async fn shutdown(&self) {
        if let Some(task) = self.accept_task.lock().await.take() {
            task.abort();
            tracing::info!("TCP transport on {} shut down", self.bind_addr);
        }
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<Connection>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("TCP accept failed: {}", e);
                continue;
            }
        };

        let conn_tx = tx.clone();
        tokio::spawn(async move {
            match handshake(stream).await {
                Ok(conn) => {
                    tracing::debug!("Accepted TCP connection from {} ({})", conn.remote, addr);
                    if conn_tx.send(conn).is_err() {
                        tracing::debug!("Listener dropped, discarding connection from {}", addr);
                    }
                }
                Err(e) => tracing::warn!("Rejected TCP connection from {}: {}", addr, e),
            }
        });

        if tx.is_closed() {
            break;
        }
    }
}

async fn handshake(mut stream: TcpStream) -> TransportResult<Connection> {
    stream.set_nodelay(true)?;

    let hello = tokio::time::timeout(HELLO_TIMEOUT, read_frame(&mut stream, MAX_HELLO_SIZE))
        .await
        .map_err(|_| TransportError::Protocol("hello timed out".into()))??
        .ok_or_else(|| TransportError::Protocol("closed before hello".into()))?;

    let remote = String::from_utf8(hello)
        .map_err(|_| TransportError::Protocol("hello is not valid UTF-8".into()))?;

    Ok(spawn_connection(stream, remote))
}

fn spawn_connection(stream: TcpStream, remote: PeerId) -> Connection {
    let (mut reader, writer) = stream.into_split();
    let (tx, frames) = mpsc::unbounded_channel();

    let peer = remote.clone();
    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader, MAX_FRAME_SIZE).await {
                Ok(Some(frame)) => {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("TCP connection to {} closed by peer", peer);
                    break;
                }
                Err(e) => {
                    tracing::warn!("TCP read from {} failed: {}", peer, e);
                    break;
                }
            }
        }
    });

    Connection {
        remote,
        sink: Arc::new(TcpSink {
            writer: Mutex::new(Some(writer)),
            reader: reader_task.abort_handle(),
            closed: AtomicBool::new(false),
        }),
        frames,
    }
}

/// Outbound half of a TCP connection
struct TcpSink {
    writer: Mutex<Option<OwnedWriteHalf>>,
    reader: AbortHandle,
    closed: AtomicBool,
}

#[async_trait]
impl FrameSink for TcpSink {
    async fn send_frame(&self, frame: Vec<u8>) -> TransportResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;

        if let Err(e) = write_frame(writer, &frame).await {
            self.closed.store(true, Ordering::Release);
            guard.take();
            return Err(match e {
                TransportError::Io(_) => TransportError::Closed,
                other => other,
            });
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        // Ends our own inbound stream as well
        self.reader.abort();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Write one length-prefixed frame
async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame; `Ok(None)` on a clean EOF at a frame
/// boundary
async fn read_frame<R>(reader: &mut R, max: usize) -> TransportResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(TransportError::Protocol(format!(
                    "connection closed after {filled} of 4 length bytes"
                )));
            }
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max {
        return Err(TransportError::FrameTooLarge { size: len, max });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}
