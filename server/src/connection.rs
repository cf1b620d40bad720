//! Per-connection framing, ordered outbound delivery, and liveness.
//!
//! Each accepted socket gets two tasks: a writer draining an outbound
//! frame queue (so game logic never blocks on socket I/O) and a reader
//! assembling delimiter-terminated frames into decoded messages. A write
//! failure or read EOF/error flips the shared liveness flag once; there
//! are no retries, and the owner learns about the death either through a
//! failed `send` or through the terminal `Disconnected` event.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use shared::{decode_frame, encode_frame, ClientMessage, ServerMessage, FRAME_DELIMITER};

/// Inbound activity surfaced to whichever task currently owns the
/// connection. `Disconnected` is terminal: once emitted, every later
/// `next_event` call repeats it.
#[derive(Debug)]
pub enum InboundEvent {
    Message(ClientMessage),
    Disconnected,
}

/// Error returned when a frame cannot be queued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection is closed")
    }
}

impl std::error::Error for SendError {}

/// Handle to one player's socket. Exclusively owned by at most one game
/// session at a time; otherwise by the matchmaking queue. Dropping the
/// handle closes the socket.
pub struct Connection {
    id: u64,
    alive: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Connection {
    /// Takes ownership of an accepted stream and spawns its reader and
    /// writer tasks. `liveness_timeout` bounds how long the reader waits
    /// for traffic before checking whether the connection already died;
    /// it is not a functional wait.
    pub fn spawn(stream: TcpStream, id: u64, liveness_timeout: Duration) -> Connection {
        let (read_half, write_half) = stream.into_split();
        let alive = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(id, write_half, outbound_rx, Arc::clone(&alive)));
        tokio::spawn(read_loop(
            id,
            read_half,
            inbound_tx,
            Arc::clone(&alive),
            liveness_timeout,
        ));

        Connection {
            id,
            alive,
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queues one message for exclusive, ordered transmission. Succeeds
    /// once the frame is accepted by the writer task; a connection that
    /// already died rejects the frame instead.
    pub fn send(&self, message: &ServerMessage) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError);
        }
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("connection {}: failed to encode outbound frame: {}", self.id, e);
                return Err(SendError);
            }
        };
        self.outbound.send(frame).map_err(|_| SendError)
    }

    /// Yields the next inbound event. The sequence is lazy and
    /// restartable; it ends with `Disconnected` and stays there.
    pub async fn next_event(&mut self) -> InboundEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => InboundEvent::Disconnected,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

async fn write_loop(
    id: u64,
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<String>,
    alive: Arc<AtomicBool>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_half.write_all(frame.as_bytes()).await {
            warn!("connection {}: write failed: {}", id, e);
            alive.store(false, Ordering::SeqCst);
            break;
        }
    }
    // Queue closed or the socket broke; either way this peer is done.
    let _ = write_half.shutdown().await;
}

async fn read_loop(
    id: u64,
    read_half: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<InboundEvent>,
    alive: Arc<AtomicBool>,
    liveness_timeout: Duration,
) {
    let mut reader = BufReader::new(read_half);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match timeout(liveness_timeout, reader.read_until(FRAME_DELIMITER, &mut buffer)).await {
            // Quiet peers are fine; a peer whose writer already failed is
            // not coming back.
            Err(_) => {
                if !alive.load(Ordering::SeqCst) {
                    break;
                }
            }
            Ok(Ok(0)) => {
                debug!("connection {}: peer closed the stream", id);
                break;
            }
            Ok(Ok(_)) => {
                let frame = String::from_utf8_lossy(&buffer);
                let frame = frame.trim();
                if frame.is_empty() {
                    continue;
                }
                match decode_frame::<ClientMessage>(frame) {
                    Ok(message) => {
                        if inbound.send(InboundEvent::Message(message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("connection {}: dropping malformed frame: {}", id, e),
                }
            }
            Ok(Err(e)) => {
                debug!("connection {}: read failed: {}", id, e);
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    let _ = inbound.send(InboundEvent::Disconnected);
}
