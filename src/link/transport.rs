//! Transport worker: exclusive owner of one TCP socket.
//!
//! All socket I/O happens on a single spawned task fed by a command channel;
//! every command produces exactly one reply on the reply channel, in order.
//! No other code ever touches the stream, so reads and writes can never
//! interleave between callers.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::proto::{FRAME_PREFIX_SIZE, MAX_PACKET_SIZE};

/// Per-operation socket timeout, independent of the caller's reply bound.
const SOCKET_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// A queued operation for the worker.
pub(crate) enum TransportCommand {
    Connect { host: String, port: u16 },
    Send(Vec<u8>),
    Receive,
    Close,
}

/// The single reply each operation produces. `Success` carries data only
/// for `Receive`.
pub(crate) enum TransportReply {
    Success(Option<Vec<u8>>),
    Error(String),
}

/// Handle to a spawned transport worker.
pub(crate) struct TransportWorker {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
    reply_rx: mpsc::UnboundedReceiver<TransportReply>,
}

impl TransportWorker {
    /// Spawn a worker task with no connection yet.
    pub(crate) fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(cmd_rx, reply_tx));
        Self { cmd_tx, reply_rx }
    }

    /// Enqueue an operation. Fails only if the worker task is gone.
    pub(crate) fn submit(&self, command: TransportCommand) -> Result<(), ()> {
        self.cmd_tx.send(command).map_err(|_| ())
    }

    /// Next reply, in FIFO order. `None` once the worker has stopped.
    pub(crate) async fn next_reply(&mut self) -> Option<TransportReply> {
        self.reply_rx.recv().await
    }
}

async fn run_worker(
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    reply_tx: mpsc::UnboundedSender<TransportReply>,
) {
    let mut socket: Option<TcpStream> = None;

    while let Some(command) = cmd_rx.recv().await {
        let reply = match command {
            TransportCommand::Connect { host, port } => handle_connect(&mut socket, &host, port).await,
            TransportCommand::Send(bytes) => handle_send(&mut socket, &bytes).await,
            TransportCommand::Receive => handle_receive(&mut socket).await,
            TransportCommand::Close => handle_close(&mut socket).await,
        };
        if reply_tx.send(reply).is_err() {
            // Caller dropped its handle; nothing left to serve.
            break;
        }
    }
}

async fn handle_connect(socket: &mut Option<TcpStream>, host: &str, port: u16) -> TransportReply {
    let addr = format!("{host}:{port}");
    debug!("transport: connecting to {addr}");
    match timeout(SOCKET_OP_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => {
            *socket = Some(stream);
            TransportReply::Success(None)
        }
        Ok(Err(e)) => {
            error!("transport: connect to {addr} failed: {e}");
            TransportReply::Error(format!("connect to {addr} failed: {e}"))
        }
        Err(_) => TransportReply::Error(format!("connect to {addr} timed out")),
    }
}

async fn handle_send(socket: &mut Option<TcpStream>, bytes: &[u8]) -> TransportReply {
    let Some(stream) = socket.as_mut() else {
        return TransportReply::Error("not connected".to_string());
    };
    match timeout(SOCKET_OP_TIMEOUT, stream.write_all(bytes)).await {
        Ok(Ok(())) => TransportReply::Success(None),
        Ok(Err(e)) => TransportReply::Error(format!("send failed: {e}")),
        Err(_) => TransportReply::Error("send timed out".to_string()),
    }
}

/// Read one whole packet: the 4-byte prefix declares the total length, the
/// rest follows however the stream fragments it.
async fn handle_receive(socket: &mut Option<TcpStream>) -> TransportReply {
    let Some(stream) = socket.as_mut() else {
        return TransportReply::Error("not connected".to_string());
    };

    let mut message = vec![0u8; FRAME_PREFIX_SIZE];
    match read_exact_bounded(stream, &mut message).await {
        Ok(()) => {}
        Err(e) => return e,
    }

    let total = usize::from(u16::from_be_bytes([message[2], message[3]]));
    if total < FRAME_PREFIX_SIZE || total > MAX_PACKET_SIZE {
        return TransportReply::Error(format!("implausible packet length {total}"));
    }

    message.resize(total, 0);
    match read_exact_bounded(stream, &mut message[FRAME_PREFIX_SIZE..]).await {
        Ok(()) => TransportReply::Success(Some(message)),
        Err(e) => e,
    }
}

async fn read_exact_bounded(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), TransportReply> {
    match timeout(SOCKET_OP_TIMEOUT, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(TransportReply::Error("socket closed prematurely".to_string()))
        }
        Ok(Err(e)) => Err(TransportReply::Error(format!("receive failed: {e}"))),
        Err(_) => Err(TransportReply::Error("receive timed out".to_string())),
    }
}

async fn handle_close(socket: &mut Option<TcpStream>) -> TransportReply {
    if let Some(mut stream) = socket.take() {
        let _ = stream.shutdown().await;
    }
    TransportReply::Success(None)
}
