//! Request/response session over a transport worker.
//!
//! All waits are bounded by an explicit timeout; the worker may still finish
//! an abandoned operation asynchronously, but the caller is released.

use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::transport::{TransportCommand, TransportReply, TransportWorker};
use crate::error::{Error, Result};
use crate::proto::{self, CommandPacket, Packet, ResponsePacket};

/// Default bound for a command/response exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected printer session: one exclusive TCP connection, strictly one
/// command/response pair in flight at a time.
pub struct PrinterSession {
    worker: TransportWorker,
}

impl PrinterSession {
    /// Connect to the printer and return a ready session.
    pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<Self> {
        let mut worker = TransportWorker::spawn();
        submit(
            &worker,
            TransportCommand::Connect {
                host: host.to_string(),
                port,
            },
        )?;
        match await_reply(&mut worker, limit).await? {
            TransportReply::Success(_) => {
                debug!("connected to {host}:{port}");
                Ok(Self { worker })
            }
            TransportReply::Error(msg) => Err(Error::Connect(msg)),
        }
    }

    /// Send one command packet and wait for the decoded response.
    ///
    /// Does not check that the response matches the command's type or
    /// session time; some flows reuse a session across different polls, so
    /// that correlation check belongs to the caller.
    pub async fn exchange(&mut self, command: &CommandPacket, limit: Duration) -> Result<ResponsePacket> {
        let bytes = command.encode();
        debug!("TX {} ({} bytes)", command.command(), bytes.len());
        submit(&self.worker, TransportCommand::Send(bytes))?;
        submit(&self.worker, TransportCommand::Receive)?;

        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::CommandTimedOut(limit));
            }
            match timeout(remaining, self.worker.next_reply()).await {
                Err(_) => return Err(Error::CommandTimedOut(limit)),
                Ok(None) => return Err(Error::connect("transport worker stopped")),
                // Send acknowledgement carries no data; keep waiting
                Ok(Some(TransportReply::Success(None))) => continue,
                Ok(Some(TransportReply::Success(Some(raw)))) => {
                    debug!("RX {} bytes", raw.len());
                    return decode_response(&raw);
                }
                Ok(Some(TransportReply::Error(msg))) => return Err(Error::Connect(msg)),
            }
        }
    }

    /// Close the connection and release the worker.
    pub async fn close(mut self, limit: Duration) -> Result<()> {
        submit(&self.worker, TransportCommand::Close)?;
        match await_reply(&mut self.worker, limit).await? {
            TransportReply::Success(_) => Ok(()),
            TransportReply::Error(msg) => Err(Error::Connect(msg)),
        }
    }
}

fn submit(worker: &TransportWorker, command: TransportCommand) -> Result<()> {
    worker
        .submit(command)
        .map_err(|()| Error::connect("transport worker stopped"))
}

async fn await_reply(worker: &mut TransportWorker, limit: Duration) -> Result<TransportReply> {
    match timeout(limit, worker.next_reply()).await {
        Err(_) => Err(Error::CommandTimedOut(limit)),
        Ok(None) => Err(Error::connect("transport worker stopped")),
        Ok(Some(reply)) => Ok(reply),
    }
}

fn decode_response(raw: &[u8]) -> Result<ResponsePacket> {
    match Packet::decode(raw) {
        Ok(Packet::Response(response)) => Ok(response),
        Ok(Packet::Command(_)) => Err(Error::protocol("peer sent a command packet, expected a response")),
        Err(e) => {
            warn!("undecodable response ({e}): {}", proto::hex_preview(raw));
            Err(Error::Packet(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{CommandPayload, DeviceStatus, ResponsePacket, ResponsePayload, ReturnCode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A peer that answers one exchange, delivering the response in small
    /// fragments so framing has to reassemble it.
    async fn fragmenting_peer(listener: TcpListener, response: Vec<u8>) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await.unwrap();
        let total = usize::from(u16::from_be_bytes([prefix[2], prefix[3]]));
        let mut rest = vec![0u8; total - 4];
        stream.read_exact(&mut rest).await.unwrap();

        for chunk in response.chunks(3) {
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_receive_reassembles_fragmented_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let response = ResponsePacket::new(
            77,
            DeviceStatus::new(ReturnCode::ReceivedFrame, 0, 2, 10),
            ResponsePayload::ModelName {
                model: "SP-2".to_string(),
            },
        );
        tokio::spawn(fragmenting_peer(listener, response.encode()));

        let mut session = PrinterSession::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        let command = CommandPacket::new(77, 1111, CommandPayload::ModelName);
        let decoded = session.exchange(&command, Duration::from_secs(2)).await.unwrap();
        assert_eq!(decoded, response);

        session.close(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is almost certainly closed
        let result = PrinterSession::connect("127.0.0.1", 1, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }

    #[tokio::test]
    async fn test_exchange_times_out_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept but never answer
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut session = PrinterSession::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        let command = CommandPacket::new(1, 1111, CommandPayload::Reset);
        let result = session.exchange(&command, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::CommandTimedOut(_))));
    }

    #[tokio::test]
    async fn test_premature_close_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await.unwrap();
            // Write half a header, then hang up
            stream.write_all(&[0x2A, 80]).await.unwrap();
        });

        let mut session = PrinterSession::connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        let command = CommandPacket::new(1, 1111, CommandPayload::Reset);
        let result = session.exchange(&command, Duration::from_secs(2)).await;
        match result {
            Err(Error::Connect(msg)) => assert!(msg.contains("closed prematurely")),
            other => panic!("expected premature close error, got {other:?}"),
        }
    }
}
