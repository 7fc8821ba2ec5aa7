//! Protocol-compatible printer simulator.
//!
//! Speaks the same framing and codec as the client, one task per accepted
//! connection, and synthesizes responses from configured fixed values. Used
//! by the test suite as the peer for end-to-end runs and standalone as a
//! fake printer.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::Canvas;
use crate::proto::{
    self, CommandPacket, CommandPayload, DeviceStatus, FRAME_PREFIX_SIZE, MAX_PACKET_SIZE, Packet, ResponsePacket,
    ResponsePayload, ReturnCode,
};

/// Fixed values the simulator answers with.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub model_name: String,
    pub battery: u8,
    pub prints_remaining: u8,
    pub total_prints: u32,
    pub canvas: Canvas,
    pub max_segment_len: u16,
    pub firmware: u16,
    pub hardware: u16,
    /// Added to the printing percentage on every status poll; 0 pins the
    /// printer in the printing state so polls never terminate.
    pub ramp_step: u8,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            model_name: "SP-2".to_string(),
            battery: 2,
            prints_remaining: 10,
            total_prints: 20,
            canvas: Canvas::SP2,
            max_segment_len: 60_000,
            firmware: 275,
            hardware: 0,
            ramp_step: 25,
        }
    }
}

/// State shared across connections.
struct SimState {
    config: SimulatorConfig,
    /// Image segments per session time; sessions may overlap, so this map
    /// is the one piece of cross-connection shared state.
    segments: Mutex<HashMap<u32, BTreeMap<u32, Vec<u8>>>>,
    printing_state: Mutex<u8>,
    message_log: Mutex<Vec<Value>>,
    last_image: Mutex<Option<Vec<u8>>>,
}

/// Shared view of a running simulator, for tests and log flushing.
#[derive(Clone)]
pub struct SimulatorHandle {
    state: Arc<SimState>,
}

impl SimulatorHandle {
    /// The most recently committed image, display-oriented RGB.
    pub async fn last_image(&self) -> Option<Vec<u8>> {
        self.state.last_image.lock().await.clone()
    }

    /// Number of packets observed so far (commands and responses).
    pub async fn message_count(&self) -> usize {
        self.state.message_log.lock().await.len()
    }

    /// Flush the packet log as pretty-printed JSON.
    pub async fn save_log(&self, path: &Path) -> Result<()> {
        let log = self.state.message_log.lock().await;
        let json = serde_json::to_string_pretty(&*log).map_err(|e| Error::protocol(e.to_string()))?;
        tokio::fs::write(path, json).await?;
        info!("saved {} packets to {}", log.len(), path.display());
        Ok(())
    }
}

/// The simulator itself: bind, then run until dropped or aborted.
pub struct PrinterSimulator {
    listener: TcpListener,
    state: Arc<SimState>,
}

impl PrinterSimulator {
    /// Bind to `addr` (use port 0 for an ephemeral test port).
    pub async fn bind(addr: &str, config: SimulatorConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("printer simulator listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            state: Arc::new(SimState {
                config,
                segments: Mutex::new(HashMap::new()),
                printing_state: Mutex::new(0),
                message_log: Mutex::new(Vec::new()),
                last_image: Mutex::new(None),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Accept loop: one task per client connection.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!("client connected from {peer}");
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(state, stream).await {
                    debug!("client {peer} gone: {e}");
                }
            });
        }
    }
}

/// Frame, decode and answer packets until the client hangs up.
async fn serve_connection(state: Arc<SimState>, mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        let mut buf = vec![0u8; FRAME_PREFIX_SIZE];
        if stream.read_exact(&mut buf).await.is_err() {
            // Normal termination: client closed between packets
            return Ok(());
        }
        let total = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        if !(FRAME_PREFIX_SIZE..=MAX_PACKET_SIZE).contains(&total) {
            warn!("dropping client: implausible packet length {total}");
            return Ok(());
        }
        buf.resize(total, 0);
        stream.read_exact(&mut buf[FRAME_PREFIX_SIZE..]).await?;

        match Packet::decode(&buf) {
            Ok(Packet::Command(command)) => {
                let response = synthesize_response(&state, &command).await;
                {
                    let mut log = state.message_log.lock().await;
                    log.push(Packet::Command(command).to_field_map());
                    log.push(Packet::Response(response.clone()).to_field_map());
                }
                stream.write_all(&response.encode()).await?;
            }
            Ok(Packet::Response(_)) => {
                warn!("peer sent a response packet; ignoring");
            }
            Err(e) => {
                // Anomalous traffic is logged with its raw bytes, not fatal
                warn!("undecodable packet ({e}): {}", proto::hex_preview(&buf));
            }
        }
    }
}

/// Build the protocol-correct response for one command.
async fn synthesize_response(state: &SimState, command: &CommandPacket) -> ResponsePacket {
    let config = &state.config;
    let mut status = DeviceStatus::new(
        ReturnCode::ReceivedFrame,
        0,
        config.battery,
        config.prints_remaining,
    );

    let payload = match &command.payload {
        CommandPayload::Specifications => ResponsePayload::Specifications {
            // Reported in display orientation, narrow edge first
            max_width: config.canvas.height as u16,
            max_height: config.canvas.width as u16,
            max_colours: 256,
            unknown1: 10,
            max_msg_size: config.max_segment_len,
            unknown2: 16,
            unknown3: 0,
        },
        CommandPayload::Reset => ResponsePayload::Reset,
        CommandPayload::PrepImage { image_len, .. } => {
            debug!("prep image announced, {image_len} bytes incoming");
            ResponsePayload::PrepImage {
                max_segment_len: config.max_segment_len,
            }
        }
        CommandPayload::SendImage { sequence, data } => {
            let mut segments = state.segments.lock().await;
            segments
                .entry(command.session_time)
                .or_default()
                .insert(*sequence, data.clone());
            ResponsePayload::SendImage {
                sequence: *sequence as u8,
            }
        }
        CommandPayload::CommitImage => {
            commit_image(state, command.session_time).await;
            ResponsePayload::CommitImage
        }
        CommandPayload::LockState => ResponsePayload::LockState { lock_state: 100 },
        CommandPayload::PrinterLock { lock_state } => {
            debug!("printer lock set to {lock_state}");
            ResponsePayload::PrinterLock
        }
        CommandPayload::ChangePassword => ResponsePayload::ChangePassword,
        CommandPayload::Version => ResponsePayload::Version {
            unknown1: 254,
            firmware: config.firmware,
            hardware: config.hardware,
        },
        CommandPayload::PrintCount => ResponsePayload::PrintCount {
            print_history: config.total_prints,
        },
        CommandPayload::ModelName => ResponsePayload::ModelName {
            model: config.model_name.clone(),
        },
        CommandPayload::StatusPoll => {
            status.return_code = poll_printing_ramp(state).await;
            ResponsePayload::StatusPoll
        }
        CommandPayload::PrePrint { cmd_number } => ResponsePayload::PrePrint {
            cmd_number: *cmd_number,
            resp_number: pre_print_answer(*cmd_number),
        },
    };

    ResponsePacket::new(command.session_time, status, payload)
}

/// Advance the toy printing ramp and report the matching status code.
async fn poll_printing_ramp(state: &SimState) -> ReturnCode {
    let mut printing = state.printing_state.lock().await;
    if *printing >= 100 {
        *printing = 0;
        ReturnCode::ReceivedFrame
    } else {
        *printing = printing.saturating_add(state.config.ramp_step);
        ReturnCode::Printing
    }
}

fn pre_print_answer(cmd_number: u16) -> u16 {
    match cmd_number {
        1..=3 => 2,
        4..=5 => 1,
        6..=8 => 0,
        other => {
            warn!("unknown pre-print command number {other}");
            0
        }
    }
}

/// Reassemble the session's segments in sequence order and decode them back
/// to a display-oriented RGB buffer.
async fn commit_image(state: &SimState, session_time: u32) {
    let Some(segments) = state.segments.lock().await.remove(&session_time) else {
        warn!("commit for session {session_time} without any segments");
        return;
    };

    let count = segments.len();
    let combined: Vec<u8> = segments.into_values().flatten().collect();
    info!("committing image: {count} segments, {} bytes", combined.len());

    match state.config.canvas.decode_image(&combined) {
        Ok(rgb) => {
            *state.last_image.lock().await = Some(rgb);
        }
        Err(e) => warn!("committed image does not decode: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::PrinterSession;
    use crate::printer::Printer;
    use std::time::Duration;

    async fn start_simulator(config: SimulatorConfig) -> (SocketAddr, SimulatorHandle) {
        let sim = PrinterSimulator::bind("127.0.0.1:0", config).await.unwrap();
        let addr = sim.local_addr().unwrap();
        let handle = sim.handle();
        tokio::spawn(sim.run());
        (addr, handle)
    }

    /// A test canvas small enough to keep transfers quick but uneven enough
    /// to exercise segmenting.
    const TEST_CANVAS: Canvas = Canvas { width: 8, height: 6 };

    fn fast_printer(addr: SocketAddr) -> Printer {
        let mut printer = Printer::new(addr.ip().to_string(), addr.port(), 1111);
        printer.canvas = TEST_CANVAS;
        printer.settle_delay = Duration::from_millis(5);
        printer.poll_interval = Duration::from_millis(5);
        printer
    }

    #[tokio::test]
    async fn test_model_name_end_to_end() {
        let (addr, _handle) = start_simulator(SimulatorConfig {
            model_name: "SP-3".to_string(),
            ..SimulatorConfig::default()
        })
        .await;

        let mut session = PrinterSession::connect(&addr.ip().to_string(), addr.port(), Duration::from_secs(2))
            .await
            .unwrap();
        let command = CommandPacket::new(424_242, 1111, CommandPayload::ModelName);
        let response = session.exchange(&command, Duration::from_secs(2)).await.unwrap();
        session.close(Duration::from_secs(2)).await.unwrap();

        assert_eq!(response.session_time, 424_242);
        assert_eq!(
            response.payload,
            ResponsePayload::ModelName {
                model: "SP-3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_printer_info_end_to_end() {
        let (addr, _handle) = start_simulator(SimulatorConfig::default()).await;

        let printer = fast_printer(addr);
        let info = printer.printer_info().await.unwrap();

        assert_eq!(info.model, "SP-2");
        assert_eq!(info.firmware, "01.13");
        assert_eq!(info.battery, 2);
        assert_eq!(info.prints_remaining, 10);
        assert_eq!(info.lifetime_prints, 20);
    }

    #[tokio::test]
    async fn test_full_print_reassembles_image() {
        let (addr, handle) = start_simulator(SimulatorConfig {
            canvas: TEST_CANVAS,
            max_segment_len: 40,
            ..SimulatorConfig::default()
        })
        .await;

        let printer = fast_printer(addr);

        // Display-oriented source buffer
        let rgb: Vec<u8> = (0..TEST_CANVAS.wire_len()).map(|i| (i % 251) as u8).collect();
        let wire = TEST_CANVAS
            .encode_image(&rgb, TEST_CANVAS.height, TEST_CANVAS.width)
            .unwrap();

        let mut log: Vec<(u32, String)> = Vec::new();
        let mut progress = |done: u32, _total: u32, status: &str| log.push((done, status.to_string()));
        printer.print_photo(&wire, &mut progress).await.unwrap();

        // Progress is monotonic and terminal
        assert!(log.windows(2).all(|w| w[0].0 <= w[1].0));
        let (done, status) = log.last().unwrap();
        assert_eq!(*done, 100);
        assert_eq!(status, "Print is complete!");

        // The simulator got every byte back in order
        assert_eq!(handle.last_image().await.unwrap(), rgb);
    }

    #[tokio::test]
    async fn test_status_poll_terminates_after_ramp() {
        // 50% per poll: two "printing" answers, idle on the third
        let (addr, _handle) = start_simulator(SimulatorConfig {
            canvas: TEST_CANVAS,
            max_segment_len: 40,
            ramp_step: 50,
            ..SimulatorConfig::default()
        })
        .await;

        let mut printer = fast_printer(addr);
        printer.max_poll_attempts = 4;

        let wire = vec![0u8; TEST_CANVAS.wire_len()];
        let mut progress = |_: u32, _: u32, _: &str| {};
        printer.print_photo(&wire, &mut progress).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_poll_times_out_when_never_idle() {
        let (addr, _handle) = start_simulator(SimulatorConfig {
            canvas: TEST_CANVAS,
            max_segment_len: 40,
            ramp_step: 0,
            ..SimulatorConfig::default()
        })
        .await;

        let mut printer = fast_printer(addr);
        printer.max_poll_attempts = 3;

        let wire = vec![0u8; TEST_CANVAS.wire_len()];
        let mut progress = |_: u32, _: u32, _: &str| {};
        let result = printer.print_photo(&wire, &mut progress).await;

        assert!(matches!(result, Err(Error::PrintTimedOut { attempts: 3 })));
    }

    #[tokio::test]
    async fn test_print_rejects_wrong_wire_length() {
        let printer = Printer::new("127.0.0.1", 1, 1111);
        let mut progress = |_: u32, _: u32, _: &str| {};
        let result = printer.print_photo(&[0u8; 17], &mut progress).await;
        assert!(matches!(result, Err(Error::InvalidImageDimensions { .. })));
    }

    #[tokio::test]
    async fn test_message_log_and_save() {
        let (addr, handle) = start_simulator(SimulatorConfig::default()).await;

        let printer = fast_printer(addr);
        printer.printer_info().await.unwrap();

        // Three exchanges, each logged as command + response
        assert_eq!(handle.message_count().await, 6);

        let path = std::env::temp_dir().join("instax-sim-log-test.json");
        handle.save_log(&path).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[0]["direction"], "command");
        assert_eq!(parsed[1]["direction"], "response");
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_pre_print_answer_mapping() {
        let (addr, _handle) = start_simulator(SimulatorConfig::default()).await;

        let mut session = PrinterSession::connect(&addr.ip().to_string(), addr.port(), Duration::from_secs(2))
            .await
            .unwrap();
        for (cmd_number, expected) in [(1u16, 2u16), (3, 2), (4, 1), (5, 1), (6, 0), (8, 0)] {
            let command = CommandPacket::new(7, 1111, CommandPayload::PrePrint { cmd_number });
            let response = session.exchange(&command, Duration::from_secs(2)).await.unwrap();
            assert_eq!(
                response.payload,
                ResponsePayload::PrePrint {
                    cmd_number,
                    resp_number: expected
                }
            );
        }
        session.close(Duration::from_secs(2)).await.unwrap();
    }
}
