//! Print orchestration: the command sequence that moves a photo from a
//! wire-format buffer onto film.
//!
//! The device protocol expects each group of related commands on a fresh
//! TCP connection: every phase below connects, runs its exchanges, closes,
//! and waits a settle delay before the next phase. Whether the printer's
//! embedded state machine genuinely requires the reconnects or this is a
//! habit inherited from early reverse-engineering is unknown; real hardware
//! accepts the cycling, so it is preserved as-is rather than collapsed into
//! one persistent connection.

use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::image::Canvas;
use crate::link::{DEFAULT_EXCHANGE_TIMEOUT, PrinterSession};
use crate::proto::{CommandPacket, CommandPayload, ResponsePacket, ResponsePayload, format_version};

/// Image format byte the SP-series expects for raw plane data.
const IMAGE_FORMAT_RAW: u8 = 16;

/// Progress callback: (completed, total, status). Invoked synchronously
/// from the orchestrator; must not block for long.
pub type ProgressFn<'a> = dyn FnMut(u32, u32, &str) + Send + 'a;

/// Summary of the printer returned by [`Printer::printer_info`].
#[derive(Debug, Clone)]
pub struct PrinterInfo {
    pub model: String,
    pub firmware: String,
    pub hardware: String,
    pub battery: u8,
    pub prints_remaining: u8,
    pub lifetime_prints: u32,
}

/// Client for one physical printer.
pub struct Printer {
    host: String,
    port: u16,
    pin_code: u16,
    session_time: u32,
    /// Print dimensions in wire orientation.
    pub canvas: Canvas,
    pub connect_timeout: Duration,
    pub exchange_timeout: Duration,
    /// Pause between connection-cycled phases.
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl Printer {
    /// Create a client. The session time correlates every packet of this
    /// client's exchanges and is fixed at construction.
    pub fn new(host: impl Into<String>, port: u16, pin_code: u16) -> Self {
        Self {
            host: host.into(),
            port,
            pin_code,
            session_time: Utc::now().timestamp_millis() as u32,
            canvas: Canvas::SP2,
            connect_timeout: Duration::from_secs(10),
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            settle_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 30,
        }
    }

    /// Query model, version and film status over a single session.
    pub async fn printer_info(&self) -> Result<PrinterInfo> {
        let mut session = self.open_session().await?;
        let result = self.query_info(&mut session).await;
        finish_phase(session, self.exchange_timeout, result).await
    }

    async fn query_info(&self, session: &mut PrinterSession) -> Result<PrinterInfo> {
        let version = self.exchange(session, CommandPayload::Version).await?;
        let ResponsePayload::Version { firmware, hardware, .. } = version.payload else {
            return Err(Error::protocol("malformed version response"));
        };

        let model = self.exchange(session, CommandPayload::ModelName).await?;
        let ResponsePayload::ModelName { model } = model.payload else {
            return Err(Error::protocol("malformed model name response"));
        };

        let count = self.exchange(session, CommandPayload::PrintCount).await?;
        let ResponsePayload::PrintCount { print_history } = count.payload else {
            return Err(Error::protocol("malformed print count response"));
        };

        Ok(PrinterInfo {
            model,
            firmware: format_version(firmware),
            hardware: format_version(hardware),
            battery: count.status.battery,
            prints_remaining: count.status.prints_remaining,
            lifetime_prints: print_history,
        })
    }

    /// Run the full print sequence for an already-transcoded wire image.
    ///
    /// Returns `Ok(())` once the printer reports the frame received and
    /// idle; `Error::PrintTimedOut` when status polling exhausts its
    /// attempts; `Error::PrintFailed` when any phase hits a hard error. On
    /// failure the open session is still closed best-effort.
    pub async fn print_photo(&self, wire_image: &[u8], progress: &mut ProgressFn<'_>) -> Result<()> {
        if wire_image.len() != self.canvas.wire_len() {
            return Err(Error::InvalidImageDimensions {
                width: 0,
                height: 0,
                canvas_width: self.canvas.width,
                canvas_height: self.canvas.height,
            });
        }

        match self.run_print(wire_image, progress).await {
            Ok(()) => {
                progress(100, 100, "Print is complete!");
                Ok(())
            }
            Err(err @ Error::PrintTimedOut { .. }) => Err(err),
            Err(err) => Err(Error::PrintFailed(err.to_string())),
        }
    }

    async fn run_print(&self, wire_image: &[u8], progress: &mut ProgressFn<'_>) -> Result<()> {
        progress(0, 100, "Connecting to printer");

        self.phase_pre_print().await?;
        progress(10, 100, "Pre-print negotiation complete");
        sleep(self.settle_delay).await;

        self.phase_lock().await?;
        progress(13, 100, "Printer locked");
        sleep(self.settle_delay).await;

        self.phase_reset().await?;
        progress(16, 100, "Printer reset");
        sleep(self.settle_delay).await;

        self.phase_transfer(wire_image, progress).await?;
        sleep(self.settle_delay).await;

        self.phase_status_poll(progress).await
    }

    /// Phase 1: eight numbered PrePrint exchanges. The respNumber answers
    /// are informational; nothing gates on them.
    async fn phase_pre_print(&self) -> Result<()> {
        let mut session = self.open_session().await?;
        let result = async {
            for cmd_number in 1..=8 {
                let response = self.exchange(&mut session, CommandPayload::PrePrint { cmd_number }).await?;
                if let ResponsePayload::PrePrint { resp_number, .. } = response.payload {
                    debug!("pre-print {cmd_number} answered with {resp_number}");
                }
            }
            Ok(())
        }
        .await;
        finish_phase(session, self.exchange_timeout, result).await
    }

    /// Phase 2: take the printer lock.
    async fn phase_lock(&self) -> Result<()> {
        let mut session = self.open_session().await?;
        let result = self
            .exchange(&mut session, CommandPayload::PrinterLock { lock_state: 1 })
            .await
            .map(drop);
        finish_phase(session, self.exchange_timeout, result).await
    }

    /// Phase 3: reset the receive state machine.
    async fn phase_reset(&self) -> Result<()> {
        let mut session = self.open_session().await?;
        let result = self.exchange(&mut session, CommandPayload::Reset).await.map(drop);
        finish_phase(session, self.exchange_timeout, result).await
    }

    /// Phase 4: announce, segment and transfer the image, then commit.
    async fn phase_transfer(&self, wire_image: &[u8], progress: &mut ProgressFn<'_>) -> Result<()> {
        let mut session = self.open_session().await?;
        let result = async {
            let prep = self
                .exchange(
                    &mut session,
                    CommandPayload::PrepImage {
                        format: IMAGE_FORMAT_RAW,
                        options: 0,
                        image_len: wire_image.len() as u32,
                    },
                )
                .await?;
            let ResponsePayload::PrepImage { max_segment_len } = prep.payload else {
                return Err(Error::protocol("malformed prep image response"));
            };
            if max_segment_len == 0 {
                return Err(Error::protocol("printer reported a zero segment length"));
            }
            progress(20, 100, "Image transfer prepared");

            let segments = segment_image(wire_image, usize::from(max_segment_len));
            let count = segments.len();
            info!("sending image as {count} segments of up to {max_segment_len} bytes");
            for (index, segment) in segments.into_iter().enumerate() {
                let response = self
                    .exchange(
                        &mut session,
                        CommandPayload::SendImage {
                            sequence: index as u32,
                            data: segment.to_vec(),
                        },
                    )
                    .await?;
                if let ResponsePayload::SendImage { sequence } = response.payload
                    && u32::from(sequence) != index as u32 & 0xFF
                {
                    warn!("segment {index} acknowledged as {sequence}");
                }
                let done = 20 + (index as u32 + 1) * 50 / count as u32;
                progress(done, 100, &format!("Sent segment {}/{count}", index + 1));
            }

            self.exchange(&mut session, CommandPayload::CommitImage).await?;
            progress(75, 100, "Image committed");
            Ok(())
        }
        .await;
        finish_phase(session, self.exchange_timeout, result).await
    }

    /// Phase 5: poll until the printer reports the frame received and idle.
    async fn phase_status_poll(&self, progress: &mut ProgressFn<'_>) -> Result<()> {
        let mut session = self.open_session().await?;
        let result = async {
            self.exchange(&mut session, CommandPayload::LockState).await?;

            for attempt in 1..=self.max_poll_attempts {
                let response = self.exchange(&mut session, CommandPayload::StatusPoll).await?;
                let code = response.status.return_code;
                if code.is_idle() {
                    return Ok(());
                }
                let done = 75 + (attempt * 24 / self.max_poll_attempts).min(24);
                progress(done, 100, &format!("Printer status: {code}"));
                debug!("status poll {attempt}/{}: {code}", self.max_poll_attempts);
                sleep(self.poll_interval).await;
            }
            Err(Error::PrintTimedOut {
                attempts: self.max_poll_attempts,
            })
        }
        .await;
        finish_phase(session, self.exchange_timeout, result).await
    }

    async fn open_session(&self) -> Result<PrinterSession> {
        PrinterSession::connect(&self.host, self.port, self.connect_timeout).await
    }

    /// One verified exchange: the response must echo the command's type and
    /// session time to count as its answer.
    async fn exchange(&self, session: &mut PrinterSession, payload: CommandPayload) -> Result<ResponsePacket> {
        let expected = payload.command_type();
        let command = CommandPacket::new(self.session_time, self.pin_code, payload);
        let response = session.exchange(&command, self.exchange_timeout).await?;
        if response.command() != expected || response.session_time != self.session_time {
            return Err(Error::protocol(format!(
                "response {} (session {}) does not answer command {} (session {})",
                response.command(),
                response.session_time,
                expected,
                self.session_time,
            )));
        }
        Ok(response)
    }
}

/// Close a phase's session; on phase failure the close is best-effort and
/// the original error wins.
async fn finish_phase<T>(session: PrinterSession, limit: Duration, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            session.close(limit).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = session.close(limit).await {
                warn!("session close after failed phase also failed: {close_err}");
            }
            Err(err)
        }
    }
}

/// Split a wire image into transfer segments of at most `max_len` bytes.
fn segment_image(image: &[u8], max_len: usize) -> Vec<&[u8]> {
    image.chunks(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_canvas_segments() {
        let image = vec![0xA5u8; 1_440_000];
        let segments = segment_image(&image, 60_000);

        assert_eq!(segments.len(), 24);
        assert!(segments.iter().all(|s| s.len() == 60_000));

        // No byte dropped or duplicated across boundaries
        let rejoined: Vec<u8> = segments.concat();
        assert_eq!(rejoined, image);
    }

    #[test]
    fn test_uneven_segmenting_keeps_tail() {
        let image: Vec<u8> = (0..25u8).collect();
        let segments = segment_image(&image, 10);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], &[20, 21, 22, 23, 24]);
        assert_eq!(segments.concat(), image);
    }
}
