//! Protocol command codes, status codes and framing constants.

use std::fmt;

/// Direction tag byte for client-to-printer packets.
pub const COMMAND_TAG: u8 = 0x24;
/// Direction tag byte for printer-to-client packets.
pub const RESPONSE_TAG: u8 = 0x2A;

/// Fixed prefix every packet starts with: tag, command, totalLength (u16 BE).
pub const FRAME_PREFIX_SIZE: usize = 4;
/// Command header: tag(1) cmd(1) len(2) sessionTime(4) pinCode(2) reserved(2).
pub const CMD_HEADER_SIZE: usize = 12;
/// Response header: tag(1) cmd(1) len(2) sessionTime(4) reserved(4) status(4).
pub const RESP_HEADER_SIZE: usize = 16;
/// Checksum (2 bytes) plus CR LF terminator.
pub const TRAILER_SIZE: usize = 4;

/// Upper bound on a declared packet length: response header + the largest
/// image segment plus the SendImage sequence word and trailer, with slack.
pub const MAX_PACKET_SIZE: usize = 70_000;

/// The closed set of command codes the protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    /// Canvas dimensions, colour depth and segment size limits (79).
    Specifications = 79,
    /// Reset the printer's receive state machine (80).
    Reset = 80,
    /// Announce an incoming image and its total length (81).
    PrepImage = 81,
    /// One image segment (82).
    SendImage = 82,
    /// Commit the transferred image for printing (83).
    CommitImage = 83,
    /// Query the device lock state (176).
    LockState = 176,
    /// Lock or unlock the printer for exclusive use (179).
    PrinterLock = 179,
    /// Change the device pin code (182). Never observed with a payload.
    ChangePassword = 182,
    /// Firmware/hardware version words (192).
    Version = 192,
    /// Lifetime print count (193).
    PrintCount = 193,
    /// Printer model string (194).
    ModelName = 194,
    /// Status poll used while a print is in progress (195).
    StatusPoll = 195,
    /// Pre-print negotiation exchange (196).
    PrePrint = 196,
}

impl CommandType {
    /// All command types, in wire-code order.
    pub const ALL: [CommandType; 13] = [
        CommandType::Specifications,
        CommandType::Reset,
        CommandType::PrepImage,
        CommandType::SendImage,
        CommandType::CommitImage,
        CommandType::LockState,
        CommandType::PrinterLock,
        CommandType::ChangePassword,
        CommandType::Version,
        CommandType::PrintCount,
        CommandType::ModelName,
        CommandType::StatusPoll,
        CommandType::PrePrint,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        match code {
            79 => Ok(CommandType::Specifications),
            80 => Ok(CommandType::Reset),
            81 => Ok(CommandType::PrepImage),
            82 => Ok(CommandType::SendImage),
            83 => Ok(CommandType::CommitImage),
            176 => Ok(CommandType::LockState),
            179 => Ok(CommandType::PrinterLock),
            182 => Ok(CommandType::ChangePassword),
            192 => Ok(CommandType::Version),
            193 => Ok(CommandType::PrintCount),
            194 => Ok(CommandType::ModelName),
            195 => Ok(CommandType::StatusPoll),
            196 => Ok(CommandType::PrePrint),
            other => Err(other),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::Specifications => "Specifications",
            CommandType::Reset => "Reset",
            CommandType::PrepImage => "PrepImage",
            CommandType::SendImage => "SendImage",
            CommandType::CommitImage => "CommitImage",
            CommandType::LockState => "LockState",
            CommandType::PrinterLock => "PrinterLock",
            CommandType::ChangePassword => "ChangePassword",
            CommandType::Version => "Version",
            CommandType::PrintCount => "PrintCount",
            CommandType::ModelName => "ModelName",
            CommandType::StatusPoll => "StatusPoll",
            CommandType::PrePrint => "PrePrint",
        };
        f.write_str(name)
    }
}

/// Response status byte. Code 0 doubles as the idle/"frame received"
/// sentinel the status poll loop terminates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    /// Idle / frame received (0).
    ReceivedFrame,
    /// Firmware update hold (127).
    UpdateHold,
    /// Printer is locked by another client (160).
    OtherUsed,
    /// Transferred data is not a valid image (161).
    NotImageData,
    /// Battery is empty (162).
    BatteryEmpty,
    /// A print is in progress (163).
    Printing,
    /// The eject mechanism is running (164).
    Ejecting,
    /// Self-test in progress (165).
    Testing,
    /// Charging (180).
    Charging,
    /// Connection fault (224).
    ConnectFault,
    /// Frame receive fault, codes 240-243.
    FrameFault(u8),
    /// No film left (244).
    FilmEmpty,
    /// Camera point fault (245).
    CamPoint,
    /// Motor fault (246).
    MotorFault,
    /// Pin code mismatch (247).
    PinMismatch,
    /// Photo-interrupter sensor fault (248).
    PiSensor,
    /// Any code outside the documented set.
    Unknown(u8),
}

impl ReturnCode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ReturnCode::ReceivedFrame,
            127 => ReturnCode::UpdateHold,
            160 => ReturnCode::OtherUsed,
            161 => ReturnCode::NotImageData,
            162 => ReturnCode::BatteryEmpty,
            163 => ReturnCode::Printing,
            164 => ReturnCode::Ejecting,
            165 => ReturnCode::Testing,
            180 => ReturnCode::Charging,
            224 => ReturnCode::ConnectFault,
            240..=243 => ReturnCode::FrameFault(code),
            244 => ReturnCode::FilmEmpty,
            245 => ReturnCode::CamPoint,
            246 => ReturnCode::MotorFault,
            247 => ReturnCode::PinMismatch,
            248 => ReturnCode::PiSensor,
            other => ReturnCode::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ReturnCode::ReceivedFrame => 0,
            ReturnCode::UpdateHold => 127,
            ReturnCode::OtherUsed => 160,
            ReturnCode::NotImageData => 161,
            ReturnCode::BatteryEmpty => 162,
            ReturnCode::Printing => 163,
            ReturnCode::Ejecting => 164,
            ReturnCode::Testing => 165,
            ReturnCode::Charging => 180,
            ReturnCode::ConnectFault => 224,
            ReturnCode::FrameFault(code) => code,
            ReturnCode::FilmEmpty => 244,
            ReturnCode::CamPoint => 245,
            ReturnCode::MotorFault => 246,
            ReturnCode::PinMismatch => 247,
            ReturnCode::PiSensor => 248,
            ReturnCode::Unknown(code) => code,
        }
    }

    /// Terminal-success sentinel for the status poll loop.
    pub fn is_idle(self) -> bool {
        matches!(self, ReturnCode::ReceivedFrame)
    }

    pub fn is_printing(self) -> bool {
        matches!(self, ReturnCode::Printing)
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnCode::ReceivedFrame => write!(f, "idle"),
            ReturnCode::UpdateHold => write!(f, "update hold"),
            ReturnCode::OtherUsed => write!(f, "in use by another client"),
            ReturnCode::NotImageData => write!(f, "not image data"),
            ReturnCode::BatteryEmpty => write!(f, "battery empty"),
            ReturnCode::Printing => write!(f, "printing"),
            ReturnCode::Ejecting => write!(f, "ejecting"),
            ReturnCode::Testing => write!(f, "self-testing"),
            ReturnCode::Charging => write!(f, "charging"),
            ReturnCode::ConnectFault => write!(f, "connection fault"),
            ReturnCode::FrameFault(code) => write!(f, "frame receive fault ({code})"),
            ReturnCode::FilmEmpty => write!(f, "film empty"),
            ReturnCode::CamPoint => write!(f, "camera point fault"),
            ReturnCode::MotorFault => write!(f, "motor fault"),
            ReturnCode::PinMismatch => write!(f, "pin code mismatch"),
            ReturnCode::PiSensor => write!(f, "PI sensor fault"),
            ReturnCode::Unknown(code) => write!(f, "unknown status ({code})"),
        }
    }
}
