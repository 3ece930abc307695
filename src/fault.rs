use crate::can::RADIO_BOARD_ID;
use serde::{Deserialize, Serialize};

/// Board status codes carried in general-board-status frames and in the
/// 6-bit kind field of radio error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Nominal,
    BusOverCurrent,
    BusUnderVoltage,
    BusOverVoltage,
    BattOverCurrent,
    BattUnderVoltage,
    BattOverVoltage,
    BoardPresumedDead,
    NoCanTraffic,
    MissingCriticalBoard,
    RadioSignalLost,
    ValveState,
    CannotInitDacs,
    VentPotRange,
    LedColor,
    ProtocolViolation,
    EncodingDefect,
    UnhandledInterrupt,
    /// A status code this board does not know; relayed as-is.
    Other(u8),
}

impl ErrorKind {
    pub const fn code(self) -> u8 {
        match self {
            ErrorKind::Nominal => 0,
            ErrorKind::BusOverCurrent => 1,
            ErrorKind::BusUnderVoltage => 2,
            ErrorKind::BusOverVoltage => 3,
            ErrorKind::BattOverCurrent => 4,
            ErrorKind::BattUnderVoltage => 5,
            ErrorKind::BattOverVoltage => 6,
            ErrorKind::BoardPresumedDead => 7,
            ErrorKind::NoCanTraffic => 8,
            ErrorKind::MissingCriticalBoard => 9,
            ErrorKind::RadioSignalLost => 10,
            ErrorKind::ValveState => 11,
            ErrorKind::CannotInitDacs => 12,
            ErrorKind::VentPotRange => 13,
            ErrorKind::LedColor => 14,
            ErrorKind::ProtocolViolation => 15,
            ErrorKind::EncodingDefect => 16,
            ErrorKind::UnhandledInterrupt => 17,
            ErrorKind::Other(code) => code,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => ErrorKind::Nominal,
            1 => ErrorKind::BusOverCurrent,
            2 => ErrorKind::BusUnderVoltage,
            3 => ErrorKind::BusOverVoltage,
            4 => ErrorKind::BattOverCurrent,
            5 => ErrorKind::BattUnderVoltage,
            6 => ErrorKind::BattOverVoltage,
            7 => ErrorKind::BoardPresumedDead,
            8 => ErrorKind::NoCanTraffic,
            9 => ErrorKind::MissingCriticalBoard,
            10 => ErrorKind::RadioSignalLost,
            11 => ErrorKind::ValveState,
            12 => ErrorKind::CannotInitDacs,
            13 => ErrorKind::VentPotRange,
            14 => ErrorKind::LedColor,
            15 => ErrorKind::ProtocolViolation,
            16 => ErrorKind::EncodingDefect,
            17 => ErrorKind::UnhandledInterrupt,
            other => ErrorKind::Other(other),
        }
    }

    pub const fn is_nominal(self) -> bool {
        matches!(self, ErrorKind::Nominal)
    }

    /// Whether the code fits the kind field of a radio error message.
    pub const fn fits_wire(self) -> bool {
        self.code() <= MAX_WIRE_CODE
    }
}

/// Largest status code the 6-bit kind field can carry.
pub const MAX_WIRE_CODE: u8 = 0x3F;

/// Classes of anomaly this core can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Anomaly {
    /// Malformed or contradictory bus payload.
    ProtocolViolation,
    /// Radio message discarded; never recorded.
    ChecksumMismatch,
    /// Liveness timeout on a board.
    BoardPresumedDead,
    /// An internal invariant was broken while building an outbound message.
    EncodingDefect,
    /// Reported by the analog collaborator, not by this core.
    SensorOutOfRange,
}

impl Anomaly {
    /// The status code used when the anomaly is sent to the ground, if it is
    /// recorded at all.
    pub const fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Anomaly::ProtocolViolation => Some(ErrorKind::ProtocolViolation),
            Anomaly::BoardPresumedDead => Some(ErrorKind::BoardPresumedDead),
            Anomaly::EncodingDefect => Some(ErrorKind::EncodingDefect),
            Anomaly::ChecksumMismatch | Anomaly::SensorOutOfRange => None,
        }
    }
}

/// One error report destined for the ground station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    board_id: u8,
    kind: ErrorKind,
    payload: [u8; 4],
}

impl ErrorRecord {
    pub const fn new(board_id: u8, kind: ErrorKind, payload: [u8; 4]) -> Self {
        Self {
            board_id,
            kind,
            payload,
        }
    }

    /// A record raised by the radio board itself.
    pub const fn local(kind: ErrorKind, payload: [u8; 4]) -> Self {
        Self::new(RADIO_BOARD_ID, kind, payload)
    }

    pub const fn board_id(&self) -> u8 {
        self.board_id
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn payload(&self) -> [u8; 4] {
        self.payload
    }
}
