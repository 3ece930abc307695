use crate::fault::ErrorKind;
use crate::types::{ValveKind, ValveState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique id the radio board uses on the bus.
pub const RADIO_BOARD_ID: u8 = 0x0D;
/// Lowest and highest sender ids tracked by the bus supervisor.
pub const MIN_BOARD_ID: u8 = 0x01;
pub const MAX_BOARD_ID: u8 = 0x0E;

pub const MAX_DATA_LEN: usize = 8;
pub const MAX_SID: u16 = 0x7FF;

const BOARD_ID_MASK: u16 = 0x001F;
const MESSAGE_TYPE_MASK: u16 = 0x07E0;
const TIMESTAMP_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("{len} data bytes do not fit in a CAN frame")]
    DataTooLong { len: usize },
    #[error("SID {sid:#05x} is wider than 11 bits")]
    InvalidSid { sid: u16 },
    #[error("payload needs {needed} bytes, frame has {found}")]
    Truncated { needed: usize, found: usize },
    #[error("byte {byte:#04x} is not a valve state")]
    InvalidValveState { byte: u8 },
    #[error("valve cannot be commanded to {state}")]
    UncommandableState { state: ValveState },
}

/// Message types defined on the bus. The set is closed; SIDs carrying any
/// other type bits are foreign traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    GeneralCmd,
    VentValveCmd,
    InjValveCmd,
    DebugMsg,
    DebugPrintf,
    DebugRadioRelay,
    GeneralBoardStatus,
    VentValveStatus,
    InjValveStatus,
    SensorAcc,
    SensorGyro,
    SensorMag,
    SensorAnalog,
    GpsTimestamp,
    GpsLatitude,
    GpsLongitude,
    GpsAltitude,
    GpsInfo,
    LedsOff,
    LedsOn,
}

impl MessageType {
    pub const fn sid_bits(self) -> u16 {
        match self {
            MessageType::GeneralCmd => 0x060,
            MessageType::VentValveCmd => 0x0C0,
            MessageType::InjValveCmd => 0x120,
            MessageType::DebugMsg => 0x180,
            MessageType::DebugPrintf => 0x1E0,
            MessageType::DebugRadioRelay => 0x200,
            MessageType::GeneralBoardStatus => 0x360,
            MessageType::VentValveStatus => 0x460,
            MessageType::InjValveStatus => 0x4C0,
            MessageType::SensorAcc => 0x580,
            MessageType::SensorGyro => 0x5E0,
            MessageType::SensorMag => 0x640,
            MessageType::SensorAnalog => 0x6A0,
            MessageType::GpsTimestamp => 0x6C0,
            MessageType::GpsLatitude => 0x6E0,
            MessageType::GpsLongitude => 0x700,
            MessageType::GpsAltitude => 0x720,
            MessageType::GpsInfo => 0x740,
            MessageType::LedsOff => 0x7C0,
            MessageType::LedsOn => 0x7E0,
        }
    }

    pub const fn from_sid(sid: u16) -> Option<Self> {
        match sid & MESSAGE_TYPE_MASK {
            0x060 => Some(MessageType::GeneralCmd),
            0x0C0 => Some(MessageType::VentValveCmd),
            0x120 => Some(MessageType::InjValveCmd),
            0x180 => Some(MessageType::DebugMsg),
            0x1E0 => Some(MessageType::DebugPrintf),
            0x200 => Some(MessageType::DebugRadioRelay),
            0x360 => Some(MessageType::GeneralBoardStatus),
            0x460 => Some(MessageType::VentValveStatus),
            0x4C0 => Some(MessageType::InjValveStatus),
            0x580 => Some(MessageType::SensorAcc),
            0x5E0 => Some(MessageType::SensorGyro),
            0x640 => Some(MessageType::SensorMag),
            0x6A0 => Some(MessageType::SensorAnalog),
            0x6C0 => Some(MessageType::GpsTimestamp),
            0x6E0 => Some(MessageType::GpsLatitude),
            0x700 => Some(MessageType::GpsLongitude),
            0x720 => Some(MessageType::GpsAltitude),
            0x740 => Some(MessageType::GpsInfo),
            0x7C0 => Some(MessageType::LedsOff),
            0x7E0 => Some(MessageType::LedsOn),
            _ => None,
        }
    }

    /// Debug output and LED control carry no information about board health.
    pub const fn is_maintenance(self) -> bool {
        matches!(
            self,
            MessageType::DebugMsg
                | MessageType::DebugPrintf
                | MessageType::LedsOn
                | MessageType::LedsOff
        )
    }

    pub const fn valve_command(kind: ValveKind) -> Self {
        match kind {
            ValveKind::Injector => MessageType::InjValveCmd,
            ValveKind::Vent => MessageType::VentValveCmd,
        }
    }

    pub const fn valve_status(kind: ValveKind) -> Self {
        match kind {
            ValveKind::Injector => MessageType::InjValveStatus,
            ValveKind::Vent => MessageType::VentValveStatus,
        }
    }
}

/// Analog sensor channels carried in sensor-analog frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogChannel {
    TankPressure,
    InjectorBattery,
    VentBattery,
}

impl AnalogChannel {
    pub const fn sensor_id(self) -> u8 {
        match self {
            AnalogChannel::TankPressure => 0,
            AnalogChannel::InjectorBattery => 1,
            AnalogChannel::VentBattery => 2,
        }
    }

    pub const fn from_sensor_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(AnalogChannel::TankPressure),
            1 => Some(AnalogChannel::InjectorBattery),
            2 => Some(AnalogChannel::VentBattery),
            _ => None,
        }
    }
}

/// One axis of a GPS position as sent by the GPS board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsCoordinate {
    pub degrees: u8,
    pub minutes: u8,
    pub dminutes: u8,
    pub direction: u8,
}

/// A standard-id CAN frame.
///
/// The SID holds the message type in its upper six bits and the sender's
/// board id in the lower five. Every payload defined here starts with a
/// 24-bit sender timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    sid: u16,
    len: u8,
    data: [u8; MAX_DATA_LEN],
}

impl CanFrame {
    pub fn new(sid: u16, data: &[u8]) -> Result<Self, FrameError> {
        if sid > MAX_SID {
            return Err(FrameError::InvalidSid { sid });
        }
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::DataTooLong { len: data.len() });
        }

        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);
        Ok(Self {
            sid,
            len: data.len() as u8,
            data: buf,
        })
    }

    /// Builds a frame whose payload is a 24-bit timestamp followed by `body`.
    pub fn timestamped(
        message_type: MessageType,
        board_id: u8,
        timestamp_ms: u64,
        body: &[u8],
    ) -> Result<Self, FrameError> {
        let mut data = [0u8; MAX_DATA_LEN];
        let len = TIMESTAMP_LEN + body.len();
        if len > MAX_DATA_LEN {
            return Err(FrameError::DataTooLong { len });
        }

        let ts = (timestamp_ms & 0x00FF_FFFF) as u32;
        data[0] = (ts >> 16) as u8;
        data[1] = (ts >> 8) as u8;
        data[2] = ts as u8;
        data[TIMESTAMP_LEN..len].copy_from_slice(body);

        let sid = message_type.sid_bits() | (u16::from(board_id) & BOARD_ID_MASK);
        Self::new(sid, &data[..len])
    }

    pub fn sid(&self) -> u16 {
        self.sid
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn board_id(&self) -> u8 {
        (self.sid & BOARD_ID_MASK) as u8
    }

    pub fn type_bits(&self) -> u16 {
        self.sid & MESSAGE_TYPE_MASK
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_sid(self.sid)
    }

    fn require(&self, needed: usize) -> Result<&[u8], FrameError> {
        let data = self.data();
        if data.len() < needed {
            return Err(FrameError::Truncated {
                needed,
                found: data.len(),
            });
        }
        Ok(data)
    }

    pub fn timestamp(&self) -> Result<u32, FrameError> {
        let data = self.require(TIMESTAMP_LEN)?;
        Ok((u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]))
    }

    /// Status code and the four bytes following it. Missing trailing bytes
    /// read as zero.
    pub fn board_status(&self) -> Result<(ErrorKind, [u8; 4]), FrameError> {
        let data = self.require(TIMESTAMP_LEN + 1)?;
        let mut payload = [0u8; 4];
        let tail = &data[TIMESTAMP_LEN + 1..];
        payload[..tail.len()].copy_from_slice(tail);
        Ok((ErrorKind::from_code(data[TIMESTAMP_LEN]), payload))
    }

    pub fn valve_state(&self) -> Result<ValveState, FrameError> {
        let byte = self.require(TIMESTAMP_LEN + 1)?[TIMESTAMP_LEN];
        ValveState::from_can_byte(byte).ok_or(FrameError::InvalidValveState { byte })
    }

    /// Sensor id and big-endian reading of a sensor-analog frame.
    pub fn analog_reading(&self) -> Result<(u8, u16), FrameError> {
        let data = self.require(TIMESTAMP_LEN + 3)?;
        let value = u16::from_be_bytes([data[TIMESTAMP_LEN + 1], data[TIMESTAMP_LEN + 2]]);
        Ok((data[TIMESTAMP_LEN], value))
    }

    pub fn gps_coordinate(&self) -> Result<GpsCoordinate, FrameError> {
        let data = self.require(TIMESTAMP_LEN + 4)?;
        Ok(GpsCoordinate {
            degrees: data[TIMESTAMP_LEN],
            minutes: data[TIMESTAMP_LEN + 1],
            dminutes: data[TIMESTAMP_LEN + 2],
            direction: data[TIMESTAMP_LEN + 3],
        })
    }
}

/// Command frame asking a valve board to move its valve.
pub fn build_valve_command(
    kind: ValveKind,
    state: ValveState,
    timestamp_ms: u64,
) -> Result<CanFrame, FrameError> {
    if state == ValveState::Illegal {
        return Err(FrameError::UncommandableState { state });
    }
    CanFrame::timestamped(
        MessageType::valve_command(kind),
        RADIO_BOARD_ID,
        timestamp_ms,
        &[state.code()],
    )
}

pub fn build_board_status(
    board_id: u8,
    timestamp_ms: u64,
    kind: ErrorKind,
    payload: [u8; 4],
) -> Result<CanFrame, FrameError> {
    let [b0, b1, b2, b3] = payload;
    CanFrame::timestamped(
        MessageType::GeneralBoardStatus,
        board_id,
        timestamp_ms,
        &[kind.code(), b0, b1, b2, b3],
    )
}

pub fn build_valve_status(
    kind: ValveKind,
    board_id: u8,
    timestamp_ms: u64,
    state: ValveState,
) -> Result<CanFrame, FrameError> {
    CanFrame::timestamped(
        MessageType::valve_status(kind),
        board_id,
        timestamp_ms,
        &[state.code()],
    )
}

pub fn build_analog_reading(
    board_id: u8,
    timestamp_ms: u64,
    channel: AnalogChannel,
    value: u16,
) -> Result<CanFrame, FrameError> {
    let [hi, lo] = value.to_be_bytes();
    CanFrame::timestamped(
        MessageType::SensorAnalog,
        board_id,
        timestamp_ms,
        &[channel.sensor_id(), hi, lo],
    )
}

pub fn build_gps_coordinate(
    message_type: MessageType,
    board_id: u8,
    timestamp_ms: u64,
    coordinate: GpsCoordinate,
) -> Result<CanFrame, FrameError> {
    CanFrame::timestamped(
        message_type,
        board_id,
        timestamp_ms,
        &[
            coordinate.degrees,
            coordinate.minutes,
            coordinate.dminutes,
            coordinate.direction,
        ],
    )
}
