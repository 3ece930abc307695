use serde::{Deserialize, Serialize};

/// Largest tank pressure the state message can carry.
pub const MAX_TANK_PRESSURE: u16 = 999;
/// Largest battery voltage (mV) a 14-bit field can carry.
pub const MAX_BATTERY_MV: u16 = 0x3FFF;
/// Largest board count a 4-bit field can carry.
pub const MAX_BOARDS_REPORTED: u8 = 15;

/// Position of a valve, as reported over CAN or commanded from the ground.
///
/// The numeric values are shared by the CAN payloads and the 2-bit radio
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValveState {
    Open = 0,
    Closed = 1,
    #[default]
    Unknown = 2,
    /// A value that was received but is not a legal valve position.
    Illegal = 3,
}

impl ValveState {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a 2-bit radio field. Every 2-bit value maps to a state.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ValveState::Open,
            1 => ValveState::Closed,
            2 => ValveState::Unknown,
            _ => ValveState::Illegal,
        }
    }

    /// Decodes a CAN valve byte. Only open, closed and unknown are legal on the bus.
    pub const fn from_can_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ValveState::Open),
            1 => Some(ValveState::Closed),
            2 => Some(ValveState::Unknown),
            _ => None,
        }
    }
}

impl core::fmt::Display for ValveState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ValveState::Open => write!(f, "open"),
            ValveState::Closed => write!(f, "closed"),
            ValveState::Unknown => write!(f, "unknown"),
            ValveState::Illegal => write!(f, "illegal"),
        }
    }
}

/// The two actuators the radio board reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValveKind {
    Injector,
    Vent,
}

/// Wire-level snapshot exchanged with the ground station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub boards_connected: u8,
    pub injector_valve_state: ValveState,
    pub vent_valve_state: ValveState,
    pub tank_pressure: u16,
    pub bus_is_powered: bool,
    pub any_errors_detected: bool,
    pub bus_battery_mv: u16,
    pub vent_battery_mv: u16,
}

impl SystemState {
    /// Returns a copy with every numeric field forced into its wire range.
    pub fn clamped(&self) -> Self {
        Self {
            boards_connected: self.boards_connected.min(MAX_BOARDS_REPORTED),
            tank_pressure: self.tank_pressure.min(MAX_TANK_PRESSURE),
            bus_battery_mv: self.bus_battery_mv.min(MAX_BATTERY_MV),
            vent_battery_mv: self.vent_battery_mv.min(MAX_BATTERY_MV),
            ..*self
        }
    }
}

/// Last known GPS position in degrees, minutes and hundredths of a minute.
///
/// Hemispheres are kept as the ASCII bytes the GPS board sends (`N`/`S`,
/// `E`/`W`); they are validated when the fix is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat_degrees: u8,
    pub lat_minutes: u8,
    pub lat_dminutes: u8,
    pub lat_direction: u8,
    pub lon_degrees: u8,
    pub lon_minutes: u8,
    pub lon_dminutes: u8,
    pub lon_direction: u8,
}

pub const fn is_latitude_direction(byte: u8) -> bool {
    matches!(byte, b'N' | b'S')
}

pub const fn is_longitude_direction(byte: u8) -> bool {
    matches!(byte, b'E' | b'W')
}
