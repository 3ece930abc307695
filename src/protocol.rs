//! Ground-link wire format.
//!
//! Every radio message is a single header byte, a run of payload symbols
//! drawn from a 64-character alphabet, one checksum symbol and a terminator.
//! Fields are packed MSB-first into one integer in the order documented on
//! each encoder, then emitted six bits per symbol, most significant first.
//!
//! Decoders check header, length and alphabet. They do not verify the
//! checksum; callers use [`checksum_matches`] for that.

use crate::fault::{ErrorKind, ErrorRecord};
use crate::types::{
    is_latitude_direction, is_longitude_direction, GpsFix, SystemState, ValveState,
};
use static_assertions::const_assert;
use thiserror::Error;

pub const STATE_REQUEST_HEADER: u8 = b'?';
pub const STATE_COMMAND_HEADER: u8 = b'!';
pub const ERROR_HEADER: u8 = b'$';
pub const GPS_HEADER: u8 = b'@';
pub const MESSAGE_TERMINATOR: u8 = b'\n';

/// Returned by [`decode_symbol`] for bytes outside the alphabet.
pub const INVALID_SYMBOL: u8 = 255;

// Lengths include header and terminator.
pub const STATE_MESSAGE_LEN: usize = 11;
pub const ERROR_MESSAGE_LEN: usize = 10;
pub const GPS_MESSAGE_LEN: usize = 12;

pub const STATE_PAYLOAD_LEN: usize = STATE_MESSAGE_LEN - 3;
pub const ERROR_PAYLOAD_LEN: usize = ERROR_MESSAGE_LEN - 3;
pub const GPS_PAYLOAD_LEN: usize = GPS_MESSAGE_LEN - 3;

pub type StateMessage = [u8; STATE_MESSAGE_LEN];
pub type ErrorMessage = [u8; ERROR_MESSAGE_LEN];
pub type GpsMessage = [u8; GPS_MESSAGE_LEN];

const BOARD_COUNT_BITS: u32 = 4;
const VALVE_BITS: u32 = 2;
const PRESSURE_BITS: u32 = 10;
const FLAG_BITS: u32 = 1;
const MILLIVOLT_BITS: u32 = 14;
const BOARD_ID_BITS: u32 = 4;
const ERROR_KIND_BITS: u32 = 6;
const BYTE_BITS: u32 = 8;
const SYMBOL_BITS: u32 = 6;

const_assert!(!is_alphabet_symbol(STATE_REQUEST_HEADER));
const_assert!(!is_alphabet_symbol(STATE_COMMAND_HEADER));
const_assert!(!is_alphabet_symbol(ERROR_HEADER));
const_assert!(!is_alphabet_symbol(GPS_HEADER));
const_assert!(!is_alphabet_symbol(MESSAGE_TERMINATOR));
const_assert!(STATE_REQUEST_HEADER != STATE_COMMAND_HEADER);
const_assert!(STATE_REQUEST_HEADER != ERROR_HEADER);
const_assert!(STATE_REQUEST_HEADER != GPS_HEADER);
const_assert!(STATE_COMMAND_HEADER != ERROR_HEADER);
const_assert!(STATE_COMMAND_HEADER != GPS_HEADER);
const_assert!(ERROR_HEADER != GPS_HEADER);
const_assert!(STATE_PAYLOAD_LEN as u32 * SYMBOL_BITS == 48);
const_assert!(ERROR_PAYLOAD_LEN as u32 * SYMBOL_BITS == 42);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("expected header {expected:#04x}, found {found:#04x}")]
    WrongHeader { expected: u8, found: u8 },
    #[error("expected {expected} bytes, found {found}")]
    WrongLength { expected: usize, found: usize },
    #[error("byte {byte:#04x} is not in the wire alphabet")]
    InvalidSymbol { byte: u8 },
    #[error("message is not terminated")]
    MissingTerminator,
    #[error("byte {byte:#04x} is not a legal hemisphere")]
    InvalidHemisphere { byte: u8 },
}

pub const fn is_alphabet_symbol(byte: u8) -> bool {
    matches!(byte, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'&' | b'/')
}

/// Maps the low six bits of `value` onto the wire alphabet.
pub const fn encode_symbol(value: u8) -> u8 {
    match value & 0x3F {
        v @ 0..=25 => b'A' + v,
        v @ 26..=51 => b'a' + (v - 26),
        v @ 52..=61 => b'0' + (v - 52),
        62 => b'&',
        _ => b'/',
    }
}

/// Inverse of [`encode_symbol`]; anything outside the alphabet yields
/// [`INVALID_SYMBOL`].
pub const fn decode_symbol(byte: u8) -> u8 {
    match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'&' => 62,
        b'/' => 63,
        _ => INVALID_SYMBOL,
    }
}

/// Weighted bit-pair checksum over `payload`, returned as an alphabet symbol.
///
/// Each byte is split into four 2-bit groups. The high bit of each group
/// counts once and the low bit three times. Scanning stops at a terminator.
pub fn checksum(payload: &[u8]) -> u8 {
    let mut total: u32 = 0;
    for &byte in payload.iter().take_while(|&&b| b != MESSAGE_TERMINATOR) {
        let mut odd = 0;
        let mut even = 0;
        for group in 0..4 {
            let bits = (byte >> (group * 2)) & 0b11;
            odd += u32::from(bits >> 1);
            even += u32::from(bits & 1);
        }
        total += odd + 3 * even;
    }
    encode_symbol((total % 64) as u8)
}

pub fn checksum_matches(payload: &[u8], received: u8) -> bool {
    checksum(payload) == received
}

fn field_mask(width: u32) -> u64 {
    (1u64 << width) - 1
}

/// Accumulates fixed-width fields MSB-first.
#[derive(Debug, Default)]
struct BitPacker {
    value: u64,
    bits: u32,
}

impl BitPacker {
    fn push(&mut self, field: u64, width: u32) {
        debug_assert!(field <= field_mask(width), "field {field} wider than {width} bits");
        self.value = (self.value << width) | (field & field_mask(width));
        self.bits += width;
    }

    fn write_symbols(&self, out: &mut [u8]) {
        debug_assert_eq!(self.bits as usize, out.len() * SYMBOL_BITS as usize);
        let mut shift = self.bits;
        for slot in out.iter_mut() {
            shift -= SYMBOL_BITS;
            *slot = encode_symbol(((self.value >> shift) & 0x3F) as u8);
        }
    }
}

/// Reads back fields written by [`BitPacker`].
#[derive(Debug)]
struct BitReader {
    value: u64,
    remaining: u32,
}

impl BitReader {
    fn from_symbols(symbols: &[u8]) -> Result<Self, ProtocolError> {
        let mut value = 0u64;
        for &byte in symbols {
            let sextet = decode_symbol(byte);
            if sextet == INVALID_SYMBOL {
                return Err(ProtocolError::InvalidSymbol { byte });
            }
            value = (value << SYMBOL_BITS) | u64::from(sextet);
        }
        Ok(Self {
            value,
            remaining: symbols.len() as u32 * SYMBOL_BITS,
        })
    }

    fn take(&mut self, width: u32) -> u64 {
        debug_assert!(width <= self.remaining);
        self.remaining -= width;
        (self.value >> self.remaining) & field_mask(width)
    }
}

fn seal<const N: usize>(header: u8, payload: &[u8]) -> [u8; N] {
    debug_assert_eq!(payload.len() + 3, N);
    let mut out = [0u8; N];
    out[0] = header;
    out[1..N - 2].copy_from_slice(payload);
    out[N - 2] = checksum(payload);
    out[N - 1] = MESSAGE_TERMINATOR;
    out
}

/// Checks framing and returns the payload symbols. The terminator may be
/// omitted, as it is in the radio receive buffer.
fn open(message: &[u8], header: u8, full_len: usize) -> Result<&[u8], ProtocolError> {
    if message.len() != full_len && message.len() != full_len - 1 {
        return Err(ProtocolError::WrongLength {
            expected: full_len,
            found: message.len(),
        });
    }
    if message[0] != header {
        return Err(ProtocolError::WrongHeader {
            expected: header,
            found: message[0],
        });
    }
    if message.len() == full_len && message[full_len - 1] != MESSAGE_TERMINATOR {
        return Err(ProtocolError::MissingTerminator);
    }
    Ok(&message[1..full_len - 2])
}

fn expect_payload_len(payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::WrongLength {
            expected,
            found: payload.len(),
        })
    }
}

/// Packs a state snapshot into its eight payload symbols.
///
/// Layout: boards(4) injector(2) vent(2) pressure(10) powered(1) errors(1)
/// bus_mv(14) vent_mv(14). Out-of-range numbers are clamped first.
pub fn pack_state(state: &SystemState) -> [u8; STATE_PAYLOAD_LEN] {
    let state = state.clamped();
    let mut packer = BitPacker::default();
    packer.push(u64::from(state.boards_connected), BOARD_COUNT_BITS);
    packer.push(u64::from(state.injector_valve_state.code()), VALVE_BITS);
    packer.push(u64::from(state.vent_valve_state.code()), VALVE_BITS);
    packer.push(u64::from(state.tank_pressure), PRESSURE_BITS);
    packer.push(u64::from(state.bus_is_powered), FLAG_BITS);
    packer.push(u64::from(state.any_errors_detected), FLAG_BITS);
    packer.push(u64::from(state.bus_battery_mv), MILLIVOLT_BITS);
    packer.push(u64::from(state.vent_battery_mv), MILLIVOLT_BITS);

    let mut payload = [0u8; STATE_PAYLOAD_LEN];
    packer.write_symbols(&mut payload);
    payload
}

pub fn unpack_state(payload: &[u8]) -> Result<SystemState, ProtocolError> {
    expect_payload_len(payload, STATE_PAYLOAD_LEN)?;
    let mut reader = BitReader::from_symbols(payload)?;
    Ok(SystemState {
        boards_connected: reader.take(BOARD_COUNT_BITS) as u8,
        injector_valve_state: ValveState::from_bits(reader.take(VALVE_BITS) as u8),
        vent_valve_state: ValveState::from_bits(reader.take(VALVE_BITS) as u8),
        tank_pressure: reader.take(PRESSURE_BITS) as u16,
        bus_is_powered: reader.take(FLAG_BITS) == 1,
        any_errors_detected: reader.take(FLAG_BITS) == 1,
        bus_battery_mv: reader.take(MILLIVOLT_BITS) as u16,
        vent_battery_mv: reader.take(MILLIVOLT_BITS) as u16,
    })
}

/// Encodes a state message. The same framing carries ground commands and
/// the board's replies to a state request.
pub fn encode_state(state: &SystemState) -> StateMessage {
    seal(STATE_COMMAND_HEADER, &pack_state(state))
}

pub fn decode_state(message: &[u8]) -> Result<SystemState, ProtocolError> {
    unpack_state(open(message, STATE_COMMAND_HEADER, STATE_MESSAGE_LEN)?)
}

/// Layout: board_id(4) kind(6) then the four payload bytes.
pub fn encode_error(record: &ErrorRecord) -> ErrorMessage {
    debug_assert!(record.kind().fits_wire(), "kind {:?} wider than 6 bits", record.kind());
    let mut packer = BitPacker::default();
    packer.push(u64::from(record.board_id()) & field_mask(BOARD_ID_BITS), BOARD_ID_BITS);
    packer.push(
        u64::from(record.kind().code()) & field_mask(ERROR_KIND_BITS),
        ERROR_KIND_BITS,
    );
    for byte in record.payload() {
        packer.push(u64::from(byte), BYTE_BITS);
    }

    let mut payload = [0u8; ERROR_PAYLOAD_LEN];
    packer.write_symbols(&mut payload);
    seal(ERROR_HEADER, &payload)
}

pub fn decode_error(message: &[u8]) -> Result<ErrorRecord, ProtocolError> {
    let payload = open(message, ERROR_HEADER, ERROR_MESSAGE_LEN)?;
    let mut reader = BitReader::from_symbols(payload)?;
    let board_id = reader.take(BOARD_ID_BITS) as u8;
    let kind = ErrorKind::from_code(reader.take(ERROR_KIND_BITS) as u8);
    let mut bytes = [0u8; 4];
    for byte in &mut bytes {
        *byte = reader.take(BYTE_BITS) as u8;
    }
    Ok(ErrorRecord::new(board_id, kind, bytes))
}

/// Layout: six position bytes (lat deg/min/dmin, lon deg/min/dmin) in eight
/// symbols, then one symbol whose bit 1 is set for `S` and bit 0 for `W`.
///
/// Fails if either direction byte is not legal for its axis.
pub fn encode_gps(fix: &GpsFix) -> Result<GpsMessage, ProtocolError> {
    if !is_latitude_direction(fix.lat_direction) {
        return Err(ProtocolError::InvalidHemisphere {
            byte: fix.lat_direction,
        });
    }
    if !is_longitude_direction(fix.lon_direction) {
        return Err(ProtocolError::InvalidHemisphere {
            byte: fix.lon_direction,
        });
    }

    let mut packer = BitPacker::default();
    for byte in [
        fix.lat_degrees,
        fix.lat_minutes,
        fix.lat_dminutes,
        fix.lon_degrees,
        fix.lon_minutes,
        fix.lon_dminutes,
    ] {
        packer.push(u64::from(byte), BYTE_BITS);
    }

    let mut payload = [0u8; GPS_PAYLOAD_LEN];
    packer.write_symbols(&mut payload[..GPS_PAYLOAD_LEN - 1]);
    let south = u8::from(fix.lat_direction == b'S');
    let west = u8::from(fix.lon_direction == b'W');
    payload[GPS_PAYLOAD_LEN - 1] = encode_symbol((south << 1) | west);
    Ok(seal(GPS_HEADER, &payload))
}

pub fn decode_gps(message: &[u8]) -> Result<GpsFix, ProtocolError> {
    let payload = open(message, GPS_HEADER, GPS_MESSAGE_LEN)?;
    let (position, hemispheres) = payload.split_at(GPS_PAYLOAD_LEN - 1);
    let mut reader = BitReader::from_symbols(position)?;
    let mut bytes = [0u8; 6];
    for byte in &mut bytes {
        *byte = reader.take(BYTE_BITS) as u8;
    }

    let flags = decode_symbol(hemispheres[0]);
    if flags == INVALID_SYMBOL {
        return Err(ProtocolError::InvalidSymbol {
            byte: hemispheres[0],
        });
    }

    Ok(GpsFix {
        lat_degrees: bytes[0],
        lat_minutes: bytes[1],
        lat_dminutes: bytes[2],
        lat_direction: if flags & 0b10 != 0 { b'S' } else { b'N' },
        lon_degrees: bytes[3],
        lon_minutes: bytes[4],
        lon_dminutes: bytes[5],
        lon_direction: if flags & 0b01 != 0 { b'W' } else { b'E' },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabet_order() {
        assert_eq!(encode_symbol(0), b'A');
        assert_eq!(encode_symbol(25), b'Z');
        assert_eq!(encode_symbol(26), b'a');
        assert_eq!(encode_symbol(51), b'z');
        assert_eq!(encode_symbol(52), b'0');
        assert_eq!(encode_symbol(61), b'9');
        assert_eq!(encode_symbol(62), b'&');
        assert_eq!(encode_symbol(63), b'/');
    }

    #[test]
    fn test_decode_symbol_inverts_encode() {
        for value in 0..64u8 {
            assert_eq!(decode_symbol(encode_symbol(value)), value);
        }
        assert_eq!(decode_symbol(b'+'), INVALID_SYMBOL);
        assert_eq!(decode_symbol(STATE_COMMAND_HEADER), INVALID_SYMBOL);
    }

    #[test]
    fn test_checksum_known_values() {
        // 'B' = 0b01_00_00_10: one high bit, one low bit -> 1 + 3 = 4
        assert_eq!(checksum(b"B"), b'E');
        // 'A' = 0b01_00_00_01: two low bits -> 6 per byte, 48 total
        assert_eq!(checksum(b"AAAAAAAA"), b'w');
        assert_eq!(checksum(b""), b'A');
    }

    #[test]
    fn test_checksum_stops_at_terminator() {
        assert_eq!(checksum(b"AB\nZZZ"), checksum(b"AB"));
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let payload = *b"Qm8/&aZ0";
        let original = checksum(&payload);
        for index in 0..payload.len() {
            for bit in 0..8 {
                let mut corrupted = payload;
                corrupted[index] ^= 1 << bit;
                assert_ne!(checksum(&corrupted), original, "byte {index} bit {bit}");
            }
        }
    }

    #[test]
    fn test_bit_packer_msb_first() {
        let mut packer = BitPacker::default();
        packer.push(0b1, 1);
        packer.push(0, 5);
        packer.push(0b11_1111, 6);
        let mut out = [0u8; 2];
        packer.write_symbols(&mut out);
        assert_eq!(out, [encode_symbol(32), encode_symbol(63)]);
    }

    #[test]
    fn test_open_rejects_bad_framing() {
        let message = encode_state(&SystemState::default());
        assert_eq!(
            decode_error(&message),
            Err(ProtocolError::WrongLength {
                expected: ERROR_MESSAGE_LEN,
                found: STATE_MESSAGE_LEN
            })
        );

        let mut unterminated = message;
        unterminated[STATE_MESSAGE_LEN - 1] = b'x';
        assert_eq!(decode_state(&unterminated), Err(ProtocolError::MissingTerminator));

        let mut wrong_header = message;
        wrong_header[0] = GPS_HEADER;
        assert!(matches!(
            decode_state(&wrong_header),
            Err(ProtocolError::WrongHeader { .. })
        ));
    }
}
