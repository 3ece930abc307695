use radioboard::fault::{ErrorKind, ErrorRecord};
use radioboard::protocol::*;
use radioboard::types::{GpsFix, SystemState, ValveState};

fn sample_state() -> SystemState {
    SystemState {
        boards_connected: 6,
        injector_valve_state: ValveState::Closed,
        vent_valve_state: ValveState::Open,
        tank_pressure: 731,
        bus_is_powered: true,
        any_errors_detected: false,
        bus_battery_mv: 12_004,
        vent_battery_mv: 8_190,
    }
}

fn sample_fix() -> GpsFix {
    GpsFix {
        lat_degrees: 32,
        lat_minutes: 59,
        lat_dminutes: 41,
        lat_direction: b'N',
        lon_degrees: 106,
        lon_minutes: 58,
        lon_dminutes: 12,
        lon_direction: b'W',
    }
}

#[test]
fn test_state_message_framing() {
    let message = encode_state(&sample_state());

    assert_eq!(message.len(), STATE_MESSAGE_LEN);
    assert_eq!(message[0], STATE_COMMAND_HEADER);
    assert_eq!(message[STATE_MESSAGE_LEN - 1], MESSAGE_TERMINATOR);
    assert!(message[1..STATE_MESSAGE_LEN - 1].iter().all(|&b| is_alphabet_symbol(b)));
    assert_eq!(
        message[STATE_MESSAGE_LEN - 2],
        checksum(&message[1..STATE_MESSAGE_LEN - 2])
    );
}

#[test]
fn test_state_round_trip_at_field_limits() {
    let states = [
        SystemState::default(),
        sample_state(),
        SystemState {
            boards_connected: 15,
            injector_valve_state: ValveState::Illegal,
            vent_valve_state: ValveState::Unknown,
            tank_pressure: 999,
            bus_is_powered: true,
            any_errors_detected: true,
            bus_battery_mv: 0x3FFF,
            vent_battery_mv: 0x3FFF,
        },
    ];

    for state in states {
        assert_eq!(decode_state(&encode_state(&state)), Ok(state));
    }
}

#[test]
fn test_state_round_trip_across_field_ranges() {
    const VALVES: [ValveState; 4] =
        [ValveState::Open, ValveState::Closed, ValveState::Unknown, ValveState::Illegal];
    let base = sample_state();

    for tank_pressure in 0..=999 {
        let state = SystemState { tank_pressure, ..base };
        assert_eq!(decode_state(&encode_state(&state)), Ok(state));
    }

    for boards_connected in 0..=15 {
        for (bus_is_powered, any_errors_detected) in [(false, false), (true, false), (false, true), (true, true)] {
            let state = SystemState { boards_connected, bus_is_powered, any_errors_detected, ..base };
            assert_eq!(decode_state(&encode_state(&state)), Ok(state));
        }
    }

    for injector_valve_state in VALVES {
        for vent_valve_state in VALVES {
            let state = SystemState { injector_valve_state, vent_valve_state, ..base };
            assert_eq!(decode_state(&encode_state(&state)), Ok(state));
        }
    }

    for bus_battery_mv in [0, 1, 0x1FFF, 0x3FFF] {
        for vent_battery_mv in [0, 1, 0x1FFF, 0x3FFF] {
            let state = SystemState { bus_battery_mv, vent_battery_mv, ..base };
            assert_eq!(decode_state(&encode_state(&state)), Ok(state));
        }
    }
}

#[test]
fn test_out_of_range_state_is_clamped_not_wrapped() {
    let state = SystemState {
        boards_connected: 16,
        tank_pressure: 1024,
        bus_battery_mv: 0x4001,
        vent_battery_mv: u16::MAX,
        ..sample_state()
    };

    let decoded = decode_state(&encode_state(&state)).unwrap();
    assert_eq!(decoded.boards_connected, 15);
    assert_eq!(decoded.tank_pressure, 999);
    assert_eq!(decoded.bus_battery_mv, 0x3FFF);
    assert_eq!(decoded.vent_battery_mv, 0x3FFF);
}

#[test]
fn test_symbol_alphabet_order() {
    assert_eq!(encode_symbol(0), b'A');
    assert_eq!(encode_symbol(25), b'Z');
    assert_eq!(encode_symbol(26), b'a');
    assert_eq!(encode_symbol(51), b'z');
    assert_eq!(encode_symbol(52), b'0');
    assert_eq!(encode_symbol(61), b'9');
    assert_eq!(encode_symbol(62), b'&');
    assert_eq!(encode_symbol(63), b'/');

    for value in 0..64u8 {
        assert_eq!(decode_symbol(encode_symbol(value)), value);
    }
    for byte in [b'+', b'=', b' ', STATE_COMMAND_HEADER, MESSAGE_TERMINATOR] {
        assert_eq!(decode_symbol(byte), INVALID_SYMBOL);
    }
}

#[test]
fn test_headers_are_outside_alphabet() {
    for header in [STATE_REQUEST_HEADER, STATE_COMMAND_HEADER, ERROR_HEADER, GPS_HEADER] {
        assert!(!is_alphabet_symbol(header));
    }
}

#[test]
fn test_checksum_detects_single_byte_mutation() {
    let message = encode_state(&sample_state());
    let payload = &message[1..STATE_MESSAGE_LEN - 2];
    let received = message[STATE_MESSAGE_LEN - 2];
    assert!(checksum_matches(payload, received));

    // Flipping the high bit of any 2-bit group moves the total by exactly one
    for index in 0..payload.len() {
        let mut corrupted = payload.to_vec();
        corrupted[index] ^= 0b10;
        assert!(
            !checksum_matches(&corrupted, received),
            "mutation at {} went undetected",
            index
        );
    }
}

#[test]
fn test_checksum_is_deterministic() {
    let payload = b"Hello0&/";
    assert_eq!(checksum(payload), checksum(payload));
    assert_eq!(checksum(b""), b'A');
}

#[test]
fn test_decode_rejects_bad_framing() {
    let mut message = encode_state(&sample_state());

    assert_eq!(
        decode_state(&message[..5]),
        Err(ProtocolError::WrongLength {
            expected: STATE_MESSAGE_LEN,
            found: 5
        })
    );

    message[0] = ERROR_HEADER;
    assert_eq!(
        decode_state(&message),
        Err(ProtocolError::WrongHeader {
            expected: STATE_COMMAND_HEADER,
            found: ERROR_HEADER
        })
    );

    let mut message = encode_state(&sample_state());
    message[3] = b'#';
    assert_eq!(
        decode_state(&message),
        Err(ProtocolError::InvalidSymbol { byte: b'#' })
    );
}

#[test]
fn test_decode_does_not_verify_checksum() {
    let mut message = encode_state(&sample_state());
    let index = STATE_MESSAGE_LEN - 2;
    message[index] = if message[index] == b'A' { b'B' } else { b'A' };
    assert_eq!(decode_state(&message), Ok(sample_state()));
}

#[test]
fn test_error_message_round_trip() {
    let record = ErrorRecord::new(7, ErrorKind::BattUnderVoltage, [47, 123, 0, 0]);
    let message = encode_error(&record);

    assert_eq!(message.len(), ERROR_MESSAGE_LEN);
    assert_eq!(message[0], ERROR_HEADER);
    assert_eq!(decode_error(&message), Ok(record));
}

#[test]
fn test_error_message_keeps_unknown_kinds() {
    let record = ErrorRecord::new(14, ErrorKind::Other(60), [0xFF, 0x00, 0xAA, 0x55]);
    assert_eq!(decode_error(&encode_error(&record)), Ok(record));
}

#[test]
fn test_gps_round_trip_all_hemispheres() {
    for (lat, lon) in [(b'N', b'E'), (b'N', b'W'), (b'S', b'E'), (b'S', b'W')] {
        let fix = GpsFix {
            lat_direction: lat,
            lon_direction: lon,
            ..sample_fix()
        };
        let message = encode_gps(&fix).unwrap();
        assert_eq!(message[0], GPS_HEADER);
        assert_eq!(message.len(), GPS_MESSAGE_LEN);
        assert_eq!(decode_gps(&message), Ok(fix));
    }
}

#[test]
fn test_gps_rejects_illegal_hemisphere() {
    let fix = GpsFix {
        lat_direction: b'E',
        ..sample_fix()
    };
    assert_eq!(
        encode_gps(&fix),
        Err(ProtocolError::InvalidHemisphere { byte: b'E' })
    );

    let fix = GpsFix {
        lon_direction: 0,
        ..sample_fix()
    };
    assert_eq!(encode_gps(&fix), Err(ProtocolError::InvalidHemisphere { byte: 0 }));
}
