use radioboard::protocol::encode_state;
use radioboard::types::{SystemState, ValveState};
use std::process::Command;

fn radioctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_radioctl"))
}

#[test]
fn test_json_decode_keeps_stdout_clean() {
    let state = SystemState {
        boards_connected: 4,
        injector_valve_state: ValveState::Closed,
        vent_valve_state: ValveState::Open,
        tank_pressure: 420,
        bus_is_powered: true,
        any_errors_detected: false,
        bus_battery_mv: 11_900,
        vent_battery_mv: 7_600,
    };
    let message = encode_state(&state);
    let text = std::str::from_utf8(&message[..message.len() - 1]).unwrap();

    let output = radioctl().args(["--format", "json", "decode", text]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["type"], "state");
    assert_eq!(json["checksum_ok"], true);
    assert_eq!(json["state"]["tank_pressure"], 420);
}

#[test]
fn test_connection_failure_is_logged_to_stderr() {
    // Nothing listens on port 1
    let output = radioctl()
        .args(["--format", "json", "--port", "1", "request"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bridge connection failed"));
}
