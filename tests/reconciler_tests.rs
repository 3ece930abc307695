mod common;

use common::{valve_report, Rig};
use radioboard::can::{CanFrame, MessageType, RADIO_BOARD_ID};
use radioboard::fault::ErrorKind;
use radioboard::protocol::decode_error;
use radioboard::reconciler::*;
use radioboard::types::{ValveKind, ValveState};

fn tick(rig: &mut Rig, reconciler: &mut Reconciler) {
    let now = rig.hw.now;
    reconciler.heartbeat(now, &rig.radio, &mut rig.bus, &mut rig.errors, &mut rig.hw);
}

fn commands_of(frames: &[CanFrame], message_type: MessageType) -> Vec<ValveState> {
    frames
        .iter()
        .filter(|frame| frame.message_type() == Some(message_type))
        .map(|frame| frame.valve_state().unwrap())
        .collect()
}

#[test]
fn test_mismatch_issues_command() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Open, ValveState::Closed, true);

    rig.hw.now = 500;
    tick(&mut rig, &mut reconciler);

    let frames = rig.hw.take_can_tx();
    assert_eq!(commands_of(&frames, MessageType::InjValveCmd), vec![ValveState::Open]);
    assert_eq!(commands_of(&frames, MessageType::VentValveCmd), vec![ValveState::Closed]);
    assert!(frames.iter().all(|frame| frame.board_id() == RADIO_BOARD_ID));
    assert_eq!(frames[0].timestamp(), Ok(500));
}

#[test]
fn test_commands_rate_limited_per_valve() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Open, ValveState::Closed, true);

    rig.hw.now = 1_000;
    tick(&mut rig, &mut reconciler);
    rig.hw.now = 1_050;
    tick(&mut rig, &mut reconciler);

    let frames = rig.hw.take_can_tx();
    assert_eq!(commands_of(&frames, MessageType::InjValveCmd).len(), 1);
    assert_eq!(reconciler.stats().commands_rate_limited, 2);

    rig.hw.now = 1_000 + VALVE_COMMAND_INTERVAL_MS;
    tick(&mut rig, &mut reconciler);
    let frames = rig.hw.take_can_tx();
    assert_eq!(commands_of(&frames, MessageType::InjValveCmd).len(), 1);
}

#[test]
fn test_matching_injector_is_left_alone() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Closed, ValveState::Closed, true);

    for now in (0..2_000).step_by(100) {
        rig.hw.now = now;
        rig.frame(valve_report(ValveKind::Injector, 3, now, ValveState::Closed));
        tick(&mut rig, &mut reconciler);
    }

    let frames = rig.hw.take_can_tx();
    assert!(commands_of(&frames, MessageType::InjValveCmd).is_empty());
}

#[test]
fn test_vent_reasserted_while_matching() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Closed, ValveState::Closed, true);

    let mut sent_at = Vec::new();
    for now in (0..=1_600).step_by(50) {
        rig.hw.now = now;
        rig.frame(valve_report(ValveKind::Vent, 4, now, ValveState::Closed));
        tick(&mut rig, &mut reconciler);
        if !commands_of(&rig.hw.take_can_tx(), MessageType::VentValveCmd).is_empty() {
            sent_at.push(now);
        }
    }

    assert_eq!(sent_at, vec![0, VENT_REASSERT_INTERVAL_MS, 2 * VENT_REASSERT_INTERVAL_MS]);
    assert_eq!(reconciler.stats().vent_reassertions, 3);
}

#[test]
fn test_lost_contact_drives_vent_open() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Closed, ValveState::Closed, true);

    rig.hw.now = 12_000;
    rig.frame(valve_report(ValveKind::Vent, 4, 12_000, ValveState::Closed));
    rig.frame(valve_report(ValveKind::Injector, 3, 12_000, ValveState::Closed));
    tick(&mut rig, &mut reconciler);

    let frames = rig.hw.take_can_tx();
    assert_eq!(commands_of(&frames, MessageType::VentValveCmd), vec![ValveState::Open]);
    assert!(commands_of(&frames, MessageType::InjValveCmd).is_empty());
}

#[test]
fn test_illegal_intent_logged_as_encoding_defect() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Illegal, ValveState::Closed, true);

    rig.hw.now = 200;
    tick(&mut rig, &mut reconciler);

    let frames = rig.hw.take_can_tx();
    assert!(commands_of(&frames, MessageType::InjValveCmd).is_empty());
    assert_eq!(reconciler.stats().build_failures, 1);

    let record = decode_error(&rig.errors.pop().unwrap()).unwrap();
    assert_eq!(record.kind(), ErrorKind::EncodingDefect);
    assert_eq!(record.payload()[1], ValveState::Illegal.code());

    // A failed build still closes the window
    rig.hw.now = 250;
    tick(&mut rig, &mut reconciler);
    assert_eq!(reconciler.stats().build_failures, 1);
}

#[test]
fn test_full_transmit_queue_is_not_an_error_record() {
    let mut rig = Rig::new();
    let mut reconciler = Reconciler::new();
    rig.command(ValveState::Open, ValveState::Closed, true);
    rig.hw.reject_tx = true;

    rig.hw.now = 100;
    tick(&mut rig, &mut reconciler);

    assert_eq!(reconciler.stats().tx_queue_full, 2);
    assert_eq!(reconciler.stats().commands_sent, 0);
    assert!(rig.errors.is_empty());

    // Dropped, not queued for retry inside the window
    rig.hw.reject_tx = false;
    rig.hw.now = 150;
    tick(&mut rig, &mut reconciler);
    assert!(rig.hw.take_can_tx().is_empty());
}
