use crate::can::{AnalogChannel, CanFrame, GpsCoordinate, MessageType, MAX_BOARD_ID, MAX_DATA_LEN, MIN_BOARD_ID};
use crate::error_log::ErrorLog;
use crate::fault::{Anomaly, ErrorRecord};
use crate::types::{is_latitude_direction, is_longitude_direction, GpsFix, ValveKind, ValveState};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A board that has been silent this long is presumed dead.
pub const BOARD_HEARTBEAT_TIMEOUT_MS: u64 = 5000;
/// A valve reading older than this is treated as unknown.
pub const VALVE_UPDATE_TIMEOUT_MS: u64 = 3000;
/// Nominal reports a board must send in a row before its errors are cleared.
pub const MAX_CONSECUTIVE_NOMINALS: u8 = 20;

const BOARD_SLOTS: usize = MAX_BOARD_ID as usize + 1;

pub type RelayPayload = Vec<u8, MAX_DATA_LEN>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub valid: bool,
    pub last_seen: u64,
    pub consecutive_nominal: u8,
}

/// What the supervisor did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    Handled,
    Ignored,
    /// Dropped and logged as a protocol violation.
    Rejected,
    /// Ground-link bytes to be replayed into the radio link.
    Relay(RelayPayload),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SupervisorStats {
    pub frames_handled: u32,
    pub frames_ignored: u32,
    pub frames_relayed: u32,
    pub protocol_violations: u32,
    pub boards_presumed_dead: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ValveTracker {
    bound_board: Option<u8>,
    state: ValveState,
}

#[derive(Debug, Clone, Copy)]
enum GpsAxis {
    Latitude,
    Longitude,
}

/// Tracks which boards are alive and caches what they last reported.
///
/// Timeouts are evaluated lazily whenever a liveness-dependent accessor is
/// called; nothing here runs on its own.
#[derive(Debug)]
pub struct BusSupervisor {
    boards: [BoardRecord; BOARD_SLOTS],
    injector: ValveTracker,
    vent: ValveTracker,
    tank_pressure: u16,
    injector_battery_mv: u16,
    vent_battery_mv: u16,
    gps_latitude: Option<GpsCoordinate>,
    gps_longitude: Option<GpsCoordinate>,
    errors_active: bool,
    stats: SupervisorStats,
}

impl BusSupervisor {
    pub fn new() -> Self {
        Self {
            boards: [BoardRecord::default(); BOARD_SLOTS],
            injector: ValveTracker::default(),
            vent: ValveTracker::default(),
            tank_pressure: 0,
            injector_battery_mv: 0,
            vent_battery_mv: 0,
            gps_latitude: None,
            gps_longitude: None,
            errors_active: false,
            stats: SupervisorStats::default(),
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn handle_frame(
        &mut self,
        frame: &CanFrame,
        now: u64,
        errors: &mut ErrorLog,
    ) -> FrameDisposition {
        let Some(message_type) = frame.message_type() else {
            // Foreign traffic on a shared bus is expected
            trace!(sid = frame.sid(), "ignoring unrecognized message type");
            self.stats.frames_ignored = self.stats.frames_ignored.wrapping_add(1);
            return FrameDisposition::Ignored;
        };

        let sender = match message_type {
            MessageType::DebugMsg
            | MessageType::DebugPrintf
            | MessageType::LedsOn
            | MessageType::LedsOff => {
                self.stats.frames_ignored = self.stats.frames_ignored.wrapping_add(1);
                return FrameDisposition::Ignored;
            }
            MessageType::DebugRadioRelay => return self.relay(frame, errors),
            _ => match self.accept_sender(frame, now, errors) {
                Some(sender) => sender,
                None => return FrameDisposition::Rejected,
            },
        };

        match message_type {
            MessageType::GeneralBoardStatus => self.handle_board_status(sender, frame, now, errors),
            MessageType::InjValveStatus => {
                self.handle_valve_status(ValveKind::Injector, sender, frame, errors);
            }
            MessageType::VentValveStatus => {
                self.handle_valve_status(ValveKind::Vent, sender, frame, errors);
            }
            MessageType::SensorAnalog => self.handle_analog(sender, frame, errors),
            MessageType::GpsLatitude => self.handle_gps(GpsAxis::Latitude, sender, frame, errors),
            MessageType::GpsLongitude => self.handle_gps(GpsAxis::Longitude, sender, frame, errors),
            MessageType::VentValveCmd
            | MessageType::InjValveCmd
            | MessageType::GeneralCmd
            | MessageType::SensorAcc
            | MessageType::SensorGyro
            | MessageType::SensorMag
            | MessageType::GpsTimestamp
            | MessageType::GpsAltitude
            | MessageType::GpsInfo => {}
            // Dispatched before the sender was accepted
            MessageType::DebugMsg
            | MessageType::DebugPrintf
            | MessageType::LedsOn
            | MessageType::LedsOff
            | MessageType::DebugRadioRelay => {}
        }

        self.stats.frames_handled = self.stats.frames_handled.wrapping_add(1);
        FrameDisposition::Handled
    }

    fn relay(&mut self, frame: &CanFrame, errors: &mut ErrorLog) -> FrameDisposition {
        match RelayPayload::from_slice(frame.data()) {
            Ok(payload) => {
                trace!(len = payload.len(), "relaying ground-link bytes from bus");
                self.stats.frames_relayed = self.stats.frames_relayed.wrapping_add(1);
                FrameDisposition::Relay(payload)
            }
            Err(()) => {
                self.report_violation(frame.board_id(), frame, errors);
                FrameDisposition::Rejected
            }
        }
    }

    /// Validates the sender id and refreshes its liveness.
    fn accept_sender(&mut self, frame: &CanFrame, now: u64, errors: &mut ErrorLog) -> Option<u8> {
        let sender = frame.board_id();
        if !(MIN_BOARD_ID..=MAX_BOARD_ID).contains(&sender) {
            self.report_violation(sender, frame, errors);
            return None;
        }

        let board = &mut self.boards[usize::from(sender)];
        if !board.valid {
            debug!(board = sender, "board connected");
        }
        board.valid = true;
        board.last_seen = now;
        Some(sender)
    }

    fn handle_board_status(&mut self, sender: u8, frame: &CanFrame, now: u64, errors: &mut ErrorLog) {
        let (kind, payload) = match frame.board_status() {
            Ok(status) => status,
            Err(_) => {
                self.report_violation(sender, frame, errors);
                return;
            }
        };

        let board = &mut self.boards[usize::from(sender)];
        if kind.is_nominal() {
            board.consecutive_nominal = board
                .consecutive_nominal
                .saturating_add(1)
                .min(MAX_CONSECUTIVE_NOMINALS);
            if board.consecutive_nominal == MAX_CONSECUTIVE_NOMINALS {
                self.refresh_errors_active(now, errors);
            }
        } else {
            board.consecutive_nominal = 0;
            self.errors_active = true;
            if !kind.fits_wire() {
                self.report_violation_with(sender, frame, kind.code(), errors);
                return;
            }
            warn!(board = sender, kind = ?kind, "board reported an error");
            errors.push(&ErrorRecord::new(sender, kind, payload));
        }
    }

    fn handle_valve_status(
        &mut self,
        kind: ValveKind,
        sender: u8,
        frame: &CanFrame,
        errors: &mut ErrorLog,
    ) {
        let tracker = self.tracker_mut(kind);
        match tracker.bound_board {
            Some(bound) if bound != sender => {
                warn!(?kind, bound, sender, "second board reporting the same valve");
                self.report_violation(sender, frame, errors);
                return;
            }
            Some(_) => {}
            None => {
                debug!(?kind, board = sender, "valve reporter bound");
                tracker.bound_board = Some(sender);
            }
        }

        match frame.valve_state() {
            Ok(state) => self.tracker_mut(kind).state = state,
            Err(_) => self.report_violation(sender, frame, errors),
        }
    }

    fn handle_analog(&mut self, sender: u8, frame: &CanFrame, errors: &mut ErrorLog) {
        let (sensor_id, value) = match frame.analog_reading() {
            Ok(reading) => reading,
            Err(_) => {
                self.report_violation(sender, frame, errors);
                return;
            }
        };

        match AnalogChannel::from_sensor_id(sensor_id) {
            Some(AnalogChannel::TankPressure) => self.tank_pressure = value,
            Some(AnalogChannel::InjectorBattery) => self.injector_battery_mv = value,
            Some(AnalogChannel::VentBattery) => self.vent_battery_mv = value,
            None => trace!(board = sender, sensor_id, "analog channel not tracked"),
        }
    }

    fn handle_gps(&mut self, axis: GpsAxis, sender: u8, frame: &CanFrame, errors: &mut ErrorLog) {
        let coordinate = match frame.gps_coordinate() {
            Ok(coordinate) => coordinate,
            Err(_) => {
                self.report_violation(sender, frame, errors);
                return;
            }
        };

        let legal = match axis {
            GpsAxis::Latitude => is_latitude_direction(coordinate.direction),
            GpsAxis::Longitude => is_longitude_direction(coordinate.direction),
        };
        if !legal {
            self.report_violation(sender, frame, errors);
            return;
        }

        match axis {
            GpsAxis::Latitude => self.gps_latitude = Some(coordinate),
            GpsAxis::Longitude => self.gps_longitude = Some(coordinate),
        }
    }

    fn report_violation(&mut self, sender: u8, frame: &CanFrame, errors: &mut ErrorLog) {
        self.report_violation_with(sender, frame, 0, errors);
    }

    /// Payload is sender, message type, data length and an offending byte.
    fn report_violation_with(&mut self, sender: u8, frame: &CanFrame, detail: u8, errors: &mut ErrorLog) {
        self.stats.protocol_violations = self.stats.protocol_violations.wrapping_add(1);
        let type_code = (frame.type_bits() >> 5) as u8;
        warn!(sender, sid = frame.sid(), detail, "protocol violation on bus");
        errors.raise(
            Anomaly::ProtocolViolation,
            [sender, type_code, frame.data().len() as u8, detail],
        );
    }

    fn tracker_mut(&mut self, kind: ValveKind) -> &mut ValveTracker {
        match kind {
            ValveKind::Injector => &mut self.injector,
            ValveKind::Vent => &mut self.vent,
        }
    }

    /// Invalidates every board whose heartbeat has lapsed, logging each one
    /// once, and returns how many remain connected.
    fn expire_boards(&mut self, now: u64, errors: &mut ErrorLog) -> u8 {
        let mut connected = 0;
        for id in MIN_BOARD_ID..=MAX_BOARD_ID {
            let board = &mut self.boards[usize::from(id)];
            if !board.valid {
                continue;
            }
            if now.saturating_sub(board.last_seen) >= BOARD_HEARTBEAT_TIMEOUT_MS {
                board.valid = false;
                self.stats.boards_presumed_dead = self.stats.boards_presumed_dead.wrapping_add(1);
                warn!(board = id, last_seen = board.last_seen, "board presumed dead");
                errors.raise(Anomaly::BoardPresumedDead, [id, 0, 0, 0]);
            } else {
                connected += 1;
            }
        }
        connected
    }

    fn refresh_errors_active(&mut self, now: u64, errors: &mut ErrorLog) {
        self.expire_boards(now, errors);
        let all_nominal = self
            .boards
            .iter()
            .filter(|board| board.valid)
            .all(|board| board.consecutive_nominal >= MAX_CONSECUTIVE_NOMINALS);
        if self.errors_active && all_nominal {
            debug!("all boards nominal, clearing error flag");
            self.errors_active = false;
        }
    }

    pub fn connected_count(&mut self, now: u64, errors: &mut ErrorLog) -> u8 {
        self.expire_boards(now, errors)
    }

    /// Last reported position of a valve, or `Unknown` if no board is bound
    /// to it or the bound board has gone quiet.
    pub fn valve_state(&mut self, kind: ValveKind, now: u64, errors: &mut ErrorLog) -> ValveState {
        self.expire_boards(now, errors);
        let tracker = match kind {
            ValveKind::Injector => self.injector,
            ValveKind::Vent => self.vent,
        };

        let stale = match tracker.bound_board {
            None => true,
            Some(id) => {
                let board = self.boards[usize::from(id)];
                !board.valid || now.saturating_sub(board.last_seen) >= VALVE_UPDATE_TIMEOUT_MS
            }
        };
        if stale {
            self.tracker_mut(kind).state = ValveState::Unknown;
        }
        self.tracker_mut(kind).state
    }

    pub fn injector_valve_state(&mut self, now: u64, errors: &mut ErrorLog) -> ValveState {
        self.valve_state(ValveKind::Injector, now, errors)
    }

    pub fn vent_valve_state(&mut self, now: u64, errors: &mut ErrorLog) -> ValveState {
        self.valve_state(ValveKind::Vent, now, errors)
    }

    pub fn bound_board(&self, kind: ValveKind) -> Option<u8> {
        match kind {
            ValveKind::Injector => self.injector.bound_board,
            ValveKind::Vent => self.vent.bound_board,
        }
    }

    pub fn any_errors_active(&self) -> bool {
        self.errors_active
    }

    pub fn tank_pressure(&self) -> u16 {
        self.tank_pressure
    }

    pub fn injector_battery_mv(&self) -> u16 {
        self.injector_battery_mv
    }

    pub fn vent_battery_mv(&self) -> u16 {
        self.vent_battery_mv
    }

    /// The last complete fix, once both axes have been received.
    pub fn gps_fix(&self) -> Option<GpsFix> {
        let lat = self.gps_latitude?;
        let lon = self.gps_longitude?;
        Some(GpsFix {
            lat_degrees: lat.degrees,
            lat_minutes: lat.minutes,
            lat_dminutes: lat.dminutes,
            lat_direction: lat.direction,
            lon_degrees: lon.degrees,
            lon_minutes: lon.minutes,
            lon_dminutes: lon.dminutes,
            lon_direction: lon.direction,
        })
    }

    /// Board table as last evaluated, without applying timeouts.
    pub fn boards(&self) -> impl Iterator<Item = (u8, BoardRecord)> + '_ {
        (MIN_BOARD_ID..=MAX_BOARD_ID).map(move |id| (id, self.boards[usize::from(id)]))
    }

    pub fn stats(&self) -> &SupervisorStats {
        &self.stats
    }
}

impl Default for BusSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
