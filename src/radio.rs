use crate::error_log::ErrorLog;
use crate::fault::Anomaly;
use crate::platform::{BatteryMonitor, BusPower, UartTx};
use crate::protocol::{
    checksum_matches, encode_gps, encode_state, unpack_state, STATE_COMMAND_HEADER,
    STATE_MESSAGE_LEN, STATE_REQUEST_HEADER,
};
use crate::supervisor::BusSupervisor;
use crate::types::{SystemState, ValveState};
use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Without a valid ground message for this long the vent fails open.
pub const NO_CONTACT_TIMEOUT_MS: u64 = 10_000;
pub const ERROR_DRAIN_INTERVAL_MS: u64 = 1_000;
pub const GPS_INTERVAL_MS: u64 = 30_000;

// Header and payload; the checksum byte completes the message
const COMMAND_BUFFER_LEN: usize = STATE_MESSAGE_LEN - 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramerState {
    Idle,
    Accumulating,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinkStats {
    pub commands_accepted: u32,
    pub checksum_mismatches: u32,
    pub malformed_commands: u32,
    pub requests_served: u32,
    pub bytes_discarded: u32,
    pub error_packets_sent: u32,
    pub gps_packets_sent: u32,
}

/// Ground-link side of the radio board.
///
/// Bytes are fed in one at a time. A state command is buffered from its
/// header until its checksum byte arrives; anything else outside a command
/// is dropped, so a corrupted message is forgotten at the next header.
#[derive(Debug)]
pub struct RadioLink {
    buffer: ArrayVec<u8, COMMAND_BUFFER_LEN>,
    desired_injector: ValveState,
    desired_vent: ValveState,
    last_contact: Option<u64>,
    last_error_drain: u64,
    last_gps_attempt: u64,
    stats: LinkStats,
}

impl RadioLink {
    pub fn new() -> Self {
        Self {
            buffer: ArrayVec::new(),
            desired_injector: ValveState::Unknown,
            desired_vent: ValveState::Unknown,
            last_contact: None,
            last_error_drain: 0,
            last_gps_attempt: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> FramerState {
        if self.buffer.is_empty() {
            FramerState::Idle
        } else {
            FramerState::Accumulating
        }
    }

    pub fn handle_char<H>(
        &mut self,
        byte: u8,
        now: u64,
        bus: &mut BusSupervisor,
        errors: &mut ErrorLog,
        hw: &mut H,
    ) where
        H: UartTx + BusPower + BatteryMonitor,
    {
        match byte {
            STATE_REQUEST_HEADER => {
                self.discard_partial();
                self.send_state(now, bus, errors, hw);
                self.last_contact = Some(now);
            }
            STATE_COMMAND_HEADER => {
                self.discard_partial();
                self.buffer.push(byte);
            }
            _ if self.buffer.is_empty() => {
                self.stats.bytes_discarded = self.stats.bytes_discarded.wrapping_add(1);
            }
            _ if self.buffer.is_full() => {
                self.complete_command(byte, now, hw);
            }
            _ => self.buffer.push(byte),
        }
    }

    fn discard_partial(&mut self) {
        if !self.buffer.is_empty() {
            trace!(len = self.buffer.len(), "dropping partial command");
            self.stats.bytes_discarded = self.stats.bytes_discarded.wrapping_add(self.buffer.len() as u32);
            self.buffer.clear();
        }
    }

    fn complete_command<H: BusPower>(&mut self, checksum: u8, now: u64, hw: &mut H) {
        let payload = &self.buffer[1..];
        if !checksum_matches(payload, checksum) {
            debug!(checksum, "state command failed checksum");
            self.stats.checksum_mismatches = self.stats.checksum_mismatches.wrapping_add(1);
            self.buffer.clear();
            return;
        }

        let decoded = unpack_state(payload);
        self.buffer.clear();
        match decoded {
            Ok(state) => self.apply_command(&state, now, hw),
            Err(e) => {
                warn!(error = %e, "state command passed checksum but did not decode");
                self.stats.malformed_commands = self.stats.malformed_commands.wrapping_add(1);
            }
        }
    }

    fn apply_command<H: BusPower>(&mut self, state: &SystemState, now: u64, hw: &mut H) {
        debug!(
            injector = %state.injector_valve_state,
            vent = %state.vent_valve_state,
            bus_powered = state.bus_is_powered,
            "ground command accepted"
        );

        self.desired_injector = state.injector_valve_state;
        self.desired_vent = state.vent_valve_state;
        if state.bus_is_powered {
            hw.trigger_powerup();
        } else {
            hw.trigger_shutdown();
        }
        self.last_contact = Some(now);
        self.stats.commands_accepted = self.stats.commands_accepted.wrapping_add(1);
    }

    fn send_state<H>(&mut self, now: u64, bus: &mut BusSupervisor, errors: &mut ErrorLog, hw: &mut H)
    where
        H: UartTx + BusPower + BatteryMonitor,
    {
        let state = SystemState {
            boards_connected: bus.connected_count(now, errors),
            injector_valve_state: bus.injector_valve_state(now, errors),
            vent_valve_state: bus.vent_valve_state(now, errors),
            tank_pressure: bus.tank_pressure(),
            bus_is_powered: hw.is_powered(),
            any_errors_detected: bus.any_errors_active(),
            bus_battery_mv: hw.battery_mv(),
            vent_battery_mv: bus.vent_battery_mv(),
        };

        trace!(?state, "answering state request");
        hw.transmit(&encode_state(&state));
        self.stats.requests_served = self.stats.requests_served.wrapping_add(1);
    }

    pub fn desired_injector_state(&self) -> ValveState {
        self.desired_injector
    }

    /// Last commanded vent position, or `Open` once ground contact has been
    /// lost for [`NO_CONTACT_TIMEOUT_MS`].
    pub fn desired_vent_state(&self, now: u64) -> ValveState {
        if self.contact_lost(now) {
            ValveState::Open
        } else {
            self.desired_vent
        }
    }

    pub fn contact_lost(&self, now: u64) -> bool {
        match self.last_contact {
            Some(at) => now.saturating_sub(at) >= NO_CONTACT_TIMEOUT_MS,
            None => true,
        }
    }

    /// Sends at most one queued error packet per drain interval and the GPS
    /// fix once per GPS interval.
    pub fn heartbeat<H: UartTx>(&mut self, now: u64, bus: &BusSupervisor, errors: &mut ErrorLog, hw: &mut H) {
        if now.saturating_sub(self.last_error_drain) >= ERROR_DRAIN_INTERVAL_MS {
            if let Some(packet) = errors.pop() {
                hw.transmit(&packet);
                self.last_error_drain = now;
                self.stats.error_packets_sent = self.stats.error_packets_sent.wrapping_add(1);
            }
        }

        if now.saturating_sub(self.last_gps_attempt) >= GPS_INTERVAL_MS {
            self.last_gps_attempt = now;
            let Some(fix) = bus.gps_fix() else {
                trace!("no gps fix to send");
                return;
            };

            match encode_gps(&fix) {
                Ok(message) => {
                    hw.transmit(&message);
                    self.stats.gps_packets_sent = self.stats.gps_packets_sent.wrapping_add(1);
                }
                Err(e) => {
                    warn!(error = %e, "could not encode gps fix");
                    errors.raise(
                        Anomaly::EncodingDefect,
                        [fix.lat_direction, fix.lon_direction, 0, 0],
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

impl Default for RadioLink {
    fn default() -> Self {
        Self::new()
    }
}
