use crate::error_log::ErrorLog;
use crate::platform::Platform;
use crate::radio::{LinkStats, RadioLink};
use crate::reconciler::{Reconciler, ReconcilerStats};
use crate::supervisor::{BoardRecord, BusSupervisor, FrameDisposition, SupervisorStats};
use crate::types::{GpsFix, SystemState, ValveState};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

// Bounds on work done per poll so a flooded queue cannot starve the heartbeats
pub const MAX_FRAMES_PER_POLL: usize = 32;
pub const MAX_BYTES_PER_POLL: usize = 64;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PollStats {
    pub polls: u64,
    pub frames_processed: u64,
    pub bytes_processed: u64,
    pub relay_bytes: u64,
}

/// Serializable view of the whole board for host tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub uptime_ms: u64,
    pub observed: SystemState,
    pub desired_injector: ValveState,
    pub desired_vent: ValveState,
    pub contact_lost: bool,
    pub gps_fix: Option<GpsFix>,
    pub pending_errors: usize,
    pub boards: Vec<(u8, BoardRecord)>,
    pub poll: PollStats,
    pub link: LinkStats,
    pub supervisor: SupervisorStats,
    pub reconciler: ReconcilerStats,
}

/// The radio board's main loop: owns every component and wires them to the
/// platform in a fixed order each poll.
#[derive(Debug, Default)]
pub struct RadioBoard {
    bus: BusSupervisor,
    radio: RadioLink,
    reconciler: Reconciler,
    errors: ErrorLog,
    stats: PollStats,
}

impl RadioBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every table. Must be called once after power-up.
    pub fn init(&mut self) {
        self.bus.init();
        self.radio.init();
        self.reconciler.init();
        self.errors.init();
        self.stats = PollStats::default();
        info!("radio board initialised");
    }

    /// One main-loop iteration: bus frames, ground bytes, then both
    /// heartbeats.
    pub fn poll<P: Platform>(&mut self, hw: &mut P) {
        self.stats.polls = self.stats.polls.wrapping_add(1);

        for _ in 0..MAX_FRAMES_PER_POLL {
            let Ok(frame) = hw.pop_frame() else { break };
            let now = hw.millis();
            self.stats.frames_processed = self.stats.frames_processed.wrapping_add(1);

            if let FrameDisposition::Relay(bytes) = self.bus.handle_frame(&frame, now, &mut self.errors) {
                // Replayed bytes never re-enter the bus path
                for byte in bytes {
                    self.stats.relay_bytes = self.stats.relay_bytes.wrapping_add(1);
                    self.radio
                        .handle_char(byte, now, &mut self.bus, &mut self.errors, hw);
                }
            }
        }

        for _ in 0..MAX_BYTES_PER_POLL {
            let Ok(byte) = hw.read_byte() else { break };
            let now = hw.millis();
            self.stats.bytes_processed = self.stats.bytes_processed.wrapping_add(1);
            self.radio
                .handle_char(byte, now, &mut self.bus, &mut self.errors, hw);
        }

        let now = hw.millis();
        self.radio.heartbeat(now, &self.bus, &mut self.errors, hw);
        self.reconciler
            .heartbeat(now, &self.radio, &mut self.bus, &mut self.errors, hw);
        trace!(now, pending_errors = self.errors.len(), "poll complete");
    }

    pub fn snapshot<P: Platform>(&mut self, hw: &P) -> BoardSnapshot {
        let now = hw.millis();
        let observed = SystemState {
            boards_connected: self.bus.connected_count(now, &mut self.errors),
            injector_valve_state: self.bus.injector_valve_state(now, &mut self.errors),
            vent_valve_state: self.bus.vent_valve_state(now, &mut self.errors),
            tank_pressure: self.bus.tank_pressure(),
            bus_is_powered: hw.is_powered(),
            any_errors_detected: self.bus.any_errors_active(),
            bus_battery_mv: hw.battery_mv(),
            vent_battery_mv: self.bus.vent_battery_mv(),
        }
        .clamped();

        BoardSnapshot {
            uptime_ms: now,
            observed,
            desired_injector: self.radio.desired_injector_state(),
            desired_vent: self.radio.desired_vent_state(now),
            contact_lost: self.radio.contact_lost(now),
            gps_fix: self.bus.gps_fix(),
            pending_errors: self.errors.len(),
            boards: self.bus.boards().filter(|(_, board)| board.valid).collect(),
            poll: self.stats,
            link: *self.radio.stats(),
            supervisor: *self.bus.stats(),
            reconciler: *self.reconciler.stats(),
        }
    }

    pub fn bus(&self) -> &BusSupervisor {
        &self.bus
    }

    pub fn radio(&self) -> &RadioLink {
        &self.radio
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }
}
