use crate::can::build_valve_command;
use crate::error_log::ErrorLog;
use crate::fault::Anomaly;
use crate::platform::CanTx;
use crate::radio::RadioLink;
use crate::supervisor::BusSupervisor;
use crate::types::{ValveKind, ValveState};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Minimum spacing between two commands to the same valve.
pub const VALVE_COMMAND_INTERVAL_MS: u64 = 100;
/// The vent is re-commanded this often even when it already matches.
pub const VENT_REASSERT_INTERVAL_MS: u64 = 750;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReconcilerStats {
    pub commands_sent: u32,
    pub commands_rate_limited: u32,
    pub vent_reassertions: u32,
    pub build_failures: u32,
    pub tx_queue_full: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct CommandWindow {
    last_attempt: Option<u64>,
}

impl CommandWindow {
    fn is_open(&self, now: u64) -> bool {
        match self.last_attempt {
            Some(at) => now.saturating_sub(at) >= VALVE_COMMAND_INTERVAL_MS,
            None => true,
        }
    }

    fn elapsed_at_least(&self, now: u64, interval: u64) -> bool {
        match self.last_attempt {
            Some(at) => now.saturating_sub(at) >= interval,
            None => true,
        }
    }
}

/// Drives the valves toward the positions the ground asked for.
#[derive(Debug, Default)]
pub struct Reconciler {
    injector: CommandWindow,
    vent: CommandWindow,
    stats: ReconcilerStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        *self = Self::new();
    }

    pub fn heartbeat<T: CanTx>(
        &mut self,
        now: u64,
        radio: &RadioLink,
        bus: &mut BusSupervisor,
        errors: &mut ErrorLog,
        tx: &mut T,
    ) {
        let desired = radio.desired_injector_state();
        let observed = bus.injector_valve_state(now, errors);
        if desired != observed {
            self.command(ValveKind::Injector, desired, now, errors, tx);
        }

        let desired = radio.desired_vent_state(now);
        let observed = bus.vent_valve_state(now, errors);
        if desired != observed {
            self.command(ValveKind::Vent, desired, now, errors, tx);
        } else if self.vent.elapsed_at_least(now, VENT_REASSERT_INTERVAL_MS) {
            self.stats.vent_reassertions = self.stats.vent_reassertions.wrapping_add(1);
            self.command(ValveKind::Vent, desired, now, errors, tx);
        }
    }

    fn window_mut(&mut self, kind: ValveKind) -> &mut CommandWindow {
        match kind {
            ValveKind::Injector => &mut self.injector,
            ValveKind::Vent => &mut self.vent,
        }
    }

    fn command<T: CanTx>(
        &mut self,
        kind: ValveKind,
        state: ValveState,
        now: u64,
        errors: &mut ErrorLog,
        tx: &mut T,
    ) {
        let window = self.window_mut(kind);
        if !window.is_open(now) {
            self.stats.commands_rate_limited = self.stats.commands_rate_limited.wrapping_add(1);
            return;
        }
        window.last_attempt = Some(now);

        let frame = match build_valve_command(kind, state, now) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(?kind, error = %e, "could not build valve command");
                self.stats.build_failures = self.stats.build_failures.wrapping_add(1);
                errors.raise(Anomaly::EncodingDefect, [kind_tag(kind), state.code(), 0, 0]);
                return;
            }
        };

        match tx.enqueue(frame) {
            Ok(()) => {
                debug!(?kind, %state, "valve command queued");
                self.stats.commands_sent = self.stats.commands_sent.wrapping_add(1);
            }
            Err(e) => {
                warn!(?kind, error = %e, "valve command dropped");
                self.stats.tx_queue_full = self.stats.tx_queue_full.wrapping_add(1);
            }
        }
    }

    pub fn stats(&self) -> &ReconcilerStats {
        &self.stats
    }
}

fn kind_tag(kind: ValveKind) -> u8 {
    match kind {
        ValveKind::Injector => 0,
        ValveKind::Vent => 1,
    }
}
