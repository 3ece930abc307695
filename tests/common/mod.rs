#![allow(dead_code)]

use heapless::spsc::Queue;
use radioboard::can::{build_board_status, build_valve_status, CanFrame};
use radioboard::platform::{BatteryMonitor, BusPower, CanRx, CanTx, Clock, TxQueueFull, UartRx, UartTx};
use radioboard::protocol::{encode_state, MESSAGE_TERMINATOR};
use radioboard::types::{SystemState, ValveKind, ValveState};
use radioboard::{BusSupervisor, ErrorKind, ErrorLog, RadioLink};
use std::convert::Infallible;

pub const MOCK_BATTERY_MV: u16 = 11_800;

/// Platform double with a manually advanced clock.
pub struct MockPlatform {
    pub now: u64,
    pub can_rx: Queue<CanFrame, 64>,
    pub can_tx: Queue<CanFrame, 64>,
    pub uart_rx: Queue<u8, 256>,
    pub uart_tx: Vec<u8>,
    pub powered: bool,
    pub powerups: u32,
    pub shutdowns: u32,
    pub battery_mv: u16,
    pub reject_tx: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            now: 0,
            can_rx: Queue::new(),
            can_tx: Queue::new(),
            uart_rx: Queue::new(),
            uart_tx: Vec::new(),
            powered: false,
            powerups: 0,
            shutdowns: 0,
            battery_mv: MOCK_BATTERY_MV,
            reject_tx: false,
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }

    pub fn push_frame(&mut self, frame: CanFrame) {
        self.can_rx.enqueue(frame).expect("mock CAN receive queue full");
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.uart_rx.enqueue(byte).expect("mock UART receive queue full");
        }
    }

    /// Everything transmitted to the ground so far, split into messages.
    pub fn take_messages(&mut self) -> Vec<Vec<u8>> {
        let bytes = std::mem::take(&mut self.uart_tx);
        bytes
            .split_inclusive(|&b| b == MESSAGE_TERMINATOR)
            .map(<[u8]>::to_vec)
            .collect()
    }

    pub fn take_can_tx(&mut self) -> Vec<CanFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.can_tx.dequeue() {
            frames.push(frame);
        }
        frames
    }
}

impl Clock for MockPlatform {
    fn millis(&self) -> u64 {
        self.now
    }
}

impl CanRx for MockPlatform {
    fn pop_frame(&mut self) -> nb::Result<CanFrame, Infallible> {
        self.can_rx.pop_frame()
    }
}

impl CanTx for MockPlatform {
    fn enqueue(&mut self, frame: CanFrame) -> Result<(), TxQueueFull> {
        if self.reject_tx {
            return Err(TxQueueFull);
        }
        CanTx::enqueue(&mut self.can_tx, frame)
    }
}

impl UartRx for MockPlatform {
    fn read_byte(&mut self) -> nb::Result<u8, Infallible> {
        self.uart_rx.read_byte()
    }
}

impl UartTx for MockPlatform {
    fn transmit(&mut self, bytes: &[u8]) {
        self.uart_tx.extend_from_slice(bytes);
    }
}

impl BusPower for MockPlatform {
    fn is_powered(&self) -> bool {
        self.powered
    }

    fn trigger_powerup(&mut self) {
        self.powered = true;
        self.powerups += 1;
    }

    fn trigger_shutdown(&mut self) {
        self.powered = false;
        self.shutdowns += 1;
    }
}

impl BatteryMonitor for MockPlatform {
    fn battery_mv(&self) -> u16 {
        self.battery_mv
    }
}

/// The components a test drives by hand instead of through `RadioBoard`.
pub struct Rig {
    pub bus: BusSupervisor,
    pub radio: RadioLink,
    pub errors: ErrorLog,
    pub hw: MockPlatform,
}

impl Rig {
    pub fn new() -> Self {
        let mut rig = Self {
            bus: BusSupervisor::new(),
            radio: RadioLink::new(),
            errors: ErrorLog::new(),
            hw: MockPlatform::new(),
        };
        rig.bus.init();
        rig.radio.init();
        rig.errors.init();
        rig
    }

    pub fn frame(&mut self, frame: CanFrame) {
        let now = self.hw.now;
        self.bus.handle_frame(&frame, now, &mut self.errors);
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        let now = self.hw.now;
        for &byte in bytes {
            self.radio
                .handle_char(byte, now, &mut self.bus, &mut self.errors, &mut self.hw);
        }
    }

    pub fn command(&mut self, injector: ValveState, vent: ValveState, powered: bool) {
        self.bytes(&state_command(injector, vent, powered));
    }

    pub fn heartbeat(&mut self) {
        let now = self.hw.now;
        self.radio.heartbeat(now, &self.bus, &mut self.errors, &mut self.hw);
    }
}

pub fn state_command(injector: ValveState, vent: ValveState, powered: bool) -> Vec<u8> {
    encode_state(&SystemState {
        injector_valve_state: injector,
        vent_valve_state: vent,
        bus_is_powered: powered,
        ..SystemState::default()
    })
    .to_vec()
}

pub fn nominal(board_id: u8, now: u64) -> CanFrame {
    build_board_status(board_id, now, ErrorKind::Nominal, [0; 4]).unwrap()
}

pub fn valve_report(kind: ValveKind, board_id: u8, now: u64, state: ValveState) -> CanFrame {
    build_valve_status(kind, board_id, now, state).unwrap()
}
