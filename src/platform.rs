//! Interfaces to the hardware-facing collaborators.
//!
//! Drivers, interrupt handlers and the bus power sequencer live outside this
//! crate. The core only sees them through these traits, which keeps every
//! component testable on a host with a manually advanced clock.

use crate::can::CanFrame;
use core::convert::Infallible;
use heapless::spsc::Queue;
use thiserror::Error;

/// Monotonic milliseconds since power-up.
pub trait Clock {
    fn millis(&self) -> u64;
}

/// Frames received from the bus, in arrival order.
pub trait CanRx {
    /// `WouldBlock` when the receive queue is empty.
    fn pop_frame(&mut self) -> nb::Result<CanFrame, Infallible>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("CAN transmit queue is full")]
pub struct TxQueueFull;

pub trait CanTx {
    fn enqueue(&mut self, frame: CanFrame) -> Result<(), TxQueueFull>;
}

/// Bytes received from the ground radio.
pub trait UartRx {
    /// `WouldBlock` when no byte is waiting.
    fn read_byte(&mut self) -> nb::Result<u8, Infallible>;
}

/// Bytes destined for the ground radio. Buffered, never blocks.
pub trait UartTx {
    fn transmit(&mut self, bytes: &[u8]);
}

/// Bus power sequencer.
pub trait BusPower {
    fn is_powered(&self) -> bool;
    fn trigger_powerup(&mut self);
    fn trigger_shutdown(&mut self);
}

/// Scaled battery voltage from the analog front end.
pub trait BatteryMonitor {
    fn battery_mv(&self) -> u16;
}

/// Everything the main loop needs from the board.
pub trait Platform: Clock + CanRx + CanTx + UartRx + UartTx + BusPower + BatteryMonitor {}

impl<T> Platform for T where T: Clock + CanRx + CanTx + UartRx + UartTx + BusPower + BatteryMonitor {}

impl<const N: usize> CanRx for Queue<CanFrame, N> {
    fn pop_frame(&mut self) -> nb::Result<CanFrame, Infallible> {
        self.dequeue().ok_or(nb::Error::WouldBlock)
    }
}

impl<const N: usize> CanTx for Queue<CanFrame, N> {
    fn enqueue(&mut self, frame: CanFrame) -> Result<(), TxQueueFull> {
        Queue::enqueue(self, frame).map_err(|_| TxQueueFull)
    }
}

impl<const N: usize> UartRx for Queue<u8, N> {
    fn read_byte(&mut self) -> nb::Result<u8, Infallible> {
        self.dequeue().ok_or(nb::Error::WouldBlock)
    }
}
