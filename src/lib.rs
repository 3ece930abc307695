//! # Radio Board Core
//!
//! Protocol and reconciliation stack for a rocket-avionics radio board that
//! bridges a serial ground radio to the vehicle's CAN bus.
//!
//! ## Features
//!
//! - **Wire codec**: bit-packed state, error and GPS messages over a 64-symbol alphabet
//! - **Bus supervision**: per-board liveness, cached valve/sensor/GPS state, sticky error flag
//! - **Ground link**: byte-at-a-time framing with checksum verification
//! - **Reconciliation**: rate-limited valve commands, vent fails open on lost contact
//! - **Embedded-friendly**: no heap allocations in the control path, bounded memory usage
//!
//! ## Quick Start
//!
//! ```rust
//! use radioboard::protocol::{decode_state, encode_state};
//! use radioboard::types::{SystemState, ValveState};
//!
//! let state = SystemState {
//!     boards_connected: 3,
//!     vent_valve_state: ValveState::Open,
//!     tank_pressure: 512,
//!     ..SystemState::default()
//! };
//!
//! let message = encode_state(&state);
//! assert_eq!(decode_state(&message), Ok(state));
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Ground-link wire codec and checksum
//! - [`error_log`] - Bounded queue of outbound error packets
//! - [`supervisor`] - CAN bus liveness and cached state
//! - [`radio`] - Ground-link framing, desired valve state, telemetry
//! - [`reconciler`] - Desired vs observed valve commands
//! - [`agent`] - Main loop tying the components to a [`platform::Platform`]

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod can;
pub mod error_log;
pub mod fault;
pub mod platform;
pub mod protocol;
pub mod radio;
pub mod reconciler;
pub mod supervisor;
pub mod types;

// Re-export main public types for convenience
pub use agent::RadioBoard;
pub use can::{CanFrame, MessageType};
pub use error_log::ErrorLog;
pub use fault::{ErrorKind, ErrorRecord};
pub use platform::Platform;
pub use radio::RadioLink;
pub use reconciler::Reconciler;
pub use supervisor::BusSupervisor;
pub use types::{GpsFix, SystemState, ValveState};
