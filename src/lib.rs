//! Control core for the StratoPIB Profiler Interface Board.
//!
//! The PIB sits between a balloon gondola's flight computer, a winch motion controller
//! (MCB) and a tethered profiling unit (PU). This crate holds the parts of its firmware
//! that decide what happens and when:
//!
//! - [`actions`] - self-expiring command flags polled once per loop iteration
//! - [`motion`] - winch motion state machine and docking interlock
//! - [`telemetry`] - mode-dependent telemetry packet assembly
//! - [`instrument`] - the control loop tying them together
//!
//! Serial transports, the telemetry framer and the pins are reached through the traits in
//! [`hardware::capabilities`]; [`hardware::mock`] provides simulated versions.

pub mod actions;
pub mod config;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod logging;
pub mod motion;
pub mod params;
pub mod telemetry;
pub mod text;

pub use actions::{Action, ActionFlagTable};
pub use error::{PibError, PibResult};
pub use instrument::{Collaborators, Pib};
pub use motion::{MotionController, MotionType};
pub use telemetry::TelemetryAssembler;
