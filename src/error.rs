//! Custom error types for the PIB control core.
//!
//! This module defines the primary error type, `PibError`, shared by every component of the
//! crate. Using the `thiserror` crate, it gives a single place to describe the failures that
//! can occur inside the control loop, from flag-table bounds violations to rejected motion
//! commands.
//!
//! ## Error Hierarchy
//!
//! - **`ActionOutOfRange`**: a raw action identifier at or beyond the size of the flag table.
//!   The table is left untouched.
//! - **`BufferCapacity`**: a telemetry append that would overflow the outbound buffer. The
//!   bytes that did not fit are dropped; the packet is still sent.
//! - **`Configuration`** / **`ConfigLoad`**: semantic or parse problems in the application
//!   configuration or the persisted parameter block.
//! - **`Scheduling`**: the action scheduler refused an entry while a profile batch was being
//!   queued. The rest of the batch is abandoned.
//! - **`InvalidMotion`**, **`MotionInProgress`**, **`TransmitFailed`**: motion requests the
//!   winch controller could not act on.
//!
//! None of these is fatal to the control loop. Callers log them and fall back to a safe
//! state.

use thiserror::Error;

use crate::motion::MotionType;

/// Convenience alias for results using the crate error type.
pub type PibResult<T> = std::result::Result<T, PibError>;

/// Every failure the control core reports.
#[derive(Error, Debug)]
pub enum PibError {
    /// Action identifier outside the flag table.
    #[error("Action {action} out of range (table holds {limit} actions)")]
    ActionOutOfRange { action: u8, limit: usize },

    /// A telemetry append did not fit.
    #[error("Telemetry buffer full: {requested} bytes requested, {remaining} remaining")]
    BufferCapacity { requested: usize, remaining: usize },

    /// Configuration failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration file or environment could not be read.
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Filesystem failure while persisting parameters.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter block could not be serialized for a dump.
    #[error("Parameter serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Parameter block could not be written as TOML.
    #[error("Parameter encoding error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// The scheduler refused a profile; `index` is zero-based.
    #[error("Scheduler rejected profile {index} of {requested}")]
    Scheduling { index: u8, requested: u8 },

    /// Motion code that names no motion.
    #[error("Unknown motion type {0}")]
    InvalidMotion(u8),

    /// A motion was requested while another runs.
    #[error("Motion already in progress: {0}")]
    MotionInProgress(MotionType),

    /// The motion command never reached the winch controller.
    #[error("Winch controller rejected {0} command")]
    TransmitFailed(MotionType),

    /// The profiling unit refused a profile start.
    #[error("Profiling unit rejected profile start")]
    ProfilerRejected,

    /// An output pin could not be driven.
    #[error("GPIO error on {pin}: {reason}")]
    Gpio { pin: String, reason: String },

    /// An annotation would exceed its length limit.
    #[error("Text exceeds {max} characters")]
    TextOverflow { max: usize },
}

impl From<figment::Error> for PibError {
    fn from(err: figment::Error) -> Self {
        PibError::ConfigLoad(Box::new(err))
    }
}
