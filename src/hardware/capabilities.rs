//! Capability traits for the collaborators the control core drives.
//!
//! The core never talks to a serial port, a pin register or the telemetry framer directly.
//! Each external system is reduced to the smallest trait the core needs, injected at
//! construction:
//!
//! - [`DeviceLink`] - winch motion controller (MCB) motion commands
//! - [`ProfilerLink`] - profiling unit (PU) profile start
//! - [`Scheduler`] - delayed re-raise of actions
//! - [`TelemetryLink`] - outbound telemetry buffer with three state slots
//! - [`Gpio`] - digital outputs
//! - [`Clock`] - monotonic milliseconds and wall-clock time
//!
//! All calls are non-blocking and report success or failure immediately.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::actions::Action;
use crate::error::PibResult;

// =============================================================================
// Motion links
// =============================================================================

/// Motion commands understood by the winch motion controller.
///
/// Each command carries a length in revolutions and a velocity; a `false` return means
/// the command was not transmitted.
pub trait DeviceLink {
    /// Retract the profiler.
    fn reel_in(&mut self, length: f32, velocity: f32) -> bool;
    /// Deploy the profiler.
    fn reel_out(&mut self, length: f32, velocity: f32) -> bool;
    /// Seat the profiler in the dock.
    fn dock(&mut self, length: f32, velocity: f32) -> bool;
    /// Retract without level wind.
    fn in_no_lw(&mut self, length: f32, velocity: f32) -> bool;
}

/// Parameters of a profile-start command sent to the profiling unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileRequest {
    /// Expected descent time, seconds.
    pub t_down: i32,
    /// Time held at depth, seconds.
    pub dwell_time: i32,
    /// Expected ascent time, seconds.
    pub t_up: i32,
    /// Sample rate while profiling, seconds.
    pub profile_rate: u16,
    /// Sample rate while dwelling, seconds.
    pub dwell_rate: u16,
    /// Enable the TSEN instrument.
    pub tsen: bool,
    /// Enable the ROPC instrument.
    pub ropc: bool,
    /// Enable the flash instrument.
    pub flash: bool,
}

/// Profiling unit commands.
pub trait ProfilerLink {
    /// False when the command was not transmitted.
    fn start_profile(&mut self, request: &ProfileRequest) -> bool;
}

/// Action-delay scheduler: re-raises `action` after `delay_secs`.
pub trait Scheduler {
    /// False when the scheduler has no room.
    fn enqueue(&mut self, action: Action, delay_secs: u32) -> bool;
}

// =============================================================================
// Telemetry
// =============================================================================

/// Severity attached to a telemetry state slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Nominal.
    Fine,
    /// Degraded, no action needed.
    Warn,
    /// Needs ground attention.
    Crit,
    /// Slot carries no message.
    NoMessage,
}

/// One of the three state annotation slots of a telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Primary message slot.
    First,
    /// Secondary message slot.
    Second,
    /// Tertiary message slot.
    Third,
}

impl Slot {
    /// Slots in packet order.
    pub const ALL: [Slot; 3] = [Slot::First, Slot::Second, Slot::Third];

    /// Zero-based position of the slot.
    pub fn position(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
            Slot::Third => 2,
        }
    }
}

/// Outbound telemetry buffer.
///
/// Appends are all-or-nothing: a value that does not fit is rejected and the bytes already
/// in the buffer are left as they were. Multi-byte values are written big-endian. `send`
/// hands the payload and annotations to the transport and resets both.
pub trait TelemetryLink {
    /// Drop the pending payload.
    fn clear(&mut self);
    /// Append all of `bytes` or nothing.
    fn append(&mut self, bytes: &[u8]) -> bool;
    /// Free payload bytes.
    fn remaining(&self) -> usize;
    /// Set the text of a state slot.
    fn set_annotation(&mut self, slot: Slot, text: &str);
    /// Set the severity of a state slot.
    fn set_severity(&mut self, slot: Slot, severity: Severity);
    /// Ask the transport to wait for a ground ack.
    fn set_ack_required(&mut self, required: bool);
    /// Hand the packet to the transport; false when refused.
    fn send(&mut self) -> bool;

    /// Append one byte.
    fn append_u8(&mut self, value: u8) -> bool {
        self.append(&[value])
    }

    /// Big-endian.
    fn append_u16(&mut self, value: u16) -> bool {
        self.append(&value.to_be_bytes())
    }

    /// Big-endian.
    fn append_u32(&mut self, value: u32) -> bool {
        self.append(&value.to_be_bytes())
    }
}

// =============================================================================
// GPIO
// =============================================================================

/// Digital outputs driven by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// Profiling unit power enable.
    PuPowerEnable,
    /// SAFE line to the balloon gondola.
    SafePin,
    /// RS232 transceiver FORCEOFF (active low).
    ForceOff232,
    /// RS232 transceiver FORCEON.
    ForceOn232,
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pin::PuPowerEnable => "PU_PWR_ENABLE",
            Pin::SafePin => "SAFE_PIN",
            Pin::ForceOff232 => "FORCEOFF_232",
            Pin::ForceOn232 => "FORCEON_232",
        };
        f.write_str(name)
    }
}

/// Minimal digital-output interface.
pub trait Gpio {
    /// Drive `pin` high (`true`) or low (`false`).
    fn write(&mut self, pin: Pin, high: bool) -> PibResult<()>;
}

// =============================================================================
// Clock
// =============================================================================

/// Time source for session timing and the status cadence.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn millis(&self) -> u64;
    /// Wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the host.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose millisecond counter starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecLink(Vec<u8>);

    impl TelemetryLink for VecLink {
        fn clear(&mut self) {
            self.0.clear();
        }
        fn append(&mut self, bytes: &[u8]) -> bool {
            self.0.extend_from_slice(bytes);
            true
        }
        fn remaining(&self) -> usize {
            usize::MAX
        }
        fn set_annotation(&mut self, _slot: Slot, _text: &str) {}
        fn set_severity(&mut self, _slot: Slot, _severity: Severity) {}
        fn set_ack_required(&mut self, _required: bool) {}
        fn send(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn test_multibyte_appends_are_big_endian() {
        let mut link = VecLink(Vec::new());
        link.append_u8(0xA5);
        link.append_u16(0x0102);
        link.append_u32(0x0A0B0C0D);
        assert_eq!(link.0, vec![0xA5, 0x01, 0x02, 0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_slot_positions() {
        let positions: Vec<usize> = Slot::ALL.iter().map(|s| s.position()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.millis();
        let b = clock.millis();
        assert!(b >= a);
    }
}
