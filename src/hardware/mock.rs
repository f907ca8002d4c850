//! Mock Hardware Implementations
//!
//! Simulated collaborators for running the control core without a winch controller,
//! profiling unit or telemetry radio attached. Every mock records what it was asked to do.
//! Handles are cheap to clone and share their state, so a test (or the simulation binary)
//! can keep one handle while the `Pib` owns another.
//!
//! # Available Mocks
//!
//! - `MockDeviceLink` - winch motion controller; accepts or rejects commands
//! - `MockProfiler` - profiling unit
//! - `MockScheduler` - action scheduler that can be told to fail on the Nth enqueue
//! - `MockTelemetry` - capacity-limited telemetry buffer that keeps every sent packet
//! - `MockGpio` - output pins with a write history
//! - `ManualClock` - clock advanced by hand

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};

use crate::actions::Action;
use crate::error::PibResult;
use crate::hardware::capabilities::{
    Clock, DeviceLink, Gpio, Pin, ProfileRequest, ProfilerLink, Scheduler, Severity, Slot,
    TelemetryLink,
};
use crate::motion::MotionType;

// =============================================================================
// MockDeviceLink - Simulated winch motion controller
// =============================================================================

/// A motion command as it reached the winch controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionCommand {
    /// Command that was sent.
    pub motion: MotionType,
    /// Revolutions.
    pub length: f32,
    /// Revolutions per minute.
    pub velocity: f32,
}

#[derive(Debug)]
struct DeviceState {
    accept: bool,
    commands: Vec<MotionCommand>,
}

/// Mock winch controller. Accepts every command until told otherwise.
#[derive(Debug, Clone)]
pub struct MockDeviceLink {
    state: Rc<RefCell<DeviceState>>,
}

impl MockDeviceLink {
    /// Controller that accepts every command.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(DeviceState {
                accept: true,
                commands: Vec::new(),
            })),
        }
    }

    /// Make subsequent commands succeed or fail.
    pub fn set_accept(&self, accept: bool) {
        self.state.borrow_mut().accept = accept;
    }

    /// Commands that were transmitted successfully.
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.state.borrow().commands.clone()
    }

    fn transmit(&mut self, motion: MotionType, length: f32, velocity: f32) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.accept {
            return false;
        }
        state.commands.push(MotionCommand {
            motion,
            length,
            velocity,
        });
        true
    }
}

impl Default for MockDeviceLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLink for MockDeviceLink {
    fn reel_in(&mut self, length: f32, velocity: f32) -> bool {
        self.transmit(MotionType::ReelIn, length, velocity)
    }

    fn reel_out(&mut self, length: f32, velocity: f32) -> bool {
        self.transmit(MotionType::ReelOut, length, velocity)
    }

    fn dock(&mut self, length: f32, velocity: f32) -> bool {
        self.transmit(MotionType::Dock, length, velocity)
    }

    fn in_no_lw(&mut self, length: f32, velocity: f32) -> bool {
        self.transmit(MotionType::InNoLw, length, velocity)
    }
}

// =============================================================================
// MockProfiler - Simulated profiling unit
// =============================================================================

#[derive(Debug)]
struct ProfilerState {
    accept: bool,
    requests: Vec<ProfileRequest>,
}

/// Mock profiling unit.
#[derive(Debug, Clone)]
pub struct MockProfiler {
    state: Rc<RefCell<ProfilerState>>,
}

impl MockProfiler {
    /// Profiling unit that accepts every start.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ProfilerState {
                accept: true,
                requests: Vec::new(),
            })),
        }
    }

    /// Make later profile starts succeed or fail.
    pub fn set_accept(&self, accept: bool) {
        self.state.borrow_mut().accept = accept;
    }

    /// Every profile start received, in order.
    pub fn requests(&self) -> Vec<ProfileRequest> {
        self.state.borrow().requests.clone()
    }
}

impl Default for MockProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfilerLink for MockProfiler {
    fn start_profile(&mut self, request: &ProfileRequest) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.accept {
            return false;
        }
        state.requests.push(*request);
        true
    }
}

// =============================================================================
// MockScheduler - Simulated action scheduler
// =============================================================================

#[derive(Debug, Default)]
struct SchedulerState {
    attempts: usize,
    fail_on_attempt: Option<usize>,
    entries: Vec<(Action, u32)>,
}

/// Mock scheduler that keeps every accepted entry.
#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl MockScheduler {
    /// Scheduler that accepts every entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `attempt`-th enqueue (1-based) and every one after it.
    pub fn fail_from_attempt(&self, attempt: usize) {
        self.state.borrow_mut().fail_on_attempt = Some(attempt);
    }

    /// Number of enqueue calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.state.borrow().attempts
    }

    /// Accepted `(action, delay)` entries in call order.
    pub fn entries(&self) -> Vec<(Action, u32)> {
        self.state.borrow().entries.clone()
    }
}

impl Scheduler for MockScheduler {
    fn enqueue(&mut self, action: Action, delay_secs: u32) -> bool {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state
            .fail_on_attempt
            .map_or(false, |limit| state.attempts >= limit)
        {
            return false;
        }
        state.entries.push((action, delay_secs));
        true
    }
}

// =============================================================================
// MockTelemetry - Simulated telemetry buffer and transport
// =============================================================================

/// A telemetry packet as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentPacket {
    /// Payload bytes.
    pub payload: Bytes,
    /// Slot texts, indexed by [`Slot::position`].
    pub annotations: [Option<String>; 3],
    /// Slot severities, indexed by [`Slot::position`].
    pub severities: [Option<Severity>; 3],
    /// Transport was asked to wait for an ack.
    pub ack_required: bool,
}

impl SentPacket {
    /// Text of `slot`, if one was set.
    pub fn annotation(&self, slot: Slot) -> Option<&str> {
        self.annotations[slot.position()].as_deref()
    }

    /// Severity of `slot`, if one was set.
    pub fn severity(&self, slot: Slot) -> Option<Severity> {
        self.severities[slot.position()]
    }
}

#[derive(Debug)]
struct TelemetryState {
    capacity: usize,
    buffer: BytesMut,
    annotations: [Option<String>; 3],
    severities: [Option<Severity>; 3],
    ack_required: bool,
    accept_send: bool,
    sent: Vec<SentPacket>,
}

/// Mock telemetry link with a fixed payload capacity.
#[derive(Debug, Clone)]
pub struct MockTelemetry {
    state: Rc<RefCell<TelemetryState>>,
}

impl MockTelemetry {
    /// Default payload capacity, bytes.
    pub const DEFAULT_CAPACITY: usize = 8192;

    /// Link with [`Self::DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Link whose payload holds at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(TelemetryState {
                capacity,
                buffer: BytesMut::with_capacity(capacity),
                annotations: Default::default(),
                severities: Default::default(),
                ack_required: true,
                accept_send: true,
                sent: Vec::new(),
            })),
        }
    }

    /// Make later sends succeed or fail.
    pub fn set_accept_send(&self, accept: bool) {
        self.state.borrow_mut().accept_send = accept;
    }

    /// Bytes currently accumulated and not yet sent.
    pub fn pending(&self) -> Vec<u8> {
        self.state.borrow().buffer.to_vec()
    }

    /// Every packet sent so far.
    pub fn sent(&self) -> Vec<SentPacket> {
        self.state.borrow().sent.clone()
    }

    /// Most recent packet, if any.
    pub fn last_sent(&self) -> Option<SentPacket> {
        self.state.borrow().sent.last().cloned()
    }
}

impl Default for MockTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryLink for MockTelemetry {
    fn clear(&mut self) {
        self.state.borrow_mut().buffer.clear();
    }

    fn append(&mut self, bytes: &[u8]) -> bool {
        let mut state = self.state.borrow_mut();
        if state.buffer.len() + bytes.len() > state.capacity {
            return false;
        }
        state.buffer.extend_from_slice(bytes);
        true
    }

    fn remaining(&self) -> usize {
        let state = self.state.borrow();
        state.capacity.saturating_sub(state.buffer.len())
    }

    fn set_annotation(&mut self, slot: Slot, text: &str) {
        self.state.borrow_mut().annotations[slot.position()] = Some(text.to_string());
    }

    fn set_severity(&mut self, slot: Slot, severity: Severity) {
        self.state.borrow_mut().severities[slot.position()] = Some(severity);
    }

    fn set_ack_required(&mut self, required: bool) {
        self.state.borrow_mut().ack_required = required;
    }

    fn send(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.accept_send {
            return false;
        }
        let payload = state.buffer.split().freeze();
        let packet = SentPacket {
            payload,
            annotations: std::mem::take(&mut state.annotations),
            severities: std::mem::take(&mut state.severities),
            ack_required: state.ack_required,
        };
        state.sent.push(packet);
        state.ack_required = true;
        true
    }
}

// =============================================================================
// MockGpio - Simulated output pins
// =============================================================================

#[derive(Debug, Default)]
struct GpioState {
    levels: HashMap<Pin, bool>,
    history: Vec<(Pin, bool)>,
}

/// Mock output pins. Unwritten pins read as `None`.
#[derive(Debug, Clone, Default)]
pub struct MockGpio {
    state: Rc<RefCell<GpioState>>,
}

impl MockGpio {
    /// No pin written yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `pin`.
    pub fn level(&self, pin: Pin) -> Option<bool> {
        self.state.borrow().levels.get(&pin).copied()
    }

    /// Every write in call order.
    pub fn history(&self) -> Vec<(Pin, bool)> {
        self.state.borrow().history.clone()
    }
}

impl Gpio for MockGpio {
    fn write(&mut self, pin: Pin, high: bool) -> PibResult<()> {
        let mut state = self.state.borrow_mut();
        state.levels.insert(pin, high);
        state.history.push((pin, high));
        Ok(())
    }
}

// =============================================================================
// ManualClock - Hand-advanced clock
// =============================================================================

#[derive(Debug)]
struct ClockState {
    base: DateTime<Utc>,
    millis: u64,
}

/// Clock that only moves when told to. Wall-clock time is `base + millis`.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Rc<RefCell<ClockState>>,
}

impl ManualClock {
    /// Clock at `base` with zero elapsed milliseconds.
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ClockState { base, millis: 0 })),
        }
    }

    /// Move the clock forward.
    pub fn advance_millis(&self, millis: u64) {
        self.state.borrow_mut().millis += millis;
    }

    /// Move the clock forward.
    pub fn advance_secs(&self, secs: u64) {
        self.advance_millis(secs * 1000);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.state.borrow().millis
    }

    fn now(&self) -> DateTime<Utc> {
        let state = self.state.borrow();
        let offset = i64::try_from(state.millis).unwrap_or(i64::MAX);
        state.base + Duration::milliseconds(offset)
    }
}
