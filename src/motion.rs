//! Winch motion state machine.
//!
//! `MotionController` starts one winch motion at a time on the motion controller board
//! (MCB), predicts how long it should take, and owns the docking interlock: whenever the
//! profiling unit (PU) is undocked its power output is off.
//!
//! ## States
//!
//! ```text
//!            start_motion(kind)            note_complete()
//!   None ─────────────────────────▶ kind ─────────────────▶ None
//!     ▲                                │
//!     └──── unknown motion type ───────┘ (forced, from any state that is not running)
//! ```
//!
//! Completion detection lives outside this module; the collaborator that watches the MCB
//! calls [`MotionController::note_complete`].
//!
//! ## Duration prediction
//!
//! `predicted = 60 * (length / velocity) + motion_timeout`. Velocities are in revolutions
//! per minute, so the first term is seconds of travel and the margin is added in seconds.
//! The result is truncated to whole seconds.

use std::fmt;

use tracing::{error, info, warn};

use crate::actions::{Action, ActionFlagTable};
use crate::annotation;
use crate::error::{PibError, PibResult};
use crate::hardware::capabilities::{
    Clock, DeviceLink, Gpio, Pin, ProfileRequest, ProfilerLink, Scheduler,
};
use crate::params::{ConfigStore, TIME_TRIGGER_DISARMED};
use crate::telemetry::TelemetryAssembler;

/// Delay before the first scheduled profile, seconds.
pub const PROFILE_FIRST_OFFSET_SECS: u32 = 5;

/// Winch motions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MotionType {
    /// No motion.
    #[default]
    None = 0,
    /// Retract the profiler.
    ReelIn = 1,
    /// Deploy the profiler; always preceded by an undock.
    ReelOut = 2,
    /// Seat the profiler in the dock.
    Dock = 3,
    /// Reel in with the level wind disengaged.
    InNoLw = 4,
}

impl MotionType {
    /// Docking-type motions end with the PU seated in the dock.
    pub fn is_docking(self) -> bool {
        matches!(self, MotionType::Dock | MotionType::InNoLw)
    }
}

impl TryFrom<u8> for MotionType {
    type Error = PibError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MotionType::None),
            1 => Ok(MotionType::ReelIn),
            2 => Ok(MotionType::ReelOut),
            3 => Ok(MotionType::Dock),
            4 => Ok(MotionType::InNoLw),
            other => Err(PibError::InvalidMotion(other)),
        }
    }
}

impl fmt::Display for MotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MotionType::None => "none",
            MotionType::ReelIn => "reel in",
            MotionType::ReelOut => "reel out",
            MotionType::Dock => "dock",
            MotionType::InNoLw => "in no lw",
        };
        f.write_str(name)
    }
}

/// State of the motion in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSession {
    /// Motion being run.
    pub motion: MotionType,
    /// Human-readable description sent with the command.
    pub description: String,
    /// Monotonic start time, set by [`MotionController::note_start`].
    pub start_ms: Option<u64>,
    /// Seconds the motion is expected to take at most.
    pub predicted_max_duration: u32,
    /// Dock state read when the motion was requested.
    pub docked_before_start: bool,
}

/// `60 * (length / velocity) + margin`, truncated to whole seconds.
pub fn predicted_duration(length: f32, velocity: f32, margin: u16) -> u32 {
    (60.0 * (length / velocity) + f32::from(margin)) as u32
}

/// Winch motion state machine and docking interlock.
pub struct MotionController {
    mcb: Box<dyn DeviceLink>,
    profiler: Box<dyn ProfilerLink>,
    gpio: Box<dyn Gpio>,
    current: MotionType,
    session: Option<MotionSession>,
    dock_ongoing: bool,
}

impl MotionController {
    /// Controller at rest, driving the given links and pins.
    pub fn new(
        mcb: Box<dyn DeviceLink>,
        profiler: Box<dyn ProfilerLink>,
        gpio: Box<dyn Gpio>,
    ) -> Self {
        Self {
            mcb,
            profiler,
            gpio,
            current: MotionType::None,
            session: None,
            dock_ongoing: false,
        }
    }

    /// Motion last started, or `None`.
    pub fn current(&self) -> MotionType {
        self.current
    }

    /// The motion in flight, if any.
    pub fn session(&self) -> Option<&MotionSession> {
        self.session.as_ref()
    }

    /// A session is open and has not been completed.
    pub fn is_motion_ongoing(&self) -> bool {
        self.session.is_some()
    }

    /// A docking-type motion has started and not yet completed.
    pub fn is_dock_ongoing(&self) -> bool {
        self.dock_ongoing
    }

    pub(crate) fn gpio_mut(&mut self) -> &mut dyn Gpio {
        self.gpio.as_mut()
    }

    // =========================================================================
    // Motion start / completion
    // =========================================================================

    /// Start a motion from a raw motion code, as received from the ground.
    ///
    /// A running motion is never disturbed, whatever the code.
    pub fn start_motion_code(&mut self, code: u8, store: &mut dyn ConfigStore) -> PibResult<u32> {
        self.ensure_idle(code)?;
        match MotionType::try_from(code) {
            Ok(kind) => self.start_motion(kind, store),
            Err(err) => {
                self.current = MotionType::None;
                error!(code, "Unknown motion type to start");
                Err(err)
            }
        }
    }

    /// Transmit the command for `kind` and open a session.
    ///
    /// Returns the predicted maximum duration in seconds. A deploy always undocks first.
    pub fn start_motion(&mut self, kind: MotionType, store: &mut dyn ConfigStore) -> PibResult<u32> {
        self.ensure_idle(kind as u8)?;

        let params = store.params();
        let (length, velocity, verb) = match kind {
            MotionType::ReelIn => (params.retract_length, params.retract_velocity, "Retracting"),
            MotionType::ReelOut => (params.deploy_length, params.deploy_velocity, "Deploying"),
            MotionType::Dock => (params.dock_length, params.dock_velocity, "Docking"),
            MotionType::InNoLw => (
                params.retract_length,
                params.dock_velocity,
                "Reel in (no LW)",
            ),
            MotionType::None => {
                self.current = MotionType::None;
                error!("Unknown motion type to start");
                return Err(PibError::InvalidMotion(MotionType::None as u8));
            }
        };
        let margin = params.motion_timeout;
        let docked_before_start = params.pu_docked;

        if kind == MotionType::ReelOut {
            self.undock(store);
        }

        let description =
            annotation!("{} {:.1} revs", verb, length).unwrap_or_else(|_| verb.to_string());

        let transmitted = match kind {
            MotionType::ReelIn => self.mcb.reel_in(length, velocity),
            MotionType::ReelOut => self.mcb.reel_out(length, velocity),
            MotionType::Dock => self.mcb.dock(length, velocity),
            MotionType::InNoLw => self.mcb.in_no_lw(length, velocity),
            MotionType::None => false,
        };
        if !transmitted {
            error!(motion = %kind, "Motion command not transmitted");
            return Err(PibError::TransmitFailed(kind));
        }

        let predicted_max_duration = predicted_duration(length, velocity, margin);
        info!(motion = %kind, predicted_max_duration, "{}", description);

        self.current = kind;
        self.session = Some(MotionSession {
            motion: kind,
            description,
            start_ms: None,
            predicted_max_duration,
            docked_before_start,
        });
        Ok(predicted_max_duration)
    }

    fn ensure_idle(&self, requested: u8) -> PibResult<()> {
        match &self.session {
            Some(session) => {
                warn!(requested, running = %session.motion, "Motion already in progress");
                Err(PibError::MotionInProgress(session.motion))
            }
            None => Ok(()),
        }
    }

    /// Stamp the session start and reset motion telemetry for the new session.
    ///
    /// Returns false when no motion has been started.
    pub fn note_start(
        &mut self,
        clock: &dyn Clock,
        telemetry: &mut TelemetryAssembler,
        real_time: bool,
    ) -> bool {
        let Some(session) = self.session.as_mut() else {
            warn!("No motion started, nothing to note");
            return false;
        };

        let now_ms = clock.millis();
        session.start_ms = Some(now_ms);
        self.dock_ongoing = session.motion.is_docking();

        let epoch_secs = u32::try_from(clock.now().timestamp()).unwrap_or(0);
        telemetry.begin_session(now_ms, epoch_secs, real_time);
        true
    }

    /// Retire the current session.
    pub fn note_complete(&mut self, clock: &dyn Clock) {
        if let Some(session) = self.session.take() {
            let elapsed_secs = session
                .start_ms
                .map(|start| clock.millis().saturating_sub(start) / 1000);
            info!(motion = %session.motion, ?elapsed_secs, "Motion complete");
        }
        self.current = MotionType::None;
        self.dock_ongoing = false;
    }

    /// The running session has outlived its predicted duration.
    pub fn deadline_exceeded(&self, now_ms: u64) -> bool {
        match &self.session {
            Some(MotionSession {
                start_ms: Some(start),
                predicted_max_duration,
                ..
            }) => now_ms.saturating_sub(*start) / 1000 > u64::from(*predicted_max_duration),
            _ => false,
        }
    }

    // =========================================================================
    // Docking interlock
    // =========================================================================

    /// Record the PU as docked and power it.
    pub fn dock(&mut self, store: &mut dyn ConfigStore) {
        if let Err(err) = store.write_pu_docked(true) {
            warn!(error = %err, "Unable to persist dock state");
        }
        self.drive_pu_power(true);
    }

    /// Cut PU power and record it as undocked.
    pub fn undock(&mut self, store: &mut dyn ConfigStore) {
        self.drive_pu_power(false);
        if let Err(err) = store.write_pu_docked(false) {
            warn!(error = %err, "Unable to persist dock state");
        }
    }

    fn drive_pu_power(&mut self, on: bool) {
        if let Err(err) = self.gpio.write(Pin::PuPowerEnable, on) {
            error!(error = %err, on, "Unable to drive PU power");
        }
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Queue the configured number of profiles at the configured period.
    pub fn schedule_profiles(
        &mut self,
        store: &mut dyn ConfigStore,
        scheduler: &mut dyn Scheduler,
    ) -> PibResult<()> {
        let count = store.params().num_profiles;
        let period = store.params().profile_period;
        self.schedule_periodic_profiles(count, period, PROFILE_FIRST_OFFSET_SECS, store, scheduler)
    }

    /// Disarm the time trigger, then enqueue `count` begin-profile actions.
    ///
    /// Profile `i` fires `i * period + first_offset` seconds from now. The first rejected
    /// enqueue ends the batch; entries already queued stay queued.
    pub fn schedule_periodic_profiles(
        &mut self,
        count: u8,
        period: u32,
        first_offset: u32,
        store: &mut dyn ConfigStore,
        scheduler: &mut dyn Scheduler,
    ) -> PibResult<()> {
        if let Err(err) = store.write_time_trigger(TIME_TRIGGER_DISARMED) {
            warn!(error = %err, "Unable to persist time trigger");
        }

        for index in 0..count {
            let delay = u32::from(index)
                .saturating_mul(period)
                .saturating_add(first_offset);
            if !scheduler.enqueue(Action::BeginProfile, delay) {
                error!(critical = true, index, count, "Error scheduling profiles, scheduler failure");
                return Err(PibError::Scheduling {
                    index,
                    requested: count,
                });
            }
        }

        let params = store.params();
        info!(
            num_profiles = count,
            profile_size = params.profile_size,
            dock_amount = params.dock_amount,
            dock_overshoot = params.dock_overshoot,
            dwell_time = params.dwell_time,
            profile_period = period,
            "Scheduled profiles"
        );
        Ok(())
    }

    /// Send the profile-start command to the PU.
    pub fn start_profiler(&mut self, store: &dyn ConfigStore) -> PibResult<ProfileRequest> {
        let params = store.params();
        let t_down = 60.0 * (params.deploy_length / params.deploy_velocity)
            + f32::from(params.preprofile_time);
        let t_up = 60.0
            * (params.retract_length / params.retract_velocity
                + params.dock_length / params.dock_velocity)
            + f32::from(params.motion_timeout);

        let request = ProfileRequest {
            t_down: t_down as i32,
            dwell_time: i32::from(params.dwell_time),
            t_up: t_up as i32,
            profile_rate: params.profile_rate,
            dwell_rate: params.dwell_rate,
            tsen: params.profile_tsen,
            ropc: params.profile_ropc,
            flash: params.profile_flash,
        };

        if !self.profiler.start_profile(&request) {
            error!("PU rejected profile start");
            return Err(PibError::ProfilerRejected);
        }
        info!(t_down = request.t_down, t_up = request.t_up, "Sent profile start to PU");
        Ok(request)
    }

    /// Start the PU profile and raise the deploy that follows it.
    pub fn begin_profile(
        &mut self,
        store: &dyn ConfigStore,
        flags: &mut ActionFlagTable,
    ) -> PibResult<()> {
        self.start_profiler(store)?;
        flags.raise_action(Action::ReelOut);
        Ok(())
    }
}
