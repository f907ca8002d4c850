//! The PIB instrument: one control-loop owner for flags, motion and telemetry.
//!
//! Each call to [`Pib::run_iteration`] is one pass of the cooperative loop:
//!
//! 1. poll the flags relevant to the current state, consuming them into a snapshot
//! 2. run the handler for every consumed action
//! 3. raise `SendStatus` when the status cadence is due
//! 4. tick the flag table
//!
//! Actions raised during step 2 or 3 are not seen until the next pass. Motion-start
//! actions are not polled while a motion runs, so a deploy commanded mid-retract simply
//! expires.
//!
//! Collaborators that run outside the loop (the MCB and PU message routers, ground
//! command parsing) reach the instrument through the `pub` entry points below.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, error, info, warn};

use crate::actions::{Action, ActionFlagTable};
use crate::error::PibResult;
use crate::hardware::capabilities::{
    Clock, DeviceLink, Gpio, Pin, ProfilerLink, Scheduler, Severity, TelemetryLink,
};
use crate::motion::{MotionController, MotionType};
use crate::params::ConfigStore;
use crate::telemetry::{PuStatus, TelemetryAssembler, MCB_EEPROM_LABEL, PIB_EEPROM_LABEL};

/// Minimum spacing between status packets, seconds.
pub const STATUS_MIN_INTERVAL_SECS: i64 = 540;

/// Status packets go out on minutes divisible by this.
pub const STATUS_MINUTE_MODULUS: u32 = 10;

/// Decides when the periodic PU status packet is due.
#[derive(Debug, Clone, Default)]
pub struct StatusCadence {
    last_sent_secs: i64,
}

impl StatusCadence {
    /// True (and the cadence restarts) when more than nine minutes have passed and the
    /// minute of the hour is a multiple of ten.
    pub fn check(&mut self, now: DateTime<Utc>) -> bool {
        let now_secs = now.timestamp();
        if now_secs > self.last_sent_secs + STATUS_MIN_INTERVAL_SECS
            && now.minute() % STATUS_MINUTE_MODULUS == 0
        {
            self.last_sent_secs = now_secs;
            return true;
        }
        false
    }
}

/// Everything the instrument drives, supplied by the platform.
pub struct Collaborators {
    /// Winch motion controller.
    pub mcb: Box<dyn DeviceLink>,
    /// Profiling unit.
    pub profiler: Box<dyn ProfilerLink>,
    /// Delayed-action scheduler.
    pub scheduler: Box<dyn Scheduler>,
    /// Outbound telemetry link.
    pub telemetry: Box<dyn TelemetryLink>,
    /// Output pins.
    pub gpio: Box<dyn Gpio>,
    /// Time source.
    pub clock: Box<dyn Clock>,
    /// Persisted parameters.
    pub store: Box<dyn ConfigStore>,
}

/// The Profiler Interface Board controller.
pub struct Pib {
    flags: ActionFlagTable,
    motion: MotionController,
    telemetry: TelemetryAssembler,
    scheduler: Box<dyn Scheduler>,
    clock: Box<dyn Clock>,
    store: Box<dyn ConfigStore>,
    pu_status: PuStatus,
    status_cadence: StatusCadence,
    iterations: u64,
}

impl Pib {
    /// Controller at rest. Call [`Pib::setup`] before the first iteration.
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            mcb,
            profiler,
            scheduler,
            telemetry,
            gpio,
            clock,
            store,
        } = collaborators;
        Self {
            flags: ActionFlagTable::new(),
            motion: MotionController::new(mcb, profiler, gpio),
            telemetry: TelemetryAssembler::new(telemetry),
            scheduler,
            clock,
            store,
            pu_status: PuStatus::default(),
            status_cadence: StatusCadence::default(),
            iterations: 0,
        }
    }

    /// Drive the output pins to their power-on levels.
    ///
    /// RS232 transceiver forced on, SAFE low, PU power off.
    pub fn setup(&mut self) -> PibResult<()> {
        let gpio = self.motion.gpio_mut();
        gpio.write(Pin::ForceOff232, true)?;
        gpio.write(Pin::ForceOn232, true)?;
        gpio.write(Pin::SafePin, false)?;
        gpio.write(Pin::PuPowerEnable, false)?;
        info!("PIB setup complete");
        Ok(())
    }

    /// Pending action flags.
    pub fn flags(&self) -> &ActionFlagTable {
        &self.flags
    }

    /// Winch motion state.
    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    /// Parameter store.
    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    /// Loop passes completed.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    // =========================================================================
    // Control loop
    // =========================================================================

    /// One pass of the control loop.
    pub fn run_iteration(&mut self) {
        let pending = self.poll_actions();
        for action in pending {
            self.handle(action);
        }

        if self.status_cadence.check(self.clock.now()) {
            self.flags.raise_action(Action::SendStatus);
        }

        self.flags.tick();
        self.iterations += 1;
    }

    fn poll_actions(&mut self) -> Vec<Action> {
        let busy = self.motion.is_motion_ongoing();
        let flags = &mut self.flags;
        Action::ALL
            .iter()
            .copied()
            .filter(|action| !(busy && action.is_motion_start()))
            .filter(|action| flags.take(*action))
            .collect()
    }

    fn handle(&mut self, action: Action) {
        debug!(%action, "Handling action");
        match action {
            Action::ReelIn => self.start_motion(MotionType::ReelIn),
            Action::ReelOut => self.start_motion(MotionType::ReelOut),
            Action::Dock => self.start_motion(MotionType::Dock),
            Action::InNoLw => self.start_motion(MotionType::InNoLw),
            Action::BeginProfile => {
                if let Err(err) = self.motion.begin_profile(self.store.as_ref(), &mut self.flags) {
                    warn!(error = %err, "Profile not started");
                }
            }
            Action::ScheduleProfiles => {
                if let Err(err) = self
                    .motion
                    .schedule_profiles(self.store.as_mut(), self.scheduler.as_mut())
                {
                    warn!(error = %err, "Profile schedule incomplete");
                }
            }
            Action::SendStatus => {
                self.telemetry.send_status(&self.pu_status);
            }
            Action::SendPibEeprom => self.send_pib_eeprom(),
        }
    }

    fn start_motion(&mut self, kind: MotionType) {
        if self.motion.start_motion(kind, self.store.as_mut()).is_ok() {
            let real_time = self.store.params().real_time_mcb;
            self.motion
                .note_start(self.clock.as_ref(), &mut self.telemetry, real_time);
        }
    }

    fn send_pib_eeprom(&mut self) {
        match self.store.bufferize() {
            Ok(image) if !image.is_empty() => {
                self.telemetry.send_raw_dump(PIB_EEPROM_LABEL, &image);
            }
            Ok(_) => error!("Error sending PIB EEPROM, length 0"),
            Err(err) => error!(error = %err, "Error sending PIB EEPROM"),
        }
    }

    // =========================================================================
    // Entry points for external collaborators
    // =========================================================================

    /// Raise an action by raw identifier, as ground commands and the scheduler do.
    pub fn raise_action(&mut self, action: u8) -> bool {
        self.flags.raise(action)
    }

    /// Raise a known action.
    pub fn raise(&mut self, action: Action) {
        self.flags.raise_action(action);
    }

    /// Start a motion from a raw ground-command code, outside the flag path.
    pub fn command_motion(&mut self, code: u8) -> bool {
        match MotionType::try_from(code) {
            Ok(kind) if kind != MotionType::None => {
                if self.motion.is_motion_ongoing() {
                    warn!(%kind, "Motion command ignored, motion in progress");
                    return false;
                }
                self.start_motion(kind);
                self.motion.current() == kind
            }
            _ => self
                .motion
                .start_motion_code(code, self.store.as_mut())
                .is_ok(),
        }
    }

    /// One motion record from the MCB.
    pub fn add_motion_data(&mut self, record: &[u8]) -> bool {
        let real_time = self.store.params().real_time_mcb;
        let now_ms = self.clock.millis();
        self.telemetry.add_motion_record(record, now_ms, real_time)
    }

    /// Flush buffered motion telemetry.
    pub fn send_motion_packet(&mut self, severity: Severity, message: &str) -> bool {
        self.telemetry.send_motion_packet(severity, message)
    }

    /// The MCB reported the motion finished.
    pub fn motion_complete(&mut self) {
        self.motion.note_complete(self.clock.as_ref());
    }

    /// The running motion has outlived its prediction.
    pub fn motion_overdue(&self) -> bool {
        self.motion.deadline_exceeded(self.clock.millis())
    }

    /// Latest PU status, sent with the next status packet.
    pub fn update_pu_status(&mut self, status: PuStatus) {
        self.pu_status = status;
    }

    /// Forward a PU profile record to the ground.
    pub fn send_profile_record(&mut self, number: u16, record: &[u8]) -> bool {
        let status = self.pu_status;
        self.telemetry.send_profile_record(number, &status, record)
    }

    /// Forward an MCB EEPROM image to the ground.
    pub fn send_mcb_eeprom(&mut self, image: &[u8]) -> bool {
        self.telemetry.send_raw_dump(MCB_EEPROM_LABEL, image)
    }

    /// PU is docked: persist and power it.
    pub fn dock(&mut self) {
        self.motion.dock(self.store.as_mut());
    }

    /// PU left the dock: cut power and persist.
    pub fn undock(&mut self) {
        self.motion.undock(self.store.as_mut());
    }
}
