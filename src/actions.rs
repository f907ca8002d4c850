//! Self-expiring action flags.
//!
//! Ground commands and periodic checks signal intent by raising a flag; the control loop
//! consumes each flag at most once with [`ActionFlagTable::test_and_clear`]. Flags that
//! nobody polls are forgotten after [`FLAG_STALE`] loop iterations, so a command that
//! arrives while the instrument is busy does not fire long after it stopped making sense.
//!
//! Every raw index is checked against [`NUM_ACTIONS`]; out-of-range access logs an error
//! and leaves the table untouched.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, error};

use crate::error::PibError;

/// Number of loop iterations an unconsumed flag survives.
pub const FLAG_STALE: u8 = 2;

/// Size of the action table.
pub const NUM_ACTIONS: usize = 8;

/// Actions the control loop knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    /// Retract the profiler.
    ReelIn = 0,
    /// Deploy the profiler.
    ReelOut = 1,
    /// Dock the profiler.
    Dock = 2,
    /// Reel in without the level wind.
    InNoLw = 3,
    /// Start a scheduled profile.
    BeginProfile = 4,
    /// Queue the configured batch of profiles.
    ScheduleProfiles = 5,
    /// Send the periodic PU status telemetry.
    SendStatus = 6,
    /// Dump the PIB parameter block.
    SendPibEeprom = 7,
}

impl Action {
    /// All actions in table order.
    pub const ALL: [Action; NUM_ACTIONS] = [
        Action::ReelIn,
        Action::ReelOut,
        Action::Dock,
        Action::InNoLw,
        Action::BeginProfile,
        Action::ScheduleProfiles,
        Action::SendStatus,
        Action::SendPibEeprom,
    ];

    /// Table index of this action.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Look an action up by raw identifier.
    pub fn from_index(index: u8) -> Option<Action> {
        Action::ALL.get(usize::from(index)).copied()
    }

    /// Whether the action starts a winch motion.
    pub fn is_motion_start(self) -> bool {
        matches!(
            self,
            Action::ReelIn | Action::ReelOut | Action::Dock | Action::InNoLw
        )
    }

    fn name(self) -> &'static str {
        match self {
            Action::ReelIn => "reel-in",
            Action::ReelOut => "reel-out",
            Action::Dock => "dock",
            Action::InNoLw => "in-no-lw",
            Action::BeginProfile => "begin-profile",
            Action::ScheduleProfiles => "schedule-profiles",
            Action::SendStatus => "send-status",
            Action::SendPibEeprom => "send-pib-eeprom",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActionFlag {
    active: bool,
    stale_count: u8,
}

/// Fixed-size table of debounced, self-expiring flags.
#[derive(Debug, Clone, Default)]
pub struct ActionFlagTable {
    flags: [ActionFlag; NUM_ACTIONS],
}

impl ActionFlagTable {
    /// Empty table, every flag clear.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag at a raw index. Returns false and logs when the index is out of range.
    pub fn raise(&mut self, action: u8) -> bool {
        match self.slot_mut(action) {
            Ok(flag) => {
                flag.active = true;
                flag.stale_count = 0;
                debug!(action, "Action raised");
                true
            }
            Err(err) => {
                error!(error = %err, "Cannot raise action");
                false
            }
        }
    }

    /// Raise a typed action.
    pub fn raise_action(&mut self, action: Action) {
        self.raise(action.index());
    }

    /// Consume the flag at a raw index. Returns true only if it was set.
    pub fn test_and_clear(&mut self, action: u8) -> bool {
        match self.slot_mut(action) {
            Ok(flag) => {
                if !flag.active {
                    return false;
                }
                flag.active = false;
                flag.stale_count = 0;
                true
            }
            Err(err) => {
                error!(error = %err, "Cannot check action");
                false
            }
        }
    }

    /// Consume a typed action.
    pub fn take(&mut self, action: Action) -> bool {
        self.test_and_clear(action.index())
    }

    /// Read-only view of a flag; out-of-range indices read as clear.
    pub fn is_set(&self, action: u8) -> bool {
        self.flags
            .get(usize::from(action))
            .map_or(false, |flag| flag.active)
    }

    /// Age every set flag by one iteration, dropping those that reach [`FLAG_STALE`].
    ///
    /// Call exactly once per control-loop iteration.
    pub fn tick(&mut self) {
        for (index, flag) in self.flags.iter_mut().enumerate() {
            if !flag.active {
                continue;
            }
            flag.stale_count += 1;
            if flag.stale_count >= FLAG_STALE {
                flag.active = false;
                flag.stale_count = 0;
                debug!(action = index, "Stale action dropped");
            }
        }
    }

    fn slot_mut(&mut self, action: u8) -> Result<&mut ActionFlag, PibError> {
        self.flags
            .get_mut(usize::from(action))
            .ok_or(PibError::ActionOutOfRange {
                action,
                limit: NUM_ACTIONS,
            })
    }
}
