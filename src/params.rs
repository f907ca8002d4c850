//! Persisted instrument parameters.
//!
//! `PibParams` is the block of named parameters the winch and profiler logic reads: motion
//! lengths and velocities, profile timing, and the dock state. A [`ConfigStore`] owns the
//! block and persists changes.
//!
//! Two stores are provided:
//!
//! - [`FileStore`] keeps the block in a TOML file. Loading goes through figment, so missing
//!   keys fall back to the built-in defaults. A file that is absent or unreadable is
//!   replaced with defaults and a warning is logged.
//! - [`MemoryStore`] keeps the block in memory, for tests and the simulator.
//!
//! ```toml
//! deploy_length = 5.0
//! deploy_velocity = 250.0
//! real_time_mcb = false
//! num_profiles = 3
//! profile_period = 3600
//! ```

use std::path::{Path, PathBuf};

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PibError, PibResult};

/// Time-trigger value meaning "no trigger armed".
pub const TIME_TRIGGER_DISARMED: u32 = u32::MAX;

/// Instrument parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PibParams {
    /// Tether paid out per profile, revolutions.
    pub deploy_length: f32,
    /// Revolutions per minute; the other velocities share the unit.
    pub deploy_velocity: f32,
    /// Tether reeled in per retract, revolutions.
    pub retract_length: f32,
    /// Revolutions per minute.
    pub retract_velocity: f32,
    /// Final docking pull, revolutions.
    pub dock_length: f32,
    /// Revolutions per minute.
    pub dock_velocity: f32,
    /// Margin added to every predicted motion duration, seconds.
    pub motion_timeout: u16,
    /// Stream MCB motion telemetry packet-per-record instead of buffering it.
    pub real_time_mcb: bool,
    /// Profiling unit is seated in the dock.
    pub pu_docked: bool,
    /// Profiles per schedule batch.
    pub num_profiles: u8,
    /// Seconds between scheduled profiles.
    pub profile_period: u32,
    /// Nominal profile depth, revolutions.
    pub profile_size: f32,
    /// Dock approach length, revolutions.
    pub dock_amount: f32,
    /// Extra pull past the dock, revolutions.
    pub dock_overshoot: f32,
    /// Epoch seconds of the armed trigger, or [`TIME_TRIGGER_DISARMED`].
    pub time_trigger: u32,
    /// Warm-up before a profile, seconds.
    pub preprofile_time: u16,
    /// Seconds.
    pub dwell_time: u16,
    /// Sample period while profiling, seconds.
    pub profile_rate: u16,
    /// Sample period while dwelling, seconds.
    pub dwell_rate: u16,
    /// Run TSEN during profiles.
    pub profile_tsen: bool,
    /// Run ROPC during profiles.
    pub profile_ropc: bool,
    /// Run the flash instrument during profiles.
    pub profile_flash: bool,
}

impl Default for PibParams {
    fn default() -> Self {
        Self {
            deploy_length: 5.0,
            deploy_velocity: 250.0,
            retract_length: 4.5,
            retract_velocity: 250.0,
            dock_length: 0.5,
            dock_velocity: 60.0,
            motion_timeout: 60,
            real_time_mcb: false,
            pu_docked: true,
            num_profiles: 1,
            profile_period: 3600,
            profile_size: 4.5,
            dock_amount: 0.5,
            dock_overshoot: 0.1,
            time_trigger: TIME_TRIGGER_DISARMED,
            preprofile_time: 300,
            dwell_time: 300,
            profile_rate: 1,
            dwell_rate: 1,
            profile_tsen: true,
            profile_ropc: true,
            profile_flash: true,
        }
    }
}

/// Owner of the persisted parameter block.
pub trait ConfigStore {
    /// Current parameter block.
    fn params(&self) -> &PibParams;
    /// Mutable block; changes need a `persist`.
    fn params_mut(&mut self) -> &mut PibParams;
    /// Write the current block to backing storage.
    fn persist(&mut self) -> PibResult<()>;

    /// Serialized copy of the block, as dumped over telemetry.
    fn bufferize(&self) -> PibResult<Vec<u8>> {
        Ok(bincode::serialize(self.params())?)
    }

    /// Set the dock state and persist.
    fn write_pu_docked(&mut self, docked: bool) -> PibResult<()> {
        self.params_mut().pu_docked = docked;
        self.persist()
    }

    /// Set the time trigger and persist.
    fn write_time_trigger(&mut self, trigger: u32) -> PibResult<()> {
        self.params_mut().time_trigger = trigger;
        self.persist()
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory store. Counts persists and can be told to fail them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    params: PibParams,
    persist_count: usize,
    fail_persist: bool,
}

impl MemoryStore {
    /// Store holding `params`; persists always succeed until told otherwise.
    pub fn new(params: PibParams) -> Self {
        Self {
            params,
            persist_count: 0,
            fail_persist: false,
        }
    }

    /// Make later persists fail.
    pub fn set_fail_persist(&mut self, fail: bool) {
        self.fail_persist = fail;
    }

    /// Successful persists so far.
    pub fn persist_count(&self) -> usize {
        self.persist_count
    }
}

impl ConfigStore for MemoryStore {
    fn params(&self) -> &PibParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut PibParams {
        &mut self.params
    }

    fn persist(&mut self) -> PibResult<()> {
        if self.fail_persist {
            return Err(PibError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        self.persist_count += 1;
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// TOML-file backed store.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    params: PibParams,
    loaded_cleanly: bool,
}

impl FileStore {
    /// Load the block from `path`, falling back to defaults on any failure.
    ///
    /// The fallback is written back so the next start finds a valid file.
    pub fn initialize(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match Self::load(&path) {
            Ok(params) => {
                info!(path = %path.display(), "Loaded instrument parameters");
                Self {
                    path,
                    params,
                    loaded_cleanly: true,
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Error loading parameters, reconfigured with defaults");
                let mut store = Self {
                    path,
                    params: PibParams::default(),
                    loaded_cleanly: false,
                };
                if let Err(err) = store.persist() {
                    warn!(error = %err, "Unable to write default parameters");
                }
                store
            }
        }
    }

    fn load(path: &Path) -> PibResult<PibParams> {
        if !path.exists() {
            return Err(PibError::Configuration(format!(
                "parameter file not found: {}",
                path.display()
            )));
        }
        let params = Figment::from(Serialized::defaults(PibParams::default()))
            .merge(Toml::file(path))
            .extract()?;
        Ok(params)
    }

    /// False when initialization fell back to defaults.
    pub fn loaded_cleanly(&self) -> bool {
        self.loaded_cleanly
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn params(&self) -> &PibParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut PibParams {
        &mut self.params
    }

    fn persist(&mut self) -> PibResult<()> {
        let text = toml::to_string_pretty(&self.params)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_disarmed_and_docked() {
        let params = PibParams::default();
        assert_eq!(params.time_trigger, TIME_TRIGGER_DISARMED);
        assert!(params.pu_docked);
        assert!(!params.real_time_mcb);
    }

    #[test]
    fn test_file_store_missing_file_falls_back_and_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.toml");

        let store = FileStore::initialize(&path);
        assert!(!store.loaded_cleanly());
        assert_eq!(store.params(), &PibParams::default());
        assert!(path.exists());

        let reloaded = FileStore::initialize(&path);
        assert!(reloaded.loaded_cleanly());
        assert_eq!(reloaded.params(), &PibParams::default());
    }

    #[test]
    fn test_file_store_partial_file_uses_defaults_for_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(&path, "num_profiles = 4\nreal_time_mcb = true\n").unwrap();

        let store = FileStore::initialize(&path);
        assert!(store.loaded_cleanly());
        assert_eq!(store.params().num_profiles, 4);
        assert!(store.params().real_time_mcb);
        assert_eq!(store.params().dock_velocity, 60.0);
    }

    #[test]
    fn test_file_store_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.toml");
        std::fs::write(&path, "num_profiles = \"many\"\n").unwrap();

        let store = FileStore::initialize(&path);
        assert!(!store.loaded_cleanly());
        assert_eq!(store.params().num_profiles, 1);
    }

    #[test]
    fn test_write_pu_docked_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("params.toml");
        let mut store = FileStore::initialize(&path);

        store.write_pu_docked(false).unwrap();
        let reloaded = FileStore::initialize(&path);
        assert!(!reloaded.params().pu_docked);
    }

    #[test]
    fn test_memory_store_persist_failure_keeps_value() {
        let mut store = MemoryStore::default();
        store.set_fail_persist(true);
        assert!(store.write_time_trigger(1234).is_err());
        assert_eq!(store.params().time_trigger, 1234);
        assert_eq!(store.persist_count(), 0);
    }

    #[test]
    fn test_bufferize_is_nonempty() {
        let store = MemoryStore::default();
        let bytes = store.bufferize().unwrap();
        assert!(!bytes.is_empty());
        let decoded: PibParams = bincode::deserialize(&bytes).unwrap();
        assert_eq!(&decoded, store.params());
    }
}
