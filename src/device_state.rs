//! Derived boolean device conditions mirrored as marker resources.
//!
//! Other processes on the host watch for the presence of one marker per
//! condition (by default a file in `/dev/shm`). Markers are only touched on
//! edges: a condition already known to be on is not re-created, one known to be
//! off is not removed again. A failed side effect leaves the tracked state
//! untouched, so the same transition is attempted on the next observation.

use crate::record::{Machine, Mode, States};
use log::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Capability to create and remove named markers.
pub trait MarkerStore {
    fn create(&mut self, name: &str) -> io::Result<()>;

    /// Removes all `names` as one batch. Removing a missing marker is not an error.
    fn remove(&mut self, names: &[&str]) -> io::Result<()>;
}

/// Markers as empty files inside one directory.
#[derive(Debug, Clone)]
pub struct FileMarkers {
    dir: PathBuf,
}

impl FileMarkers {
    /// Uses `dir` for the markers, creating it when missing.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MarkerStore for FileMarkers {
    fn create(&mut self, name: &str) -> io::Result<()> {
        fs::File::create(self.dir.join(name)).map(|_| ())
    }

    fn remove(&mut self, names: &[&str]) -> io::Result<()> {
        let mut result = Ok(());
        for name in names {
            match fs::remove_file(self.dir.join(name)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        result
    }
}

/// Tracked value of one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tristate {
    #[default]
    Unknown,
    Off,
    On,
}

/// The conditions mirrored as markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Powered,
    Running,
    Pump,
    Compressor,
    CoolMode,
    Defrost,
}

impl Condition {
    pub const ALL: [Condition; 6] = [
        Condition::Powered,
        Condition::Running,
        Condition::Pump,
        Condition::Compressor,
        Condition::CoolMode,
        Condition::Defrost,
    ];

    pub const fn marker_name(&self) -> &'static str {
        match self {
            Condition::Powered => "VitocalPowered",
            Condition::Running => "VitocalStatusOn",
            Condition::Pump => "VitocalPumpOn",
            Condition::Compressor => "VitocalCompressorOn",
            Condition::CoolMode => "VitocalModeCool",
            Condition::Defrost => "VitocalDefrost",
        }
    }

    const fn index(&self) -> usize {
        *self as usize
    }
}

/// Owner of the tracked conditions and of the marker store backing them.
#[derive(Debug)]
pub struct DeviceState<M> {
    store: M,
    states: [Tristate; 6],
}

impl<M: MarkerStore> DeviceState<M> {
    pub fn new(store: M) -> Self {
        Self {
            store,
            states: [Tristate::Unknown; 6],
        }
    }

    pub fn get(&self, condition: Condition) -> Tristate {
        self.states[condition.index()]
    }

    pub fn store(&self) -> &M {
        &self.store
    }

    /// Creates the marker unless the condition is already on.
    ///
    /// Returns `true` when the tracked state changed.
    pub fn mark_on(&mut self, condition: Condition) -> bool {
        if self.get(condition) == Tristate::On {
            return false;
        }
        match self.store.create(condition.marker_name()) {
            Ok(()) => {
                debug!("{condition:?} on");
                self.states[condition.index()] = Tristate::On;
                true
            }
            Err(err) => {
                warn!("Cannot create marker {}: {err}", condition.marker_name());
                false
            }
        }
    }

    /// Removes the marker unless the condition is already off.
    ///
    /// Returns `true` when the tracked state changed.
    pub fn mark_off(&mut self, condition: Condition) -> bool {
        if self.get(condition) == Tristate::Off {
            return false;
        }
        match self.store.remove(&[condition.marker_name()]) {
            Ok(()) => {
                debug!("{condition:?} off");
                self.states[condition.index()] = Tristate::Off;
                true
            }
            Err(err) => {
                warn!("Cannot remove marker {}: {err}", condition.marker_name());
                false
            }
        }
    }

    pub fn mark(&mut self, condition: Condition, on: bool) -> bool {
        if on {
            self.mark_on(condition)
        } else {
            self.mark_off(condition)
        }
    }

    /// Drives every condition off in a single removal batch after the device
    /// went quiet. Nothing happens when the device is already known to be off.
    ///
    /// Returns `true` when the batch was issued and succeeded.
    pub fn device_silent(&mut self) -> bool {
        if self.get(Condition::Powered) == Tristate::Off {
            return false;
        }
        let names = Condition::ALL.map(|condition| condition.marker_name());
        match self.store.remove(&names) {
            Ok(()) => {
                info!("No data from heat pump, assuming it is not powered");
                self.states = [Tristate::Off; 6];
                true
            }
            Err(err) => {
                warn!("Cannot remove markers: {err}");
                false
            }
        }
    }

    /// Updates the conditions derived from a states block.
    pub fn observe_states(&mut self, states: &States) {
        self.mark(Condition::Running, states.status.is_on());
        self.mark(Condition::Compressor, states.compressor_required);
        self.mark(Condition::Defrost, states.defrost.is_defrosting());
        match states.mode {
            Some(Mode::Cool) => {
                self.mark_on(Condition::CoolMode);
            }
            Some(Mode::Heat) => {
                self.mark_off(Condition::CoolMode);
            }
            None => {}
        }
    }

    /// Updates the conditions derived from a machine block.
    pub fn observe_machine(&mut self, machine: &Machine) {
        self.mark(Condition::Pump, machine.pump_status.is_on());
    }
}
