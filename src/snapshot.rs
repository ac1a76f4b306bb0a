//! Assembly of decoded register blocks into one device snapshot.
//!
//! The controller does not send the four blocks atomically, so the snapshot
//! keeps the last value of every field and tracks which blocks were refreshed
//! since the previous publish. Only the completeness set is reset per cycle.

use crate::protocol::RecordKind;
use crate::record::{Errors, Machine, Record, States, Temperatures};
use chrono::{DateTime, Utc};
use std::fmt;

/// Set of record kinds observed since the last completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completeness(u8);

impl Completeness {
    const ALL: u8 = 0x0F;

    pub fn insert(&mut self, kind: RecordKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: RecordKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_complete(&self) -> bool {
        self.0 & Self::ALL == Self::ALL
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// The accumulated device state published to the bus.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    timestamp: Option<DateTime<Utc>>,
    pub temperatures: Temperatures,
    pub states: States,
    pub machine: Machine,
    pub errors: Errors,
    completeness: Completeness,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the fields carried by `record` and records its kind.
    ///
    /// Returns `true` once every kind has been observed in this cycle, in
    /// which case the snapshot is stamped with `now`. Control and circuit mode
    /// keep their previous value when the block reports an unmapped code.
    pub fn apply(&mut self, record: Record, now: DateTime<Utc>) -> bool {
        self.completeness.insert(record.kind());
        match record {
            Record::Temperatures(temperatures) => self.temperatures = temperatures,
            Record::States(states) => {
                let control_mode = states.control_mode.or(self.states.control_mode);
                let mode = states.mode.or(self.states.mode);
                self.states = States {
                    control_mode,
                    mode,
                    ..states
                };
            }
            Record::Machine(machine) => self.machine = machine,
            Record::Errors(errors) => self.errors = errors,
        }

        let ready = self.completeness.is_complete();
        if ready {
            self.timestamp = Some(now);
        }
        ready
    }

    /// Starts a new cycle. Field values are retained.
    pub fn begin_cycle(&mut self) {
        self.completeness.clear();
    }

    pub fn is_ready(&self) -> bool {
        self.completeness.is_complete()
    }

    pub fn completeness(&self) -> Completeness {
        self.completeness
    }

    /// Time the snapshot last became complete.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Flag used by consumers to tell whether the heat pump is doing work.
    pub fn is_running(&self) -> bool {
        self.states.status.is_on() || self.machine.pump_status.is_on()
    }

    #[cfg(feature = "serde")]
    fn document(&self) -> Document<'_> {
        let temperatures = &self.temperatures;
        Document {
            timestamp: self.timestamp,
            control_mode: self.states.control_mode,
            status: self.states.status,
            mode: self.states.mode,
            defrost: self.states.defrost,
            oil_heater: self.machine.oil_heater,
            compressor_required: self.states.compressor_required,
            compressor_status: self.machine.compressor_status,
            compressor_thrust: self.machine.compressor_thrust,
            compressor_hz: self.states.compressor_hz,
            pump_status: self.machine.pump_status,
            pump_speed: self.states.pump_speed,
            fan_speed: self.states.fan_speed,
            temperatures: TemperatureDocument {
                water_in: temperatures.water_in,
                water_out: temperatures.water_out,
                external: temperatures.external,
                compressor_in: temperatures.compressor_in,
                compressor_out: temperatures.compressor_out,
            },
            pressure_suction: temperatures.pressure_suction,
            pressure_condensation: temperatures.pressure_condensation,
            hours: self.states.hours,
            errors: &self.errors,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.machine, self.states, self.temperatures, self.errors
        )
    }
}

/// Published layout of a [`Snapshot`].
#[cfg(feature = "serde")]
#[derive(serde::Serialize)]
struct Document<'a> {
    timestamp: Option<DateTime<Utc>>,
    control_mode: Option<crate::record::ControlMode>,
    status: crate::record::Switch,
    mode: Option<crate::record::Mode>,
    defrost: crate::record::Defrost,
    oil_heater: crate::record::Switch,
    compressor_required: bool,
    compressor_status: crate::record::CompressorStatus,
    compressor_thrust: crate::record::Switch,
    compressor_hz: u16,
    pump_status: crate::record::Switch,
    pump_speed: u16,
    fan_speed: u16,
    temperatures: TemperatureDocument,
    pressure_suction: crate::protocol::Pressure,
    pressure_condensation: crate::protocol::Pressure,
    hours: u16,
    errors: &'a Errors,
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize)]
struct TemperatureDocument {
    water_in: crate::protocol::Temperature,
    water_out: crate::protocol::Temperature,
    external: crate::protocol::Temperature,
    compressor_in: crate::protocol::Temperature,
    compressor_out: crate::protocol::Temperature,
}

#[cfg(feature = "serde")]
impl serde::Serialize for Snapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document().serialize(serializer)
    }
}
