//! Decoders for the four register blocks of the telemetry stream.
//!
//! Every block is decoded from a [`Frame`] that already matched the block's
//! exact signature, so all byte and register offsets used below are inside the
//! payload. Offsets named `byte` count from the start of the frame (the
//! address byte is byte 0, the first payload byte is byte 3); offsets named
//! `register` count big-endian words from the start of the payload.

use crate::protocol::{Frame, Pressure, RecordKind, Temperature};
use std::fmt;

/// A two state output such as a relay or a heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Switch {
    #[default]
    Off,
    On,
}

impl Switch {
    fn from_bool(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }

    pub fn is_on(&self) -> bool {
        *self == Switch::On
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "on" } else { "off" })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Defrost {
    #[default]
    Inactive,
    Starting,
    Active,
}

impl Defrost {
    pub fn is_defrosting(&self) -> bool {
        *self != Defrost::Inactive
    }
}

/// Operating mode selected on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ControlMode {
    Off,
    Cool,
    Heat,
}

/// Mode the refrigerant circuit is currently running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Mode {
    Heat,
    Cool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CompressorStatus {
    #[default]
    Off,
    Starting,
    StartingSecondary,
    On,
}

/// Temperatures and pressures block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Temperatures {
    pub water_in: Temperature,
    pub water_out: Temperature,
    pub external: Temperature,
    pub compressor_in: Temperature,
    pub compressor_out: Temperature,
    pub pressure_suction: Pressure,
    pub pressure_condensation: Pressure,
}

impl Temperatures {
    const WATER_IN: usize = 1;
    const WATER_OUT: usize = 2;
    const CONDENSATION: usize = 7;
    const SUCTION: usize = 15;
    const COMPRESSOR_IN: usize = 23;
    const EXTERNAL: usize = 29;
    const COMPRESSOR_OUT: usize = 34;

    fn decode(frame: &Frame) -> Self {
        let temperature = |index| Temperature::from_register(frame.register(index));
        Self {
            water_in: temperature(Self::WATER_IN),
            water_out: temperature(Self::WATER_OUT),
            external: temperature(Self::EXTERNAL),
            compressor_in: temperature(Self::COMPRESSOR_IN),
            compressor_out: temperature(Self::COMPRESSOR_OUT),
            pressure_suction: Pressure::from_register(frame.register(Self::SUCTION)),
            pressure_condensation: Pressure::from_register(frame.register(Self::CONDENSATION)),
        }
    }
}

impl fmt::Display for Temperatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temp: wtr_in={} wtr_out={} ext={} cmp_in={} cmp_out={} - Press: suct={} cond={}",
            self.water_in,
            self.water_out,
            self.external,
            self.compressor_in,
            self.compressor_out,
            self.pressure_suction,
            self.pressure_condensation
        )
    }
}

/// Bits of the first status byte (frame byte 3) of the states block.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum StatusBit {
    Standby = 0x02,
    CompressorRequired = 0x10,
}

impl StatusBit {
    fn is_set(self, byte: u8) -> bool {
        byte & self as u8 != 0
    }
}

/// Whole-byte values of frame byte 3 announcing a defrost cycle. Other status
/// bits share this byte, so these are compared by value and never masked.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum DefrostCode {
    Starting = 0x30,
    Active = 0x50,
}

impl DefrostCode {
    fn decode(byte: u8) -> Defrost {
        match byte {
            b if b == DefrostCode::Starting as u8 => Defrost::Starting,
            b if b == DefrostCode::Active as u8 => Defrost::Active,
            _ => Defrost::Inactive,
        }
    }
}

/// Operational status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct States {
    pub status: Switch,
    pub compressor_required: bool,
    pub defrost: Defrost,
    /// `None` when the controller reports a value outside the known mapping.
    pub control_mode: Option<ControlMode>,
    /// `None` when the controller reports a value outside the known mapping.
    pub mode: Option<Mode>,
    pub compressor_hz: u16,
    pub fan_speed: u16,
    pub pump_speed: u16,
    pub hours: u16,
}

impl States {
    const STATUS_BYTE: usize = 3;
    const CONTROL_MODE_BYTE: usize = 4;
    const MODE_BYTE: usize = 7;

    fn decode(frame: &Frame) -> Self {
        let status = frame.byte(Self::STATUS_BYTE);
        Self {
            status: Switch::from_bool(!StatusBit::Standby.is_set(status)),
            compressor_required: StatusBit::CompressorRequired.is_set(status),
            defrost: DefrostCode::decode(status),
            control_mode: match frame.byte(Self::CONTROL_MODE_BYTE) {
                0x00 => Some(ControlMode::Off),
                0x01 => Some(ControlMode::Cool),
                0x02 => Some(ControlMode::Heat),
                _ => None,
            },
            mode: match frame.byte(Self::MODE_BYTE) {
                0x40 => Some(Mode::Heat),
                0x80 => Some(Mode::Cool),
                _ => None,
            },
            compressor_hz: frame.register(5),
            fan_speed: frame.register(6),
            pump_speed: frame.register(7),
            hours: frame.register(8),
        }
    }
}

impl fmt::Display for States {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} cmp_req={} defrost={:?} ctrl={:?} mode={:?} hz={} fan={} pump={} hours={}",
            self.status,
            self.compressor_required,
            self.defrost,
            self.control_mode,
            self.mode,
            self.compressor_hz,
            self.fan_speed,
            self.pump_speed,
            self.hours
        )
    }
}

/// Bits of frame byte 3 of the machine block.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum CompressorBit {
    Active = 0x01,
    OilHeater = 0x80,
}

impl CompressorBit {
    fn is_set(self, byte: u8) -> bool {
        byte & self as u8 != 0
    }
}

/// Bits of frame byte 4 of the machine block.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum DriveBit {
    Starting = 0x01,
    Thrust = 0x08,
}

impl DriveBit {
    fn is_set(self, byte: u8) -> bool {
        byte & self as u8 != 0
    }
}

/// Mask over register 2 of the machine block that is fully set while the
/// circulation pump runs.
const CIRCULATION_PUMP_ACTIVE: u16 = 0x0601;

/// Compressor and circulation pump block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Machine {
    pub compressor_status: CompressorStatus,
    pub oil_heater: Switch,
    pub compressor_thrust: Switch,
    pub pump_status: Switch,
}

impl Machine {
    const COMPRESSOR_BYTE: usize = 3;
    const DRIVE_BYTE: usize = 4;
    const PUMP_REGISTER: usize = 2;

    /// `compressor_required` is the flag from the most recent states block; the
    /// machine block alone cannot tell a starting compressor from a stopped one.
    fn decode(frame: &Frame, compressor_required: bool) -> Self {
        let compressor = frame.byte(Self::COMPRESSOR_BYTE);
        let drive = frame.byte(Self::DRIVE_BYTE);
        let compressor_status = if CompressorBit::Active.is_set(compressor) {
            CompressorStatus::On
        } else if !compressor_required {
            CompressorStatus::Off
        } else if DriveBit::Starting.is_set(drive) {
            CompressorStatus::StartingSecondary
        } else {
            CompressorStatus::Starting
        };
        let pump = frame.register(Self::PUMP_REGISTER);
        Self {
            compressor_status,
            oil_heater: Switch::from_bool(CompressorBit::OilHeater.is_set(compressor)),
            compressor_thrust: Switch::from_bool(DriveBit::Thrust.is_set(drive)),
            pump_status: Switch::from_bool(
                pump & CIRCULATION_PUMP_ACTIVE == CIRCULATION_PUMP_ACTIVE,
            ),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compressor={:?} oil_heater={} thrust={} pump={}",
            self.compressor_status, self.oil_heater, self.compressor_thrust, self.pump_status
        )
    }
}

/// Active error codes; zero means no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Errors {
    pub error1: u16,
    pub error2: u16,
    pub error3: u16,
    pub error4: u16,
    pub error5: u16,
}

impl Errors {
    fn decode(frame: &Frame) -> Self {
        Self {
            error1: frame.register(0),
            error2: frame.register(1),
            error3: frame.register(2),
            error4: frame.register(3),
            error5: frame.register(4),
        }
    }

    pub fn codes(&self) -> [u16; 5] {
        [self.error1, self.error2, self.error3, self.error4, self.error5]
    }

    pub fn any(&self) -> bool {
        self.codes().iter().any(|code| *code != 0)
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [e1, e2, e3, e4, e5] = self.codes();
        write!(f, "errors={e1} {e2} {e3} {e4} {e5}")
    }
}

/// One decoded register block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    Temperatures(Temperatures),
    States(States),
    Machine(Machine),
    Errors(Errors),
}

impl Record {
    /// Decodes a validated frame, or returns `None` when its shape matches
    /// none of the known blocks.
    ///
    /// `compressor_required` must carry the flag of the last decoded states
    /// block; it is only consulted for machine blocks.
    pub fn decode(frame: &Frame, compressor_required: bool) -> Option<Self> {
        let record = match RecordKind::classify(frame)? {
            RecordKind::Temperatures => Record::Temperatures(Temperatures::decode(frame)),
            RecordKind::States => Record::States(States::decode(frame)),
            RecordKind::Machine => Record::Machine(Machine::decode(frame, compressor_required)),
            RecordKind::Errors => Record::Errors(Errors::decode(frame)),
        };
        Some(record)
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Temperatures(_) => RecordKind::Temperatures,
            Record::States(_) => RecordKind::States,
            Record::Machine(_) => RecordKind::Machine,
            Record::Errors(_) => RecordKind::Errors,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Temperatures(record) => record.fmt(f),
            Record::States(record) => record.fmt(f),
            Record::Machine(record) => record.fmt(f),
            Record::Errors(record) => record.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameFilter};
    use assert_matches::assert_matches;

    fn words_to_payload(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_be_bytes()).collect()
    }

    fn decode(payload: &[u8], compressor_required: bool) -> Option<Record> {
        let bytes = build_frame(0x01, 0x03, payload);
        let frame = FrameFilter::default().validate(&bytes).unwrap();
        Record::decode(&frame, compressor_required)
    }

    #[test]
    fn temperatures_from_literal_frame() {
        let mut words = [0u16; 50];
        words[1] = 352; // 35.2
        words[2] = 298; // 29.8
        words[7] = 1875;
        words[15] = 642;
        words[23] = 0xFFCE; // -5.0
        words[29] = 0xFFF9; // -0.7
        words[34] = 613;
        let record = decode(&words_to_payload(&words), false);

        let temperatures = assert_matches!(record, Some(Record::Temperatures(t)) => t);
        assert_eq!(temperatures.water_in.to_string(), "35.2");
        assert_eq!(temperatures.water_out.to_string(), "29.8");
        assert_eq!(temperatures.compressor_in.as_f32(), -5.0);
        assert_eq!(temperatures.external.to_string(), "-0.7");
        assert_eq!(temperatures.compressor_out.to_string(), "61.3");
        assert_eq!(temperatures.pressure_suction.raw(), 642);
        assert_eq!(temperatures.pressure_condensation.raw(), 1875);
    }

    fn states_payload(status: u8, control: u8, mode: u8) -> Vec<u8> {
        let mut words = [0u16; 11];
        words[0] = u16::from_be_bytes([status, control]);
        words[2] = u16::from_be_bytes([mode, 0x00]);
        words[5] = 48;
        words[6] = 620;
        words[7] = 75;
        words[8] = 10234;
        words_to_payload(&words)
    }

    #[test]
    fn states_fields() {
        let record = decode(&states_payload(0x10, 0x02, 0x40), false);
        let states = assert_matches!(record, Some(Record::States(s)) => s);
        assert_eq!(states.status, Switch::On);
        assert!(states.compressor_required);
        assert_eq!(states.defrost, Defrost::Inactive);
        assert_eq!(states.control_mode, Some(ControlMode::Heat));
        assert_eq!(states.mode, Some(Mode::Heat));
        assert_eq!(states.compressor_hz, 48);
        assert_eq!(states.fan_speed, 620);
        assert_eq!(states.pump_speed, 75);
        assert_eq!(states.hours, 10234);

        let record = decode(&states_payload(0x02, 0x01, 0x80), false);
        let states = assert_matches!(record, Some(Record::States(s)) => s);
        assert_eq!(states.status, Switch::Off);
        assert!(!states.compressor_required);
        assert_eq!(states.control_mode, Some(ControlMode::Cool));
        assert_eq!(states.mode, Some(Mode::Cool));

        let record = decode(&states_payload(0x00, 0x07, 0xC0), false);
        let states = assert_matches!(record, Some(Record::States(s)) => s);
        assert_eq!(states.control_mode, None);
        assert_eq!(states.mode, None);
    }

    #[test]
    fn defrost_matches_whole_byte() {
        let defrost = |status| match decode(&states_payload(status, 0, 0x40), false) {
            Some(Record::States(states)) => states.defrost,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(defrost(0x30), Defrost::Starting);
        assert_eq!(defrost(0x50), Defrost::Active);
        // Masking would misread these, the extra bits belong to other flags.
        assert_eq!(defrost(0x32), Defrost::Inactive);
        assert_eq!(defrost(0x70), Defrost::Inactive);
        assert_eq!(defrost(0x10), Defrost::Inactive);
    }

    fn machine_payload(compressor: u8, drive: u8, pump: u16) -> Vec<u8> {
        words_to_payload(&[u16::from_be_bytes([compressor, drive]), 0, pump])
    }

    #[test]
    fn machine_compressor_status() {
        let status = |compressor, drive, required| match decode(
            &machine_payload(compressor, drive, 0),
            required,
        ) {
            Some(Record::Machine(machine)) => machine.compressor_status,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(status(0x01, 0x00, false), CompressorStatus::On);
        assert_eq!(status(0x01, 0x01, true), CompressorStatus::On);
        assert_eq!(status(0x00, 0x01, false), CompressorStatus::Off);
        assert_eq!(status(0x00, 0x00, true), CompressorStatus::Starting);
        assert_eq!(status(0x00, 0x01, true), CompressorStatus::StartingSecondary);
    }

    #[test]
    fn machine_outputs() {
        let record = decode(&machine_payload(0x81, 0x08, 0x0601), false);
        let machine = assert_matches!(record, Some(Record::Machine(m)) => m);
        assert_eq!(machine.oil_heater, Switch::On);
        assert_eq!(machine.compressor_thrust, Switch::On);
        assert_eq!(machine.pump_status, Switch::On);

        let record = decode(&machine_payload(0x01, 0x00, 0x0600), false);
        let machine = assert_matches!(record, Some(Record::Machine(m)) => m);
        assert_eq!(machine.oil_heater, Switch::Off);
        assert_eq!(machine.compressor_thrust, Switch::Off);
        assert_eq!(machine.pump_status, Switch::Off);

        let record = decode(&machine_payload(0x00, 0x00, 0xFFFF), false);
        let machine = assert_matches!(record, Some(Record::Machine(m)) => m);
        assert_eq!(machine.pump_status, Switch::On);
    }

    #[test]
    fn errors_are_stored_directly() {
        let record = decode(&words_to_payload(&[0, 12, 0, 0, 300]), false);
        let errors = assert_matches!(record, Some(Record::Errors(e)) => e);
        assert_eq!(errors.codes(), [0, 12, 0, 0, 300]);
        assert!(errors.any());
        assert!(!Errors::default().any());
    }

    #[test]
    fn unknown_shape_decodes_to_nothing() {
        assert_eq!(decode(&[0; 8], true), None);
        assert_eq!(decode(&[0; 4], true), None);
    }
}
