//! Wire level definitions for the Vitocal Modbus telemetry stream.
//!
//! The heat pump controller continuously dumps a fixed set of holding register
//! blocks as Modbus RTU style responses over TCP:
//!
//! ```text
//! [address:1][function:1][byte_count:1][payload:byte_count][crc_low:1][crc_high:1]
//! ```
//!
//! There is no message type field. A response is recognised purely by its
//! shape: the declared byte count must match the window that was read, the
//! address and function must be the configured ones and the trailing CRC16
//! must match. [`FrameFilter::validate`] performs these checks and hands out a
//! [`Frame`] that the record decoders can index safely.

use std::fmt;

/// Largest byte window produced by one read of the stream.
pub const MAX_FRAME_LEN: usize = 256;

/// Bytes preceding the payload: address, function and byte count.
pub const HEADER_LEN: usize = 3;

/// Trailing CRC16 bytes.
pub const CRC_LEN: usize = 2;

/// Slave address used by the controller out of the box.
pub const DEFAULT_SLAVE_ADDRESS: u8 = 0x01;

/// Modbus "read holding registers" function code.
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

const CRC_INIT: u16 = 0xFFFF;
const CRC_POLYNOMIAL: u16 = 0xA001;

/// Computes the Modbus CRC16 over `data`.
///
/// The low byte of the result is transmitted first.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |mut crc, byte| {
        crc ^= *byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC_POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
        crc
    })
}

/// Reasons a byte window is not accepted as a telemetry frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame of {0} bytes is too short")]
    TooShort(usize),
    #[error("Declared byte count {declared} does not match a frame of {len} bytes")]
    LengthMismatch { declared: u8, len: usize },
    #[error("Unexpected slave address {received:#04x}, expected {expected:#04x}")]
    AddressMismatch { expected: u8, received: u8 },
    #[error("Unexpected function code {received:#04x}, expected {expected:#04x}")]
    FunctionMismatch { expected: u8, received: u8 },
    #[error("CRC mismatch: computed {computed:#06x}, received {received:#06x}")]
    CrcMismatch { computed: u16, received: u16 },
}

/// Address and function a frame must carry to be a decode candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFilter {
    pub slave: u8,
    pub function: u8,
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self {
            slave: DEFAULT_SLAVE_ADDRESS,
            function: READ_HOLDING_REGISTERS,
        }
    }
}

impl FrameFilter {
    pub fn new(slave: u8, function: u8) -> Self {
        Self { slave, function }
    }

    /// Checks shape, address, function and CRC of `bytes`, in that order.
    ///
    /// The CRC is only computed once the cheap shape checks passed, so the
    /// bulk of unrelated traffic is rejected without hashing it.
    pub fn validate<'a>(&self, bytes: &'a [u8]) -> Result<Frame<'a>, FrameError> {
        let len = bytes.len();
        if len <= 2 {
            return Err(FrameError::TooShort(len));
        }
        let declared = bytes[2];
        if declared as usize + HEADER_LEN + CRC_LEN != len {
            return Err(FrameError::LengthMismatch { declared, len });
        }
        if bytes[0] != self.slave {
            return Err(FrameError::AddressMismatch {
                expected: self.slave,
                received: bytes[0],
            });
        }
        if bytes[1] != self.function {
            return Err(FrameError::FunctionMismatch {
                expected: self.function,
                received: bytes[1],
            });
        }

        let (body, trailer) = bytes.split_at(len - CRC_LEN);
        let computed = crc16(body);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        if computed != received {
            return Err(FrameError::CrcMismatch { computed, received });
        }
        Ok(Frame { bytes })
    }
}

/// A byte window that passed [`FrameFilter::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Total frame length including header and CRC.
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Declared payload length (byte 2).
    pub fn byte_count(&self) -> u8 {
        self.bytes[2]
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_LEN..self.bytes.len() - CRC_LEN]
    }

    /// Returns byte `index` counted from the start of the frame.
    pub(crate) fn byte(&self, index: usize) -> u8 {
        self.bytes[index]
    }

    /// Returns payload register `index` as a big-endian word.
    pub(crate) fn register(&self, index: usize) -> u16 {
        let offset = HEADER_LEN + index * 2;
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// All payload registers in order.
    pub fn registers(&self) -> impl Iterator<Item = u16> + 'a {
        self.payload()
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }
}

/// The register blocks the controller dumps, told apart by their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RecordKind {
    Temperatures,
    States,
    Machine,
    Errors,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Temperatures,
        RecordKind::States,
        RecordKind::Machine,
        RecordKind::Errors,
    ];

    /// The `(frame length, payload byte count)` pair identifying this kind.
    pub const fn signature(&self) -> (usize, u8) {
        match self {
            RecordKind::Temperatures => (105, 100),
            RecordKind::States => (27, 22),
            RecordKind::Machine => (11, 6),
            RecordKind::Errors => (15, 10),
        }
    }

    /// Matches a frame against the known signatures.
    pub fn classify(frame: &Frame) -> Option<Self> {
        let shape = (frame.len(), frame.byte_count());
        Self::ALL
            .into_iter()
            .find(|kind| kind.signature() == shape)
    }

    pub(crate) const fn bit(&self) -> u8 {
        match self {
            RecordKind::Temperatures => 0x04,
            RecordKind::States => 0x02,
            RecordKind::Machine => 0x01,
            RecordKind::Errors => 0x08,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Temperatures => "temperatures",
            RecordKind::States => "states",
            RecordKind::Machine => "machine",
            RecordKind::Errors => "errors",
        };
        f.write_str(name)
    }
}

/// A temperature in degrees Celsius with one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Temperature(f32);

impl Temperature {
    /// Decodes a register holding tenths of a degree as a signed 16 bit value.
    pub fn from_register(value: u16) -> Self {
        Self(value as i16 as f32 / 10.0)
    }

    pub fn as_f32(&self) -> f32 {
        self.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// A refrigerant pressure in hundredths of a bar, as transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Pressure(u16);

impl Pressure {
    pub fn from_register(value: u16) -> Self {
        Self(value)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn as_bar(&self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_bar())
    }
}

/// Builds a frame around `payload` with a valid CRC. Used by tests across the crate.
#[cfg(test)]
pub(crate) fn build_frame(slave: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + HEADER_LEN + CRC_LEN);
    frame.push(slave);
    frame.push(function);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}
