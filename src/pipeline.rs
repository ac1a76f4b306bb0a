//! The decode-and-publish pipeline run for every connection.
//!
//! Frames are processed strictly in arrival order. Every read outcome is
//! handled here:
//!
//! | Outcome            | Handling                                           |
//! |--------------------|----------------------------------------------------|
//! | data               | validate, decode, assemble, maybe publish          |
//! | timed out          | device is silent, drive all conditions off         |
//! | closed             | session ends, the stream will not resume           |
//! | any other failure  | session ends, the supervisor reconnects            |

use crate::device_state::{Condition, DeviceState, MarkerStore};
use crate::error::Result;
use crate::protocol::{FrameError, FrameFilter};
use crate::record::Record;
use crate::snapshot::Snapshot;
use crate::throttle::Throttle;
use crate::transport::{ReadOutcome, TransportReader};
use chrono::{DateTime, Utc};
use log::*;
use std::io::{self, Read};

/// Destination of published snapshots.
pub trait Publish {
    fn publish(&mut self, snapshot: &Snapshot) -> Result<()>;
}

impl<F> Publish for F
where
    F: FnMut(&Snapshot) -> Result<()>,
{
    fn publish(&mut self, snapshot: &Snapshot) -> Result<()> {
        self(snapshot)
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the stream.
    EndOfStream,
    /// The read failed for any other reason.
    Failed(io::Error),
}

/// Owns all state carried across frames and sessions.
pub struct Pipeline<M, P> {
    filter: FrameFilter,
    snapshot: Snapshot,
    device: DeviceState<M>,
    throttle: Throttle,
    publisher: P,
    raw_log: bool,
    raw_temperatures: Option<String>,
}

impl<M: MarkerStore, P: Publish> Pipeline<M, P> {
    pub fn new(filter: FrameFilter, throttle: Throttle, markers: M, publisher: P) -> Self {
        Self {
            filter,
            snapshot: Snapshot::new(),
            device: DeviceState::new(markers),
            throttle,
            publisher,
            raw_log: false,
            raw_temperatures: None,
        }
    }

    /// Logs the raw temperature registers along with every published snapshot.
    pub fn with_raw_log(mut self, raw_log: bool) -> Self {
        self.raw_log = raw_log;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn device(&self) -> &DeviceState<M> {
        &self.device
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Reads and processes frames until the session ends.
    pub fn run_session<R: Read>(&mut self, reader: &mut TransportReader<R>) -> SessionEnd {
        loop {
            match reader.read() {
                ReadOutcome::Data(bytes) => self.process(bytes, Utc::now()),
                ReadOutcome::TimedOut => self.on_silence(),
                ReadOutcome::Closed => return SessionEnd::EndOfStream,
                ReadOutcome::Failed(err) => return SessionEnd::Failed(err),
            }
        }
    }

    /// Handles one received byte window.
    pub fn process(&mut self, bytes: &[u8], now: DateTime<Utc>) {
        // Any traffic at all means the heat pump is powered.
        self.device.mark_on(Condition::Powered);

        let frame = match self.filter.validate(bytes) {
            Ok(frame) => frame,
            Err(err @ FrameError::CrcMismatch { .. }) => {
                warn!("Dropping frame of {} bytes: {err}", bytes.len());
                trace!("Dropped frame: {bytes:02x?}");
                return;
            }
            Err(err) => {
                trace!("Ignoring {} bytes: {err}", bytes.len());
                return;
            }
        };

        let Some(record) = Record::decode(&frame, self.snapshot.states.compressor_required) else {
            debug!(
                "Ignoring frame with unknown signature ({} bytes, byte count {})",
                frame.len(),
                frame.byte_count()
            );
            return;
        };
        trace!("Decoded {}: {record}", record.kind());

        match &record {
            Record::Temperatures(_) => {
                let words: Vec<String> = frame.registers().map(|word| format!("{word:04x}")).collect();
                self.raw_temperatures = Some(words.join(" "));
            }
            Record::States(states) => self.device.observe_states(states),
            Record::Machine(machine) => self.device.observe_machine(machine),
            Record::Errors(_) => {}
        }

        if self.snapshot.apply(record, now) {
            self.offer();
            self.snapshot.begin_cycle();
        }
    }

    /// Handles a read that timed out.
    pub fn on_silence(&mut self) {
        trace!("No data within the read deadline");
        self.device.device_silent();
    }

    fn offer(&mut self) {
        if !self.throttle.should_publish(&self.snapshot) {
            debug!("Snapshot throttled");
            return;
        }
        info!("{}", self.snapshot);
        if let Some(raw) = &self.raw_temperatures {
            if self.raw_log {
                info!("Raw temperatures: {raw}");
            } else {
                trace!("Raw temperatures: {raw}");
            }
        }
        if let Err(err) = self.publisher.publish(&self.snapshot) {
            warn!("{err}");
        }
    }
}
