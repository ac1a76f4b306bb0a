//! A library for decoding the telemetry stream of a Viessmann Vitocal heat pump.
//!
//! The heat pump controller dumps a fixed set of Modbus holding register blocks
//! over a persistent TCP connection. This crate turns that stream into a
//! device [`snapshot::Snapshot`] and hands it to a publisher at a rate limited
//! cadence:
//!
//! ```text
//! Supervisor → TransportReader → FrameFilter → Record → Snapshot → Throttle → Publish
//!                                                  └──▶ DeviceState (marker files)
//! ```
//!
//! ## Features
//!
//! - **Frame Validation**: Shape heuristics and Modbus CRC16, see [`protocol`].
//! - **Record Decoding**: Temperatures, states, machine and error blocks, see [`record`].
//! - **Snapshot Assembly**: Field values survive across cycles, see [`snapshot`].
//! - **Device Conditions**: Edge triggered marker resources, see [`device_state`].
//! - **Publish Throttling**: Running and standby intervals, see [`throttle`].
//! - **Connection Supervision**: Dial retry budget and backoff, see [`supervisor`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use vitocal_lib::{
//!     device_state::FileMarkers,
//!     pipeline::Pipeline,
//!     protocol::FrameFilter,
//!     snapshot::Snapshot,
//!     supervisor::Supervisor,
//!     throttle::Throttle,
//!     transport::{TcpDialer, TransportReader},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let markers = FileMarkers::new("/dev/shm")?;
//!     let publisher = |snapshot: &Snapshot| -> vitocal_lib::Result<()> {
//!         println!("{snapshot}");
//!         Ok(())
//!     };
//!     let mut pipeline = Pipeline::new(FrameFilter::default(), Throttle::default(), markers, publisher);
//!
//!     let mut dialer = TcpDialer::new("heatpump:502");
//!     let reason = Supervisor::default().run(&mut dialer, |stream| {
//!         pipeline.run_session(&mut TransportReader::new(stream))
//!     });
//!     Err(reason.into())
//! }
//! ```

pub mod device_state;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod record;
pub mod snapshot;
pub mod supervisor;
pub mod throttle;
pub mod transport;

pub use error::{Error, Result};
