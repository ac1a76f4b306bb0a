//! Vitocal Heat Pump Gateway
//!
//! A daemon that connects to the Modbus TCP telemetry stream of a Viessmann
//! Vitocal heat pump and republishes the decoded device state.
//!
//! This tool allows users to:
//! - Run in a continuous daemon mode that decodes the stream and either prints
//!   the snapshots to the console or publishes them to an MQTT broker.
//! - Maintain marker files describing the device conditions (powered, running,
//!   pump, compressor, cool mode, defrost) for local consumers.
//! - Decode a single captured frame offline for troubleshooting.
//!
//! The daemon leverages the `vitocal_lib` crate for frame validation, record
//! decoding and connection supervision.

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::panic;
use std::path::Path;
use vitocal_lib::{
    device_state::FileMarkers,
    pipeline::{Pipeline, Publish},
    protocol::{FrameError, FrameFilter},
    record::Record,
    snapshot::Snapshot,
    supervisor::Supervisor,
    throttle::Throttle,
    transport::{TcpDialer, TransportReader},
};

mod commandline;
mod config;
mod mqtt;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Runs the supervised pipeline until a terminal condition and returns it as error.
fn run_gateway<P: Publish>(config: &config::Config, publisher: P) -> (P, anyhow::Error) {
    let filter = FrameFilter::new(config.modbus.slave, config.modbus.function);
    let throttle = Throttle::new(
        config.gateway.running_throttle,
        config.gateway.standby_throttle,
    );
    let markers = match FileMarkers::new(&config.gateway.marker_dir) {
        Ok(markers) => markers,
        Err(err) => {
            let err = anyhow::Error::new(err).context(format!(
                "Cannot create marker directory {:?}",
                config.gateway.marker_dir
            ));
            return (publisher, err);
        }
    };
    info!("Maintaining device markers in {:?}", markers.dir());

    let mut pipeline =
        Pipeline::new(filter, throttle, markers, publisher).with_raw_log(config.gateway.raw_log);
    let mut supervisor = Supervisor::new(
        config.gateway.max_dial_failures,
        config.gateway.retry_interval,
    );
    let mut dialer = TcpDialer::new(config.modbus.address.clone());

    let reason = supervisor.run(&mut dialer, |stream| {
        pipeline.run_session(&mut TransportReader::new(stream))
    });
    (pipeline.into_publisher(), reason.into())
}

fn print_json(snapshot: &Snapshot) -> vitocal_lib::Result<()> {
    let json = serde_json::to_string(snapshot).map_err(vitocal_lib::Error::publish)?;
    println!("{json}");
    Ok(())
}

fn handle_daemon(
    config_file: &str,
    overrides: &commandline::DaemonOverrides,
    output: &commandline::DaemonOutput,
) -> Result<()> {
    let mut config = config::Config::load(Path::new(config_file))?;
    overrides.apply(&mut config);
    info!(
        "Starting daemon mode: output={output:?}, address={}, throttle={:?}/{:?}",
        config.modbus.address, config.gateway.running_throttle, config.gateway.standby_throttle
    );

    match output {
        commandline::DaemonOutput::Console => {
            let (_, reason) = run_gateway(&config, print_json);
            Err(reason)
        }
        commandline::DaemonOutput::Mqtt => {
            let publisher = mqtt::MqttPublisher::connect(&config.mqtt)?;
            let (publisher, reason) = run_gateway(&config, publisher);
            if let Err(err) = publisher.go_offline() {
                warn!("{err:#}");
            }
            if let Err(err) = publisher.disconnect() {
                warn!("{err:#}");
            }
            Err(reason)
        }
    }
}

fn handle_decode(frame: &[u8], slave: u8, function: u8, compressor_required: bool) -> Result<()> {
    let length = frame.len();
    info!("Executing: Decode frame of {length} bytes");
    let filter = FrameFilter::new(slave, function);
    let frame = match filter.validate(frame) {
        Ok(frame) => frame,
        Err(err @ FrameError::CrcMismatch { .. }) => bail!("Corrupted frame: {err}"),
        Err(err) => bail!("Not a telemetry frame: {err}"),
    };
    let record = Record::decode(&frame, compressor_required).with_context(|| {
        format!(
            "Unknown block signature ({length} bytes, byte count {})",
            frame.byte_count()
        )
    })?;
    println!("{}: {record}", record.kind());
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Vitocal gateway started. Log level: {}",
        args.verbose.log_level_filter()
    );

    match &args.command {
        commandline::CliCommands::Daemon { overrides, output } => {
            handle_daemon(&args.config_file, overrides, output)
        }
        commandline::CliCommands::Decode {
            frame,
            slave,
            function,
            compressor_required,
        } => handle_decode(frame, *slave, *function, *compressor_required),
    }
}
