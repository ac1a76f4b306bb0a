use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::time::Duration;
use vitocal_lib::protocol as proto;

fn parse_byte(s: &str) -> Result<u8, String> {
    clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid byte value format: {e}"))
}

/// Parses a frame given as hex digits. Spaces, colons and dashes between bytes are ignored.
pub fn parse_hex_frame(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    if let Some(invalid) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(format!("Invalid hex digit '{invalid}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: {}", digits.len()));
    }
    if digits.len() / 2 > proto::MAX_FRAME_LEN {
        return Err(format!(
            "Frame longer than {} bytes",
            proto::MAX_FRAME_LEN
        ));
    }
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(pair, 16).map_err(|e| format!("Invalid hex byte '{pair}': {e}"))
        })
        .collect()
}

/// Settings that override the configuration file.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct DaemonOverrides {
    /// Host and port of the heat pump Modbus TCP stream.
    /// Example: "heatpump:502" or "192.168.1.50:502".
    #[arg(long, verbatim_doc_comment)]
    pub address: Option<String>,

    /// Expected Modbus slave address.
    /// Can be specified in decimal or hexadecimal (e.g., "0x01").
    #[arg(long, value_parser = parse_byte, verbatim_doc_comment)]
    pub slave: Option<u8>,

    /// Directory holding the device condition marker files.
    #[arg(long)]
    pub marker_dir: Option<PathBuf>,

    /// Minimum interval between snapshots while the heat pump is running (e.g., "10s").
    #[arg(long, value_parser = humantime::parse_duration)]
    pub running_throttle: Option<Duration>,

    /// Minimum interval between snapshots while the heat pump is in standby (e.g., "1m").
    #[arg(long, value_parser = humantime::parse_duration)]
    pub standby_throttle: Option<Duration>,

    /// Log the raw temperature registers with every published snapshot.
    #[arg(long)]
    pub raw_log: bool,
}

impl DaemonOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(address) = &self.address {
            config.modbus.address = address.clone();
        }
        if let Some(slave) = self.slave {
            config.modbus.slave = slave;
        }
        if let Some(marker_dir) = &self.marker_dir {
            config.gateway.marker_dir = marker_dir.clone();
        }
        if let Some(running_throttle) = self.running_throttle {
            config.gateway.running_throttle = running_throttle;
        }
        if let Some(standby_throttle) = self.standby_throttle {
            config.gateway.standby_throttle = standby_throttle;
        }
        config.gateway.raw_log |= self.raw_log;
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Print every published snapshot as JSON to the standard output (console).
    Console,
    /// Publish snapshots to the MQTT broker configured in the configuration file.
    Mqtt,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: connect to the heat pump, decode its telemetry stream
    /// and publish snapshots until the stream ends or the heat pump stays unreachable.
    #[clap(verbatim_doc_comment)]
    Daemon {
        #[command(flatten)]
        overrides: DaemonOverrides,

        /// Specifies the output.
        #[command(subcommand)]
        output: DaemonOutput,
    },

    /// Validate and decode a single captured frame.
    /// Example: "01 03 06 00 01 00 00 06 01 xx xx".
    #[clap(verbatim_doc_comment)]
    Decode {
        /// Frame bytes as hex digits.
        #[arg(value_parser = parse_hex_frame)]
        frame: ::std::vec::Vec<u8>,

        /// Expected Modbus slave address.
        #[arg(long, default_value_t = proto::DEFAULT_SLAVE_ADDRESS, value_parser = parse_byte)]
        slave: u8,

        /// Expected function code.
        #[arg(long, default_value_t = proto::READ_HOLDING_REGISTERS, value_parser = parse_byte)]
        function: u8,

        /// Compressor required flag of the preceding states block, used for machine blocks.
        #[arg(long)]
        compressor_required: bool,
    },
}

const fn about_text() -> &'static str {
    "Vitocal heat pump gateway - Decode the Modbus telemetry stream and publish it to MQTT."
}

#[derive(Parser, Debug)]
#[command(name="vitocald", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -q for warnings only, -v for debug, -vv for trace. Default is info.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// The configuration file (YAML). Defaults are used when the file does not exist.
    #[arg(global = true, short, long, default_value_t = Config::DEFAULT_CONFIG_FILE.to_string())]
    pub config_file: String,

    #[command(subcommand)]
    pub command: CliCommands,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_frame_parsing() {
        assert_eq!(parse_hex_frame("01 03 02 00 2a"), Ok(vec![0x01, 0x03, 0x02, 0x00, 0x2A]));
        assert_eq!(parse_hex_frame("01:03-02"), Ok(vec![0x01, 0x03, 0x02]));
        assert_eq!(parse_hex_frame("0103FF"), Ok(vec![0x01, 0x03, 0xFF]));
        assert!(parse_hex_frame("010").is_err());
        assert_eq!(parse_hex_frame("01zz"), Err(String::from("Invalid hex digit 'z'")));
        assert!(parse_hex_frame(&"00".repeat(257)).is_err());
        assert_eq!(parse_hex_frame("aéb"), Err(String::from("Invalid hex digit 'é'")));
        assert!(parse_hex_frame("01é3").is_err());
        assert!(parse_hex_frame("+1").is_err());
    }

    #[test]
    fn overrides_apply() {
        let args = CliArgs::parse_from([
            "vitocald",
            "daemon",
            "--slave",
            "0x02",
            "--standby-throttle",
            "2m",
            "--raw-log",
            "console",
        ]);
        let CliCommands::Daemon { overrides, output } = args.command else {
            panic!("expected daemon command");
        };
        assert_eq!(output, DaemonOutput::Console);

        let mut config = Config::default();
        overrides.apply(&mut config);
        assert_eq!(config.modbus.slave, 2);
        assert_eq!(config.modbus.address, "heatpump:502");
        assert_eq!(config.gateway.standby_throttle, Duration::from_secs(120));
        assert!(config.gateway.raw_log);
    }

    #[test]
    fn decode_command() {
        let args = CliArgs::parse_from(["vitocald", "decode", "01 03 02 00 2a 38 5b"]);
        assert_eq!(
            args.command,
            CliCommands::Decode {
                frame: vec![0x01, 0x03, 0x02, 0x00, 0x2A, 0x38, 0x5B],
                slave: 1,
                function: 3,
                compressor_required: false,
            }
        );
    }
}
