use crate::mqtt::MqttConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vitocal_lib::{protocol as proto, supervisor, throttle};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Host and port of the heat pump's Modbus TCP bridge.
    pub address: String,
    pub slave: u8,
    pub function: u8,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            address: String::from("heatpump:502"),
            slave: proto::DEFAULT_SLAVE_ADDRESS,
            function: proto::READ_HOLDING_REGISTERS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(with = "humantime_serde")]
    pub running_throttle: Duration,
    #[serde(with = "humantime_serde")]
    pub standby_throttle: Duration,
    pub max_dial_failures: u32,
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
    pub marker_dir: PathBuf,
    pub raw_log: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            running_throttle: throttle::DEFAULT_RUNNING_THRESHOLD,
            standby_throttle: throttle::DEFAULT_STANDBY_THRESHOLD,
            max_dial_failures: supervisor::DEFAULT_MAX_DIAL_FAILURES,
            retry_interval: supervisor::DEFAULT_RETRY_INTERVAL,
            marker_dir: PathBuf::from("/dev/shm"),
            raw_log: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub modbus: ModbusConfig,
    pub gateway: GatewayConfig,
    pub mqtt: MqttConfig,
}

impl Config {
    pub const DEFAULT_CONFIG_FILE: &'static str = "vitocal.yml";

    /// Loads the configuration, falling back to the defaults when `path` does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file {path:?} not found, using defaults");
            return Ok(Self::default());
        }
        log::debug!("Loading config file from {path:?}");
        let file = File::open(path).with_context(|| format!("Cannot open config file {path:?}"))?;
        serde_yaml::from_reader(file).with_context(|| format!("Cannot parse config file {path:?}"))
    }
}
