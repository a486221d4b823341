// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daemon configuration
//!
//! ```toml
//! [module]
//! kind = "counter"
//!
//! [store]
//! dir = "/tmp"
//!
//! [[counter]]
//! pin = 17
//! divisor = 2.5
//! selector = "tariff"
//!
//! [[counter]]
//! pin = 0 # unused
//! ```

use std::{
    collections::HashSet,
    fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    frame::Address,
    gpio::{sysfs, PinId, Polarity},
    module::{control, counter, sensor, status, ModuleKind},
    monitor::Timing,
    server::tcp::DEFAULT_MAX_REG,
    slave::{Slave, SlaveId, PORT_BASE},
    store::validate_name,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub module: ModuleConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub counter: Vec<CounterConfig>,
    #[serde(default)]
    pub status: Vec<StatusConfig>,
    #[serde(default)]
    pub control: Vec<ControlConfig>,
    #[serde(default)]
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleConfig {
    pub kind: ModuleKind,
    /// Defaults to the address of the module kind.
    pub slave: Option<SlaveId>,
    #[serde(default = "default_listen")]
    pub listen: IpAddr,
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    /// Overrides `port_base + slave`, `0` picks an ephemeral port.
    pub port: Option<u16>,
    #[serde(default = "default_max_reg")]
    pub max_reg: Address,
}

fn default_listen() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port_base() -> u16 {
    PORT_BASE
}

fn default_max_reg() -> Address {
    DEFAULT_MAX_REG
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/tmp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpioDriver {
    Sysfs,
    /// In-memory lines, nothing is connected.
    Simulation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpioConfig {
    pub driver: GpioDriver,
    pub root: PathBuf,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            driver: GpioDriver::Sysfs,
            root: PathBuf::from(sysfs::DEFAULT_ROOT),
        }
    }
}

/// Delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub status_settle_ms: u64,
    pub status_rest_ms: u64,
    pub control_pulse_ms: u64,
    pub control_rest_ms: u64,
    pub pulse_idle_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = Timing::default();
        let millis = |duration: Duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self {
            status_settle_ms: millis(timing.status_settle),
            status_rest_ms: millis(timing.status_rest),
            control_pulse_ms: millis(timing.control_pulse),
            control_rest_ms: millis(timing.control_rest),
            pulse_idle_poll_ms: millis(timing.pulse_idle_poll),
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn timing(&self) -> Timing {
        Timing {
            status_settle: Duration::from_millis(self.status_settle_ms),
            status_rest: Duration::from_millis(self.status_rest_ms),
            control_pulse: Duration::from_millis(self.control_pulse_ms),
            control_rest: Duration::from_millis(self.control_rest_ms),
            pulse_idle_poll: Duration::from_millis(self.pulse_idle_poll_ms),
        }
    }
}

/// A pulse counter channel, `pin = 0` marks an unused channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterConfig {
    pub pin: PinId,
    #[serde(default = "default_divisor")]
    pub divisor: f64,
    /// File deciding which of both counters is credited, relative
    /// paths are resolved against the store directory.
    pub selector: Option<PathBuf>,
    #[serde(default = "active_low")]
    pub polarity: Polarity,
}

fn default_divisor() -> f64 {
    1.0
}

fn active_low() -> Polarity {
    Polarity::ActiveLow
}

fn active_high() -> Polarity {
    Polarity::ActiveHigh
}

/// A status channel, `pin2 = 0` selects single line mode and
/// `pin1 = 0` marks an unused channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusConfig {
    pub pin1: PinId,
    #[serde(default)]
    pub pin2: PinId,
    #[serde(default = "active_high")]
    pub polarity: Polarity,
}

/// An actuation line, `pin = 0` marks an unused line.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    pub pin: PinId,
    /// Name of the command slot in the store.
    pub slot: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub one_wire: Vec<PathBuf>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            one_wire: sensor::default_one_wire_paths(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        content.parse()
    }

    #[must_use]
    pub fn slave(&self) -> Slave {
        self.module
            .slave
            .map_or_else(|| self.module.kind.default_slave(), Slave)
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        if let Some(port) = self.module.port {
            return Ok(port);
        }
        let slave = self.slave();
        slave.tcp_port(self.module.port_base).ok_or_else(|| {
            invalid(format!(
                "port base {} too large for slave {slave}",
                self.module.port_base
            ))
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.module.listen, self.port()?))
    }

    /// Resolve the selector file of a counter.
    #[must_use]
    pub fn selector_path(&self, counter: &CounterConfig) -> Option<PathBuf> {
        counter
            .selector
            .as_ref()
            .map(|selector| self.store.dir.join(selector))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.module.kind;
        let slave = self.slave();
        if !slave.is_single_device() {
            return Err(invalid(format!("slave address {slave} out of range")));
        }
        self.port()?;
        if self.module.max_reg == 0 {
            return Err(invalid("max_reg must not be 0"));
        }

        for (section, len, expected) in [
            ("counter", self.counter.len(), ModuleKind::Counter),
            ("status", self.status.len(), ModuleKind::Status),
            ("control", self.control.len(), ModuleKind::Control),
        ] {
            if len > 0 && kind != expected {
                return Err(invalid(format!(
                    "[[{section}]] channels are not supported by {kind} modules"
                )));
            }
        }

        check_len("counter", self.counter.len(), counter::MAX_COUNTERS)?;
        check_len("status", self.status.len(), status::MAX_STATUS_LINES)?;
        check_len("control", self.control.len(), control::MAX_CONTROL_LINES)?;
        check_len(
            "one-wire sensor",
            self.sensor.one_wire.len(),
            sensor::MAX_ONE_WIRE_SENSORS,
        )?;

        let mut pins = Pins::default();
        for channel in &self.counter {
            if !(channel.divisor.is_finite() && channel.divisor > 0.0) {
                return Err(invalid(format!(
                    "invalid divisor {} for counter on pin {}",
                    channel.divisor, channel.pin
                )));
            }
            pins.insert(channel.pin)?;
        }
        for channel in &self.status {
            if channel.pin1 == 0 && channel.pin2 != 0 {
                return Err(invalid(format!(
                    "status line on pin {} requires a first pin",
                    channel.pin2
                )));
            }
            pins.insert(channel.pin1)?;
            pins.insert(channel.pin2)?;
        }
        let mut slots = HashSet::new();
        for channel in &self.control {
            validate_name(&channel.slot).map_err(|err| invalid(err.to_string()))?;
            if !slots.insert(channel.slot.as_str()) {
                return Err(invalid(format!(
                    "control slot '{}' is used twice",
                    channel.slot
                )));
            }
            pins.insert(channel.pin)?;
        }
        Ok(())
    }
}

fn check_len(section: &str, len: usize, max: usize) -> Result<(), ConfigError> {
    if len > max {
        return Err(invalid(format!(
            "{len} {section} channels configured, at most {max} are supported"
        )));
    }
    Ok(())
}

#[derive(Default)]
struct Pins(HashSet<PinId>);

impl Pins {
    fn insert(&mut self, pin: PinId) -> Result<(), ConfigError> {
        if pin != 0 && !self.0.insert(pin) {
            return Err(invalid(format!("pin {pin} is used twice")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_module() {
        let config: Config = r#"
            [module]
            kind = "counter"

            [store]
            dir = "/run/iomodbus"

            [[counter]]
            pin = 17
            divisor = 2.5
            selector = "tariff"

            [[counter]]
            pin = 0

            [[counter]]
            pin = 22
            polarity = "active-high"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.module.kind, ModuleKind::Counter);
        assert_eq!(config.slave(), Slave(2));
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:5002".parse().unwrap()
        );
        assert_eq!(config.module.max_reg, 8200);
        assert_eq!(config.counter.len(), 3);
        assert_eq!(config.counter[0].divisor, 2.5);
        assert_eq!(config.counter[0].polarity, Polarity::ActiveLow);
        assert_eq!(config.counter[2].polarity, Polarity::ActiveHigh);
        assert_eq!(
            config.selector_path(&config.counter[0]),
            Some(PathBuf::from("/run/iomodbus/tariff"))
        );
        assert_eq!(config.selector_path(&config.counter[1]), None);
        assert_eq!(config.gpio.driver, GpioDriver::Sysfs);
        assert_eq!(config.timing.timing(), Timing::default());
    }

    #[test]
    fn overrides() {
        let config: Config = r#"
            [module]
            kind = "control"
            slave = 9
            listen = "0.0.0.0"
            port_base = 6000
            max_reg = 16

            [gpio]
            driver = "simulation"

            [timing]
            control_pulse_ms = 100

            [[control]]
            pin = 4
            slot = "relay1"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.slave(), Slave(9));
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:6009".parse().unwrap());
        assert_eq!(config.gpio.driver, GpioDriver::Simulation);
        assert_eq!(config.gpio.root, PathBuf::from("/sys/class/gpio"));
        let timing = config.timing.timing();
        assert_eq!(timing.control_pulse, Duration::from_millis(100));
        assert_eq!(timing.control_rest, Duration::from_millis(500));
    }

    #[test]
    fn sensor_defaults() {
        let config: Config = "[module]\nkind = \"sensor\"\n".parse().unwrap();
        assert_eq!(config.slave(), Slave(1));
        assert_eq!(config.sensor.one_wire.len(), 10);
        assert_eq!(
            config.sensor.one_wire[9],
            PathBuf::from("/sensors/sensor10")
        );
    }

    fn invalid_config(toml: &str) -> String {
        match toml.parse::<Config>() {
            Err(ConfigError::Invalid(msg)) => msg,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejected_configs() {
        let msg = invalid_config(
            "[module]\nkind = \"status\"\n[[counter]]\npin = 4\n",
        );
        assert!(msg.contains("counter"));
        let msg = invalid_config(
            "[module]\nkind = \"control\"\n\
             [[control]]\npin = 4\nslot = \"relay\"\n\
             [[control]]\npin = 5\nslot = \"relay\"\n",
        );
        assert!(msg.contains("relay"));
        let msg = invalid_config(
            "[module]\nkind = \"status\"\n\
             [[status]]\npin1 = 4\npin2 = 5\n\
             [[status]]\npin1 = 5\n",
        );
        assert!(msg.contains("pin 5"));
        let msg = invalid_config(
            "[module]\nkind = \"counter\"\n[[counter]]\npin = 4\ndivisor = 0.0\n",
        );
        assert!(msg.contains("divisor"));
        invalid_config("[module]\nkind = \"control\"\nslave = 0\n");
        invalid_config("[module]\nkind = \"control\"\nslave = 248\n");
        invalid_config("[module]\nkind = \"control\"\nport_base = 65535\n");
        invalid_config(
            "[module]\nkind = \"control\"\n[[control]]\npin = 4\nslot = \"../relay\"\n",
        );
        let counters = "[[counter]]\npin = 0\n".repeat(9);
        let msg = invalid_config(&format!("[module]\nkind = \"counter\"\n{counters}"));
        assert!(msg.contains("at most 8"));
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            "[module]\nkind = \"dimmer\"\n".parse::<Config>(),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            "[module]\nkind = \"counter\"\nunknown = 1\n".parse::<Config>(),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            Config::load(Path::new("/nonexistent/iomodbus.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
