// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temperature and humidity sensor module
//!
//! Sensors are read on demand, i.e. while the request is handled.
//!
//! | Address  | Source                        | Value                          |
//! |----------|-------------------------------|--------------------------------|
//! | 1..=10   | one-wire `w1_slave` files     | temperature in tenths of °C    |
//! | 11, 12   | DHT sensor 1                  | humidity, temperature (tenths) |
//! | 13, 14   | DHT sensor 2                  | humidity, temperature (tenths) |
//! | 15, 16   | SHT sensor 1                  | humidity, temperature (tenths) |
//! | 17, 18   | SHT sensor 2                  | humidity, temperature (tenths) |

use std::{fmt, fs, ops::RangeInclusive, path::PathBuf};

use crate::{
    dispatch::{ReadHandler, RegisterDispatch},
    error::HandlerError,
    frame::{Address, Word},
};

use super::{check_range, to_word};

pub const REGISTERS: RangeInclusive<Address> = 1..=18;

pub const ONE_WIRE_REGISTERS: RangeInclusive<Address> = 1..=10;
pub const DHT_REGISTERS: RangeInclusive<Address> = 11..=14;
pub const SHT_REGISTERS: RangeInclusive<Address> = 15..=18;

pub const MAX_ONE_WIRE_SENSORS: usize = 10;

/// Number of additional attempts after a failed sensor read.
pub const SENSOR_READ_RETRIES: usize = 4;

/// The one-wire device files of the default board layout.
#[must_use]
pub fn default_one_wire_paths() -> Vec<PathBuf> {
    (1..=MAX_ONE_WIRE_SENSORS)
        .map(|n| PathBuf::from(format!("/sensors/sensor{n}")))
        .collect()
}

/// Decode the content of a one-wire `w1_slave` file into tenths of °C.
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_one_wire(content: &str) -> Result<i64, HandlerError> {
    let mut lines = content.lines();
    let crc_line = lines.next().unwrap_or_default();
    if !crc_line.contains("crc=") {
        return Err(HandlerError::Parse(format!("missing CRC in {crc_line:?}")));
    }
    if !crc_line.trim_end().ends_with("YES") {
        return Err(HandlerError::Crc);
    }
    let value = lines
        .find_map(|line| line.split_once("t=").map(|(_, value)| value.trim()))
        .ok_or_else(|| HandlerError::Parse("missing temperature".to_owned()))?;
    let millis: i64 = value
        .parse()
        .map_err(|_| HandlerError::Parse(format!("invalid temperature {value:?}")))?;
    Ok(millis / 100)
}

/// A single measurement of a combined humidity/temperature sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Relative humidity in percent
    pub humidity: f32,
    /// Temperature in °C
    pub temperature: f32,
}

/// Driver of a combined humidity/temperature sensor chip.
pub trait HumiditySensor: Send + Sync {
    fn measure(&self) -> Result<Reading, HandlerError>;

    /// Power cycle a sensor that keeps failing.
    fn reset(&self) {}
}

/// The register block a humidity sensor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumiditySensorKind {
    /// Registers 11..=14
    Dht,
    /// Registers 15..=18
    Sht,
}

#[derive(Default)]
pub struct SensorRegisters {
    one_wire: Vec<PathBuf>,
    dht: [Option<Box<dyn HumiditySensor>>; 2],
    sht: [Option<Box<dyn HumiditySensor>>; 2],
}

impl fmt::Debug for SensorRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorRegisters")
            .field("one_wire", &self.one_wire)
            .field("dht", &[self.dht[0].is_some(), self.dht[1].is_some()])
            .field("sht", &[self.sht[0].is_some(), self.sht[1].is_some()])
            .finish()
    }
}

impl SensorRegisters {
    #[must_use]
    pub fn new(one_wire: Vec<PathBuf>) -> Self {
        Self {
            one_wire,
            ..Default::default()
        }
    }

    /// Attach DHT sensor `index` (0 or 1).
    #[must_use]
    pub fn with_dht(self, index: usize, sensor: impl HumiditySensor + 'static) -> Self {
        self.with_humidity_sensor(HumiditySensorKind::Dht, index, Box::new(sensor))
    }

    /// Attach SHT sensor `index` (0 or 1).
    #[must_use]
    pub fn with_sht(self, index: usize, sensor: impl HumiditySensor + 'static) -> Self {
        self.with_humidity_sensor(HumiditySensorKind::Sht, index, Box::new(sensor))
    }

    /// Attach a humidity sensor. Indices other than 0 and 1 are ignored.
    #[must_use]
    pub fn with_humidity_sensor(
        mut self,
        kind: HumiditySensorKind,
        index: usize,
        sensor: Box<dyn HumiditySensor>,
    ) -> Self {
        let sensors = match kind {
            HumiditySensorKind::Dht => &mut self.dht,
            HumiditySensorKind::Sht => &mut self.sht,
        };
        match sensors.get_mut(index) {
            Some(slot) => *slot = Some(sensor),
            None => log::warn!("No {kind:?} sensor with index {index}"),
        }
        self
    }

    #[must_use]
    pub fn into_dispatch(self) -> RegisterDispatch {
        RegisterDispatch::new().with_read(self)
    }

    fn read_one_wire(&self, addr: Address) -> Result<i64, HandlerError> {
        let path = self
            .one_wire
            .get(usize::from(addr - ONE_WIRE_REGISTERS.start()))
            .ok_or(HandlerError::UndefinedLine(addr))?;
        let mut attempts = 0;
        loop {
            let content = fs::read_to_string(path).map_err(|err| {
                log::error!("Open {}: {err}", path.display());
                err
            })?;
            match parse_one_wire(&content) {
                Err(HandlerError::Crc) if attempts < SENSOR_READ_RETRIES => {
                    log::error!("CRC error in file {}", path.display());
                    attempts += 1;
                }
                result => return result,
            }
        }
    }

    fn read_dht(&self, addr: Address) -> Result<i64, HandlerError> {
        let index = usize::from((addr - DHT_REGISTERS.start()) / 2);
        let sensor = self.dht[index]
            .as_deref()
            .ok_or(HandlerError::UndefinedLine(addr))?;
        let mut attempts = 0;
        let reading = loop {
            match sensor.measure() {
                Ok(reading) => break reading,
                Err(err) if attempts < SENSOR_READ_RETRIES => {
                    log::debug!("Retrying DHT sensor {}: {err}", index + 1);
                    attempts += 1;
                }
                Err(err) => {
                    log::error!(
                        "Error reading DHT sensor after {SENSOR_READ_RETRIES} retries: {err}"
                    );
                    log::info!("Resetting DHT sensor {}", index + 1);
                    sensor.reset();
                    return Err(err);
                }
            }
        };
        Ok(pick(addr, reading))
    }

    fn read_sht(&self, addr: Address) -> Result<i64, HandlerError> {
        let index = usize::from((addr - SHT_REGISTERS.start()) / 2);
        let sensor = self.sht[index]
            .as_deref()
            .ok_or(HandlerError::UndefinedLine(addr))?;
        let reading = sensor.measure().map_err(|err| {
            log::error!("Error reading SHT sensor {}: {err}", index + 1);
            err
        })?;
        Ok(pick(addr, reading))
    }
}

/// Odd addresses hold the humidity, even addresses the temperature.
#[allow(clippy::cast_possible_truncation)]
fn pick(addr: Address, reading: Reading) -> i64 {
    let value = if addr % 2 == 1 {
        reading.humidity
    } else {
        reading.temperature
    };
    (value * 10.0) as i64
}

impl ReadHandler for SensorRegisters {
    fn read(&self, addr: Address) -> Result<Word, HandlerError> {
        check_range(&REGISTERS, addr)?;
        let value = if ONE_WIRE_REGISTERS.contains(&addr) {
            self.read_one_wire(addr)?
        } else if DHT_REGISTERS.contains(&addr) {
            self.read_dht(addr)?
        } else {
            self.read_sht(addr)?
        };
        Ok(to_word(value))
    }
}
