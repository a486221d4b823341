// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register maps of the I/O modules

use std::{fmt, ops::RangeInclusive};

use serde::Deserialize;

use crate::{error::HandlerError, frame::Address, slave::Slave};

pub mod control;
pub mod counter;
pub mod sensor;
pub mod status;

/// The physical function served by a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// Temperature and humidity sensors
    Sensor,
    /// Pulse counters
    Counter,
    /// Flip-flop and status lines
    Status,
    /// Relays and other actuation lines
    Control,
}

impl ModuleKind {
    #[must_use]
    pub const fn default_slave(self) -> Slave {
        match self {
            Self::Sensor => Slave::sensor_module(),
            Self::Counter => Slave::counter_module(),
            Self::Status => Slave::status_module(),
            Self::Control => Slave::control_module(),
        }
    }

    /// The register addresses of the module.
    #[must_use]
    pub const fn registers(self) -> RangeInclusive<Address> {
        match self {
            Self::Sensor => sensor::REGISTERS,
            Self::Counter => counter::REGISTERS,
            Self::Status => status::REGISTERS,
            Self::Control => control::REGISTERS,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Counter => "counter",
            Self::Status => "status",
            Self::Control => "control",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_range(registers: &RangeInclusive<Address>, addr: Address) -> Result<(), HandlerError> {
    if registers.contains(&addr) {
        Ok(())
    } else {
        log::error!("Address {addr} out of range");
        Err(HandlerError::OutOfRange(addr))
    }
}

/// Truncate an application value to a register.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_word(value: i64) -> u16 {
    value as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_ranges() {
        assert_eq!(ModuleKind::Sensor.registers(), 1..=18);
        assert_eq!(ModuleKind::Counter.registers(), 1..=16);
        assert_eq!(ModuleKind::Status.registers(), 1..=16);
        assert_eq!(ModuleKind::Control.registers(), 1..=16);
    }

    #[test]
    fn default_slaves() {
        assert_eq!(ModuleKind::Sensor.default_slave(), Slave(1));
        assert_eq!(ModuleKind::Counter.default_slave(), Slave(2));
        assert_eq!(ModuleKind::Status.default_slave(), Slave(3));
        assert_eq!(ModuleKind::Control.default_slave(), Slave(4));
    }

    #[test]
    fn truncate_to_word() {
        assert_eq!(to_word(42), 42);
        assert_eq!(to_word(65_536 + 7), 7);
        assert_eq!(to_word(-1), 0xFFFF);
        assert_eq!(to_word(-215), 0xFF29);
    }
}
