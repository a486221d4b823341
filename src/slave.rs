// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

/// Slave identifier
pub type SlaveId = u8;

/// Each module listens on `PORT_BASE` plus its slave address.
pub const PORT_BASE: u16 = 5000;

/// A single byte for addressing Modbus slave devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slave(pub SlaveId);

impl Slave {
    /// The minimum address of a single Modbus slave device.
    #[must_use]
    pub const fn min_device() -> Self {
        Slave(1)
    }

    /// The maximum address of a single Modbus slave device.
    #[must_use]
    pub const fn max_device() -> Self {
        Slave(247)
    }

    /// Default address of the temperature/humidity sensor module.
    #[must_use]
    pub const fn sensor_module() -> Self {
        Slave(1)
    }

    /// Default address of the pulse counter module.
    #[must_use]
    pub const fn counter_module() -> Self {
        Slave(2)
    }

    /// Default address of the flip-flop/status module.
    #[must_use]
    pub const fn status_module() -> Self {
        Slave(3)
    }

    /// Default address of the relay control module.
    #[must_use]
    pub const fn control_module() -> Self {
        Slave(4)
    }

    #[must_use]
    pub fn is_single_device(self) -> bool {
        self >= Self::min_device() && self <= Self::max_device()
    }

    /// The TCP port of this address counted from `base`, usually
    /// [`PORT_BASE`].
    #[must_use]
    pub fn tcp_port(self, base: u16) -> Option<u16> {
        base.checked_add(u16::from(self.0))
    }
}

impl From<SlaveId> for Slave {
    fn from(from: SlaveId) -> Self {
        Slave(from)
    }
}

impl From<Slave> for SlaveId {
    fn from(from: Slave) -> Self {
        from.0
    }
}

impl fmt::Display for Slave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:0>2X})", self.0, self.0)
    }
}
