// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Digital I/O lines
//!
//! Lines are claimed from a [`Gpio`] driver and released when the
//! claimed line is dropped.

use std::{fmt, io};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod sim;
pub mod sysfs;

pub use self::{sim::SimGpio, sysfs::SysfsGpio};

/// Kernel id of a GPIO line.
pub type PinId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Decode the first byte of a sysfs `value` file.
    #[must_use]
    pub const fn from_ascii(value: u8) -> Self {
        match value {
            b'0' => Self::Low,
            _ => Self::High,
        }
    }

    #[must_use]
    pub const fn as_ascii(self) -> u8 {
        match self {
            Self::Low => b'0',
            Self::High => b'1',
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("LOW"),
            Self::High => f.write_str("HIGH"),
        }
    }
}

/// The level that marks an input as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    #[must_use]
    pub const fn active_level(self) -> Level {
        match self {
            Self::ActiveHigh => Level::High,
            Self::ActiveLow => Level::Low,
        }
    }

    #[must_use]
    pub fn is_active(self, level: Level) -> bool {
        level == self.active_level()
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveHigh => f.write_str("ACTIVE_HIGH"),
            Self::ActiveLow => f.write_str("ACTIVE_LOW"),
        }
    }
}

/// A line could not be claimed or configured.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("pin {pin} is already claimed")]
    Claimed { pin: PinId },

    #[error("pin {pin}: failed to {action}: {source}")]
    Io {
        pin: PinId,
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl SetupError {
    pub(crate) fn io(pin: PinId, action: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io {
            pin,
            action,
            source,
        }
    }
}

/// An input line that reports both edges.
#[async_trait]
pub trait InputLine: Send {
    fn pin(&self) -> PinId;

    /// Read the current level.
    fn level(&mut self) -> io::Result<Level>;

    /// Wait for the next edge and return the level after it.
    async fn edge(&mut self) -> io::Result<Level>;
}

/// An output line.
pub trait OutputLine: Send {
    fn pin(&self) -> PinId;

    fn set_level(&mut self, level: Level) -> io::Result<()>;
}

/// Hands out exclusive access to lines.
pub trait Gpio: Send + Sync {
    /// Claim `pin` as input, triggering on both edges.
    fn claim_input(&self, pin: PinId) -> Result<Box<dyn InputLine>, SetupError>;

    /// Claim `pin` as output.
    fn claim_output(&self, pin: PinId) -> Result<Box<dyn OutputLine>, SetupError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_ascii() {
        assert_eq!(Level::from_ascii(b'0'), Level::Low);
        assert_eq!(Level::from_ascii(b'1'), Level::High);
        assert_eq!(Level::from_ascii(Level::High.as_ascii()), Level::High);
    }

    #[test]
    fn polarity() {
        assert!(Polarity::ActiveHigh.is_active(Level::High));
        assert!(!Polarity::ActiveHigh.is_active(Level::Low));
        assert!(Polarity::ActiveLow.is_active(Level::Low));
        assert_eq!(Polarity::ActiveLow.to_string(), "ACTIVE_LOW");
    }
}
