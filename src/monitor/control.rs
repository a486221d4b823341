// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Actuation lines driven by command slots

use std::{io, sync::Arc, time::Duration};

use crate::{
    gpio::{Gpio, Level, OutputLine, PinId},
    store::{SlotStore, SlotWatcher},
    supervisor::Shutdown,
};

use super::{park, pause, SetupError};

/// A command for an actuation line, stored as a single digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `0`
    Nop,
    /// `1`: switch to high
    High,
    /// `2`: switch to low
    Low,
    /// `3`: low pulse, high afterwards
    LowPulse,
    /// `4`: high pulse, low afterwards
    HighPulse,
}

impl Command {
    #[must_use]
    pub const fn from_digit(digit: u8) -> Option<Self> {
        let cmd = match digit {
            0 => Self::Nop,
            1 => Self::High,
            2 => Self::Low,
            3 => Self::LowPulse,
            4 => Self::HighPulse,
            _ => return None,
        };
        Some(cmd)
    }

    #[must_use]
    pub const fn digit(self) -> u8 {
        match self {
            Self::Nop => 0,
            Self::High => 1,
            Self::Low => 2,
            Self::LowPulse => 3,
            Self::HighPulse => 4,
        }
    }

    /// The permanent level this command leaves the line in.
    #[must_use]
    pub const fn restore_level(self) -> Option<Level> {
        match self {
            Self::Nop => None,
            Self::High | Self::LowPulse => Some(Level::High),
            Self::Low | Self::HighPulse => Some(Level::Low),
        }
    }
}

/// Executes the commands written to the slot of an actuation line.
pub struct ControlMonitor {
    gpio: Arc<dyn Gpio>,
    pin: PinId,
    store: SlotStore,
    slot: String,
    pulse: Duration,
    rest: Duration,
}

impl std::fmt::Debug for ControlMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlMonitor")
            .field("pin", &self.pin)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl ControlMonitor {
    #[must_use]
    pub fn new(gpio: Arc<dyn Gpio>, pin: PinId, store: SlotStore, slot: impl Into<String>) -> Self {
        Self {
            gpio,
            pin,
            store,
            slot: slot.into(),
            pulse: Duration::from_millis(500),
            rest: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn timing(mut self, pulse: Duration, rest: Duration) -> Self {
        self.pulse = pulse;
        self.rest = rest;
        self
    }

    fn setup(&self) -> Result<(Box<dyn OutputLine>, SlotWatcher), SetupError> {
        let line = self.gpio.claim_output(self.pin)?;
        // Watch before the replay, commands written in between are not lost.
        let watcher = self.store.watcher()?;
        Ok((line, watcher))
    }

    fn load_command(&self) -> Option<Command> {
        let digit = match self.store.reader(&self.slot).load_digit() {
            Ok(digit) => digit,
            Err(err) => {
                log::error!("Unable to read command for pin {}: {err}", self.pin);
                return None;
            }
        };
        let command = Command::from_digit(digit);
        if command.is_none() {
            log::error!("Invalid command {digit} for pin {}", self.pin);
        }
        command
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        let name = format!("Control line on pin {}", self.pin);
        let (mut line, mut watcher) = match self.setup() {
            Ok(setup) => setup,
            Err(err) => return park(&name, &err, &mut shutdown).await,
        };

        if let Some(level) = self.load_command().and_then(Command::restore_level) {
            log::info!("{name}: restoring {level}");
            if let Err(err) = line.set_level(level) {
                log::error!("{name}: {err}");
            }
        }
        log::info!("{name}: watching {}", self.slot);

        loop {
            let changed = tokio::select! {
                changed = watcher.changed_slot(&self.slot) => changed,
                () = shutdown.wait() => break,
            };
            if let Err(err) = changed {
                return park(&name, &err, &mut shutdown).await;
            }
            if let Some(command) = self.load_command() {
                log::debug!("{name}: executing {command:?}");
                if let Err(err) = execute(line.as_mut(), command, self.pulse).await {
                    log::error!("{name}: {err}");
                }
            }
            if !pause(self.rest, &mut shutdown).await {
                break;
            }
        }
        log::info!("{name}: stopped");
    }
}

async fn execute(line: &mut dyn OutputLine, command: Command, pulse: Duration) -> io::Result<()> {
    match command {
        Command::Nop => Ok(()),
        Command::High => line.set_level(Level::High),
        Command::Low => line.set_level(Level::Low),
        Command::LowPulse => {
            line.set_level(Level::Low)?;
            tokio::time::sleep(pulse).await;
            line.set_level(Level::High)
        }
        Command::HighPulse => {
            line.set_level(Level::High)?;
            tokio::time::sleep(pulse).await;
            line.set_level(Level::Low)
        }
    }
}
