// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flip-flop and status lines

use std::{future, io, sync::Arc, time::Duration};

use crate::{
    gpio::{Gpio, InputLine, Level, PinId, Polarity},
    store::{format_digit, SlotWriter},
    supervisor::Shutdown,
};

use super::{park, pause, SetupError};

/// State of a status channel.
///
/// With two lines the state is the number of the line that became
/// active last, `0` until any line became active. With a single line
/// the state is `1` while the line is active and `2` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipFlop {
    two_lines: bool,
    state: u8,
}

impl FlipFlop {
    #[must_use]
    pub const fn new(two_lines: bool) -> Self {
        Self {
            two_lines,
            state: 0,
        }
    }

    #[must_use]
    pub const fn state(self) -> u8 {
        self.state
    }

    /// Apply the state of line `line` (1 or 2) sampled after its edge.
    pub fn update(&mut self, line: u8, active: bool) -> u8 {
        if self.two_lines {
            if active {
                self.state = line;
            }
        } else {
            self.state = if active { 1 } else { 2 };
        }
        self.state
    }
}

/// Publishes the state of a status channel.
pub struct StatusMonitor {
    gpio: Arc<dyn Gpio>,
    pin1: PinId,
    pin2: Option<PinId>,
    polarity: Polarity,
    slot: SlotWriter,
    settle: Duration,
    rest: Duration,
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("pin1", &self.pin1)
            .field("pin2", &self.pin2)
            .field("polarity", &self.polarity)
            .field("slot", &self.slot.name())
            .finish_non_exhaustive()
    }
}

impl StatusMonitor {
    /// A `pin2` of `0` selects single line mode.
    #[must_use]
    pub fn new(
        gpio: Arc<dyn Gpio>,
        (pin1, pin2): (PinId, PinId),
        polarity: Polarity,
        slot: SlotWriter,
    ) -> Self {
        Self {
            gpio,
            pin1,
            pin2: (pin2 != 0).then_some(pin2),
            polarity,
            slot,
            settle: Duration::from_millis(50),
            rest: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn timing(mut self, settle: Duration, rest: Duration) -> Self {
        self.settle = settle;
        self.rest = rest;
        self
    }

    fn setup(&self) -> Result<[Option<Box<dyn InputLine>>; 2], SetupError> {
        let line1 = self.gpio.claim_input(self.pin1)?;
        let line2 = self
            .pin2
            .map(|pin| self.gpio.claim_input(pin))
            .transpose()?;
        self.slot.store(&format_digit(0))?;
        Ok([Some(line1), line2])
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        let name = format!(
            "Status monitor on pins {}/{}",
            self.pin1,
            self.pin2.unwrap_or_default()
        );
        let mut lines = match self.setup() {
            Ok(lines) => lines,
            Err(err) => return park(&name, &err, &mut shutdown).await,
        };
        log::info!("{name}: started using {} logic", self.polarity);
        let mut flip_flop = FlipFlop::new(self.pin2.is_some());

        loop {
            let [line1, line2] = &mut lines;
            let fired = tokio::select! {
                edge = next_edge(line1) => edge.map(|_| 1),
                edge = next_edge(line2) => edge.map(|_| 2),
                () = shutdown.wait() => break,
            };
            let sampled = match fired {
                Ok(line) => {
                    if !pause(self.settle, &mut shutdown).await {
                        break;
                    }
                    sample(&mut lines, line).map(|level| (line, level))
                }
                Err(err) => Err(err),
            };
            match sampled {
                Ok((line, level)) => {
                    let state = flip_flop.update(line, self.polarity.is_active(level));
                    log::debug!("{name}: edge on line {line}, new state {state}");
                    if let Err(err) = self.slot.store(&format_digit(state)) {
                        log::error!("{name}: unable to publish state: {err}");
                    }
                }
                Err(err) => log::error!("{name}: error during edge detection: {err}"),
            }
            if !pause(self.rest, &mut shutdown).await {
                break;
            }
        }
        log::info!("{name}: stopped");
    }
}

async fn next_edge(line: &mut Option<Box<dyn InputLine>>) -> io::Result<Level> {
    match line {
        Some(line) => line.edge().await,
        None => future::pending().await,
    }
}

fn sample(lines: &mut [Option<Box<dyn InputLine>>; 2], line: u8) -> io::Result<Level> {
    lines[usize::from(line - 1)]
        .as_mut()
        .map_or_else(|| Err(io::ErrorKind::NotFound.into()), |line| line.level())
}
