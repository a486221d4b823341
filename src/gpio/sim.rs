// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simulated lines for running modules without hardware

use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Gpio, InputLine, Level, OutputLine, PinId, SetupError};

#[derive(Debug, Default)]
struct SimPin {
    level: Option<Level>,
    claimed: bool,
    edges: Option<mpsc::UnboundedSender<Level>>,
    history: Vec<Level>,
}

/// In-memory lines whose input levels are driven by [`SimGpio::set_level`].
///
/// Cloned handles share the same lines.
#[derive(Debug, Clone, Default)]
pub struct SimGpio {
    pins: Arc<Mutex<HashMap<PinId, SimPin>>>,
}

impl SimGpio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<PinId, SimPin>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive an input line. A claimed line reports an edge if the level changes.
    pub fn set_level(&self, pin: PinId, level: Level) {
        let mut pins = self.pins();
        let sim = pins.entry(pin).or_default();
        if sim.level == Some(level) {
            return;
        }
        sim.level = Some(level);
        if let Some(edges) = &sim.edges {
            // The receiving line may have been dropped concurrently.
            let _ = edges.send(level);
        }
    }

    /// The current level, [`Level::Low`] if never set.
    #[must_use]
    pub fn level(&self, pin: PinId) -> Level {
        self.pins()
            .get(&pin)
            .and_then(|sim| sim.level)
            .unwrap_or(Level::Low)
    }

    /// All levels written to an output line.
    #[must_use]
    pub fn history(&self, pin: PinId) -> Vec<Level> {
        self.pins()
            .get(&pin)
            .map(|sim| sim.history.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_claimed(&self, pin: PinId) -> bool {
        self.pins().get(&pin).is_some_and(|sim| sim.claimed)
    }

    fn claim(
        &self,
        pin: PinId,
        edges: Option<mpsc::UnboundedSender<Level>>,
    ) -> Result<(), SetupError> {
        let mut pins = self.pins();
        let sim = pins.entry(pin).or_default();
        if sim.claimed {
            return Err(SetupError::Claimed { pin });
        }
        sim.claimed = true;
        sim.edges = edges;
        log::debug!("Claimed simulated pin {pin}");
        Ok(())
    }

    fn release(&self, pin: PinId) {
        if let Some(sim) = self.pins().get_mut(&pin) {
            sim.claimed = false;
            sim.edges = None;
        }
        log::debug!("Released simulated pin {pin}");
    }
}

impl Gpio for SimGpio {
    fn claim_input(&self, pin: PinId) -> Result<Box<dyn InputLine>, SetupError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.claim(pin, Some(tx))?;
        Ok(Box::new(SimInput {
            pin,
            gpio: self.clone(),
            edges: rx,
        }))
    }

    fn claim_output(&self, pin: PinId) -> Result<Box<dyn OutputLine>, SetupError> {
        self.claim(pin, None)?;
        Ok(Box::new(SimOutput {
            pin,
            gpio: self.clone(),
        }))
    }
}

struct SimInput {
    pin: PinId,
    gpio: SimGpio,
    edges: mpsc::UnboundedReceiver<Level>,
}

#[async_trait]
impl InputLine for SimInput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn level(&mut self) -> io::Result<Level> {
        Ok(self.gpio.level(self.pin))
    }

    async fn edge(&mut self) -> io::Result<Level> {
        self.edges.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "simulated line released")
        })
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        self.gpio.release(self.pin);
    }
}

struct SimOutput {
    pin: PinId,
    gpio: SimGpio,
}

impl OutputLine for SimOutput {
    fn pin(&self) -> PinId {
        self.pin
    }

    fn set_level(&mut self, level: Level) -> io::Result<()> {
        let mut pins = self.gpio.pins();
        let sim = pins.entry(self.pin).or_default();
        sim.level = Some(level);
        sim.history.push(level);
        Ok(())
    }
}

impl Drop for SimOutput {
    fn drop(&mut self) {
        self.gpio.release(self.pin);
    }
}
