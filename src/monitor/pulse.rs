// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pulse counting

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    gpio::{Gpio, InputLine, PinId, Polarity},
    store::{format_counter, SlotReader, SlotWriter},
    supervisor::Shutdown,
};

use super::{park, pause, SetupError};

/// Counts completed pulses for two sub-counters.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseCounter {
    divisor: f64,
    counts: [u64; 2],
    started: Option<Instant>,
}

impl PulseCounter {
    #[must_use]
    pub fn new(divisor: f64) -> Self {
        Self {
            divisor,
            counts: [0; 2],
            started: None,
        }
    }

    #[must_use]
    pub fn is_pulse_active(&self) -> bool {
        self.started.is_some()
    }

    /// Feed the state of the line after an edge.
    ///
    /// Returns the length of the pulse if the edge completed one.
    pub fn on_edge(&mut self, active: bool, now: Instant) -> Option<Duration> {
        match (self.started, active) {
            (None, true) => {
                self.started = Some(now);
                None
            }
            (Some(_), true) => {
                log::debug!("Detected starting pulse out of sequence");
                None
            }
            (Some(started), false) => {
                self.started = None;
                Some(now.saturating_duration_since(started))
            }
            (None, false) => {
                log::debug!("Detected ending pulse out of sequence");
                None
            }
        }
    }

    /// Count a pulse for sub-counter `sub` (1 or 2) and return its
    /// scaled value.
    pub fn credit(&mut self, sub: u8) -> Option<u64> {
        let count = self.counts.get_mut(usize::from(sub).checked_sub(1)?)?;
        *count += 1;
        let count = *count;
        Some(self.scale(count))
    }

    /// The scaled value of sub-counter `sub` (1 or 2).
    #[must_use]
    pub fn scaled(&self, sub: u8) -> Option<u64> {
        let count = self.counts.get(usize::from(sub).checked_sub(1)?)?;
        Some(self.scale(*count))
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn scale(&self, count: u64) -> u64 {
        (count as f64 / self.divisor).floor() as u64
    }
}

/// Counts pulses on an input line and publishes the scaled counts.
///
/// Without a selector every pulse is credited to the first counter.
/// Otherwise the selector slot decides which counter is credited,
/// pulses are dropped if it holds neither `1` nor `2`.
pub struct PulseMonitor {
    gpio: Arc<dyn Gpio>,
    pin: PinId,
    polarity: Polarity,
    counter: PulseCounter,
    first: SlotWriter,
    selector: Option<(SlotReader, SlotWriter)>,
    idle_poll: Duration,
}

impl std::fmt::Debug for PulseMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseMonitor")
            .field("pin", &self.pin)
            .field("polarity", &self.polarity)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl PulseMonitor {
    #[must_use]
    pub fn new(
        gpio: Arc<dyn Gpio>,
        pin: PinId,
        polarity: Polarity,
        divisor: f64,
        first: SlotWriter,
    ) -> Self {
        Self {
            gpio,
            pin,
            polarity,
            counter: PulseCounter::new(divisor),
            first,
            selector: None,
            idle_poll: Duration::from_millis(100),
        }
    }

    /// Publish the second counter to `second` and credit pulses as
    /// told by `selector`.
    #[must_use]
    pub fn with_selector(mut self, selector: SlotReader, second: SlotWriter) -> Self {
        self.selector = Some((selector, second));
        self
    }

    #[must_use]
    pub fn idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    fn name(&self) -> String {
        format!("Pulse counter on pin {}", self.pin)
    }

    fn setup(&self) -> Result<Box<dyn InputLine>, SetupError> {
        let line = self.gpio.claim_input(self.pin)?;
        self.first.store(&format_counter(0))?;
        if let Some((_, second)) = &self.selector {
            second.store(&format_counter(0))?;
        }
        Ok(line)
    }

    pub async fn run(mut self, mut shutdown: Shutdown) {
        let name = self.name();
        let mut line = match self.setup() {
            Ok(line) => line,
            Err(err) => return park(&name, &err, &mut shutdown).await,
        };
        log::info!(
            "{name}: started using {} logic, divisor {}",
            self.polarity,
            self.counter.divisor
        );

        // Wait for a possibly ongoing pulse to end.
        loop {
            match line.level() {
                Ok(level) if self.polarity.is_active(level) => {
                    if !pause(self.idle_poll, &mut shutdown).await {
                        return;
                    }
                }
                Ok(_) => break,
                Err(err) => return park(&name, &err, &mut shutdown).await,
            }
        }

        loop {
            let level = tokio::select! {
                level = line.edge() => level,
                () = shutdown.wait() => break,
            };
            match level {
                Ok(level) => self.on_level(self.polarity.is_active(level)),
                Err(err) => return park(&name, &err, &mut shutdown).await,
            }
        }
        log::info!("{name}: stopped");
    }

    fn on_level(&mut self, active: bool) {
        let Some(length) = self.counter.on_edge(active, Instant::now()) else {
            return;
        };
        log::debug!(
            "Detected pulse with length {} ms on pin {}",
            length.as_millis(),
            self.pin
        );
        let sub = match &self.selector {
            None => 1,
            Some((selector, _)) => selector.load_digit().unwrap_or_else(|err| {
                log::error!("Unable to read selector: {err}");
                0
            }),
        };
        let writer = match (sub, &self.selector) {
            (1, _) => &self.first,
            (2, Some((_, second))) => second,
            _ => {
                log::debug!("Ignoring pulse on pin {} for selector {sub}", self.pin);
                return;
            }
        };
        let Some(value) = self.counter.credit(sub) else {
            return;
        };
        if let Err(err) = writer.store(&format_counter(value)) {
            log::error!("Unable to publish counter value: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_sequence() {
        let mut counter = PulseCounter::new(1.0);
        let t0 = Instant::now();
        assert_eq!(counter.on_edge(false, t0), None);
        assert_eq!(counter.on_edge(true, t0), None);
        assert!(counter.is_pulse_active());
        assert_eq!(counter.on_edge(true, t0 + Duration::from_millis(5)), None);
        assert_eq!(
            counter.on_edge(false, t0 + Duration::from_millis(20)),
            Some(Duration::from_millis(20))
        );
        assert!(!counter.is_pulse_active());
        assert_eq!(counter.on_edge(false, t0), None);
    }

    #[test]
    fn fractional_divisor() {
        let mut counter = PulseCounter::new(2.5);
        let values: Vec<_> = (0..7).filter_map(|_| counter.credit(1)).collect();
        assert_eq!(values, vec![0, 0, 1, 1, 2, 2, 2]);
        assert_eq!(counter.scaled(1), Some(2));
        assert_eq!(counter.scaled(2), Some(0));
        assert_eq!(counter.credit(2), Some(0));
        assert_eq!(counter.credit(0), None);
        assert_eq!(counter.credit(3), None);
    }
}
