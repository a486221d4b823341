// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel monitors
//!
//! Each monitor owns the lines and slots of a single channel and runs
//! as a worker until shutdown is requested. A monitor whose setup fails
//! stays idle until shutdown.

use std::{fmt, io, time::Duration};

use thiserror::Error;

use crate::{gpio, store::StoreError, supervisor::Shutdown};

pub mod control;
pub mod pulse;
pub mod status;

pub use self::{control::ControlMonitor, pulse::PulseMonitor, status::StatusMonitor};

/// Delays of the monitor loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between an edge and sampling the status lines.
    pub status_settle: Duration,
    /// Pause after publishing a status.
    pub status_rest: Duration,
    /// Length of a generated control pulse.
    pub control_pulse: Duration,
    /// Pause after executing a command.
    pub control_rest: Duration,
    /// Poll interval while waiting for a pulse that was active at startup.
    pub pulse_idle_poll: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            status_settle: Duration::from_millis(50),
            status_rest: Duration::from_millis(500),
            control_pulse: Duration::from_millis(500),
            control_rest: Duration::from_millis(500),
            pulse_idle_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Gpio(#[from] gpio::SetupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Wait for shutdown after an unrecoverable failure.
async fn park(worker: &str, err: &(dyn fmt::Display + Sync), shutdown: &mut Shutdown) {
    log::error!("{worker}: {err}");
    log::warn!("{worker}: idle until shutdown");
    shutdown.wait().await;
}

/// Sleep for `duration`, returns `false` if shutdown was requested meanwhile.
async fn pause(duration: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = shutdown.wait() => false,
    }
}
