// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pulse counter module
//!
//! | Address | Slot                 | Access |
//! |---------|----------------------|--------|
//! | 1       | `pulsecount<pin1>_1` | R      |
//! | 2       | `pulsecount<pin1>_2` | R      |
//! | ...     |                      |        |
//! | 15      | `pulsecount<pin8>_1` | R      |
//! | 16      | `pulsecount<pin8>_2` | R      |

use std::ops::RangeInclusive;

use crate::{
    dispatch::{ReadHandler, RegisterDispatch},
    error::HandlerError,
    frame::{Address, Word},
    gpio::PinId,
    store::SlotStore,
};

use super::{check_range, to_word};

pub const REGISTERS: RangeInclusive<Address> = 1..=16;

pub const MAX_COUNTERS: usize = 8;

/// Name of the slot holding sub-counter `sub` (1 or 2) of the counter on `pin`.
#[must_use]
pub fn slot_name(pin: PinId, sub: u8) -> String {
    format!("pulsecount{pin}_{sub}")
}

/// Read access to the published counter values.
#[derive(Debug, Clone)]
pub struct CounterRegisters {
    store: SlotStore,
    pins: Vec<PinId>,
}

impl CounterRegisters {
    /// `pins` lists the counter channels in register order, `0` marks
    /// an unused channel.
    #[must_use]
    pub fn new(store: SlotStore, pins: Vec<PinId>) -> Self {
        Self { store, pins }
    }

    #[must_use]
    pub fn into_dispatch(self) -> RegisterDispatch {
        RegisterDispatch::new().with_read(self)
    }
}

impl ReadHandler for CounterRegisters {
    fn read(&self, addr: Address) -> Result<Word, HandlerError> {
        check_range(&REGISTERS, addr)?;
        let channel = usize::from((addr - 1) / 2);
        let sub = if addr % 2 == 1 { 1 } else { 2 };
        let pin = self
            .pins
            .get(channel)
            .copied()
            .filter(|pin| *pin != 0)
            .ok_or(HandlerError::UndefinedLine(addr))?;
        let value = self
            .store
            .reader(&slot_name(pin, sub))
            .load_counter()
            .map_err(|err| {
                log::error!("Unable to read counter value: {err}");
                err
            })?;
        Ok(to_word(i64::try_from(value).unwrap_or(i64::MAX)))
    }
}
