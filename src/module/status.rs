// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flip-flop/status module
//!
//! Register `n` in `1..=16` reads the state of status channel `n`
//! from slot `status.<pin1>_<pin2>`.

use std::ops::RangeInclusive;

use crate::{
    dispatch::{ReadHandler, RegisterDispatch},
    error::HandlerError,
    frame::{Address, Word},
    gpio::PinId,
    store::SlotStore,
};

use super::check_range;

pub const REGISTERS: RangeInclusive<Address> = 1..=16;

pub const MAX_STATUS_LINES: usize = 16;

/// `pin2` is `0` for single line channels.
#[must_use]
pub fn slot_name(pin1: PinId, pin2: PinId) -> String {
    format!("status.{pin1}_{pin2}")
}

#[derive(Debug, Clone)]
pub struct StatusRegisters {
    store: SlotStore,
    lines: Vec<(PinId, PinId)>,
}

impl StatusRegisters {
    #[must_use]
    pub fn new(store: SlotStore, lines: Vec<(PinId, PinId)>) -> Self {
        Self { store, lines }
    }

    #[must_use]
    pub fn into_dispatch(self) -> RegisterDispatch {
        RegisterDispatch::new().with_read(self)
    }
}

impl ReadHandler for StatusRegisters {
    fn read(&self, addr: Address) -> Result<Word, HandlerError> {
        check_range(&REGISTERS, addr)?;
        let (pin1, pin2) = self
            .lines
            .get(usize::from(addr - 1))
            .copied()
            .filter(|(pin1, _)| *pin1 != 0)
            .ok_or(HandlerError::UndefinedLine(addr))?;
        let state = self
            .store
            .reader(&slot_name(pin1, pin2))
            .load_digit()
            .map_err(|err| {
                log::error!("Unable to read state value: {err}");
                err
            })?;
        Ok(Word::from(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_to_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        store.writer("status.4_5").unwrap().store("2\n").unwrap();
        store.writer("status.6_0").unwrap().store("1\n").unwrap();
        let registers = StatusRegisters::new(store, vec![(4, 5), (0, 0), (6, 0)]);
        assert_eq!(registers.read(1).unwrap(), 2);
        assert_eq!(registers.read(3).unwrap(), 1);
        assert!(matches!(
            registers.read(2),
            Err(HandlerError::UndefinedLine(2))
        ));
        assert!(matches!(
            registers.read(4),
            Err(HandlerError::UndefinedLine(4))
        ));
        assert!(matches!(
            registers.read(17),
            Err(HandlerError::OutOfRange(17))
        ));
    }
}
