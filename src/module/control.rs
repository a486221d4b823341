// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay control module
//!
//! Register `n` in `1..=16` reads and writes the command slot of control
//! line `n`. Registers above the configured number of lines are
//! undefined.

use std::{ops::RangeInclusive, sync::Arc};

use crate::{
    dispatch::{ReadHandler, RegisterDispatch, WriteHandler},
    error::HandlerError,
    frame::{Address, Word},
    monitor::control::Command,
    store::{format_digit, SlotWriter},
};

use super::check_range;

pub const REGISTERS: RangeInclusive<Address> = 1..=16;

pub const MAX_CONTROL_LINES: usize = 8;

/// Command slots of the control lines, in register order.
///
/// `None` marks an unused line.
#[derive(Debug)]
pub struct ControlRegisters {
    slots: Vec<Option<SlotWriter>>,
}

impl ControlRegisters {
    #[must_use]
    pub fn new(slots: Vec<Option<SlotWriter>>) -> Self {
        Self { slots }
    }

    #[must_use]
    pub fn into_dispatch(self) -> RegisterDispatch {
        let registers = Arc::new(self);
        RegisterDispatch::new()
            .with_read(Arc::clone(&registers))
            .with_write(registers)
    }

    fn slot(&self, addr: Address) -> Result<&SlotWriter, HandlerError> {
        check_range(&REGISTERS, addr)?;
        self.slots
            .get(usize::from(addr - 1))
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                log::error!("Control line {addr} not defined");
                HandlerError::UndefinedLine(addr)
            })
    }
}

impl ReadHandler for Arc<ControlRegisters> {
    fn read(&self, addr: Address) -> Result<Word, HandlerError> {
        let command = self.slot(addr)?.reader().load_digit()?;
        Ok(Word::from(command))
    }
}

impl WriteHandler for Arc<ControlRegisters> {
    fn write(&self, addr: Address, value: Word) -> Result<(), HandlerError> {
        let slot = self.slot(addr)?;
        let command = u8::try_from(value)
            .ok()
            .and_then(Command::from_digit)
            .ok_or(HandlerError::InvalidValue {
                address: addr,
                value,
            })?;
        log::debug!("Writing command {command:?} to {}", slot.name());
        slot.store(&format_digit(command.digit()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SlotStore;

    fn registers(store: &SlotStore) -> Arc<ControlRegisters> {
        Arc::new(ControlRegisters::new(vec![
            Some(store.writer("relay1").unwrap()),
            None,
            Some(store.writer("relay3").unwrap()),
        ]))
    }

    #[test]
    fn write_then_read_command() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        let registers = registers(&store);
        registers.write(3, 4).unwrap();
        assert_eq!(store.reader("relay3").load().unwrap(), "4\n");
        assert_eq!(registers.read(3).unwrap(), 4);
        registers.write(1, 0).unwrap();
        assert_eq!(registers.read(1).unwrap(), 0);
    }

    #[test]
    fn invalid_commands() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        let registers = registers(&store);
        for value in [5, 9, 256 + 1] {
            assert!(matches!(
                registers.write(1, value),
                Err(HandlerError::InvalidValue { address: 1, .. })
            ));
        }
        assert!(!store.path("relay1").exists());
    }

    #[test]
    fn undefined_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        let registers = registers(&store);
        assert!(matches!(
            registers.write(2, 1),
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
        // Commands written by other programs lack the newline.
        std::fs::write(store.path("relay1"), "3").unwrap();
        assert_eq!(registers.read(1).unwrap(), 3);
    }

    #[test]
    fn slots_stay_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        let dispatch = registers(&store);
        assert!(store.writer("relay1").is_err());
        drop(dispatch);
        assert!(store.writer("relay1").is_ok());
    }
}
