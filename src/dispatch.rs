// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register handlers a module plugs into the protocol engine.

use std::fmt;

use crate::{
    error::HandlerError,
    frame::{Address, Word},
};

/// Reads the value of a single register.
pub trait ReadHandler: Send + Sync {
    fn read(&self, address: Address) -> Result<Word, HandlerError>;
}

/// Writes the value of a single register.
pub trait WriteHandler: Send + Sync {
    fn write(&self, address: Address, value: Word) -> Result<(), HandlerError>;
}

impl<F> ReadHandler for F
where
    F: Fn(Address) -> Result<Word, HandlerError> + Send + Sync,
{
    fn read(&self, address: Address) -> Result<Word, HandlerError> {
        self(address)
    }
}

impl<F> WriteHandler for F
where
    F: Fn(Address, Word) -> Result<(), HandlerError> + Send + Sync,
{
    fn write(&self, address: Address, value: Word) -> Result<(), HandlerError> {
        self(address, value)
    }
}

/// The pair of optional register handlers of a module.
///
/// A missing handler makes the engine answer the corresponding
/// requests with [`ExceptionCode::IllegalFunction`](crate::ExceptionCode::IllegalFunction).
#[derive(Default)]
pub struct RegisterDispatch {
    read: Option<Box<dyn ReadHandler>>,
    write: Option<Box<dyn WriteHandler>>,
}

impl RegisterDispatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_read(mut self, handler: impl ReadHandler + 'static) -> Self {
        self.read = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_write(mut self, handler: impl WriteHandler + 'static) -> Self {
        self.write = Some(Box::new(handler));
        self
    }

    pub fn reader(&self) -> Option<&dyn ReadHandler> {
        self.read.as_deref()
    }

    pub fn writer(&self) -> Option<&dyn WriteHandler> {
        self.write.as_deref()
    }
}

impl fmt::Debug for RegisterDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterDispatch")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_as_handlers() {
        let dispatch = RegisterDispatch::new()
            .with_read(|addr: Address| -> Result<Word, HandlerError> { Ok(addr + 100) })
            .with_write(|addr: Address, _: Word| -> Result<(), HandlerError> {
                Err(HandlerError::OutOfRange(addr))
            });
        assert_eq!(dispatch.reader().unwrap().read(5).unwrap(), 105);
        assert!(matches!(
            dispatch.writer().unwrap().write(7, 1),
            Err(HandlerError::OutOfRange(7))
        ));
    }

    #[test]
    fn missing_handlers() {
        let dispatch = RegisterDispatch::new();
        assert!(dispatch.reader().is_none());
        assert!(dispatch.writer().is_none());
        assert_eq!(
            format!("{dispatch:?}"),
            "RegisterDispatch { read: false, write: false }"
        );
    }
}
