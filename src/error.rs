// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::io;

use thiserror::Error;

use crate::{frame::Address, store::StoreError};

/// Failure of a module's register handler.
///
/// The protocol engine answers every handler failure with
/// [`ExceptionCode::ServerDeviceFailure`](crate::ExceptionCode::ServerDeviceFailure).
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The address is outside of the module's register map.
    #[error("register {0} is out of range")]
    OutOfRange(Address),

    /// The address maps to a channel that is not configured.
    #[error("no line is configured for register {0}")]
    UndefinedLine(Address),

    /// The written value is not accepted by the register.
    #[error("invalid value {value} for register {address}")]
    InvalidValue { address: Address, value: u16 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sensor output could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Sensor output failed its checksum.
    #[error("CRC mismatch")]
    Crc,

    /// The sensor did not deliver a reading.
    #[error("sensor failure: {0}")]
    Sensor(String),
}
