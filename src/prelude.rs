// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::{Address, Quantity, Request, Response, SlaveRequest, Word};
pub use crate::{ExceptionCode, ExceptionResponse};

pub use crate::config::Config;
pub use crate::daemon::{Daemon, Running};
pub use crate::dispatch::RegisterDispatch;
pub use crate::error::HandlerError;
pub use crate::gpio::{Level, PinId, Polarity};
pub use crate::module::ModuleKind;
pub use crate::server::{Server, Terminated};
pub use crate::slave::{Slave, SlaveId};
pub use crate::store::{SlotReader, SlotStore, SlotWriter};
pub use crate::supervisor::{Shutdown, Supervisor};

///////////////////////////////////////////////////////////////////
/// Traits
///////////////////////////////////////////////////////////////////
pub use crate::dispatch::{ReadHandler, WriteHandler};
pub use crate::gpio::{Gpio, InputLine, OutputLine};
