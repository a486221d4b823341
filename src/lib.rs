// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP slave daemons for the digital I/O of embedded
//! [Linux](https://www.kernel.org) boards, based on [tokio](https://tokio.rs).
//!
//! Every physical function of a board is served by its own module daemon:
//!
//! | Module    | Slave | Registers | Access |
//! |-----------|-------|-----------|--------|
//! | `sensor`  | 1     | 1..=18    | R      |
//! | `counter` | 2     | 1..=16    | R      |
//! | `status`  | 3     | 1..=16    | R      |
//! | `control` | 4     | 1..=16    | RW     |
//!
//! A daemon listens on TCP port `5000 + slave` and answers a single
//! request per connection. Channel monitors publish the state of their
//! lines to file slots that the register handlers read, and register
//! writes are handed to the monitors through the same slots.
//!
//! ```no_run
//! use iomodbus::{config::Config, daemon::Daemon, supervisor::TerminationSignal};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config: Config = r#"
//!     [module]
//!     kind = "control"
//!
//!     [[control]]
//!     pin = 4
//!     slot = "relay1"
//! "#
//! .parse()?;
//! let signal = TerminationSignal::new()?;
//! let running = Daemon::new(config).start()?;
//! running.run_until(signal.recv()).await?;
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod gpio;
pub mod module;
pub mod monitor;
pub mod server;
pub mod slave;
pub mod store;
pub mod supervisor;

mod codec;

mod frame;
pub use self::frame::{
    Address, ExceptionCode, ExceptionResponse, FunctionCode, Quantity, Request, Response,
    SlaveRequest, Word,
};
