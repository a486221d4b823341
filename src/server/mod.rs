// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP slave

use std::{io, net::SocketAddr};

use thiserror::Error;

pub mod tcp;

pub use self::tcp::Server;

/// Cause for termination of the server loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminated {
    /// The abort signal has been triggered.
    Aborted,
}

/// Fatal failure of the server loop.
///
/// Errors of a single connection are logged and never terminate the loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}
