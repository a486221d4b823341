// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus TCP server loop

use std::{
    future::{self, Future},
    io,
    net::SocketAddr,
};

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::Framed;

use crate::{
    codec::tcp::ServerCodec,
    dispatch::RegisterDispatch,
    frame::{tcp::ResponseAdu, *},
    slave::Slave,
};

use super::{Error, Terminated};

/// Default exclusive upper bound of served register addresses.
pub const DEFAULT_MAX_REG: Address = 8200;

/// Maximum number of registers in a single read response.
const MAX_READ_QUANTITY: Quantity = 125;

/// A Modbus TCP slave serving one connection and one request at a time.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    slave: Slave,
    max_reg: Address,
    dispatch: RegisterDispatch,
}

impl Server {
    /// Listen on `addr` with a backlog of a single connection.
    pub fn bind(addr: SocketAddr, slave: Slave, dispatch: RegisterDispatch) -> Result<Self, Error> {
        let listener = listen(addr).map_err(|source| Error::Bind { addr, source })?;
        Ok(Self::new(listener, slave, dispatch))
    }

    /// Attach the server to an existing [`TcpListener`].
    #[must_use]
    pub fn new(listener: TcpListener, slave: Slave, dispatch: RegisterDispatch) -> Self {
        Self {
            listener,
            slave,
            max_reg: DEFAULT_MAX_REG,
            dispatch,
        }
    }

    /// Override the exclusive upper bound of served register addresses.
    #[must_use]
    pub fn max_reg(mut self, max_reg: Address) -> Self {
        self.max_reg = max_reg;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve requests until accepting a connection fails.
    pub async fn serve(self) -> Result<Terminated, Error> {
        self.serve_until(future::pending()).await
    }

    /// Serve requests until accepting a connection fails or
    /// `abort_signal` resolves.
    ///
    /// The abort signal interrupts both waiting for a connection
    /// and waiting for the request of an accepted connection.
    pub async fn serve_until<X>(self, abort_signal: X) -> Result<Terminated, Error>
    where
        X: Future<Output = ()>,
    {
        tokio::pin!(abort_signal);
        log::info!(
            "Slave {}: listening on {:?}",
            self.slave,
            self.listener.local_addr()
        );
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => accepted.map_err(Error::Accept)?,
                () = &mut abort_signal => break,
            };
            log::debug!("Slave {}: accepted connection from {peer}", self.slave);
            tokio::select! {
                () = self.process(stream, peer) => (),
                () = &mut abort_signal => break,
            }
        }
        log::info!("Slave {}: server terminated", self.slave);
        Ok(Terminated::Aborted)
    }

    /// Receive a single request, reply to it and close the connection.
    async fn process(&self, stream: TcpStream, peer: SocketAddr) {
        let mut framed = Framed::new(stream, ServerCodec::default());

        let adu = match framed.next().await {
            Some(Ok(adu)) => adu,
            Some(Err(err)) => {
                log::error!(
                    "Slave {}: failed to receive request from {peer}: {err}",
                    self.slave
                );
                return;
            }
            None => {
                log::error!(
                    "Slave {}: connection from {peer} closed without request",
                    self.slave
                );
                return;
            }
        };

        let hdr = adu.hdr;
        let response = self.handle(adu.into());
        if let Err(err) = framed
            .send(ResponseAdu {
                hdr,
                pdu: response.into(),
            })
            .await
        {
            log::error!(
                "Slave {}: failed to send reply to {peer}: {err}",
                self.slave
            );
        }
    }

    /// Map a request onto the register handlers.
    pub fn handle(&self, req: SlaveRequest) -> Result<Response, ExceptionResponse> {
        let SlaveRequest { slave, request } = req;
        if slave != self.slave.0 {
            log::warn!(
                "Slave {}: slave address {slave} doesn't match our own address",
                self.slave
            );
        }
        let function = request.function_code();
        log::debug!("Slave {}: handling {request:?}", self.slave);
        let result = match request {
            Request::ReadHoldingRegisters(addr, cnt) => {
                self.read(addr, cnt).map(Response::ReadHoldingRegisters)
            }
            Request::ReadInputRegisters(addr, cnt) => {
                self.read(addr, cnt).map(Response::ReadInputRegisters)
            }
            Request::WriteSingleRegister(addr, value) => self
                .write(addr, value)
                .map(|()| Response::WriteSingleRegister(addr, value)),
            Request::Custom(code, _) => {
                log::warn!("Slave {}: invalid operation 0x{code:0>2X}", self.slave);
                Err(ExceptionCode::IllegalFunction)
            }
        };
        result.map_err(|exception| ExceptionResponse {
            function,
            exception,
        })
    }

    fn read(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>, ExceptionCode> {
        if addr >= self.max_reg {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let Some(handler) = self.dispatch.reader() else {
            return Err(ExceptionCode::IllegalFunction);
        };
        let value = handler.read(addr).map_err(|err| {
            log::error!("Slave {}: failed to read register {addr}: {err}", self.slave);
            ExceptionCode::ServerDeviceFailure
        })?;
        if cnt == 0 || cnt > MAX_READ_QUANTITY {
            return Err(ExceptionCode::IllegalDataValue);
        }
        if u32::from(addr) + u32::from(cnt) > u32::from(self.max_reg) {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let mut registers = vec![0; usize::from(cnt)];
        registers[0] = value;
        Ok(registers)
    }

    fn write(&self, addr: Address, value: Word) -> Result<(), ExceptionCode> {
        if addr >= self.max_reg {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let Some(handler) = self.dispatch.writer() else {
            return Err(ExceptionCode::IllegalFunction);
        };
        handler.write(addr, value).map_err(|err| {
            log::error!(
                "Slave {}: failed to write {value} to register {addr}: {err}",
                self.slave
            );
            ExceptionCode::ServerDeviceFailure
        })
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::HandlerError;

    async fn server(dispatch: RegisterDispatch) -> Server {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Server::new(listener, Slave(4), dispatch).max_reg(16)
    }

    fn request(request: Request) -> SlaveRequest {
        SlaveRequest { slave: 4, request }
    }

    fn echo_dispatch() -> RegisterDispatch {
        RegisterDispatch::new()
            .with_read(|addr: Address| -> Result<Word, HandlerError> { Ok(addr + 100) })
            .with_write(|_: Address, _: Word| -> Result<(), HandlerError> { Ok(()) })
    }

    #[tokio::test]
    async fn read_first_register_holds_value() {
        let server = server(echo_dispatch()).await;
        let rsp = server
            .handle(request(Request::ReadHoldingRegisters(5, 3)))
            .unwrap();
        assert_eq!(rsp, Response::ReadHoldingRegisters(vec![105, 0, 0]));
        let rsp = server
            .handle(request(Request::ReadInputRegisters(15, 1)))
            .unwrap();
        assert_eq!(rsp, Response::ReadInputRegisters(vec![115]));
    }

    #[tokio::test]
    async fn addresses_beyond_max_reg() {
        let server = server(echo_dispatch()).await;
        for req in [
            Request::ReadHoldingRegisters(16, 1),
            Request::ReadInputRegisters(u16::MAX, 1),
            Request::ReadHoldingRegisters(15, 2),
            Request::WriteSingleRegister(16, 1),
            Request::WriteSingleRegister(20, 1),
        ] {
            let err = server.handle(request(req)).unwrap_err();
            assert_eq!(err.exception, ExceptionCode::IllegalDataAddress);
        }
    }

    #[tokio::test]
    async fn read_quantity_limits() {
        let server = server(echo_dispatch()).await.max_reg(DEFAULT_MAX_REG);
        let err = server
            .handle(request(Request::ReadHoldingRegisters(1, 0)))
            .unwrap_err();
        assert_eq!(err.exception, ExceptionCode::IllegalDataValue);
        let err = server
            .handle(request(Request::ReadHoldingRegisters(1, 126)))
            .unwrap_err();
        assert_eq!(err.exception, ExceptionCode::IllegalDataValue);
        assert!(server
            .handle(request(Request::ReadHoldingRegisters(1, 125)))
            .is_ok());
    }

    #[tokio::test]
    async fn write_echoes_request() {
        let server = server(echo_dispatch()).await;
        let rsp = server
            .handle(request(Request::WriteSingleRegister(3, 0x0102)))
            .unwrap();
        assert_eq!(rsp, Response::WriteSingleRegister(3, 0x0102));
    }

    #[tokio::test]
    async fn unknown_function() {
        let server = server(echo_dispatch()).await;
        let err = server
            .handle(request(Request::Custom(0x10, Bytes::new())))
            .unwrap_err();
        assert_eq!(
            err,
            ExceptionResponse {
                function: FunctionCode::Custom(0x10),
                exception: ExceptionCode::IllegalFunction,
            }
        );
    }

    #[tokio::test]
    async fn missing_handlers() {
        let server = server(RegisterDispatch::new()).await;
        let err = server
            .handle(request(Request::ReadInputRegisters(1, 1)))
            .unwrap_err();
        assert_eq!(err.exception, ExceptionCode::IllegalFunction);
        let err = server
            .handle(request(Request::WriteSingleRegister(1, 1)))
            .unwrap_err();
        assert_eq!(err.exception, ExceptionCode::IllegalFunction);
    }

    #[tokio::test]
    async fn failing_handlers() {
        let dispatch = RegisterDispatch::new()
            .with_read(|addr: Address| -> Result<Word, HandlerError> {
                Err(HandlerError::UndefinedLine(addr))
            })
            .with_write(|address: Address, value: Word| -> Result<(), HandlerError> {
                Err(HandlerError::InvalidValue { address, value })
            });
        let server = server(dispatch).await;
        for req in [
            Request::ReadHoldingRegisters(1, 1),
            Request::ReadHoldingRegisters(1, 0),
            Request::ReadInputRegisters(1, 126),
            Request::ReadHoldingRegisters(15, 2),
        ] {
            let err = server.handle(request(req)).unwrap_err();
            assert_eq!(err.exception, ExceptionCode::ServerDeviceFailure);
        }
        let err = server
            .handle(request(Request::WriteSingleRegister(1, 9)))
            .unwrap_err();
        assert_eq!(err.exception, ExceptionCode::ServerDeviceFailure);
    }

    #[tokio::test]
    async fn foreign_slave_address_is_served() {
        let server = server(echo_dispatch()).await;
        let rsp = server
            .handle(SlaveRequest {
                slave: 99,
                request: Request::ReadHoldingRegisters(1, 1),
            })
            .unwrap();
        assert_eq!(rsp, Response::ReadHoldingRegisters(vec![101]));
    }
}
