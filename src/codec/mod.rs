// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    convert::TryFrom,
    io::{self, Cursor, Error, ErrorKind},
};

use byteorder::{BigEndian, ReadBytesExt as _};
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};

use crate::frame::{ExceptionResponse, Request, Response, ResponsePdu};

pub(crate) mod tcp;

/// Maximum request/response PDU size.
///
/// As defined by the spec for both RTU and TCP.
pub(crate) const MAX_PDU_SIZE: usize = 253;

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn u16_len(len: usize) -> u16 {
    debug_assert!(len <= u16::MAX.into());
    len as u16
}

fn encode_response_pdu(buf: &mut BytesMut, rsp: &Response) {
    use crate::frame::Response::*;
    buf.put_u8(rsp.function_code().value());
    match rsp {
        ReadHoldingRegisters(registers) | ReadInputRegisters(registers) => {
            buf.put_u8(u8_len(registers.len() * 2));
            for r in registers {
                buf.put_u16(*r);
            }
        }
        WriteSingleRegister(address, word) => {
            buf.put_u16(*address);
            buf.put_u16(*word);
        }
    }
}

fn encode_exception_response_pdu(buf: &mut BytesMut, rsp: ExceptionResponse) {
    debug_assert!(rsp.function.value() < 0x80);
    buf.put_u8(rsp.function.value() + 0x80);
    buf.put_u8(rsp.exception.into());
}

pub(crate) fn encode_response_result_pdu(buf: &mut BytesMut, res: &ResponsePdu) {
    match &res.0 {
        Ok(rsp) => encode_response_pdu(buf, rsp),
        Err(rsp) => encode_exception_response_pdu(buf, *rsp),
    }
}

fn response_pdu_size(rsp: &Response) -> io::Result<usize> {
    use crate::frame::Response::*;
    let size = match rsp {
        ReadHoldingRegisters(data) | ReadInputRegisters(data) => 2 + data.len() * 2,
        WriteSingleRegister(_, _) => 5,
    };
    if size > MAX_PDU_SIZE {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "response PDU size exceeded",
        ));
    }
    Ok(size)
}

pub(crate) fn response_result_pdu_size(res: &ResponsePdu) -> io::Result<usize> {
    match &res.0 {
        Ok(rsp) => response_pdu_size(rsp),
        Err(_) => Ok(2),
    }
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

impl TryFrom<Bytes> for Request {
    type Error = Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        use crate::frame::Request::*;
        if bytes.len() > MAX_PDU_SIZE {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "request PDU size exceeded",
            ));
        }
        let rdr = &mut Cursor::new(&bytes);
        let fn_code = rdr.read_u8()?;
        let req = match fn_code {
            0x03 => ReadHoldingRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x04 => ReadInputRegisters(read_u16_be(rdr)?, read_u16_be(rdr)?),
            0x06 => WriteSingleRegister(read_u16_be(rdr)?, read_u16_be(rdr)?),
            fn_code if fn_code < 0x80 => {
                // Consume all remaining bytes as custom data.
                return Ok(Custom(fn_code, bytes.slice(1..)));
            }
            fn_code => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("invalid function code: 0x{fn_code:02X}"),
                ));
            }
        };
        // Verify that all data has been consumed and decoded.
        if rdr.has_remaining() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "undecoded request data",
            ));
        }
        Ok(req)
    }
}
