// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::{Error, ErrorKind, Result};

use bytes::{Buf as _, BufMut as _, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::{encode_response_result_pdu, response_result_pdu_size, u16_len, MAX_PDU_SIZE},
    frame::{tcp::*, Request},
};

const HEADER_LEN: usize = 7;

const PROTOCOL_ID: u16 = 0x0000; // TCP

/// Decoder for MBAP framed requests, encoder for the matching replies.
#[derive(Debug, Default)]
pub(crate) struct ServerCodec {
    _priv: (),
}

impl Decoder for ServerCodec {
    type Item = RequestAdu;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RequestAdu>> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let transaction_id = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
        let len = usize::from(u16::from_be_bytes([buf[4], buf[5]]));

        if protocol_id != PROTOCOL_ID {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid protocol identifier: expected = {PROTOCOL_ID}, actual = {protocol_id}"),
            ));
        }

        // len = bytes of PDU + one byte (unit ID)
        if len < 2 || len > MAX_PDU_SIZE + 1 {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("Invalid data length: {len}"),
            ));
        }

        let pdu_len = len - 1;
        if buf.len() < HEADER_LEN + pdu_len {
            // Not all bytes of the PDU have been received yet.
            return Ok(None);
        }

        let unit_id = buf[6];
        buf.advance(HEADER_LEN);
        let pdu_data = buf.split_to(pdu_len).freeze();

        let hdr = Header {
            transaction_id,
            unit_id,
        };
        let pdu = Request::try_from(pdu_data)?;

        Ok(Some(RequestAdu { hdr, pdu }))
    }
}

impl Encoder<ResponseAdu> for ServerCodec {
    type Error = Error;

    fn encode(&mut self, adu: ResponseAdu, buf: &mut BytesMut) -> Result<()> {
        let ResponseAdu { hdr, pdu } = adu;
        let pdu_len = response_result_pdu_size(&pdu)?;
        buf.reserve(HEADER_LEN + pdu_len);
        buf.put_u16(hdr.transaction_id);
        buf.put_u16(PROTOCOL_ID);
        buf.put_u16(u16_len(pdu_len + 1));
        buf.put_u8(hdr.unit_id);
        encode_response_result_pdu(buf, &pdu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::frame::{ExceptionCode, ExceptionResponse, FunctionCode, Response, ResponsePdu};

    mod server {

        use super::*;

        #[test]
        fn decode_header_fragment() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(&[0x00, 0x11, 0x00, 0x00, 0x00, 0x00][..]);
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 6);
        }

        #[test]
        fn decode_partly_received_message() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x00, // transaction id HI
                    0x11, // transaction id LO
                    0x00, // protocol id HI
                    0x00, // protocol id LO
                    0x00, // length HI
                    0x06, // length LO
                    0x01, // unit id
                    0x03, // function code
                    0x00, // address HI
                ][..],
            );
            let res = codec.decode(&mut buf).unwrap();
            assert!(res.is_none());
            assert_eq!(buf.len(), 9);
        }

        #[test]
        fn decode_read_holding_registers() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x12, 0x34, // transaction id
                    0x00, 0x00, // protocol id
                    0x00, 0x06, // length
                    0x02, // unit id
                    0x03, // function code
                    0x00, 0x05, // address
                    0x00, 0x01, // quantity
                    0xFF, // first byte of the next frame
                ][..],
            );
            let adu = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(buf.len(), 1);
            assert_eq!(adu.hdr.transaction_id, 0x1234);
            assert_eq!(adu.hdr.unit_id, 0x02);
            assert_eq!(adu.pdu, Request::ReadHoldingRegisters(5, 1));
        }

        #[test]
        fn decode_custom_function() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x04, 0x01, 0x00, 0x00, 0x00, 0x08][..],
            );
            let adu = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(
                adu.pdu,
                Request::Custom(0x01, Bytes::from_static(&[0x00, 0x00, 0x00, 0x08]))
            );
        }

        #[test]
        fn decode_with_invalid_protocol_id() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::from(
                &[
                    0x00, 0x00, // transaction id
                    0x33, 0x12, // protocol id
                    0x00, 0x06, // length
                    0x01, // unit id
                    0x03, 0x00, 0x05, 0x00, 0x01,
                ][..],
            );
            let err = codec.decode(&mut buf).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::InvalidData);
            assert_eq!(
                err.to_string(),
                "Invalid protocol identifier: expected = 0, actual = 13074"
            );
        }

        #[test]
        fn decode_with_invalid_length() {
            let mut codec = ServerCodec::default();
            let mut buf =
                BytesMut::from(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01][..]);
            let err = codec.decode(&mut buf).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::InvalidData);
            assert_eq!(err.to_string(), "Invalid data length: 1");
        }

        #[test]
        fn encode_read_response() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::new();
            let adu = ResponseAdu {
                hdr: Header {
                    transaction_id: 0x0102,
                    unit_id: 0x03,
                },
                pdu: ResponsePdu::from(Response::ReadHoldingRegisters(vec![42])),
            };
            codec.encode(adu, &mut buf).unwrap();
            assert_eq!(
                &buf[..],
                &[0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0x03, 0x03, 0x02, 0x00, 0x2A]
            );
        }

        #[test]
        fn encode_exception_response() {
            let mut codec = ServerCodec::default();
            let mut buf = BytesMut::new();
            let adu = ResponseAdu {
                hdr: Header {
                    transaction_id: 0x0007,
                    unit_id: 0x04,
                },
                pdu: ResponsePdu::from(ExceptionResponse {
                    function: FunctionCode::WriteSingleRegister,
                    exception: ExceptionCode::IllegalDataAddress,
                }),
            };
            codec.encode(adu, &mut buf).unwrap();
            assert_eq!(
                &buf[..],
                &[0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0x04, 0x86, 0x02]
            );
        }
    }
}
