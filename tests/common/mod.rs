// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use std::{io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::timeout,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Build a request ADU with the MBAP header.
pub fn adu(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let len = u16::try_from(pdu.len() + 1).unwrap();
    let mut adu = Vec::with_capacity(7 + pdu.len());
    adu.extend_from_slice(&transaction_id.to_be_bytes());
    adu.extend_from_slice(&[0, 0]);
    adu.extend_from_slice(&len.to_be_bytes());
    adu.push(unit_id);
    adu.extend_from_slice(pdu);
    adu
}

pub fn read_holding_registers(addr: u16, cnt: u16) -> Vec<u8> {
    let mut pdu = vec![0x03];
    pdu.extend_from_slice(&addr.to_be_bytes());
    pdu.extend_from_slice(&cnt.to_be_bytes());
    pdu
}

pub fn read_input_registers(addr: u16, cnt: u16) -> Vec<u8> {
    let mut pdu = read_holding_registers(addr, cnt);
    pdu[0] = 0x04;
    pdu
}

pub fn write_single_register(addr: u16, value: u16) -> Vec<u8> {
    let mut pdu = vec![0x06];
    pdu.extend_from_slice(&addr.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

/// Send `request` and read until the server closes the connection.
pub async fn transact(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    timeout(TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        match stream.read_to_end(&mut response).await {
            Ok(_) => {}
            // Closed with unread request data
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {}
            Err(err) => panic!("failed to read response: {err}"),
        }
        response
    })
    .await
    .expect("server did not close the connection")
}

/// The PDU of a response ADU, after checking the echoed header fields.
pub fn response_pdu(response: &[u8], transaction_id: u16, unit_id: u8) -> &[u8] {
    assert!(response.len() > 7, "incomplete response: {response:?}");
    assert_eq!(&response[0..2], &transaction_id.to_be_bytes());
    assert_eq!(&response[2..4], &[0, 0]);
    let len = usize::from(u16::from_be_bytes([response[4], response[5]]));
    assert_eq!(len, response.len() - 6);
    assert_eq!(response[6], unit_id);
    &response[7..]
}

/// Read a single register, `None` if the server answered with an exception.
pub async fn read_register(addr: SocketAddr, unit_id: u8, register: u16) -> Option<u16> {
    let response = transact(addr, &adu(1, unit_id, &read_holding_registers(register, 1))).await;
    match response_pdu(&response, 1, unit_id) {
        [0x03, 2, hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        [0x83, _] => None,
        pdu => panic!("unexpected response: {pdu:?}"),
    }
}

/// Poll `f` until it returns `Some`.
pub async fn eventually<T, F>(mut f: F) -> T
where
    F: FnMut() -> Option<T>,
{
    timeout(TIMEOUT, async {
        loop {
            if let Some(value) = f() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
