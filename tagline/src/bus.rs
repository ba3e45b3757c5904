// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Owns the single stream socket to the remote RAID server and turns one
//! driver call into one request/response exchange.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::{DriverError, Result};
use crate::wire::{from_wire_bytes, to_wire_bytes, Opcode, RequestType};

/// Synchronous, single-outstanding-request client for the RAID wire
/// protocol. There is never more than one socket open at a time.
pub struct BusClient {
    server_addr: String,
    block_size: u32,
    stream: Option<TcpStream>,
}

impl BusClient {
    pub fn new(server_addr: impl Into<String>, block_size: u32) -> Self {
        Self {
            server_addr: server_addr.into(),
            block_size,
            stream: None,
        }
    }

    fn payload_len(&self, op: &Opcode) -> usize {
        op.block_quantity as usize * self.block_size as usize
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            DriverError::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "bus client has no open connection; call init first",
            ))
        })
    }

    fn write_header(stream: &mut TcpStream, op: Opcode, payload_len: usize) -> Result<()> {
        stream.write_all(&to_wire_bytes(op.encode()))?;
        stream.write_all(&to_wire_bytes(payload_len as u64))?;
        Ok(())
    }

    fn read_response(stream: &mut TcpStream, request: Opcode) -> Result<(Opcode, usize)> {
        let mut op_bytes = [0u8; 8];
        stream.read_exact(&mut op_bytes)?;
        let response = Opcode::decode(from_wire_bytes(op_bytes))?;

        let mut len_bytes = [0u8; 8];
        stream.read_exact(&mut len_bytes)?;
        let response_len = from_wire_bytes(len_bytes) as usize;

        response.check_response_to(request)?;
        Ok((response, response_len))
    }

    /// `INIT`, `FORMAT`, `STATUS`: no payload in either direction.
    pub fn exchange(&mut self, op: Opcode) -> Result<Opcode> {
        if op.request_type == RequestType::Init {
            self.stream = Some(TcpStream::connect(&self.server_addr)?);
        }
        let stream = self.stream_mut()?;
        Self::write_header(stream, op, 0)?;
        let (response, _len) = Self::read_response(stream, op)?;
        Ok(response)
    }

    /// `WRITE`: `payload` precedes the server's response.
    pub fn write(&mut self, op: Opcode, payload: &[u8]) -> Result<Opcode> {
        debug_assert_eq!(op.request_type, RequestType::Write);
        let len = self.payload_len(&op);
        let stream = self.stream_mut()?;
        Self::write_header(stream, op, len)?;
        stream.write_all(&payload[..len])?;
        let (response, _len) = Self::read_response(stream, op)?;
        Ok(response)
    }

    /// `READ`: the server's response is followed by the payload, which is
    /// filled into `out`.
    pub fn read(&mut self, op: Opcode, out: &mut [u8]) -> Result<Opcode> {
        debug_assert_eq!(op.request_type, RequestType::Read);
        let len = self.payload_len(&op);
        let stream = self.stream_mut()?;
        Self::write_header(stream, op, len)?;
        let (response, response_len) = Self::read_response(stream, op)?;
        if response_len > out.len() {
            return Err(DriverError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "response payload length {response_len} exceeds caller buffer {}",
                    out.len()
                ),
            )));
        }
        stream.read_exact(&mut out[..response_len])?;
        Ok(response)
    }

    /// `CLOSE`: closes the socket after the exchange completes.
    pub fn close(&mut self, op: Opcode) -> Result<Opcode> {
        debug_assert_eq!(op.request_type, RequestType::Close);
        let response = self.exchange(op)?;
        self.stream = None;
        Ok(response)
    }
}
