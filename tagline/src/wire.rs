// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The 64-bit opcode wire format shared with the remote RAID server.
//!
//! ```text
//! [63..56] request_type   (8 bits)
//! [55..48] block_quantity (8 bits)
//! [47..40] disk_number    (8 bits)
//! [39..33] unused         (7 bits, zero on request)
//! [32]     status         (1 bit: 0 = ok, 1 = error on response)
//! [31..0]  id             (32 bits: starting offset for READ/WRITE, 0 otherwise)
//! ```
//!
//! The shift amounts below are an implementation detail of [`Opcode::encode`]
//! and [`Opcode::decode`]; callers only ever see the named fields.

use crate::error::{DriverError, Result};

/// Sentinel value for a `STATUS` response's `id` field meaning the queried
/// disk has failed.
pub const DISK_FAILED: u32 = 0xFFFF_FFFF;

/// The six operations understood by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    Init,
    Format,
    Read,
    Write,
    Status,
    Close,
}

impl RequestType {
    fn to_byte(self) -> u8 {
        match self {
            RequestType::Init => 1,
            RequestType::Format => 2,
            RequestType::Read => 3,
            RequestType::Write => 4,
            RequestType::Status => 5,
            RequestType::Close => 6,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        Ok(match b {
            1 => RequestType::Init,
            2 => RequestType::Format,
            3 => RequestType::Read,
            4 => RequestType::Write,
            5 => RequestType::Status,
            6 => RequestType::Close,
            other => return Err(DriverError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown request_type byte {other}"),
            ))),
        })
    }
}

const SHIFT_REQUEST_TYPE: u32 = 56;
const SHIFT_BLOCK_QUANTITY: u32 = 48;
const SHIFT_DISK_NUMBER: u32 = 40;
const SHIFT_STATUS: u32 = 32;
const MASK_ID: u64 = 0xFFFF_FFFF;

/// A decoded 64-bit opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub request_type: RequestType,
    pub block_quantity: u8,
    pub disk_number: u8,
    /// `false` on every request; on a response, `true` means the server
    /// rejected the request.
    pub status_error: bool,
    pub id: u32,
}

impl Opcode {
    pub fn request(request_type: RequestType, block_quantity: u8, disk_number: u8, id: u32) -> Self {
        Self {
            request_type,
            block_quantity,
            disk_number,
            status_error: false,
            id,
        }
    }

    pub fn encode(self) -> u64 {
        (u64::from(self.request_type.to_byte()) << SHIFT_REQUEST_TYPE)
            | (u64::from(self.block_quantity) << SHIFT_BLOCK_QUANTITY)
            | (u64::from(self.disk_number) << SHIFT_DISK_NUMBER)
            | (u64::from(self.status_error) << SHIFT_STATUS)
            | (u64::from(self.id) & MASK_ID)
    }

    pub fn decode(raw: u64) -> Result<Self> {
        let request_type = RequestType::from_byte(((raw >> SHIFT_REQUEST_TYPE) & 0xFF) as u8)?;
        let block_quantity = ((raw >> SHIFT_BLOCK_QUANTITY) & 0xFF) as u8;
        let disk_number = ((raw >> SHIFT_DISK_NUMBER) & 0xFF) as u8;
        let status_error = ((raw >> SHIFT_STATUS) & 0x1) != 0;
        let id = (raw & MASK_ID) as u32;
        Ok(Self {
            request_type,
            block_quantity,
            disk_number,
            status_error,
            id,
        })
    }

    /// Check a response against the request that produced it, per the
    /// well-formedness rule: `type`, `block_quantity`, `disk_number` echoed
    /// byte-for-byte, `status` clear, and (except for `STATUS`) `id` echoed.
    pub fn check_response_to(self, request: Opcode) -> Result<()> {
        let id_must_match = !matches!(request.request_type, RequestType::Status);
        let ok = self.request_type == request.request_type
            && self.block_quantity == request.block_quantity
            && self.disk_number == request.disk_number
            && !self.status_error
            && (!id_must_match || self.id == request.id);
        if ok {
            Ok(())
        } else {
            Err(DriverError::MalformedResponse {
                expected_type: request.request_type,
                expected_blocks: request.block_quantity,
                expected_disk: request.disk_number,
                expected_id: id_must_match.then_some(request.id),
                got_type: self.request_type,
                got_blocks: self.block_quantity,
                got_disk: self.disk_number,
                got_id: id_must_match.then_some(self.id),
            })
        }
    }
}

/// Host-to-network transform for the 64-bit opcode and length fields:
/// big-endian byte order, as required by the wire format.
pub fn to_wire_bytes(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Network-to-host transform, the inverse of [`to_wire_bytes`].
pub fn from_wire_bytes(bytes: [u8; 8]) -> u64 {
    u64::from_be_bytes(bytes)
}
