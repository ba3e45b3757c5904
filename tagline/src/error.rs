// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Error kinds surfaced by the tagline driver.
//!
//! Every fallible driver entry point returns [`DriverError`]. Kinds map
//! directly onto the propagation table in the design: `Alloc` only escapes
//! `init`, `Transport`/`MalformedResponse` escape any call that touches the
//! wire, and `RecoveryFailed` only escapes `status_poll`.

use std::io;

/// Unified error type for all driver operations.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Allocation of driver-owned state failed during `init`, or the
    /// supplied configuration did not validate.
    #[error("allocation failed: {0}")]
    Alloc(String),

    /// A socket read/write was short, errored, or the connection died.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The server's response did not echo the request's fixed fields.
    #[error(
        "malformed response: expected type={expected_type:?} blocks={expected_blocks} \
         disk={expected_disk} id={expected_id:?}, got type={got_type:?} blocks={got_blocks} \
         disk={got_disk} id={got_id:?}"
    )]
    MalformedResponse {
        expected_type: crate::wire::RequestType,
        expected_blocks: u8,
        expected_disk: u8,
        expected_id: Option<u32>,
        got_type: crate::wire::RequestType,
        got_blocks: u8,
        got_disk: u8,
        got_id: Option<u32>,
    },

    /// A transport error occurred while rebuilding a failed disk's mirror.
    #[error("recovery of disk {disk} failed: {source}")]
    RecoveryFailed { disk: u8, source: io::Error },

    /// The requested block range does not fit within `MAX_TAG_BLOCKS`, or
    /// the chosen disk has no room left for a new allocation.
    #[error("I/O policy violation: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;
