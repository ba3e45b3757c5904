// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Mirrored block-storage driver over a remote RAID wire protocol.
//!
//! Presents an abstract "tagline" address space — numbered logical streams
//! of fixed-size blocks — on top of a remote RAID array reached over a
//! socket. Every logical block is stored twice, on two distinct disks; reads
//! are served from the primary copy, and a failed disk is rebuilt from its
//! mirror.
//!
//! The modules below are leaves-first in the same order the design lays
//! them out: wire codec, bus client, block cache, disk table, tag map, and
//! finally the driver engine that ties them together.

pub mod bus;
pub mod cache;
pub mod config;
pub mod disk;
pub mod driver;
pub mod error;
pub mod tagmap;
pub mod wire;

pub use config::DriverConfig;
pub use driver::Driver;
pub use error::{DriverError, Result};
