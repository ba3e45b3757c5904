// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-physical-disk status and high-water allocation mark.
//!
//! Plain indexed structures, no allocation after [`DiskTable::new`]. The
//! only protocol beyond direct field access is [`DiskTable::reserve`], which
//! enforces the "don't overrun the disk" invariant the design notes flag as
//! a defect in the original source (§9, note 2).

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStatus {
    Uninitialized,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct DiskSlot {
    status: DiskStatus,
    /// `None` means empty.
    next_free_offset: Option<u32>,
}

#[derive(Debug)]
pub struct DiskTable {
    disk_blocks: u32,
    slots: Vec<DiskSlot>,
}

impl DiskTable {
    pub fn new(disk_count: u8, disk_blocks: u32) -> Self {
        Self {
            disk_blocks,
            slots: vec![
                DiskSlot {
                    status: DiskStatus::Uninitialized,
                    next_free_offset: None,
                };
                disk_count as usize
            ],
        }
    }

    pub fn len(&self) -> u8 {
        self.slots.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn status(&self, disk: u8) -> DiskStatus {
        self.slots[disk as usize].status
    }

    pub fn next_free_offset(&self, disk: u8) -> Option<u32> {
        self.slots[disk as usize].next_free_offset
    }

    /// Record that `disk` has just been formatted by the server during
    /// `init`: empty and ready to take writes. `recover` does not call this
    /// — it reformats the server's copy but leaves the client-side offset
    /// alone (see `Driver::recover`), so a recovered disk keeps serving the
    /// same offsets it had before it failed.
    pub fn format(&mut self, disk: u8) {
        let slot = &mut self.slots[disk as usize];
        slot.status = DiskStatus::Ready;
        slot.next_free_offset = None;
    }

    pub fn mark_failed(&mut self, disk: u8) {
        self.slots[disk as usize].status = DiskStatus::Failed;
    }

    pub fn mark_ready(&mut self, disk: u8) {
        self.slots[disk as usize].status = DiskStatus::Ready;
    }

    /// Reserve `count` contiguous blocks at the end of `disk`, returning the
    /// offset of the first reserved block. Errors rather than silently
    /// overrunning the disk.
    pub fn reserve(&mut self, disk: u8, count: u32) -> Result<u32> {
        let slot = &mut self.slots[disk as usize];
        let start = match slot.next_free_offset {
            Some(o) => o + 1,
            None => 0,
        };
        let end = start
            .checked_add(count.saturating_sub(1))
            .ok_or_else(|| DriverError::Io(format!("disk {disk} offset overflow")))?;
        if end > self.disk_blocks - 1 {
            return Err(DriverError::Io(format!(
                "disk {disk} exhausted: offset {end} would exceed {} blocks",
                self.disk_blocks
            )));
        }
        slot.next_free_offset = Some(end);
        Ok(start)
    }
}
