// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Top-level driver operations: init/format, read, write (with the
//! overlap/rewrite policy), close, status-poll, and recovery.

use log::{debug, info, trace, warn};
use rand::Rng;

use crate::bus::BusClient;
use crate::cache::BlockCache;
use crate::config::DriverConfig;
use crate::disk::{DiskStatus, DiskTable};
use crate::error::{DriverError, Result};
use crate::tagmap::{Side, TagMap};
use crate::wire::{Opcode, RequestType, DISK_FAILED};

/// A fully constructed driver: tag map, disk table, cache, and the socket
/// to the RAID server, bundled into one value created by [`Driver::init`]
/// and consumed by [`Driver::close`]. No process-wide state is kept.
pub struct Driver {
    config: DriverConfig,
    max_tags: u32,
    bus: BusClient,
    cache: BlockCache,
    disks: DiskTable,
    tag_map: TagMap,
}

impl Driver {
    /// Allocate driver state and bring the RAID array up: one `INIT`
    /// exchange followed by one `FORMAT` per disk. On any failure, no
    /// socket is left open and nothing escapes — the partially built state
    /// is simply dropped with the `Err`.
    pub fn init(config: DriverConfig, max_tags: u32) -> Result<Self> {
        config.validate()?;

        let tag_map = TagMap::new(max_tags, config.max_tag_blocks);
        let cache = BlockCache::new(config.cache_capacity);
        let disks = DiskTable::new(config.disk_count, config.disk_blocks);
        let mut bus = BusClient::new(config.server_addr.clone(), config.block_size);

        let block_quantity = u8::try_from(config.disk_blocks / config.track_blocks + 3)
            .map_err(|_| DriverError::Alloc("INIT block_quantity does not fit in 8 bits".into()))?;
        let init_op = Opcode::request(RequestType::Init, block_quantity, config.disk_count, 0);
        bus.exchange(init_op)?;

        let mut driver = Self {
            config,
            max_tags,
            bus,
            cache,
            disks,
            tag_map,
        };

        for disk in 0..driver.config.disk_count {
            let format_op = Opcode::request(RequestType::Format, 0, disk, 0);
            driver.bus.exchange(format_op)?;
            driver.disks.format(disk);
        }

        info!(
            "tagline driver initialised: max_tags={max_tags} disks={}",
            driver.config.disk_count
        );
        Ok(driver)
    }

    fn block_size(&self) -> usize {
        self.config.block_size as usize
    }

    /// The configuration this driver was constructed with, e.g. for a
    /// caller that needs `block_size` to size its own buffers.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Picks a random, distinct `(primary, backup)` pair from the disks
    /// currently `Ready`. Any strategy preserving `primary != backup` and
    /// favouring non-full disks satisfies the design; this one is a plain
    /// uniform draw with rejection on collision.
    fn random_disk_pair(&self) -> Result<(u8, u8)> {
        let ready: Vec<u8> = (0..self.disks.len())
            .filter(|&d| self.disks.status(d) == DiskStatus::Ready)
            .collect();
        if ready.len() < 2 {
            return Err(DriverError::Io(
                "fewer than two Ready disks available for mirroring".into(),
            ));
        }
        let mut rng = rand::thread_rng();
        let primary = ready[rng.gen_range(0..ready.len())];
        loop {
            let backup = ready[rng.gen_range(0..ready.len())];
            if backup != primary {
                return Ok((primary, backup));
            }
        }
    }

    /// Redraws a disk for `side` that differs from `other_side_disk`, only
    /// among disks currently `Ready`. Used when a rewrite's tail allocates
    /// a cell whose two sides would otherwise collide.
    fn redraw_disk_avoiding(&self, other_side_disk: u8) -> Result<u8> {
        let ready: Vec<u8> = (0..self.disks.len())
            .filter(|&d| self.disks.status(d) == DiskStatus::Ready && d != other_side_disk)
            .collect();
        if ready.is_empty() {
            return Err(DriverError::Io(
                "no Ready disk distinct from the other mirror side".into(),
            ));
        }
        let mut rng = rand::thread_rng();
        Ok(ready[rng.gen_range(0..ready.len())])
    }

    /// Read `count` blocks of `tag` starting at `start_block` into `out`,
    /// which must be exactly `count * BLOCK_SIZE` bytes. Served from the
    /// primary copy only, through the cache.
    pub fn read(&mut self, tag: u32, start_block: u32, count: u8, out: &mut [u8]) -> Result<()> {
        let bs = self.block_size();
        if out.len() != count as usize * bs {
            return Err(DriverError::Io(format!(
                "read buffer is {} bytes, expected {}",
                out.len(),
                count as usize * bs
            )));
        }
        debug!("read tag={tag} start_block={start_block} count={count}");

        for i in 0..count as u32 {
            let cell = self.tag_map.get(tag, start_block + i);
            let (disk, offset) = cell.primary.ok_or_else(|| {
                DriverError::Io(format!(
                    "read of unmapped block: tag={tag} block={}",
                    start_block + i
                ))
            })?;
            let dst = &mut out[i as usize * bs..(i as usize + 1) * bs];
            if let Some(cached) = self.cache.get(disk, offset) {
                dst.copy_from_slice(cached);
            } else {
                let op = Opcode::request(RequestType::Read, 1, disk, offset);
                self.bus.read(op, dst)?;
                self.cache.put(disk, offset, dst);
            }
        }
        Ok(())
    }

    /// Write `count` blocks of `tag` starting at `start_block` from `buf`,
    /// which must be exactly `count * BLOCK_SIZE` bytes.
    ///
    /// A transport failure partway through aborts the remaining blocks for
    /// this call but does not roll back tag-map cells already advanced —
    /// this mirrors the source's behaviour (see the design's open question
    /// on partial-write map state) rather than journalling the map.
    pub fn write(&mut self, tag: u32, start_block: u32, count: u8, buf: &[u8]) -> Result<()> {
        let bs = self.block_size();
        if buf.len() != count as usize * bs {
            return Err(DriverError::Io(format!(
                "write buffer is {} bytes, expected {}",
                buf.len(),
                count as usize * bs
            )));
        }
        if start_block as u64 + count as u64 > self.config.max_tag_blocks as u64 {
            return Err(DriverError::Io(format!(
                "write range [{start_block}, {}) exceeds max_tag_blocks {}",
                start_block as u64 + count as u64,
                self.config.max_tag_blocks
            )));
        }

        let is_append = start_block >= self.tag_map.tag_count(tag);
        let (rand_primary, rand_backup) = self.random_disk_pair()?;
        trace!(
            "write tag={tag} start_block={start_block} count={count} append={is_append} \
             candidate_pair=({rand_primary},{rand_backup})"
        );

        if is_append {
            self.write_append(tag, start_block, count, buf, rand_primary, rand_backup)?;
        } else {
            self.write_rewrite(tag, start_block, count, buf, rand_primary, rand_backup)?;
        }

        let new_count = self
            .tag_map
            .tag_count(tag)
            .max(start_block + count as u32);
        self.tag_map.set_tag_count(tag, new_count);

        debug!("write tag={tag} start_block={start_block} count={count} committed");
        Ok(())
    }

    /// The append path: one bulk `WRITE` per side, contiguous by
    /// construction since both sides are freshly reserved.
    fn write_append(
        &mut self,
        tag: u32,
        start_block: u32,
        count: u8,
        buf: &[u8],
        primary: u8,
        backup: u8,
    ) -> Result<()> {
        let bs = self.block_size();
        let primary_start = self.disks.reserve(primary, count as u32)?;
        let backup_start = self.disks.reserve(backup, count as u32)?;

        let op = Opcode::request(RequestType::Write, count, primary, primary_start);
        self.bus.write(op, buf)?;
        let op = Opcode::request(RequestType::Write, count, backup, backup_start);
        self.bus.write(op, buf)?;

        for i in 0..count as u32 {
            let block = &buf[i as usize * bs..(i as usize + 1) * bs];
            self.tag_map
                .set_side(tag, start_block + i, Side::Primary, (primary, primary_start + i));
            self.tag_map
                .set_side(tag, start_block + i, Side::Backup, (backup, backup_start + i));
            self.cache.put(primary, primary_start + i, block);
            self.cache.put(backup, backup_start + i, block);
        }
        Ok(())
    }

    /// The rewrite path: contiguous prefix reused in bulk, tail allocated
    /// or rewritten one block at a time, independently per side.
    fn write_rewrite(
        &mut self,
        tag: u32,
        start_block: u32,
        count: u8,
        buf: &[u8],
        rand_primary: u8,
        rand_backup: u8,
    ) -> Result<()> {
        self.write_rewrite_side(tag, start_block, count, buf, Side::Primary, rand_primary)?;
        self.write_rewrite_side(tag, start_block, count, buf, Side::Backup, rand_backup)?;
        Ok(())
    }

    /// Runs the contiguous-prefix-then-tail algorithm for one side. `disk`
    /// is this side's candidate disk for new allocations, redrawn per block
    /// if it would collide with whatever the other side already mapped.
    fn write_rewrite_side(
        &mut self,
        tag: u32,
        start_block: u32,
        count: u8,
        buf: &[u8],
        side: Side,
        disk: u8,
    ) -> Result<()> {
        let bs = self.block_size();
        let count = count as u32;
        let k = self
            .tag_map
            .contiguous_prefix_len(tag, start_block, count, side);
        trace!("write_rewrite_side side={side:?} k={k} count={count}");

        if k >= count {
            let (existing_disk, existing_offset) = self
                .tag_map
                .get(tag, start_block)
                .side(side)
                .expect("k > 0 implies the first cell is mapped");
            let op = Opcode::request(RequestType::Write, count as u8, existing_disk, existing_offset);
            self.bus.write(op, buf)?;
            for i in 0..count {
                let block = &buf[i as usize * bs..(i as usize + 1) * bs];
                self.cache.put(existing_disk, existing_offset + i, block);
            }
            return Ok(());
        }

        if k > 0 {
            let (existing_disk, existing_offset) = self
                .tag_map
                .get(tag, start_block)
                .side(side)
                .expect("k > 0 implies the first cell is mapped");
            let op = Opcode::request(RequestType::Write, k as u8, existing_disk, existing_offset);
            self.bus.write(op, &buf[..k as usize * bs])?;
            for i in 0..k {
                let block = &buf[i as usize * bs..(i as usize + 1) * bs];
                self.cache.put(existing_disk, existing_offset + i, block);
            }
        }

        for j in k..count {
            let block_num = start_block + j;
            let block = &buf[j as usize * bs..(j as usize + 1) * bs];
            let existing = self.tag_map.get(tag, block_num).side(side);
            match existing {
                Some((existing_disk, existing_offset)) => {
                    let op = Opcode::request(RequestType::Write, 1, existing_disk, existing_offset);
                    self.bus.write(op, block)?;
                    self.cache.put(existing_disk, existing_offset, block);
                }
                None => {
                    let other_mapped = self.tag_map.get(tag, block_num).side(other_side(side));
                    let chosen_disk = match other_mapped {
                        Some((other_d, _)) if other_d == disk => self.redraw_disk_avoiding(other_d)?,
                        _ => disk,
                    };
                    let offset = self.disks.reserve(chosen_disk, 1)?;
                    let op = Opcode::request(RequestType::Write, 1, chosen_disk, offset);
                    self.bus.write(op, block)?;
                    self.tag_map.set_side(tag, block_num, side, (chosen_disk, offset));
                    self.cache.put(chosen_disk, offset, block);
                }
            }
        }
        Ok(())
    }

    /// Send `CLOSE`, log the final cache statistics, and free all driver
    /// state. No further operations may follow.
    pub fn close(mut self) -> Result<()> {
        let op = Opcode::request(RequestType::Close, 0, 0, 0);
        self.bus.close(op)?;
        let stats = self.cache.stats();
        info!(
            "tagline driver closing: cache hit={} miss={} insert={} get={}",
            stats.hit, stats.miss, stats.insert, stats.get
        );
        Ok(())
    }

    /// Poll every disk's status, recovering any disk the server reports as
    /// failed. Returns `Ok(())` once every disk is healthy, whether it was
    /// already healthy or recovery just fixed it.
    pub fn status_poll(&mut self) -> Result<()> {
        for disk in 0..self.disks.len() {
            let op = Opcode::request(RequestType::Status, 0, disk, 0);
            let resp = self.bus.exchange(op)?;
            if resp.id == DISK_FAILED {
                warn!("disk {disk} reported failed; starting recovery");
                self.disks.mark_failed(disk);
                self.recover(disk).map_err(|e| DriverError::RecoveryFailed {
                    disk,
                    source: match e {
                        DriverError::Transport(io) => io,
                        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
                    },
                })?;
                info!("disk {disk} recovered");
            }
        }
        Ok(())
    }

    /// Rebuild every mirror copy that resided on `disk`: `FORMAT` it, then
    /// walk the tag map row-major, refetching and rewriting every cell on
    /// either side whose disk is `disk`. Offsets are preserved — the
    /// disk's high-water mark is not reset, only its on-server contents.
    fn recover(&mut self, disk: u8) -> Result<()> {
        let op = Opcode::request(RequestType::Format, 0, disk, 0);
        self.bus.exchange(op)?;

        let bs = self.block_size();
        let max_tags = self.tag_map_len();
        for tag in 0..max_tags {
            for block in 0..self.config.max_tag_blocks {
                let cell = self.tag_map.get(tag, block);
                if let Some((d, offset)) = cell.primary {
                    if d == disk {
                        self.rebuild_cell(tag, block, Side::Primary, disk, offset, bs)?;
                    }
                }
                if let Some((d, offset)) = cell.backup {
                    if d == disk {
                        self.rebuild_cell(tag, block, Side::Backup, disk, offset, bs)?;
                    }
                }
            }
        }

        self.disks.mark_ready(disk);
        Ok(())
    }

    fn rebuild_cell(
        &mut self,
        tag: u32,
        block: u32,
        side: Side,
        disk: u8,
        offset: u32,
        bs: usize,
    ) -> Result<()> {
        let mirror = self
            .tag_map
            .get(tag, block)
            .side(other_side(side))
            .ok_or_else(|| {
                DriverError::Io(format!(
                    "cell tag={tag} block={block} lost its only mirror during recovery"
                ))
            })?;
        let mut data = vec![0u8; bs];
        if let Some(cached) = self.cache.get(disk, offset) {
            data.copy_from_slice(cached);
        } else {
            let (mirror_disk, mirror_offset) = mirror;
            let op = Opcode::request(RequestType::Read, 1, mirror_disk, mirror_offset);
            self.bus.read(op, &mut data)?;
        }
        let op = Opcode::request(RequestType::Write, 1, disk, offset);
        self.bus.write(op, &data)?;
        self.cache.put(disk, offset, &data);
        Ok(())
    }

    fn tag_map_len(&self) -> u32 {
        self.max_tags
    }
}

fn other_side(side: Side) -> Side {
    match side {
        Side::Primary => Side::Backup,
        Side::Backup => Side::Primary,
    }
}
