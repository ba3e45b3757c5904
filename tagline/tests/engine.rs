// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Integration tests for the bus client and driver engine against a real
//! loopback socket. Exercises the concrete scenarios from the design: fresh
//! init, append + read-back, in-place rewrite, disk failure + recovery, and
//! a rewrite that overlaps into fresh territory.

mod support;

use tagline::config::DriverConfig;
use tagline::driver::Driver;
use support::MockRaid;

fn test_config(addr: String) -> DriverConfig {
    DriverConfig {
        disk_count: 4,
        disk_blocks: 64,
        block_size: 8,
        track_blocks: 8,
        max_tag_blocks: 16,
        cache_capacity: 4,
        server_addr: addr,
    }
}

#[test]
fn init_formats_every_disk() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let driver = Driver::init(cfg, 4).unwrap();
    driver.close().unwrap();
}

#[test]
fn write_then_read_round_trips() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let mut driver = Driver::init(cfg, 4).unwrap();

    let buf = [b'A'; 24]; // 3 blocks * 8 bytes, content doesn't matter here
    let mut buf = buf;
    buf[8] = b'B';
    buf[16] = b'C';

    driver.write(0, 0, 3, &buf).unwrap();

    let mut out = [0u8; 24];
    driver.read(0, 0, 3, &mut out).unwrap();
    assert_eq!(out, buf);

    driver.close().unwrap();
}

#[test]
fn overwrite_preserves_tag_count_and_updates_in_place() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let mut driver = Driver::init(cfg, 4).unwrap();

    let mut buf = [0u8; 24];
    buf[0..8].fill(b'A');
    buf[8..16].fill(b'B');
    buf[16..24].fill(b'C');
    driver.write(0, 0, 3, &buf).unwrap();

    let mut bprime = [0u8; 8];
    bprime.fill(b'X');
    driver.write(0, 1, 1, &bprime).unwrap();

    let mut out = [0u8; 24];
    driver.read(0, 0, 3, &mut out).unwrap();
    assert_eq!(&out[0..8], &[b'A'; 8]);
    assert_eq!(&out[8..16], &[b'X'; 8]);
    assert_eq!(&out[16..24], &[b'C'; 8]);

    driver.close().unwrap();
}

#[test]
fn rewrite_tail_overlapping_fresh_territory_extends_the_tag() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let mut driver = Driver::init(cfg, 4).unwrap();

    let mut ab = [0u8; 16];
    ab[0..8].fill(b'A');
    ab[8..16].fill(b'B');
    driver.write(0, 0, 2, &ab).unwrap();

    // Overlaps block 1 (existing) and extends through blocks 2, 3 (new).
    let mut tail = [0u8; 24];
    tail[0..8].fill(b'b'); // B'
    tail[8..16].fill(b'X');
    tail[16..24].fill(b'Y');
    driver.write(0, 1, 3, &tail).unwrap();

    let mut out = [0u8; 32];
    driver.read(0, 0, 4, &mut out).unwrap();
    assert_eq!(&out[0..8], &[b'A'; 8]);
    assert_eq!(&out[8..16], &[b'b'; 8]);
    assert_eq!(&out[16..24], &[b'X'; 8]);
    assert_eq!(&out[24..32], &[b'Y'; 8]);

    driver.close().unwrap();
}

#[test]
fn status_poll_recovers_a_failed_disk_transparently() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let mut driver = Driver::init(cfg, 4).unwrap();

    let mut buf = [0u8; 24];
    buf[0..8].fill(b'A');
    buf[8..16].fill(b'B');
    buf[16..24].fill(b'C');
    driver.write(0, 0, 3, &buf).unwrap();

    // Read once so we know which disk served as primary without peeking at
    // driver internals: any disk works, we just need one to declare failed.
    // Here we fail disk 0 unconditionally; the mock server's STATUS handler
    // reports it failed regardless of whether it was actually used, which
    // is enough to drive the recovery path end-to-end.
    raid.fail_disk(0);
    driver.status_poll().unwrap();

    let mut out = [0u8; 24];
    driver.read(0, 0, 3, &mut out).unwrap();
    assert_eq!(out, buf);

    driver.close().unwrap();
}

#[test]
fn write_buffer_length_mismatch_is_rejected() {
    let raid = MockRaid::start(4, 64, 8);
    let cfg = test_config(raid.addr.clone());
    let mut driver = Driver::init(cfg, 4).unwrap();

    let short = [0u8; 4];
    assert!(driver.write(0, 0, 3, &short).is_err());

    driver.close().unwrap();
}
