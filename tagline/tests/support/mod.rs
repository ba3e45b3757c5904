// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! In-process mock RAID server: a background-thread `TcpListener` that
//! understands the same wire opcode the real array speaks, backed by an
//! in-memory disk image per physical disk.
//!
//! This lets the bus client and driver engine be exercised against real
//! socket I/O (short reads, big-endian framing, response well-formedness)
//! without depending on an actual RAID array.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use tagline::wire::{from_wire_bytes, to_wire_bytes, Opcode, RequestType, DISK_FAILED};

struct ServerState {
    disks: Vec<Vec<u8>>,
    failed: HashSet<u8>,
    block_size: usize,
}

/// Handle to a running mock server. Dropping it does not stop the server
/// thread; send `CLOSE` from the driver under test, or let the process exit.
pub struct MockRaid {
    pub addr: String,
    state: Arc<Mutex<ServerState>>,
}

impl MockRaid {
    /// Starts the server with `disk_count` disks of `disk_blocks` blocks of
    /// `block_size` bytes each, all zeroed.
    pub fn start(disk_count: u8, disk_blocks: u32, block_size: u32) -> Self {
        let state = Arc::new(Mutex::new(ServerState {
            disks: vec![vec![0u8; disk_blocks as usize * block_size as usize]; disk_count as usize],
            failed: HashSet::new(),
            block_size: block_size as usize,
        }));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve(stream, accept_state);
            }
        });

        Self { addr, state }
    }

    /// Mark `disk` as failed; the next `STATUS(disk)` will report it.
    pub fn fail_disk(&self, disk: u8) {
        self.state.lock().unwrap().failed.insert(disk);
    }

    /// Snapshot of the raw bytes on `disk` at `offset`, for assertions that
    /// want to bypass the cache and check what actually landed on the wire.
    pub fn disk_block(&self, disk: u8, offset: u32) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let bs = state.block_size;
        let start = offset as usize * bs;
        state.disks[disk as usize][start..start + bs].to_vec()
    }
}

fn serve(mut stream: TcpStream, state: Arc<Mutex<ServerState>>) {
    loop {
        let mut op_bytes = [0u8; 8];
        if stream.read_exact(&mut op_bytes).is_err() {
            return;
        }
        let Ok(req) = Opcode::decode(from_wire_bytes(op_bytes)) else {
            return;
        };

        let mut len_bytes = [0u8; 8];
        if stream.read_exact(&mut len_bytes).is_err() {
            return;
        }
        let req_len = from_wire_bytes(len_bytes) as usize;

        let mut incoming = vec![0u8; 0];
        if req.request_type == RequestType::Write {
            incoming = vec![0u8; req_len];
            if stream.read_exact(&mut incoming).is_err() {
                return;
            }
        }

        let mut resp = req;
        resp.status_error = false;

        let mut outgoing: Vec<u8> = Vec::new();
        {
            let mut state = state.lock().unwrap();
            match req.request_type {
                RequestType::Init | RequestType::Close => {}
                RequestType::Format => {
                    let disk = &mut state.disks[req.disk_number as usize];
                    disk.iter_mut().for_each(|b| *b = 0);
                }
                RequestType::Status => {
                    resp.id = if state.failed.contains(&req.disk_number) {
                        DISK_FAILED
                    } else {
                        0
                    };
                }
                RequestType::Read => {
                    let bs = state.block_size;
                    let count = req.block_quantity as usize;
                    let start = req.id as usize * bs;
                    outgoing = state.disks[req.disk_number as usize][start..start + count * bs].to_vec();
                }
                RequestType::Write => {
                    let bs = state.block_size;
                    let start = req.id as usize * bs;
                    let disk = &mut state.disks[req.disk_number as usize];
                    disk[start..start + incoming.len()].copy_from_slice(&incoming);
                }
            }
        }

        if stream.write_all(&to_wire_bytes(resp.encode())).is_err() {
            return;
        }
        if stream
            .write_all(&to_wire_bytes(outgoing.len() as u64))
            .is_err()
        {
            return;
        }
        if req.request_type == RequestType::Read && stream.write_all(&outgoing).is_err() {
            return;
        }

        if req.request_type == RequestType::Close {
            return;
        }
    }
}
