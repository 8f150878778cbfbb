// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte-level builders for synthetic tapes, mirroring the on-tape layout
//! the crate parses. Kept separate from the library's unit-test fixtures:
//! these build whole dump files the way a salvage run would produce them.

// Each test binary uses a different subset of the builders.
#![allow(dead_code)]

use onstream_recovery::tape::{ADR_50, PAYLOAD_SIZE, logical_to_physical};

pub const SESSION_SIGNATURE: u32 = 0xDDDD_DDDD;
pub const DOS_FILE_SIGNATURE: u32 = 0xBBBB_BBBB;
pub const TRAILER_SIGNATURE: u32 = 0xCCCC_CCCC;
pub const TERMINATOR_SIGNATURE: u32 = 0x7E7E_7E7E;
pub const WRITE_STOP_MAGIC: u32 = u32::from_be_bytes(*b"WTST");

pub fn push_fixed_str(buf: &mut Vec<u8>, s: &str, len: usize) {
    assert!(s.len() < len);
    buf.extend_from_slice(s.as_bytes());
    buf.extend(std::iter::repeat_n(0u8, len - s.len()));
}

pub fn pad_to_sector(buf: &mut Vec<u8>) {
    while buf.len() % 512 != 0 {
        buf.push(0);
    }
}

/// One 512-byte session-header sector with sane defaults.
pub fn session_header(root: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(&SESSION_SIGNATURE.to_be_bytes());
    push_fixed_str(&mut buf, root, 128);
    push_fixed_str(&mut buf, "OPERATOR", 48);
    push_fixed_str(&mut buf, "", 24);
    push_fixed_str(&mut buf, "integration fixture", 80);
    buf.extend_from_slice(&1u16.to_le_bytes()); // session type
    buf.push(0); // mode
    buf.extend_from_slice(&0u32.to_le_bytes()); // flags
    buf.extend_from_slice(&[0u8; 5]); // compression + key sizes
    buf.extend_from_slice(&[0u8; 24]); // key tails
    buf.extend_from_slice(&0u32.to_le_bytes()); // version
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(&1u16.to_le_bytes()); // tape number
    buf.extend_from_slice(&0u32.to_be_bytes()); // start time
    buf.push(0);
    buf.push(1);
    buf.push(0); // workstation type
    push_fixed_str(&mut buf, "FIXTURE", 64);
    buf.push(0); // OS/2 compression method
    buf.extend_from_slice(&[0u8; 4]); // OS/2 date + time
    buf.extend_from_slice(&[0u8; 9]); // OS/2 index file
    buf.push(0); // last session
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&0u16.to_le_bytes()); // extended session header
    buf.extend_from_slice(&[0u8; 24]); // encryption key
    buf.extend_from_slice(&[0u8; 62]);
    assert_eq!(buf.len(), 512);
    buf
}

/// Signature plus the 343-byte shared prefix of a DOS-dialect file header.
pub fn dos_file_header(path: &str, size: u32, attributes: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(347);
    buf.extend_from_slice(&DOS_FILE_SIGNATURE.to_be_bytes());
    push_fixed_str(&mut buf, path, 250);
    push_fixed_str(&mut buf, "", 33);
    buf.push(0); // directory level
    buf.extend_from_slice(&0u32.to_be_bytes()); // last modified
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // resource fork
    buf.extend_from_slice(&attributes.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // owner
    buf.extend_from_slice(&0u16.to_le_bytes()); // mask
    buf.push(0); // file class
    buf.extend_from_slice(&0u32.to_le_bytes()); // trustee length
    buf.extend_from_slice(&0u32.to_le_bytes()); // dir space restriction
    buf.extend_from_slice(&0u16.to_le_bytes()); // last access
    buf.extend_from_slice(&0u32.to_le_bytes()); // creation
    buf.extend_from_slice(&[0u8; 22]);
    assert_eq!(buf.len(), 347);
    buf
}

/// One 512-byte file-trailer sector.
pub fn file_trailer(path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(&TRAILER_SIGNATURE.to_be_bytes());
    push_fixed_str(&mut buf, path, 246);
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(0);
    buf.extend_from_slice(&[0u8; 257]);
    assert_eq!(buf.len(), 512);
    buf
}

/// A session terminator packet.
pub fn session_terminator() -> Vec<u8> {
    let mut buf = Vec::with_capacity(347);
    buf.extend_from_slice(&TERMINATOR_SIGNATURE.to_be_bytes());
    buf.extend(std::iter::repeat_n(0x7Eu8, 288));
    buf.extend_from_slice(&[0u8; 16]);
    buf.extend(std::iter::repeat_n(0x7Eu8, 39));
    buf
}

/// One catalog entry as ARCserve writes them into `.CAT` files.
pub fn catalog_entry(path: &str, size: i64, flags: u8) -> Vec<u8> {
    let filename = path.rsplit('\\').next().unwrap_or("");
    let full_path_length = path.len() + 1;
    let mut buf = Vec::new();
    buf.push(0xFF);
    buf.push((40 + full_path_length) as u8);
    buf.push(1); // filesystem
    buf.push(0); // mode
    buf.extend_from_slice(&0u32.to_le_bytes()); // owner
    buf.extend_from_slice(&0x20u32.to_le_bytes()); // attributes
    buf.extend_from_slice(&((size >> 32) as u32).to_le_bytes());
    buf.extend_from_slice(&(size as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // mtime
    buf.extend_from_slice(&0u32.to_le_bytes()); // page index
    buf.extend_from_slice(&0u32.to_le_bytes()); // page offset
    buf.extend_from_slice(&((filename.len() as u16) + 1).to_le_bytes());
    buf.extend_from_slice(&(full_path_length as u16).to_le_bytes());
    buf.push(flags);
    buf.extend_from_slice(&[0u8; 3]);
    buf.extend_from_slice(path.as_bytes());
    buf.push(0);
    buf
}

/// Split a logical byte stream into dump records: 32 KiB payload plus the
/// 512-byte auxiliary area carrying the physical address of the logical
/// block each record holds. `logicals[i]` names the i-th record's block.
pub fn dump_from_stream(stream: &[u8], logicals: &[u32]) -> Vec<u8> {
    let mut padded = stream.to_vec();
    while padded.len() % PAYLOAD_SIZE != 0 {
        padded.push(0);
    }
    assert_eq!(padded.len() / PAYLOAD_SIZE, logicals.len());
    let mut dump = Vec::new();
    for (i, &logical) in logicals.iter().enumerate() {
        dump.extend_from_slice(&padded[i * PAYLOAD_SIZE..(i + 1) * PAYLOAD_SIZE]);
        let pos = logical_to_physical(&ADR_50, logical).unwrap();
        push_aux(&mut dump, 1, ADR_50.raster_index(pos));
    }
    dump
}

/// Append a 512-byte auxiliary area.
pub fn push_aux(dump: &mut Vec<u8>, magic: u32, address: u32) {
    let mut aux = [0u8; 512];
    aux[..4].copy_from_slice(&magic.to_be_bytes());
    aux[4..8].copy_from_slice(&address.to_be_bytes());
    dump.extend_from_slice(&aux);
}

/// A whole record holding only write-stop padding.
pub fn write_stop_record(dump: &mut Vec<u8>) {
    dump.extend(std::iter::repeat_n(0u8, PAYLOAD_SIZE));
    push_aux(dump, WRITE_STOP_MAGIC, 0);
}
