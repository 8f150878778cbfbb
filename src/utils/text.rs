// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! String handling for the on-tape fixed-width fields.
//!
//! ARCserve wrote narrow strings as NUL-terminated bytes inside fixed-width
//! fields, in whatever OEM code page the backup host used. Recovery treats
//! them as Latin-1: every byte maps to the Unicode code point of the same
//! value, which is lossless and never fails, so even mojibake survives into
//! the archive where a human can still recognise the name. Wide strings
//! (Windows dialect and universal stream chunks) are UTF-16LE.

use std::io::{self, Read};

/// Decode a NUL-terminated narrow string out of a fixed-width field.
pub fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| char::from(b)).collect()
}

/// Read a `len`-byte fixed field and decode it.
pub fn read_fixed_string<R: Read>(reader: &mut R, len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(fixed_string(&buf))
}

/// Decode a NUL-terminated UTF-16LE string out of a fixed-width field.
pub fn utf16_fixed(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Read a `byte_len`-byte fixed UTF-16LE field and decode it.
pub fn read_utf16_fixed<R: Read>(reader: &mut R, byte_len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; byte_len];
    reader.read_exact(&mut buf)?;
    Ok(utf16_fixed(&buf))
}

/// Syntactic sanity test guarding against signature collisions in random
/// data: does this fixed field plausibly hold a string a backup operator
/// typed? Deliberately conservative: a false negative only costs a resync,
/// a false positive pollutes the archive.
///
/// Strict mode accepts printable ASCII only; relaxed mode additionally
/// accepts tab and high Latin-1 bytes.
pub fn looks_like_text(bytes: &[u8], strict: bool) -> bool {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end].iter().all(|&b| {
        let printable_ascii = (0x20..=0x7E).contains(&b);
        if strict {
            printable_ascii
        } else {
            printable_ascii || b == b'\t' || b >= 0x80
        }
    })
}

/// [`looks_like_text`] over an owned decode of the field, for callers that
/// already went through [`fixed_string`].
pub fn string_looks_like_text(s: &str, strict: bool) -> bool {
    s.chars().all(|c| {
        let printable_ascii = (' '..='~').contains(&c);
        if strict {
            printable_ascii
        } else {
            printable_ascii || c == '\t' || u32::from(c) >= 0x80
        }
    })
}
