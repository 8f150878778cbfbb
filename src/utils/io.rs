// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, Read};

/// Discard exactly `n` bytes from the reader. Errors if the reader ends
/// first.
pub fn skip<R: Read>(reader: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(n), &mut io::sink())?;
    if copied != n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted to skip {n} bytes, reader ended after {copied}"),
        ));
    }
    Ok(())
}

/// Read exactly `n` bytes into a fresh buffer.
pub fn read_vec<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Consume a reserved field of `n` bytes and report whether every byte was
/// zero, as the format says it must be.
pub fn read_reserved<R: Read>(reader: &mut R, n: usize) -> io::Result<bool> {
    let buf = read_vec(reader, n)?;
    Ok(buf.iter().all(|&b| b == 0))
}
