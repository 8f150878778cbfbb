// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Timestamp decoding.
//!
//! ARCserve packs most times into 32 bits, DOS-style but with its own bit
//! positions and a variable base year:
//!
//! ```text
//! 31      25 24  21 20  16 15  11 10   5 4    0
//! ├─────────┼──────┼──────┼──────┼──────┼──────┤
//! │year-base│month │ day  │ hour │minute│sec/2 │
//! └─────────┴──────┴──────┴──────┴──────┴──────┘
//! ```
//!
//! A raw value of zero stands for the Unix epoch everywhere. File headers
//! count years from 1980; session headers from 1900. The Windows dialect
//! instead records FILETIMEs (100 ns ticks since 1601-01-01 UTC).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Base year for file-header timestamps.
pub const FILE_BASE_YEAR: i32 = 1980;
/// Base year for session-header timestamps.
pub const SESSION_BASE_YEAR: i32 = 1900;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_DELTA: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SECOND: i64 = 10_000_000;

/// 1970-01-01T00:00:00, the stand-in for "no timestamp recorded".
pub fn unix_epoch() -> NaiveDateTime {
    DateTime::from_timestamp(0, 0)
        .expect("epoch is representable")
        .naive_utc()
}

/// Decode a packed 32-bit timestamp. Zero decodes to the Unix epoch;
/// fields that name an impossible calendar date decode to `None`.
pub fn unpack_timestamp(raw: u32, base_year: i32) -> Option<NaiveDateTime> {
    if raw == 0 {
        return Some(unix_epoch());
    }
    let second = (raw & 0x1F) << 1;
    let minute = (raw >> 5) & 0x3F;
    let hour = (raw >> 11) & 0x1F;
    let day = (raw >> 16) & 0x1F;
    let month = (raw >> 21) & 0x0F;
    let year = base_year + ((raw >> 25) & 0x7F) as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Decode, falling back to the epoch (with the caller logging) when the
/// packed fields are nonsense.
pub fn timestamp_or_epoch(raw: u32, base_year: i32) -> NaiveDateTime {
    unpack_timestamp(raw, base_year).unwrap_or_else(unix_epoch)
}

/// Decode a packed 16-bit date (DOS layout: 5 bits day, 4 bits month,
/// 7 bits year from 1980). Used by the shared file-header prefix for the
/// last-access field.
pub fn unpack_date(raw: u16) -> Option<NaiveDate> {
    if raw == 0 {
        return None;
    }
    let day = u32::from(raw & 0x1F);
    let month = u32::from((raw >> 5) & 0x0F);
    let year = FILE_BASE_YEAR + i32::from(raw >> 9);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Decode a Windows FILETIME. Zero and out-of-range tick counts decode to
/// `None`.
pub fn unpack_filetime(ticks: i64) -> Option<NaiveDateTime> {
    if ticks <= 0 {
        return None;
    }
    let seconds = ticks / FILETIME_TICKS_PER_SECOND - FILETIME_UNIX_DELTA;
    let nanos = (ticks % FILETIME_TICKS_PER_SECOND) * 100;
    Some(DateTime::from_timestamp(seconds, nanos as u32)?.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Inverse of [`unpack_timestamp`], for round-trip testing.
    fn pack_timestamp(t: NaiveDateTime, base_year: i32) -> u32 {
        use chrono::{Datelike, Timelike};
        (t.second() >> 1)
            | (t.minute() << 5)
            | (t.hour() << 11)
            | (t.day() << 16)
            | (t.month() << 21)
            | (((t.year() - base_year) as u32) << 25)
    }

    #[test]
    fn zero_is_the_epoch() {
        assert_eq!(
            unpack_timestamp(0, FILE_BASE_YEAR),
            Some(unix_epoch())
        );
    }

    #[test]
    fn known_packing() {
        // 1998-07-04 12:30:20 from 1980.
        let t = NaiveDate::from_ymd_opt(1998, 7, 4)
            .unwrap()
            .and_hms_opt(12, 30, 20)
            .unwrap();
        let raw = pack_timestamp(t, FILE_BASE_YEAR);
        assert_eq!(unpack_timestamp(raw, FILE_BASE_YEAR), Some(t));
    }

    #[test]
    fn impossible_dates_are_rejected() {
        // Month 15.
        let raw = 15 << 21 | 1 << 16;
        assert_eq!(unpack_timestamp(raw, FILE_BASE_YEAR), None);
    }

    #[quickcheck]
    fn round_trip(year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) {
        // Any valid calendar time with an even second survives packing.
        let year = FILE_BASE_YEAR + i32::from(year % 128);
        let month = u32::from(month % 12) + 1;
        let day = u32::from(day % 28) + 1;
        let Some(t) = NaiveDate::from_ymd_opt(year, month, day).and_then(|d| {
            d.and_hms_opt(
                u32::from(hour % 24),
                u32::from(minute % 60),
                u32::from(second % 30) * 2,
            )
        }) else {
            return;
        };
        let raw = pack_timestamp(t, FILE_BASE_YEAR);
        assert_eq!(unpack_timestamp(raw, FILE_BASE_YEAR), Some(t));
    }

    #[test]
    fn filetime_epochs() {
        assert_eq!(unpack_filetime(0), None);
        // 1970-01-01 in FILETIME ticks.
        let unix_zero = 11_644_473_600 * 10_000_000;
        assert_eq!(unpack_filetime(unix_zero), Some(unix_epoch()));
    }

    #[test]
    fn packed_date() {
        // 1999-12-31: year 19, month 12, day 31.
        let raw = (19 << 9) | (12 << 5) | 31;
        assert_eq!(unpack_date(raw), NaiveDate::from_ymd_opt(1999, 12, 31));
    }
}
