//! Timestamp epochs and sub-second unities.
//!
//! A wire timestamp is an unsigned integer `raw`; its calendar value is
//! `epoch + raw / unity` seconds.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Calendar origin of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Epoch {
    Windows,
    Mumps,
    Vms,
    Excel,
    Ntp,
    MacOs9,
    PickOs,
    Unix,
    Fat,
    Gps,
    ZigBee,
    Cocoa,
}

/// Scale between the raw integer and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unity {
    Second,
    Decisecond,
    Centisecond,
    Millisecond,
    Microsecond,
    Nanosecond,
    HundredPicosecond,
}

/// Display / parse format (ctime style).
pub const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

impl Epoch {
    pub const ALL: [Epoch; 12] = [
        Epoch::Windows,
        Epoch::Mumps,
        Epoch::Vms,
        Epoch::Excel,
        Epoch::Ntp,
        Epoch::MacOs9,
        Epoch::PickOs,
        Epoch::Unix,
        Epoch::Fat,
        Epoch::Gps,
        Epoch::ZigBee,
        Epoch::Cocoa,
    ];

    fn ymd(self) -> (i32, u32, u32) {
        match self {
            Epoch::Windows => (1601, 1, 1),
            Epoch::Mumps => (1840, 12, 31),
            Epoch::Vms => (1858, 11, 17),
            Epoch::Excel => (1899, 12, 31),
            Epoch::Ntp => (1900, 1, 1),
            Epoch::MacOs9 => (1904, 1, 1),
            Epoch::PickOs => (1967, 12, 31),
            Epoch::Unix => (1970, 1, 1),
            Epoch::Fat => (1980, 1, 1),
            Epoch::Gps => (1980, 1, 6),
            Epoch::ZigBee => (2000, 1, 1),
            Epoch::Cocoa => (2001, 1, 1),
        }
    }

    /// Midnight of the epoch's origin day.
    pub fn origin(self) -> NaiveDateTime {
        let (y, m, d) = self.ymd();
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Epoch::Windows => "windows",
            Epoch::Mumps => "mumps",
            Epoch::Vms => "vms",
            Epoch::Excel => "excel",
            Epoch::Ntp => "ntp",
            Epoch::MacOs9 => "macos9",
            Epoch::PickOs => "pickos",
            Epoch::Unix => "unix",
            Epoch::Fat => "fat",
            Epoch::Gps => "gps",
            Epoch::ZigBee => "zigbee",
            Epoch::Cocoa => "cocoa",
        }
    }

    pub fn from_name(name: &str) -> Option<Epoch> {
        let name = name.to_ascii_lowercase();
        Epoch::ALL.into_iter().find(|e| e.name() == name)
    }
}

impl Unity {
    pub fn factor(self) -> u64 {
        match self {
            Unity::Second => 1,
            Unity::Decisecond => 10,
            Unity::Centisecond => 100,
            Unity::Millisecond => 1_000,
            Unity::Microsecond => 1_000_000,
            Unity::Nanosecond => 1_000_000_000,
            Unity::HundredPicosecond => 10_000_000_000,
        }
    }

    pub fn from_name(name: &str) -> Option<Unity> {
        match name.to_ascii_lowercase().as_str() {
            "second" | "s" => Some(Unity::Second),
            "decisecond" | "ds" => Some(Unity::Decisecond),
            "centisecond" | "cs" => Some(Unity::Centisecond),
            "millisecond" | "ms" => Some(Unity::Millisecond),
            "microsecond" | "us" => Some(Unity::Microsecond),
            "nanosecond" | "ns" => Some(Unity::Nanosecond),
            "hundred_picosecond" | "100ps" => Some(Unity::HundredPicosecond),
            _ => None,
        }
    }
}

/// Calendar value of a raw timestamp; `None` when it overflows or lands past year 9999.
pub fn to_datetime(raw: u64, epoch: Epoch, unity: Unity) -> Option<NaiveDateTime> {
    let factor = unity.factor();
    let secs = i64::try_from(raw / factor).ok()?;
    let nanos = ((raw % factor) as u128 * 1_000_000_000 / factor as u128) as i64;
    let dt = epoch
        .origin()
        .checked_add_signed(Duration::try_seconds(secs)?)?
        .checked_add_signed(Duration::nanoseconds(nanos))?;
    if dt.year() > 9999 {
        return None;
    }
    Some(dt)
}

/// Raw timestamp of a calendar value; `None` before the epoch or on overflow.
pub fn from_datetime(dt: NaiveDateTime, epoch: Epoch, unity: Unity) -> Option<u64> {
    let delta = dt.signed_duration_since(epoch.origin());
    let secs = u64::try_from(delta.num_seconds()).ok()?;
    let sub_nanos = (delta - Duration::try_seconds(delta.num_seconds())?)
        .num_nanoseconds()
        .unwrap_or(0)
        .max(0) as u128;
    let factor = unity.factor();
    let sub = (sub_nanos * factor as u128 / 1_000_000_000) as u64;
    secs.checked_mul(factor)?.checked_add(sub)
}

/// Parse the ctime format used by [`DATE_FORMAT`], falling back to ISO-8601 forms.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}
