//! Time helpers.
//!
//! Time triggers are written in local wall-clock time (`HH:MM`). The engine
//! works with [`NaiveDateTime`] values taken from the local clock so tests can
//! inject any instant.

use chrono::{FixedOffset, Local, NaiveDateTime, NaiveTime, Offset};

/// Return the current local wall-clock time.
#[must_use]
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Return the UTC offset of the local clock right now.
#[must_use]
pub fn local_offset() -> FixedOffset {
    Local::now().offset().fix()
}

/// Parse a `HH:MM` wall-clock time.
#[must_use]
pub fn parse_hh_mm(text: &str) -> Option<NaiveTime> {
    let (hours, minutes) = text.split_once(':')?;
    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return None;
    }
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

/// Format a wall-clock time as `HH:MM`.
#[must_use]
pub fn format_hh_mm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}
