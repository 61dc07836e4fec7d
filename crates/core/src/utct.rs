//! UTC timestamp fields
//!
//! Tokens carry their time as `YY[MM[DD[hh[mm[ss]]]]]` in UTC. Two-digit
//! years below 70 are read as 20YY, the rest as 19YY.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::TimeError;

pub const TIME_MINUTE: i64 = 60;
pub const TIME_HOUR: i64 = 60 * TIME_MINUTE;
pub const TIME_DAY: i64 = 24 * TIME_HOUR;
pub const TIME_MONTH: i64 = 30 * TIME_DAY;
pub const TIME_YEAR: i64 = 365 * TIME_DAY;

/// Accepted timestamp widths
pub const WIDTHS: [usize; 6] = [2, 4, 6, 8, 10, 12];

pub fn check_width(width: usize) -> Result<(), TimeError> {
    if WIDTHS.contains(&width) {
        Ok(())
    } else {
        Err(TimeError::InvalidWidth(width))
    }
}

/// Render `time` (seconds since the epoch) truncated to `width` digits
pub fn to_utc_string(time: i64, width: usize) -> Result<String, TimeError> {
    check_width(width)?;
    if time < 0 {
        return Err(TimeError::OutOfRange(time));
    }
    let dt = DateTime::<Utc>::from_timestamp(time, 0).ok_or(TimeError::OutOfRange(time))?;
    let full = dt.format("%y%m%d%H%M%S").to_string();
    Ok(full[..width].to_string())
}

/// Parse a token timestamp back into seconds since the epoch.
///
/// Omitted trailing fields default to the start of the period.
pub fn from_utc_string(utct: &str) -> Result<i64, TimeError> {
    let malformed = || TimeError::Malformed(utct.to_string());

    check_width(utct.len()).map_err(|_| malformed())?;
    if !utct.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let field = |i: usize, default: u32| -> u32 {
        utct.get(i * 2..i * 2 + 2)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    };

    let yy = field(0, 0) as i32;
    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };

    let naive = NaiveDate::from_ymd_opt(year, field(1, 1), field(2, 1))
        .and_then(|d| d.and_hms_opt(field(3, 0), field(4, 0), field(5, 0)))
        .ok_or_else(malformed)?;

    Ok(Utc.from_utc_datetime(&naive).timestamp())
}

/// Round `time` down to the precision a `width`-digit timestamp can express
pub fn round_off(time: i64, width: usize) -> Result<i64, TimeError> {
    from_utc_string(&to_utc_string(time, width)?)
}

/// Narrowest timestamp width that still resolves a validity period.
///
/// A period of zero (valid forever) uses the default `YYMMDD`; negative
/// periods have no width.
pub fn validity_to_width(validity_period: i64) -> Option<usize> {
    let width = match validity_period {
        p if p < 0 => return None,
        0 => 6,
        p if p < 2 * TIME_MINUTE => 12,
        p if p < 2 * TIME_HOUR => 10,
        p if p < 2 * TIME_DAY => 8,
        p if p < 2 * TIME_MONTH => 6,
        p if p < 2 * TIME_YEAR => 4,
        _ => 2,
    };
    Some(width)
}

/// Current time in seconds since the epoch
pub fn now() -> i64 {
    Utc::now().timestamp()
}
