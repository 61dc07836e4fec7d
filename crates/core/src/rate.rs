//! Hash rate measurement and time-to-mint estimates

use std::time::{Duration, Instant};

use crate::collision::find_collision;

/// Counter values handed to each `find_collision` call while measuring
const STEP: u32 = 100;
/// Bit target the measurement never expects to reach
const PROBE_BITS: u32 = 25;
const SAMPLE: Duration = Duration::from_millis(50);

/// Average number of candidates needed for `bits` leading zero bits
pub fn expected_tries(bits: u32) -> f64 {
    2f64.powi(bits as i32)
}

/// Average seconds to mint `bits` at `rate` hashes per second
pub fn estimate_seconds(bits: u32, rate: u64) -> f64 {
    if rate == 0 {
        return f64::INFINITY;
    }
    expected_tries(bits) / rate as f64
}

/// Average seconds to mint `bits` on the structured-token path
pub fn estimate_time(bits: u32) -> f64 {
    estimate_seconds(bits, per_sec())
}

/// Hashes per second of the structured-token search.
///
/// Runs short fixed-size searches from the start of a clock tick until
/// a sample window has passed.
pub fn per_sec() -> u64 {
    let hashed_per_step = u64::from((STEP + 8) / 16 * 16);

    let previous = Instant::now();
    let mut start = Instant::now();
    while start == previous {
        start = Instant::now();
    }

    let mut hashed = 0u64;
    let elapsed = loop {
        find_collision("000101", "flame", PROBE_BITS, STEP, "00000000");
        hashed += hashed_per_step;
        let elapsed = start.elapsed();
        if elapsed >= SAMPLE {
            break elapsed;
        }
    };

    (hashed as f64 / elapsed.as_secs_f64()).round() as u64
}

/// Human-readable duration for estimates
pub fn format_duration(seconds: f64) -> String {
    const MINUTE: f64 = 60.0;
    const HOUR: f64 = 60.0 * MINUTE;
    const DAY: f64 = 24.0 * HOUR;
    const YEAR: f64 = 365.0 * DAY;

    if !seconds.is_finite() {
        "forever".to_string()
    } else if seconds < 1.0 {
        format!("{:.0} ms", seconds * 1000.0)
    } else if seconds < MINUTE {
        format!("{:.1} seconds", seconds)
    } else if seconds < HOUR {
        format!("{:.1} minutes", seconds / MINUTE)
    } else if seconds < DAY {
        format!("{:.1} hours", seconds / HOUR)
    } else if seconds < YEAR {
        format!("{:.1} days", seconds / DAY)
    } else {
        format!("{:.1} years", seconds / YEAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_tries() {
        assert_eq!(expected_tries(0), 1.0);
        assert_eq!(expected_tries(20), 1_048_576.0);
        assert_eq!(expected_tries(100), 2f64.powi(100));
    }

    #[test]
    fn test_estimate_seconds() {
        assert_eq!(estimate_seconds(20, 1 << 20), 1.0);
        assert_eq!(estimate_seconds(10, 0), f64::INFINITY);
    }

    #[test]
    fn test_per_sec_measures_something() {
        let start = Instant::now();
        assert!(per_sec() > 0);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250 ms");
        assert_eq!(format_duration(12.0), "12.0 seconds");
        assert_eq!(format_duration(90.0), "1.5 minutes");
        assert_eq!(format_duration(7200.0), "2.0 hours");
        assert_eq!(format_duration(172_800.0), "2.0 days");
        assert_eq!(format_duration(f64::INFINITY), "forever");
    }
}
