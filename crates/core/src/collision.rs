//! Structured-token minting by brute-force partial preimage search
//!
//! Candidates are `0:TIMESTAMP:RESOURCE:COUNTER` with a 24-hex-digit
//! counter made of three 32-bit groups. The last group is stepped 16 at a
//! time: everything up to its final hex digit is hashed once per step and
//! the 16 possible final digits are finished from clones of that state.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::MintError;
use crate::params::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_TIME_WIDTH, DIGEST_BITS, DIGEST_BYTES, GROUP_DIGITS, MAX_RES,
    VERSION,
};
use crate::utct::{check_width, round_off, to_utc_string};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Minting options shared by both minting paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MintConfig {
    /// Timestamp digits (2, 4, 6, 8, 10 or 12)
    pub time_width: usize,
    /// Shift the stamped time by a random offset within +/- this many seconds
    pub anon_period: i64,
    /// Padding regenerations FastMint may attempt before giving up
    pub max_attempts: u32,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            time_width: DEFAULT_TIME_WIDTH,
            anon_period: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// A freshly minted structured token
#[derive(Debug, Clone, PartialEq)]
pub struct Minted {
    pub token: String,
    /// Stamped time after rounding and anonymity offset
    pub time: i64,
    /// Random offset applied to the requested time
    pub anon_offset: i64,
    /// Candidates hashed before the winner
    pub tries: f64,
}

/// Random starting offsets of the three counter groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchState {
    pub outer: u32,
    pub middle: u32,
    pub low: u32,
}

impl SearchState {
    pub fn random() -> Result<Self, MintError> {
        let mut seed = [0u8; 12];
        getrandom::getrandom(&mut seed)?;
        let word = |i: usize| u32::from_le_bytes([seed[i], seed[i + 1], seed[i + 2], seed[i + 3]]);
        Ok(Self {
            outer: word(0),
            middle: word(4),
            low: word(8),
        })
    }

    /// Starting counter for outer step `i0` and middle step `i1`
    pub fn counter(&self, i0: u32, i1: u32) -> String {
        format!(
            "{:08x}{:08x}{:08x}",
            self.outer.wrapping_add(i0),
            self.middle.wrapping_add(i1),
            self.low
        )
    }
}

/// Leading-zero test split into whole bytes plus a masked partial byte
#[derive(Debug, Clone, Copy)]
struct Target {
    full_bytes: usize,
    partial_mask: u8,
}

impl Target {
    fn new(bits: u32) -> Self {
        let partial = bits % 8;
        Self {
            full_bytes: (bits / 8) as usize,
            partial_mask: if partial == 0 { 0 } else { !(0xFFu8 >> partial) },
        }
    }

    #[inline(always)]
    fn hit(&self, digest: &[u8; DIGEST_BYTES]) -> bool {
        digest[..self.full_bytes].iter().all(|b| *b == 0)
            && (self.partial_mask == 0 || digest[self.full_bytes] & self.partial_mask == 0)
    }
}

/// Search `tries` counter values starting from `counter`.
///
/// Only the last [`GROUP_DIGITS`] hex digits of `counter` vary; they are
/// rounded down to a multiple of 16 first. Returns the token and the
/// 1-based number of candidates tried, or `None` if no candidate hit.
/// A full `u32::MAX` budget covers 2^32 candidates, so the count is `u64`.
pub fn find_collision(
    utct: &str,
    resource: &str,
    bits: u32,
    tries: u32,
    counter: &str,
) -> Option<(String, u64)> {
    let split = counter.len().checked_sub(GROUP_DIGITS)?;
    let (fixed_digits, low_digits) = counter.split_at(split);
    let mut trial = u32::from_str_radix(low_digits, 16).ok()?;
    trial -= trial % 16;

    let target = Target::new(bits.min(DIGEST_BITS));
    let prefix = format!("{}:{}:{}:{}", VERSION, utct, resource, fixed_digits);
    let base = Sha1::new_with_prefix(prefix.as_bytes());

    let groups = (u64::from(tries) + 8) / 16;
    let mut digits = [0u8; GROUP_DIGITS];

    for i in 0..groups {
        write_hex(trial, &mut digits);

        let mut precomputed = base.clone();
        precomputed.update(&digits[..GROUP_DIGITS - 1]);

        for (j, last) in HEX.iter().enumerate() {
            let mut ctx = precomputed.clone();
            ctx.update([*last]);
            let digest: [u8; DIGEST_BYTES] = ctx.finalize().into();

            if target.hit(&digest) {
                digits[GROUP_DIGITS - 1] = *last;
                let token = format!("{}{}", prefix, String::from_utf8_lossy(&digits));
                return Some((token, candidate_index(i, j)));
            }
        }

        trial = trial.wrapping_add(16);
    }

    None
}

/// 1-based position of final digit `digit` within group `group`
#[inline(always)]
fn candidate_index(group: u64, digit: usize) -> u64 {
    group * 16 + digit as u64 + 1
}

fn write_hex(value: u32, out: &mut [u8; GROUP_DIGITS]) {
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = HEX[((value >> (28 - 4 * i)) & 0xF) as usize];
    }
}

/// Mint a structured token for `resource` with at least `bits` bits.
///
/// `now` is the time to stamp (seconds since the epoch). The counter space
/// starts at random offsets on every call.
pub fn mint(now: i64, resource: &str, bits: u32, config: &MintConfig) -> Result<Minted, MintError> {
    if bits > DIGEST_BITS {
        return Err(MintError::BitsTooLarge {
            requested: bits,
            max: DIGEST_BITS,
        });
    }
    if resource.len() > MAX_RES {
        return Err(MintError::ResourceTooLong {
            len: resource.len(),
            max: MAX_RES,
        });
    }
    check_width(config.time_width)?;
    if now < 0 {
        return Err(MintError::InvalidTime(now));
    }

    let state = SearchState::random()?;
    let anon_offset = anonymity_offset(config.anon_period)?;
    let time = round_off(now + anon_offset, config.time_width)?;
    let utct = to_utc_string(time, config.time_width)?;

    debug!(resource, bits, utct = %utct, "minting");

    for i0 in 0..=u32::MAX {
        for i1 in 0..=u32::MAX {
            let counter = state.counter(i0, i1);
            if let Some((token, found)) = find_collision(&utct, resource, bits, u32::MAX, &counter) {
                let tries = f64::from(i0) * 2f64.powi(64) + f64::from(i1) * 2f64.powi(32) + found as f64;
                return Ok(Minted {
                    token,
                    time,
                    anon_offset,
                    tries,
                });
            }
        }
    }

    Err(MintError::TooManyTries {
        attempts: u64::MAX,
    })
}

/// Uniform offset in `[-period, period]`
fn anonymity_offset(period: i64) -> Result<i64, MintError> {
    if period == 0 {
        return Ok(0);
    }
    let span = period.unsigned_abs();
    let mut raw = [0u8; 8];
    getrandom::getrandom(&mut raw)?;
    let r = u64::from_le_bytes(raw) % (2 * span + 1);
    Ok(r as i64 - span as i64)
}

/// One entry of a batch mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub resource: String,
    pub bits: u32,
}

/// Mint several independent tokens, in parallel when the `parallel`
/// feature is enabled. Results keep the order of `requests`.
pub fn mint_many(
    now: i64,
    requests: &[MintRequest],
    config: &MintConfig,
) -> Vec<Result<Minted, MintError>> {
    #[cfg(feature = "parallel")]
    let iter = requests.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = requests.iter();

    iter.map(|r| mint(now, &r.resource, r.bits, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::count_bits;

    #[test]
    fn test_target_mask() {
        let t = Target::new(12);
        assert_eq!(t.full_bytes, 1);
        assert_eq!(t.partial_mask, 0xF0);
        let mut digest = [0xFFu8; DIGEST_BYTES];
        digest[0] = 0;
        digest[1] = 0x0F;
        assert!(t.hit(&digest));
        digest[1] = 0x10;
        assert!(!t.hit(&digest));
    }

    #[test]
    fn test_zero_bits_hits_first_candidate() {
        let (token, tried) = find_collision("040404", "foo", 0, 16, "00000000").unwrap();
        assert_eq!(tried, 1);
        assert_eq!(token, "0:040404:foo:00000000");
    }

    #[test]
    fn test_find_collision_meets_bits() {
        let (token, tried) =
            find_collision("040404", "foo", 12, u32::MAX, "0123456789abcdef01234567").unwrap();
        assert!(count_bits(&token) >= 12);
        assert!(tried >= 1);
        assert!(token.starts_with("0:040404:foo:0123456789abcdef"));
    }

    #[test]
    fn test_low_group_is_rounded_to_sixteen() {
        let (token, _) = find_collision("040404", "foo", 0, 16, "0000001f").unwrap();
        assert_eq!(token, "0:040404:foo:00000010");
    }

    #[test]
    fn test_full_budget_index_does_not_wrap() {
        let groups = (u64::from(u32::MAX) + 8) / 16;
        assert_eq!(candidate_index(0, 0), 1);
        assert_eq!(candidate_index(groups - 1, 15), 1 << 32);
    }

    #[test]
    fn test_exhausted_budget() {
        // 160 bits will not turn up in 32 candidates
        assert!(find_collision("040404", "foo", 160, 32, "00000000").is_none());
        assert!(find_collision("040404", "foo", 1, 32, "xyz").is_none());
    }

    #[test]
    fn test_mint_validates_input() {
        let config = MintConfig::default();
        assert!(matches!(
            mint(0, "foo", 161, &config),
            Err(MintError::BitsTooLarge { .. })
        ));
        assert_eq!(mint(-1, "foo", 1, &config), Err(MintError::InvalidTime(-1)));
        let odd = MintConfig {
            time_width: 7,
            ..MintConfig::default()
        };
        assert_eq!(mint(0, "foo", 1, &odd), Err(MintError::InvalidTimeWidth(7)));
        assert!(matches!(
            mint(0, &"r".repeat(MAX_RES + 1), 1, &config),
            Err(MintError::ResourceTooLong { .. })
        ));
    }

    #[test]
    fn test_mint_randomizes_search() {
        let config = MintConfig::default();
        let a = mint(1_081_082_096, "foo", 4, &config).unwrap();
        let b = mint(1_081_082_096, "foo", 4, &config).unwrap();
        assert!(a.token.starts_with("0:040404:foo:"));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_anonymity_offset_bounds() {
        for _ in 0..100 {
            let offset = anonymity_offset(30).unwrap();
            assert!((-30..=30).contains(&offset));
        }
        assert_eq!(anonymity_offset(0).unwrap(), 0);
    }

    #[test]
    fn test_mint_many_keeps_order() {
        let requests = vec![
            MintRequest {
                resource: "alpha".into(),
                bits: 6,
            },
            MintRequest {
                resource: "beta".into(),
                bits: 6,
            },
        ];
        let results = mint_many(1_081_082_096, &requests, &MintConfig::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().token.contains(":alpha:"));
        assert!(results[1].as_ref().unwrap().token.contains(":beta:"));
    }
}
