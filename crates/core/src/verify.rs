//! Token verification
//!
//! Bits are always recomputed from the token string; nothing a minter
//! claims is trusted.

use serde::{Deserialize, Serialize};

use crate::error::CheckError;
use crate::matcher::{MatchKind, ResourceMatcher};
use crate::params::VERSION;
use crate::primitives::{leading_zero_bits, sha1_digest};
use crate::token::Token;
use crate::utct::{TIME_DAY, from_utc_string};

/// Leading zero bits of the SHA-1 of the whole token string
pub fn count_bits(token: &str) -> u32 {
    leading_zero_bits(&sha1_digest(token.as_bytes()))
}

/// Remaining lifetime of an accepted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Forever,
    /// Seconds left, always positive
    Remaining(i64),
}

/// Time window check.
///
/// A zero `validity_period` never expires. Tokens dated more than
/// `grace_period` ahead of `now` are refused outright. The arithmetic
/// saturates, so huge periods read as "valid for a very long time".
pub fn valid_for(
    token_time: i64,
    validity_period: i64,
    grace_period: i64,
    now: i64,
) -> Result<Validity, CheckError> {
    if validity_period == 0 {
        return Ok(Validity::Forever);
    }
    if token_time > now.saturating_add(grace_period) {
        return Err(CheckError::InFuture);
    }

    let remaining = token_time
        .saturating_add(validity_period)
        .saturating_add(grace_period)
        .saturating_sub(now);
    if remaining > 0 {
        Ok(Validity::Remaining(remaining))
    } else {
        Err(CheckError::Expired)
    }
}

/// Acceptance policy for [`check`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// How the expected resource is matched
    pub kind: MatchKind,
    /// Seconds a token stays valid; 0 means forever
    pub validity_period: i64,
    /// Clock skew tolerance in seconds
    pub grace_period: i64,
    /// Minimum leading zero bits
    pub required_bits: u32,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            kind: MatchKind::Exact,
            validity_period: 28 * TIME_DAY,
            grace_period: 2 * TIME_DAY,
            required_bits: 20,
        }
    }
}

/// An accepted token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checked {
    pub token: Token,
    pub token_time: i64,
    pub bits: u32,
    pub validity: Validity,
}

/// Full check against an expected resource pattern (`None` skips it).
pub fn check(
    token: &str,
    resource: Option<&str>,
    config: &CheckConfig,
    now: i64,
) -> Result<Checked, CheckError> {
    let parsed = Token::parse(token)?;
    check_version(&parsed)?;
    let token_time = from_utc_string(&parsed.timestamp)?;

    let matcher = resource
        .map(|pattern| ResourceMatcher::new(config.kind, pattern))
        .transpose()?;

    finish(token, parsed, token_time, matcher.as_ref(), config, now)
}

/// Same as [`check`] with a pre-compiled matcher.
pub fn check_with(
    token: &str,
    matcher: Option<&ResourceMatcher>,
    config: &CheckConfig,
    now: i64,
) -> Result<Checked, CheckError> {
    let parsed = Token::parse(token)?;
    check_version(&parsed)?;
    let token_time = from_utc_string(&parsed.timestamp)?;

    finish(token, parsed, token_time, matcher, config, now)
}

fn check_version(token: &Token) -> Result<(), CheckError> {
    if token.version != VERSION {
        return Err(CheckError::UnsupportedVersion(token.version));
    }
    Ok(())
}

fn finish(
    token: &str,
    parsed: Token,
    token_time: i64,
    matcher: Option<&ResourceMatcher>,
    config: &CheckConfig,
    now: i64,
) -> Result<Checked, CheckError> {
    if let Some(matcher) = matcher {
        if !matcher.matches(&parsed.resource) {
            return Err(CheckError::WrongResource);
        }
    }

    let bits = count_bits(token);
    if bits < config.required_bits {
        return Err(CheckError::InsufficientBits {
            required: config.required_bits,
            got: bits,
        });
    }

    let validity = valid_for(token_time, config.validity_period, config.grace_period, now)?;

    Ok(Checked {
        token: parsed,
        token_time,
        bits,
        validity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_forever() {
        assert_eq!(valid_for(0, 0, 0, i64::MAX / 2), Ok(Validity::Forever));
        assert_eq!(valid_for(1_000_000, 0, 60, 0), Ok(Validity::Forever));
    }

    #[test]
    fn test_expiry_boundary() {
        let (t, p, g) = (1_000_000, 3600, 60);
        assert_eq!(valid_for(t, p, g, t + p + g + 1), Err(CheckError::Expired));
        assert_eq!(valid_for(t, p, g, t + p + g), Err(CheckError::Expired));
        assert_eq!(valid_for(t, p, g, t + p + g - 1), Ok(Validity::Remaining(1)));
    }

    #[test]
    fn test_huge_periods_saturate() {
        let t = 1_700_000_000;
        assert_eq!(valid_for(t, i64::MAX, 60, t), Ok(Validity::Remaining(i64::MAX - t)));
        assert_eq!(valid_for(t, 3600, i64::MAX, t), Ok(Validity::Remaining(i64::MAX - t)));
        assert_eq!(valid_for(i64::MAX, 3600, 60, 0), Err(CheckError::InFuture));
    }

    #[test]
    fn test_future_dated() {
        let (t, g) = (1_000_000, 60);
        assert_eq!(valid_for(t, 3600, g, t - g - 1), Err(CheckError::InFuture));
        assert!(valid_for(t, 3600, g, t - g).is_ok());
    }

    #[test]
    fn test_rejects_before_hashing() {
        let config = CheckConfig::default();
        assert!(matches!(check("garbage", None, &config, 0), Err(CheckError::Invalid(_))));
        assert_eq!(
            check("1:040404:foo:abc", None, &config, 0),
            Err(CheckError::UnsupportedVersion(1))
        );
        assert!(matches!(
            check("0:04x404:foo:abc", None, &config, 0),
            Err(CheckError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_resource_mismatch_and_pattern_error() {
        let config = CheckConfig {
            required_bits: 0,
            ..CheckConfig::default()
        };
        assert_eq!(
            check("0:040404:foo:abc", Some("bar"), &config, 0),
            Err(CheckError::WrongResource)
        );

        let regex = CheckConfig {
            kind: MatchKind::Regex,
            ..config
        };
        assert!(matches!(
            check("0:040404:foo:abc", Some("[bad"), &regex, 0),
            Err(CheckError::PatternError(_))
        ));
    }
}
