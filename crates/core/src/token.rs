//! Structured token codec
//!
//! ```text
//! VERSION:TIMESTAMP:RESOURCE:COUNTER
//! ```
//!
//! The resource may itself contain colons, so it runs from the second
//! colon up to the *last* one. A resource whose tail looks like a counter
//! (`a:b` minted as `0:040404:a:b:ctr`) cannot be told apart from one
//! without it; the last colon always wins.

use core::fmt;

use crate::error::TokenError;
use crate::params::{MAX_RES, MAX_UTC, MAX_VER};

/// Parsed fields of a structured token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub version: u32,
    pub timestamp: String,
    pub resource: String,
    pub counter: String,
}

/// Printable ASCII, space through tilde
#[inline]
pub fn is_valid_counter_char(b: u8) -> bool {
    (32..=126).contains(&b)
}

impl Token {
    pub fn new(
        version: u32,
        timestamp: impl Into<String>,
        resource: impl Into<String>,
        counter: impl Into<String>,
    ) -> Self {
        Self {
            version,
            timestamp: timestamp.into(),
            resource: resource.into(),
            counter: counter.into(),
        }
    }

    /// Split a token into its fields, validating lengths and character set.
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let (version, rest) = token.split_once(':').ok_or(TokenError::MissingSeparator)?;
        if version.len() > MAX_VER {
            return Err(TokenError::FieldTooLong {
                field: "version",
                len: version.len(),
                max: MAX_VER,
            });
        }
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::InvalidVersion);
        }
        let version: u32 = version.parse().map_err(|_| TokenError::InvalidVersion)?;

        let (timestamp, rest) = rest.split_once(':').ok_or(TokenError::MissingSeparator)?;
        if timestamp.len() > MAX_UTC {
            return Err(TokenError::FieldTooLong {
                field: "timestamp",
                len: timestamp.len(),
                max: MAX_UTC,
            });
        }

        let (resource, counter) = rest.rsplit_once(':').ok_or(TokenError::MissingSeparator)?;
        if resource.len() > MAX_RES {
            return Err(TokenError::FieldTooLong {
                field: "resource",
                len: resource.len(),
                max: MAX_RES,
            });
        }
        if !counter.bytes().all(is_valid_counter_char) {
            return Err(TokenError::InvalidCounter);
        }

        Ok(Self::new(version, timestamp, resource, counter))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.version, self.timestamp, self.resource, self.counter
        )
    }
}

impl core::str::FromStr for Token {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Token::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let token = Token::parse("0:040404:foo@example.com:a1b2c3d4e5f6").unwrap();
        assert_eq!(token.version, 0);
        assert_eq!(token.timestamp, "040404");
        assert_eq!(token.resource, "foo@example.com");
        assert_eq!(token.counter, "a1b2c3d4e5f6");
    }

    #[test]
    fn test_resource_with_colons() {
        let token = Token::parse("0:0404:http://example.com:8080/x:ff").unwrap();
        assert_eq!(token.resource, "http://example.com:8080/x");
        assert_eq!(token.counter, "ff");
        assert_eq!(token.to_string(), "0:0404:http://example.com:8080/x:ff");
    }

    #[test]
    fn test_round_trip() {
        let token = Token::new(0, "040404123456", "user@host", "0123abcd");
        assert_eq!(Token::parse(&token.to_string()).unwrap(), token);
    }

    #[test]
    fn test_counter_like_resource_tail_is_ambiguous() {
        // The last colon decides: a resource ending in ":b" loses that part
        // to the counter once the real counter is split off.
        let token = Token::parse("0:040404:a:b").unwrap();
        assert_eq!(token.resource, "a");
        assert_eq!(token.counter, "b");
    }

    #[test]
    fn test_structural_rejections() {
        assert_eq!(Token::parse("0"), Err(TokenError::MissingSeparator));
        assert_eq!(Token::parse("0:040404"), Err(TokenError::MissingSeparator));
        assert_eq!(Token::parse("0:040404:foo"), Err(TokenError::MissingSeparator));
        assert_eq!(Token::parse("-1:040404:foo:1"), Err(TokenError::InvalidVersion));
        assert_eq!(Token::parse(":040404:foo:1"), Err(TokenError::InvalidVersion));
        assert_eq!(Token::parse("0:040404:foo:a\tb"), Err(TokenError::InvalidCounter));
        assert!(matches!(
            Token::parse("123456:040404:foo:1"),
            Err(TokenError::FieldTooLong { field: "version", .. })
        ));
        assert!(matches!(
            Token::parse("0:0404041234567:foo:1"),
            Err(TokenError::FieldTooLong { field: "timestamp", .. })
        ));
    }

    #[test]
    fn test_oversized_resource() {
        let token = format!("0:040404:{}:1", "r".repeat(MAX_RES + 1));
        assert!(matches!(
            Token::parse(&token),
            Err(TokenError::FieldTooLong { field: "resource", .. })
        ));
    }
}
