//! Opaque-prefix minting through the selected backend
//!
//! ```text
//! PREFIX  RANDOM-PADDING  ':'  COUNTER(8)
//! ```
//!
//! Whole blocks before the final one are compressed once into a chaining
//! value; the backend searches only the final block. Every result is
//! rehashed with the reference SHA-1 before it is returned.

use core::ops::Range;

use tracing::{debug, error};

use crate::alphabet::Alphabet;
use crate::backend::Backend;
use crate::error::MintError;
use crate::params::{BLOCK_SIZE, COUNTER_WIDTH, DIGEST_BITS, MAX_TAIL, MAX_TOK, MIN_PADDING};
use crate::primitives::{chaining_value, final_block, leading_zero_bits, sha1_digest};
use crate::registry::Engine;

/// A token stamped by [`Engine::fast_mint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub token: String,
    /// Leading zero bits confirmed by the reference hash
    pub bits: u32,
    /// Padding regenerations used, starting at 1
    pub attempts: u32,
    /// Byte range of the random padding within `token`
    pub padding: Range<usize>,
}

/// Padding length for a `prefix_len`-byte prefix.
///
/// At least [`MIN_PADDING`], extended so the final block holds the whole
/// counter and still leaves room for the SHA-1 length trailer.
pub fn padding_len(prefix_len: usize) -> usize {
    let suffix = 1 + COUNTER_WIDTH;
    let mut padding = MIN_PADDING;
    let tail = (prefix_len + padding + suffix) % BLOCK_SIZE;
    if tail > MAX_TAIL {
        padding += BLOCK_SIZE - tail + COUNTER_WIDTH;
    } else if tail < COUNTER_WIDTH {
        padding += COUNTER_WIDTH - tail;
    }
    padding
}

/// Random printable padding drawn from the base-64 alphabet
fn random_padding(len: usize) -> Result<Vec<u8>, MintError> {
    let mut raw = vec![0u8; len];
    getrandom::getrandom(&mut raw)?;
    let symbols = Alphabet::Base64.symbols();
    Ok(raw.into_iter().map(|b| symbols[(b & 0x3F) as usize]).collect())
}

impl Engine {
    /// Stamp `prefix` with at least `bits` bits using the selected backend.
    ///
    /// A search that exhausts the final block's counter space is retried
    /// with fresh padding, up to `max_attempts` times. A backend reporting
    /// more bits than the reference hash confirms aborts with
    /// [`MintError::BackendIntegrity`].
    pub fn fast_mint(&self, bits: u32, prefix: &str, max_attempts: u32) -> Result<Stamp, MintError> {
        if bits > DIGEST_BITS {
            return Err(MintError::BitsTooLarge {
                requested: bits,
                max: DIGEST_BITS,
            });
        }
        if prefix.len() > MAX_TOK {
            return Err(MintError::TokenTooLong {
                len: prefix.len(),
                max: MAX_TOK,
            });
        }

        let backend = self.selected();
        let padding_len = padding_len(prefix.len());
        let padding = prefix.len()..prefix.len() + padding_len;

        for attempt in 1..=max_attempts {
            let mut buffer = Vec::with_capacity(padding.end + 1 + COUNTER_WIDTH);
            buffer.extend_from_slice(prefix.as_bytes());
            buffer.extend_from_slice(&random_padding(padding_len)?);
            buffer.push(b':');
            buffer.extend_from_slice(&[b'0'; COUNTER_WIDTH]);

            let verified = search_final_block(backend, bits, &mut buffer)?;
            if verified >= bits {
                debug!(backend = backend.name(), bits = verified, attempt, "stamped");
                // Prefix is UTF-8 and everything appended is ASCII
                return Ok(Stamp {
                    token: String::from_utf8_lossy(&buffer).into_owned(),
                    bits: verified,
                    attempts: attempt,
                    padding,
                });
            }

            debug!(attempt, verified, "final block exhausted, regenerating padding");
        }

        Err(MintError::TooManyTries {
            attempts: u64::from(max_attempts),
        })
    }
}

/// Run `backend` over the last block of `buffer`, commit its counter and
/// return the bit count confirmed by the reference hash.
fn search_final_block(backend: Backend, bits: u32, buffer: &mut [u8]) -> Result<u32, MintError> {
    let whole = buffer.len() - buffer.len() % BLOCK_SIZE;
    let iv = chaining_value(&buffer[..whole]);
    let tail = buffer.len() - whole;

    let mut block = final_block(&buffer[whole..], buffer.len());
    let reported = backend.search(bits, &mut block, &iv, tail, u64::from(u32::MAX));
    buffer[whole..].copy_from_slice(&block[..tail]);

    confirm_bits(backend, bits, reported, buffer)
}

/// Rehash a committed `buffer` with the reference SHA-1.
///
/// Claiming more bits than the reference confirms is an integrity failure;
/// claiming fewer is not, the verified count is returned either way.
fn confirm_bits(backend: Backend, requested: u32, reported: u32, buffer: &[u8]) -> Result<u32, MintError> {
    let verified = leading_zero_bits(&sha1_digest(buffer));
    if reported > verified {
        error!(
            backend = backend.name(),
            requested,
            reported,
            verified,
            token = %String::from_utf8_lossy(buffer),
            "backend reported bits the reference hash does not confirm"
        );
        return Err(MintError::BackendIntegrity {
            backend: backend.name(),
            requested,
            reported,
            verified,
        });
    }

    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::count_bits;

    #[test]
    fn test_padding_keeps_counter_in_final_block() {
        for prefix_len in 0..200 {
            let padding = padding_len(prefix_len);
            assert!(padding >= MIN_PADDING);
            let tail = (prefix_len + padding + 1 + COUNTER_WIDTH) % BLOCK_SIZE;
            assert!(
                (COUNTER_WIDTH..=MAX_TAIL).contains(&tail),
                "prefix {} padding {} tail {}",
                prefix_len,
                padding,
                tail
            );
        }
    }

    #[test]
    fn test_fast_mint_with_every_backend() {
        for (backend, usable) in Engine::backends() {
            if !usable {
                continue;
            }
            let engine = Engine::with_backend(backend).unwrap();
            let stamp = engine.fast_mint(14, "1:14:040404:foo@example.com::", 10).unwrap();

            assert!(stamp.bits >= 14, "{}", backend.name());
            assert_eq!(count_bits(&stamp.token), stamp.bits);
            assert!(stamp.token.starts_with("1:14:040404:foo@example.com::"));
            assert_eq!(stamp.padding.start, 29);
            let padding = &stamp.token[stamp.padding.clone()];
            assert!(padding.bytes().all(|b| Alphabet::Base64.symbols().contains(&b)));
            assert_eq!(stamp.token.as_bytes()[stamp.padding.end], b':');
        }
    }

    #[test]
    fn test_overstated_bits_are_an_integrity_failure() {
        let stamp = Engine::new().fast_mint(10, "1:10:040404:foo::", 10).unwrap();
        let buffer = stamp.token.as_bytes();
        let backend = Backend::PortableStandard;

        assert_eq!(confirm_bits(backend, 10, stamp.bits, buffer), Ok(stamp.bits));
        assert_eq!(confirm_bits(backend, 10, 0, buffer), Ok(stamp.bits));
        assert_eq!(
            confirm_bits(backend, 10, stamp.bits + 1, buffer),
            Err(MintError::BackendIntegrity {
                backend: backend.name(),
                requested: 10,
                reported: stamp.bits + 1,
                verified: stamp.bits,
            })
        );

        // A counter the backend never wrote no longer carries its claim
        let mut tampered = buffer.to_vec();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'+' { b'/' } else { b'+' };
        let verified = count_bits(&String::from_utf8_lossy(&tampered));
        if verified < stamp.bits {
            assert!(matches!(
                confirm_bits(backend, 10, stamp.bits, &tampered),
                Err(MintError::BackendIntegrity { .. })
            ));
        }
    }

    #[test]
    fn test_fast_mint_long_prefix_spans_blocks() {
        let prefix = format!("1:12:040404:{}::", "x".repeat(150));
        let stamp = Engine::new().fast_mint(12, &prefix, 10).unwrap();
        assert!(count_bits(&stamp.token) >= 12);
        assert_eq!(stamp.token.len(), prefix.len() + stamp.padding.len() + 1 + COUNTER_WIDTH);
    }

    #[test]
    fn test_fast_mint_rejects_bad_input() {
        let engine = Engine::new();
        assert!(matches!(
            engine.fast_mint(161, "x", 1),
            Err(MintError::BitsTooLarge { .. })
        ));
        assert!(matches!(
            engine.fast_mint(8, &"x".repeat(MAX_TOK + 1), 1),
            Err(MintError::TokenTooLong { .. })
        ));
        assert_eq!(
            engine.fast_mint(8, "x", 0),
            Err(MintError::TooManyTries { attempts: 0 })
        );
    }
}
