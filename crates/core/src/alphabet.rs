//! Counter encodings used by the search backends
//!
//! A backend writes its iteration number into the counter region using one
//! of these alphabets. The registry needs to know which one to read the
//! iteration count back out of a finished block.

use serde::{Deserialize, Serialize};

use crate::params::COUNTER_WIDTH;

/// Output alphabet tag carried by every backend descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alphabet {
    /// `0-9a-f`
    HexLower,
    /// `0-9A-Za-z+/`
    Base64,
}

const HEX_LOWER: &[u8] = b"0123456789abcdef";
const BASE64: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz+/";

impl Alphabet {
    pub fn symbols(self) -> &'static [u8] {
        match self {
            Alphabet::HexLower => HEX_LOWER,
            Alphabet::Base64 => BASE64,
        }
    }

    pub fn radix(self) -> u64 {
        self.symbols().len() as u64
    }

    /// Number of distinct values a full counter region can hold
    pub fn capacity(self) -> u64 {
        self.radix().pow(COUNTER_WIDTH as u32)
    }

    /// Write `value` most significant digit first, padded with the zero symbol.
    ///
    /// Values beyond [`Alphabet::capacity`] wrap.
    #[inline(always)]
    pub fn encode(self, mut value: u64, out: &mut [u8; COUNTER_WIDTH]) {
        let symbols = self.symbols();
        let radix = symbols.len() as u64;
        for slot in out.iter_mut().rev() {
            *slot = symbols[(value % radix) as usize];
            value /= radix;
        }
    }

    /// Read a counter region back into the iteration number.
    ///
    /// Leading `'0'` characters are skipped before decoding; any character
    /// outside the alphabet makes the region unparseable.
    pub fn decode(self, digits: &[u8]) -> Option<u64> {
        let symbols = self.symbols();
        let radix = symbols.len() as u64;
        let start = digits.iter().take_while(|c| **c == b'0').count();

        digits[start..].iter().try_fold(0u64, |acc, c| {
            let digit = symbols.iter().position(|s| s == c)? as u64;
            acc.checked_mul(radix)?.checked_add(digit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity() {
        assert_eq!(Alphabet::HexLower.capacity(), 1 << 32);
        assert_eq!(Alphabet::Base64.capacity(), 1 << 48);
    }

    #[test]
    fn test_encode_pads_with_zero_symbol() {
        let mut out = [0u8; COUNTER_WIDTH];
        Alphabet::HexLower.encode(0xbeef, &mut out);
        assert_eq!(&out, b"0000beef");

        Alphabet::Base64.encode(64 + 63, &mut out);
        assert_eq!(&out, b"0000001/");
    }

    #[test]
    fn test_decode_reverses_encode() {
        for alphabet in [Alphabet::HexLower, Alphabet::Base64] {
            let mut out = [0u8; COUNTER_WIDTH];
            alphabet.encode(123_456, &mut out);
            assert_eq!(alphabet.decode(&out), Some(123_456), "{:?}", alphabet);
        }
    }

    #[test]
    fn test_decode_rejects_foreign_characters() {
        assert_eq!(Alphabet::HexLower.decode(b"0000BEEF"), None);
        assert_eq!(Alphabet::Base64.decode(b"0000ab-c"), None);
        assert_eq!(Alphabet::HexLower.decode(b"00000000"), Some(0));
    }
}
