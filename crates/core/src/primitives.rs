//! SHA-1 building blocks for the collision search backends
//!
//! The reference digest and block compression come from the `sha1` crate.
//! The backends additionally run the 80 SHA-1 rounds themselves so they can
//! skip the rounds whose message words never change between candidates.

use sha1::{Digest, Sha1};

use crate::params::{BLOCK_SIZE, DIGEST_BYTES, DIGEST_WORDS};

/// SHA-1 initial chaining value
pub const SHA1_IV: [u32; DIGEST_WORDS] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];

const K: [u32; 4] = [0x5A827999, 0x6ED9EBA1, 0x8F1BBCDC, 0xCA62C1D6];

/// One-shot reference digest
#[inline]
pub fn sha1_digest(data: &[u8]) -> [u8; DIGEST_BYTES] {
    Sha1::digest(data).into()
}

/// Raw compression of one block into `state` (reference implementation)
#[inline(always)]
pub fn sha1_compress(state: &mut [u32; DIGEST_WORDS], block: &[u8; BLOCK_SIZE]) {
    sha1::compress(state, &[(*block).into()]);
}

/// Chaining value after compressing every whole block of `data`
///
/// `data.len()` must be a multiple of the block size.
pub fn chaining_value(data: &[u8]) -> [u32; DIGEST_WORDS] {
    debug_assert_eq!(data.len() % BLOCK_SIZE, 0);
    let mut state = SHA1_IV;
    for chunk in data.chunks_exact(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        sha1_compress(&mut state, &block);
    }
    state
}

/// Final block holding `tail`, the `0x80` terminator and the bit length of
/// a `message_len`-byte message. `tail` must fit before the length trailer.
pub fn final_block(tail: &[u8], message_len: usize) -> [u8; BLOCK_SIZE] {
    debug_assert!(tail.len() < BLOCK_SIZE - 8);
    let mut block = [0u8; BLOCK_SIZE];
    block[..tail.len()].copy_from_slice(tail);
    block[tail.len()] = 0x80;
    block[BLOCK_SIZE - 8..].copy_from_slice(&((message_len as u64) << 3).to_be_bytes());
    block
}

/// Count leading zero bits of a digest.
///
/// Whole zero bytes count 8 each, the first non-zero byte contributes its
/// own leading zeros. Every bit count in the crate goes through here.
#[inline]
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut zero_bits = 0u32;

    for byte in digest.iter() {
        if *byte == 0 {
            zero_bits += 8;
        } else {
            zero_bits += byte.leading_zeros();
            break;
        }
    }

    zero_bits
}

/// Same count taken straight from the big-endian chaining words
#[inline(always)]
pub fn leading_zero_words(words: &[u32; DIGEST_WORDS]) -> u32 {
    let mut zero_bits = 0u32;

    for word in words.iter() {
        if *word == 0 {
            zero_bits += 32;
        } else {
            zero_bits += word.leading_zeros();
            break;
        }
    }

    zero_bits
}

/// Load the 16 big-endian message words of a block
#[inline(always)]
pub fn load_words(block: &[u8; BLOCK_SIZE]) -> [u32; 16] {
    let mut w = [0u32; 16];
    for (i, word) in w.iter_mut().enumerate() {
        *word = u32::from_be_bytes([
            block[i * 4],
            block[i * 4 + 1],
            block[i * 4 + 2],
            block[i * 4 + 3],
        ]);
    }
    w
}

/// Lane-wise 32-bit operations needed by the SHA-1 rounds.
///
/// Implemented for plain `u32`, for a portable `[u32; 4]` and for SSE2
/// registers, so the round code below is written once.
pub trait Word: Copy {
    fn splat(x: u32) -> Self;
    fn add(self, other: Self) -> Self;
    fn xor(self, other: Self) -> Self;
    fn and(self, other: Self) -> Self;
    fn or(self, other: Self) -> Self;
    /// `!self & other`
    fn andnot(self, other: Self) -> Self;
    fn rotl(self, n: u32) -> Self;
}

impl Word for u32 {
    #[inline(always)]
    fn splat(x: u32) -> Self {
        x
    }
    #[inline(always)]
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }
    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        self ^ other
    }
    #[inline(always)]
    fn and(self, other: Self) -> Self {
        self & other
    }
    #[inline(always)]
    fn or(self, other: Self) -> Self {
        self | other
    }
    #[inline(always)]
    fn andnot(self, other: Self) -> Self {
        !self & other
    }
    #[inline(always)]
    fn rotl(self, n: u32) -> Self {
        self.rotate_left(n)
    }
}

/// Four independent SHA-1 lanes in plain integers
pub type Lanes4 = [u32; 4];

macro_rules! lanewise {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {{
        let (a, b) = ($a, $b);
        [
            {
                let ($x, $y) = (a[0], b[0]);
                $body
            },
            {
                let ($x, $y) = (a[1], b[1]);
                $body
            },
            {
                let ($x, $y) = (a[2], b[2]);
                $body
            },
            {
                let ($x, $y) = (a[3], b[3]);
                $body
            },
        ]
    }};
}

impl Word for Lanes4 {
    #[inline(always)]
    fn splat(x: u32) -> Self {
        [x; 4]
    }
    #[inline(always)]
    fn add(self, other: Self) -> Self {
        lanewise!(self, other, |x, y| x.wrapping_add(y))
    }
    #[inline(always)]
    fn xor(self, other: Self) -> Self {
        lanewise!(self, other, |x, y| x ^ y)
    }
    #[inline(always)]
    fn and(self, other: Self) -> Self {
        lanewise!(self, other, |x, y| x & y)
    }
    #[inline(always)]
    fn or(self, other: Self) -> Self {
        lanewise!(self, other, |x, y| x | y)
    }
    #[inline(always)]
    fn andnot(self, other: Self) -> Self {
        lanewise!(self, other, |x, y| !x & y)
    }
    #[inline(always)]
    fn rotl(self, n: u32) -> Self {
        [
            self[0].rotate_left(n),
            self[1].rotate_left(n),
            self[2].rotate_left(n),
            self[3].rotate_left(n),
        ]
    }
}

/// SSE2 four-lane words
#[cfg(target_arch = "x86_64")]
pub mod sse2 {
    use core::arch::x86_64::{
        __m128i, _mm_add_epi32, _mm_and_si128, _mm_andnot_si128, _mm_cvtsi32_si128,
        _mm_or_si128, _mm_set1_epi32, _mm_sll_epi32, _mm_srl_epi32, _mm_storeu_si128,
        _mm_xor_si128,
    };

    use super::Word;

    #[derive(Clone, Copy)]
    pub struct Sse2x4(pub __m128i);

    impl Sse2x4 {
        /// Build from four lanes, lane 0 first
        #[inline(always)]
        pub fn from_lanes(lanes: [u32; 4]) -> Self {
            // SAFETY: SSE2 is part of the x86_64 baseline, unaligned load
            unsafe {
                Self(core::arch::x86_64::_mm_loadu_si128(
                    lanes.as_ptr() as *const __m128i
                ))
            }
        }

        #[inline(always)]
        pub fn to_lanes(self) -> [u32; 4] {
            let mut out = [0u32; 4];
            // SAFETY: unaligned store into a 16-byte local
            unsafe { _mm_storeu_si128(out.as_mut_ptr() as *mut __m128i, self.0) };
            out
        }
    }

    // SAFETY (all methods): SSE2 is part of the x86_64 baseline and the
    // backend using these is additionally gated behind a runtime probe.
    impl Word for Sse2x4 {
        #[inline(always)]
        fn splat(x: u32) -> Self {
            unsafe { Self(_mm_set1_epi32(x as i32)) }
        }
        #[inline(always)]
        fn add(self, other: Self) -> Self {
            unsafe { Self(_mm_add_epi32(self.0, other.0)) }
        }
        #[inline(always)]
        fn xor(self, other: Self) -> Self {
            unsafe { Self(_mm_xor_si128(self.0, other.0)) }
        }
        #[inline(always)]
        fn and(self, other: Self) -> Self {
            unsafe { Self(_mm_and_si128(self.0, other.0)) }
        }
        #[inline(always)]
        fn or(self, other: Self) -> Self {
            unsafe { Self(_mm_or_si128(self.0, other.0)) }
        }
        #[inline(always)]
        fn andnot(self, other: Self) -> Self {
            unsafe { Self(_mm_andnot_si128(self.0, other.0)) }
        }
        #[inline(always)]
        fn rotl(self, n: u32) -> Self {
            unsafe {
                let left = _mm_sll_epi32(self.0, _mm_cvtsi32_si128(n as i32));
                let right = _mm_srl_epi32(self.0, _mm_cvtsi32_si128(32 - n as i32));
                Self(_mm_or_si128(left, right))
            }
        }
    }
}

/// Run SHA-1 rounds `first..80` over `state`.
///
/// `w` holds the 16 message words on entry and is used as the rolling
/// schedule window. Words `0..first` must already be folded into `state`.
#[inline(always)]
pub fn rounds_from<W: Word>(state: &mut [W; DIGEST_WORDS], w: &mut [W; 16], first: usize) {
    let [mut a, mut b, mut c, mut d, mut e] = *state;

    for t in first..80 {
        let wt = if t < 16 {
            w[t]
        } else {
            let x = w[(t + 13) & 15]
                .xor(w[(t + 8) & 15])
                .xor(w[(t + 2) & 15])
                .xor(w[t & 15])
                .rotl(1);
            w[t & 15] = x;
            x
        };

        let (f, k) = match t {
            0..=19 => (b.and(c).or(b.andnot(d)), K[0]),
            20..=39 => (b.xor(c).xor(d), K[1]),
            40..=59 => (b.and(c).or(b.and(d)).or(c.and(d)), K[2]),
            _ => (b.xor(c).xor(d), K[3]),
        };

        let temp = a.rotl(5).add(f).add(e).add(W::splat(k)).add(wt);
        e = d;
        d = c;
        c = b.rotl(30);
        b = a;
        a = temp;
    }

    *state = [a, b, c, d, e];
}

/// Fold the first `count` (< 16) message words into a scalar state.
///
/// Those words stay fixed across candidates, so their rounds run once.
#[inline]
pub fn precompute_rounds(iv: &[u32; DIGEST_WORDS], w: &[u32; 16], count: usize) -> [u32; DIGEST_WORDS] {
    let [mut a, mut b, mut c, mut d, mut e] = *iv;

    for wt in w.iter().take(count.min(16)) {
        let f = (b & c) | (!b & d);
        let temp = a
            .rotate_left(5)
            .wrapping_add(f)
            .wrapping_add(e)
            .wrapping_add(K[0])
            .wrapping_add(*wt);
        e = d;
        d = c;
        c = b.rotate_left(30);
        b = a;
        a = temp;
    }

    [a, b, c, d, e]
}

/// Add the chaining value back in (final step of the compression)
#[inline(always)]
pub fn feed_forward<W: Word>(state: &mut [W; DIGEST_WORDS], iv: &[u32; DIGEST_WORDS]) {
    for (s, h) in state.iter_mut().zip(iv.iter()) {
        *s = s.add(W::splat(*h));
    }
}
