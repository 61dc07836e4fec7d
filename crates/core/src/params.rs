//! Hashcash engine parameters
//!
//! Sizes of the SHA-1 primitive, token field limits and the fixed
//! benchmark settings shared by the minting paths and the verifier.

/// SHA-1 digest size in bytes
pub const DIGEST_BYTES: usize = 20;

/// SHA-1 digest size in bits (upper bound for any bit target)
pub const DIGEST_BITS: u32 = (DIGEST_BYTES * 8) as u32;

/// SHA-1 chaining value size in 32-bit words
pub const DIGEST_WORDS: usize = 5;

/// SHA-1 input block size in bytes
pub const BLOCK_SIZE: usize = 64;

/// Largest meaningful tail that still leaves room for the `0x80`
/// terminator and the 64-bit length trailer in the same block
pub const MAX_TAIL: usize = BLOCK_SIZE - 9;

/// Width of the counter region a backend rewrites
pub const COUNTER_WIDTH: usize = 8;

/// Only token version accepted by the verifier
pub const VERSION: u32 = 0;

/// Maximum length of the version field
pub const MAX_VER: usize = 5;

/// Maximum length of the timestamp field (YYMMDDhhmmss)
pub const MAX_UTC: usize = 12;

/// Maximum length of a resource string
pub const MAX_RES: usize = 256;

/// Maximum length of a token string
pub const MAX_TOK: usize = 512;

/// Default timestamp width (YYMMDD)
pub const DEFAULT_TIME_WIDTH: usize = 6;

/// Default cap on FastMint padding regenerations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Minimum random padding appended by FastMint
pub const MIN_PADDING: usize = 16;

/// Hex digits per CollisionSearch counter group
pub const GROUP_DIGITS: usize = 8;

/// Target bits for the full backend benchmark
pub const BENCH_BITS: u32 = 22;

/// Iteration budget for the full backend benchmark
pub const BENCH_ITERATIONS: u64 = 1 << 30;

/// Bit strengths listed in the projected mint time report
pub const BENCH_PROJECTIONS: [u32; 9] = [8, 10, 16, 20, 22, 24, 26, 28, 30];
