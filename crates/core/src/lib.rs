//! # Hashcash Core
//!
//! Proof-of-work stamps over SHA-1: a sender searches for a string whose
//! digest starts with enough zero bits, a receiver checks it with a single
//! hash.
//!
//! ## Minting paths
//!
//! - **Structured tokens** ([`mint`]): `0:TIMESTAMP:RESOURCE:COUNTER`,
//!   searched with incremental hashing over a randomized 96-bit counter space.
//! - **Fast mint** ([`Engine::fast_mint`]): stamps an opaque prefix using
//!   the fastest collision search backend the CPU supports.
//!
//! ## Backends
//!
//! | Backend | Counter alphabet | Notes |
//! |---------|------------------|-------|
//! | Portable Compact | hex | one reference compression per candidate |
//! | Portable Standard | base-64 | skips rounds over unchanged words |
//! | Word-Parallel | base-64 | four lanes in plain integers |
//! | SSE2 | base-64 | four lanes in SSE2 registers (x86-64) |
//!
//! ## Example
//!
//! ```rust
//! use hashcash_core::{CheckConfig, Engine, MintConfig, check, mint, utct};
//!
//! let now = utct::now();
//! let minted = mint(now, "alice@example.com", 10, &MintConfig::default()).unwrap();
//!
//! let config = CheckConfig { required_bits: 10, ..CheckConfig::default() };
//! let checked = check(&minted.token, Some("alice@example.com"), &config, now).unwrap();
//! assert!(checked.bits >= 10);
//!
//! let stamp = Engine::new().fast_mint(10, "1:10:040404:bob::", 100).unwrap();
//! assert!(stamp.bits >= 10);
//! ```

mod alphabet;
mod backend;
mod collision;
mod error;
mod fastmint;
mod matcher;
mod params;
mod primitives;
mod rate;
mod registry;
mod token;
mod verify;

pub mod utct;

pub use alphabet::Alphabet;
pub use backend::Backend;
pub use collision::{MintConfig, MintRequest, Minted, SearchState, find_collision, mint, mint_many};
pub use error::{CheckError, MintError, TimeError, TokenError};
pub use fastmint::{Stamp, padding_len};
pub use matcher::{MatchKind, ResourceMatcher, email_match, resource_match, wild_match};
pub use params::*;
pub use primitives::{leading_zero_bits, sha1_digest};
pub use rate::{estimate_seconds, estimate_time, expected_tries, format_duration, per_sec};
pub use registry::{
    BenchEntry, BenchFailure, BenchOutcome, BenchmarkReport, Engine, format_projection,
};
pub use token::{Token, is_valid_counter_char};
pub use verify::{CheckConfig, Checked, Validity, check, check_with, count_bits, valid_for};
