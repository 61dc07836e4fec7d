//! Hashcash stamp minter and verifier
//!
//! A hashcash token proves that its sender spent CPU time on it: its SHA-1
//! digest starts with a chosen number of zero bits. Minting takes about
//! `2^bits` hashes, checking takes one.
//!
//! # Example
//!
//! ```rust
//! use hashcash::engine::{CheckConfig, MintConfig, check, mint, utct};
//!
//! let now = utct::now();
//! let minted = mint(now, "bob@example.com", 8, &MintConfig::default()).unwrap();
//!
//! let config = CheckConfig { required_bits: 8, ..CheckConfig::default() };
//! assert!(check(&minted.token, Some("bob@example.com"), &config, now).is_ok());
//! ```

// Re-export the minting engine
pub use hashcash_core as engine;

pub mod config;
pub mod spend;

// Convenience re-exports
pub use engine::{Engine, check, count_bits, mint};
