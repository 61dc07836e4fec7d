//! Error types for minting, parsing and verification

use thiserror::Error;

/// Failures while minting a token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error("Requested {requested} bits exceeds the {max}-bit digest")]
    BitsTooLarge { requested: u32, max: u32 },

    #[error("Invalid timestamp width {0} (expected 2, 4, 6, 8, 10 or 12)")]
    InvalidTimeWidth(usize),

    #[error("Invalid time: {0}")]
    InvalidTime(i64),

    #[error("Resource is {len} bytes, limit is {max}")]
    ResourceTooLong { len: usize, max: usize },

    #[error("Token is {len} bytes, limit is {max}")]
    TokenTooLong { len: usize, max: usize },

    #[error("Random number generator failed: {0}")]
    RngFailed(String),

    #[error("Search space exhausted after {attempts} attempts; lower the bit target")]
    TooManyTries { attempts: u64 },

    /// A backend claimed more bits than the reference hash confirms.
    /// Not recoverable: the backend cannot be trusted to mint.
    #[error(
        "Backend {backend} is broken: requested {requested} bits, reported {reported}, got {verified}"
    )]
    BackendIntegrity {
        backend: &'static str,
        requested: u32,
        reported: u32,
        verified: u32,
    },
}

/// Structural problems with a token string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Missing field separator")]
    MissingSeparator,

    #[error("Version field is not a non-negative integer")]
    InvalidVersion,

    #[error("{field} field is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Counter contains characters outside printable ASCII")]
    InvalidCounter,
}

/// Timestamp conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid timestamp width {0}")]
    InvalidWidth(usize),

    #[error("Timestamp {0:?} is not a valid UTC time")]
    Malformed(String),

    #[error("Time {0} is out of range")]
    OutOfRange(i64),
}

/// Reasons a token is rejected by [`crate::check`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("Invalid token: {0}")]
    Invalid(#[from] TokenError),

    #[error("Unsupported token version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid token timestamp: {0}")]
    InvalidTime(#[from] TimeError),

    #[error("Token resource does not match")]
    WrongResource,

    #[error("Invalid resource pattern: {0}")]
    PatternError(String),

    #[error("Insufficient bits: required {required}, got {got}")]
    InsufficientBits { required: u32, got: u32 },

    #[error("Token is expired")]
    Expired,

    #[error("Token is dated in the future")]
    InFuture,
}

impl From<getrandom::Error> for MintError {
    fn from(e: getrandom::Error) -> Self {
        MintError::RngFailed(e.to_string())
    }
}

impl From<TimeError> for MintError {
    fn from(e: TimeError) -> Self {
        match e {
            TimeError::InvalidWidth(width) => MintError::InvalidTimeWidth(width),
            TimeError::OutOfRange(time) => MintError::InvalidTime(time),
            TimeError::Malformed(_) => MintError::InvalidTime(-1),
        }
    }
}
