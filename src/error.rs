//! Error taxonomy for the token vending machine.
//!
//! Every public operation returns exactly one of these variants; the core
//! never leaks driver-specific error types (LMDB errors, I/O errors, …) to
//! callers. See spec §7 for the recovery/mapping policy each variant implies
//! at the RPC boundary.

use thiserror::Error;

/// Sentinel error returned by vending-machine operations.
///
/// `#[non_exhaustive]` so that adding a variant later does not break
/// downstream `match` arms written against this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TvmError {
    /// The identity provider failed, or returned data the caller should not trust.
    #[error("identity provider exchange failed")]
    Exchange,

    /// No user matches the given id or email.
    #[error("user not found")]
    UserNotFound,

    /// A login-token-only API was called with a non-user token.
    #[error("token does not act as a user")]
    ImproperUsage,

    /// The caller asked for a token duration beyond `MaxTokenDuration`.
    #[error("requested duration exceeds the maximum allowed")]
    DurationExceedsMaxAllowed,

    /// The scope algebra denied the request.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// A parent lookup failed, or the entity type in a check is unknown.
    #[error("entity not found")]
    EntityNotFound,

    /// Persisting a new token failed.
    #[error("failed to store token")]
    StoreToken,

    /// Minting or persisting a token failed for a reason other than storage I/O.
    #[error("failed to issue token")]
    IssueToken,

    /// The presented token does not resolve to any row.
    #[error("token not found")]
    TokenNotFound,

    /// The token resolved, but `now >= expires_at`.
    #[error("token expired")]
    TokenExpired,

    /// The calling operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,
}

/// The categories an RPC interceptor maps a [`TvmError`] onto.
/// See spec §6 "Error wire encoding".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Internal,
    Cancelled,
}

impl TvmError {
    /// Classify this error into the category an RPC interceptor should map it to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TvmError::Exchange
            | TvmError::UserNotFound
            | TvmError::TokenNotFound
            | TvmError::TokenExpired => ErrorKind::Unauthenticated,
            TvmError::ImproperUsage | TvmError::DurationExceedsMaxAllowed => {
                ErrorKind::InvalidArgument
            }
            TvmError::InsufficientPermissions => ErrorKind::PermissionDenied,
            TvmError::EntityNotFound => ErrorKind::NotFound,
            TvmError::StoreToken | TvmError::IssueToken => ErrorKind::Internal,
            TvmError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, TvmError>;
