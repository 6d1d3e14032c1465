//! Error taxonomy for the OTP engine.
//!
//! Policy-driven denials (rate limit, expiry, attempt limit, token or
//! password mismatch) are ordinary outcome values, not errors; see the
//! outcome enums in [`crate::service`]. The types here cover what is left:
//! configuration defects, caller input defects, and infrastructure
//! failures.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error returned by [`crate::OtpService`] and
/// [`crate::PolicyRegistry`].
#[derive(Debug, Error)]
pub enum OtpError {
    /// No policy is registered under the requested function name.
    /// Configuration defect; the caller must not proceed or retry.
    #[error("no policy registered for function {0:?}")]
    PolicyNotFound(String),

    /// A policy failed validation when the registry was built.
    #[error("invalid policy for function {function_name:?}: {reason}")]
    PolicyInvalid {
        function_name: String,
        reason: String,
    },

    /// The caller supplied an empty user key. Rejected before any store
    /// access.
    #[error("user key is empty")]
    MissingUserKey,

    /// A record handle no longer resolves to a stored record.
    #[error("no record for handle {0}")]
    RecordNotFound(Uuid),

    /// The OS random source failed while generating a password or token.
    #[error("random source failed")]
    Random(#[from] rand::Error),

    #[error("record store failed")]
    Store(#[from] StoreError),

    #[error("password hashing failed")]
    Hasher(#[from] HasherError),
}

/// Failure inside a [`crate::store::RecordStore`] adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// An update targeted a record id that is not present. The engine
    /// never deletes records, so this signals external cleanup racing a
    /// verification.
    #[error("record {0} is gone")]
    Missing(Uuid),
}

/// Failure inside a [`crate::hasher::PasswordHasher`] implementation.
///
/// A wrong password is not an error; implementations report it as
/// `Ok(false)` from `verify`.
#[derive(Debug, Error)]
pub enum HasherError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    /// The stored digest cannot be parsed. Operational defect, distinct
    /// from a mismatch.
    #[error("malformed password digest: {0}")]
    MalformedDigest(String),
}
