//! One-way hashing for OTP values.
//!
//! The engine never stores or returns an OTP in plaintext after issuance;
//! records carry only the digest produced here. Hashing is an injected
//! capability so embedders can swap parameters or algorithms without
//! touching lifecycle logic.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier};
use rand::rngs::OsRng;

use crate::error::HasherError;

/// Hash-and-verify capability for one-time passwords.
///
/// `verify` reports a wrong password as `Ok(false)`; `Err` is reserved for
/// operational failures such as an unparseable stored digest.
pub trait PasswordHasher: Send + Sync {
    /// Produce a one-way digest of `plaintext`.
    ///
    /// # Errors
    /// Returns [`HasherError::Hash`] if the primitive fails.
    fn hash(&self, plaintext: &str) -> Result<String, HasherError>;

    /// Check `plaintext` against a stored digest.
    ///
    /// # Errors
    /// Returns [`HasherError::MalformedDigest`] if `digest` cannot be
    /// parsed, [`HasherError::Hash`] on any other primitive failure.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HasherError>;
}

/// Argon2id with the library's recommended parameters and a per-hash
/// random salt.
#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2PasswordHasher;

fn argon2() -> Argon2<'static> {
    Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String, HasherError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| HasherError::Hash(err.to_string()))?
            .to_string();
        Ok(digest)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, HasherError> {
        let parsed = PasswordHash::new(digest)
            .map_err(|err| HasherError::MalformedDigest(err.to_string()))?;
        match argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(HasherError::Hash(err.to_string())),
        }
    }
}
