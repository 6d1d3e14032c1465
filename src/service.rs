//! The OTP lifecycle engine.
//!
//! [`OtpService`] orchestrates issuance under rate limiting, the
//! client-token handshake, and password verification with its state
//! transitions. It owns no mutable state: records live behind the
//! injected [`RecordStore`], time comes from the injected [`Clock`], and
//! hashing from the injected [`PasswordHasher`], so every policy decision
//! here is a pure function of what those collaborators return.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::OtpError;
use crate::hasher::PasswordHasher;
use crate::models::{NewOtpRecord, OtpHandle, OtpRecord};
use crate::policy::PolicyRegistry;
use crate::secret;
use crate::store::RecordStore;

/// Result of [`OtpService::issue`].
#[derive(Debug)]
pub enum IssueOutcome {
    Issued(IssuedOtp),
    /// Recent failures for this user exceed the policy's rate limit; no
    /// record was created.
    RateLimited,
}

/// A freshly issued OTP.
///
/// The plaintext password exists only in this value; the store keeps a
/// one-way hash and there is no way to read the password back later. The
/// caller is responsible for delivering it out-of-band.
#[derive(Debug)]
pub struct IssuedOtp {
    pub handle: OtpHandle,
    pub client_token: String,
    pub password: SecretString,
}

/// Result of [`OtpService::verify_client_token`].
#[derive(Debug, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The presented token matched; the replacement returned here is now
    /// the only token the record accepts.
    Rotated(String),
    /// The presented token was empty or mismatched; the stored token is
    /// cleared and the handshake is dead.
    Rejected,
}

/// Result of [`OtpService::verify_password`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordOutcome {
    Authenticated,
    Denied(DenialReason),
}

/// Why a password verification was denied.
///
/// The distinction drives state transitions and belongs to the embedding
/// application only. Surfacing it to end users invites enumeration;
/// collapse every reason into one generic rejection at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The record already authenticated once; an OTP never succeeds
    /// twice.
    AlreadyAuthenticated,
    Expired,
    AttemptLimitReached,
    PasswordMismatch,
}

/// The OTP lifecycle engine. Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct OtpService {
    registry: PolicyRegistry,
    store: Arc<dyn RecordStore>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    normalize_user_keys: bool,
}

impl OtpService {
    /// Build an engine on the system clock with user-key normalization
    /// enabled.
    #[must_use]
    pub fn new(
        registry: PolicyRegistry,
        store: Arc<dyn RecordStore>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            registry,
            store,
            hasher,
            clock: Arc::new(SystemClock),
            normalize_user_keys: true,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Toggle lowercasing of user keys. Keys are always trimmed; an
    /// all-whitespace key is rejected either way.
    #[must_use]
    pub fn with_user_key_normalization(mut self, enabled: bool) -> Self {
        self.normalize_user_keys = enabled;
        self
    }

    /// Issue a new OTP for `function_name` and `user_key`.
    ///
    /// Recent failed attempts are summed over the policy's rate window
    /// first; a sum strictly above the limit returns
    /// [`IssueOutcome::RateLimited`] without creating a record. A sum
    /// equal to the limit still proceeds. The check and the insert are
    /// not serialized, so concurrent calls for one user can overshoot
    /// the limit slightly: it is a soft limit, not admission control.
    ///
    /// # Errors
    /// [`OtpError::PolicyNotFound`] for an unregistered function name,
    /// [`OtpError::MissingUserKey`] for an empty key, plus store, hasher,
    /// and randomness failures.
    pub async fn issue(
        &self,
        function_name: &str,
        user_key: &str,
    ) -> Result<IssueOutcome, OtpError> {
        let policy = self.registry.resolve(function_name)?;
        let user_key = self.user_key(user_key)?;
        let now = self.clock.now();

        let window = chrono::Duration::from_std(policy.failure_rate_window())
            .unwrap_or(chrono::Duration::MAX);
        let since = now
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        let recent_failed = self.store.sum_failed_count_since(&user_key, since).await?;
        if recent_failed > policy.failure_rate_limit() {
            debug!(
                function_name,
                recent_failed,
                limit = policy.failure_rate_limit(),
                "otp issuance rate limited"
            );
            return Ok(IssueOutcome::RateLimited);
        }

        let password = secret::numeric_password(policy.password_length());
        let password_hash = self.hasher.hash(&password)?;
        let client_token = secret::client_token()?;

        let record = self
            .store
            .insert(NewOtpRecord {
                function_name: function_name.to_string(),
                user_key,
                password_hash,
                client_token: Some(client_token.clone()),
                expires_seconds: i64::try_from(policy.expires_in().as_secs())
                    .unwrap_or(i64::MAX),
                max_attempts: policy.max_attempts(),
            })
            .await?;

        debug!(function_name, record_id = %record.id, "issued otp");
        Ok(IssueOutcome::Issued(IssuedOtp {
            handle: OtpHandle::new(record.id),
            client_token,
            password: SecretString::from(password),
        }))
    }

    /// Handle of the most recently created record for `(function_name,
    /// user_key)`, or `None`.
    ///
    /// # Errors
    /// [`OtpError::PolicyNotFound`] for an unregistered function name
    /// (lookups go through the same single source of truth as issuance),
    /// plus [`OtpError::MissingUserKey`] and store failures.
    pub async fn find(
        &self,
        function_name: &str,
        user_key: &str,
    ) -> Result<Option<OtpHandle>, OtpError> {
        self.registry.resolve(function_name)?;
        let user_key = self.user_key(user_key)?;
        let record = self.store.most_recent(function_name, &user_key).await?;
        Ok(record.map(|record| OtpHandle::new(record.id)))
    }

    /// Current state of the record behind `handle`.
    ///
    /// # Errors
    /// [`OtpError::RecordNotFound`] if the handle no longer resolves.
    pub async fn fetch(&self, handle: OtpHandle) -> Result<OtpRecord, OtpError> {
        let record = self.store.fetch(handle.id()).await?;
        record.ok_or(OtpError::RecordNotFound(handle.id()))
    }

    /// Whether `record` is outside its closed verification interval
    /// `[created_at, created_at + expires_seconds]` right now.
    #[must_use]
    pub fn is_expired(&self, record: &OtpRecord) -> bool {
        record.is_expired(self.clock.now())
    }

    #[must_use]
    pub fn is_under_attempt_limit(&self, record: &OtpRecord) -> bool {
        record.is_under_attempt_limit()
    }

    /// Run one round of the client-token handshake.
    ///
    /// A non-empty presented token that equals the stored non-empty token
    /// rotates it and returns the replacement; anything else clears the
    /// stored token. Either way the token write is persisted, so a correct
    /// token can be presented exactly once. The write covers the token
    /// column alone; a password verification landing on the same record
    /// in parallel keeps its counter and timestamp. Liveness is not
    /// consulted; the password check is the sole authority on expiry and
    /// attempts.
    ///
    /// # Errors
    /// [`OtpError::RecordNotFound`] for a dangling handle, plus store and
    /// randomness failures.
    pub async fn verify_client_token(
        &self,
        handle: OtpHandle,
        presented: &str,
    ) -> Result<TokenOutcome, OtpError> {
        let record = self.fetch(handle).await?;

        let token_matches = !presented.is_empty()
            && record
                .client_token
                .as_deref()
                .is_some_and(|stored| !stored.is_empty() && stored == presented);

        if token_matches {
            let rotated = secret::client_token()?;
            self.store
                .set_client_token(record.id, Some(rotated.as_str()))
                .await?;
            Ok(TokenOutcome::Rotated(rotated))
        } else {
            self.store.set_client_token(record.id, None).await?;
            debug!(record_id = %record.id, "client token rejected");
            Ok(TokenOutcome::Rejected)
        }
    }

    /// Verify a presented password and apply the resulting transition.
    ///
    /// Liveness is settled before any hash comparison: an already
    /// authenticated, expired, or out-of-attempts record denies without
    /// touching the hasher and without a store write, so `failed_count`
    /// only ever moves on a genuine mismatch and stops at `max_attempts`.
    /// On a match the record authenticates (timestamp set once, client
    /// token cleared); on a mismatch the failed-attempt counter is
    /// incremented atomically.
    ///
    /// # Errors
    /// [`OtpError::RecordNotFound`] for a dangling handle, plus store and
    /// hasher failures.
    pub async fn verify_password(
        &self,
        handle: OtpHandle,
        presented: &str,
    ) -> Result<PasswordOutcome, OtpError> {
        let record = self.fetch(handle).await?;
        let now = self.clock.now();

        if record.is_authenticated() {
            return Ok(PasswordOutcome::Denied(DenialReason::AlreadyAuthenticated));
        }
        if record.is_expired(now) {
            return Ok(PasswordOutcome::Denied(DenialReason::Expired));
        }
        if !record.is_under_attempt_limit() {
            return Ok(PasswordOutcome::Denied(DenialReason::AttemptLimitReached));
        }

        if self.hasher.verify(presented, &record.password_hash)? {
            self.store.mark_authenticated(record.id, now).await?;
            debug!(record_id = %record.id, "otp authenticated");
            Ok(PasswordOutcome::Authenticated)
        } else {
            self.store.record_failed_attempt(record.id).await?;
            debug!(record_id = %record.id, "otp password mismatch");
            Ok(PasswordOutcome::Denied(DenialReason::PasswordMismatch))
        }
    }

    fn user_key(&self, raw: &str) -> Result<String, OtpError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OtpError::MissingUserKey);
        }
        if self.normalize_user_keys {
            Ok(trimmed.to_lowercase())
        } else {
            Ok(trimmed.to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{IssueOutcome, OtpService};
    use crate::clock::ManualClock;
    use crate::error::OtpError;
    use crate::hasher::Argon2PasswordHasher;
    use crate::policy::{FunctionPolicy, PolicyRegistry};
    use crate::store::MemoryRecordStore;
    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn service() -> (OtpService, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let registry = PolicyRegistry::new([FunctionPolicy::new("sign_in")]).unwrap();
        let store = Arc::new(MemoryRecordStore::with_clock(Arc::new(clock.clone())));
        let service = OtpService::new(registry, store, Arc::new(Argon2PasswordHasher))
            .with_clock(Arc::new(clock.clone()));
        (service, clock)
    }

    #[tokio::test]
    async fn unknown_function_name_fails_loudly() -> Result<()> {
        let (service, _clock) = service();
        let err = service.issue("password_reset", "user@example.com").await;
        assert!(matches!(err, Err(OtpError::PolicyNotFound(_))));

        let err = service.find("password_reset", "user@example.com").await;
        assert!(matches!(err, Err(OtpError::PolicyNotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn blank_user_key_is_rejected_before_the_store() -> Result<()> {
        let (service, _clock) = service();
        let err = service.issue("sign_in", "   ").await;
        assert!(matches!(err, Err(OtpError::MissingUserKey)));
        Ok(())
    }

    #[tokio::test]
    async fn user_keys_are_trimmed_and_lowercased_by_default() -> Result<()> {
        let (service, _clock) = service();
        let outcome = service.issue("sign_in", "  User@Example.COM ").await?;
        assert!(matches!(outcome, IssueOutcome::Issued(_)));

        let handle = service.find("sign_in", "user@example.com").await?;
        let record = service.fetch(handle.unwrap()).await?;
        assert_eq!(record.user_key, "user@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn normalization_toggle_preserves_case() -> Result<()> {
        let (service, _clock) = service();
        let service = service.with_user_key_normalization(false);

        service.issue("sign_in", " User@Example.COM ").await?;
        let handle = service.find("sign_in", "User@Example.COM").await?;
        let record = service.fetch(handle.unwrap()).await?;
        assert_eq!(record.user_key, "User@Example.COM");

        assert!(service.find("sign_in", "user@example.com").await?.is_none());
        Ok(())
    }
}
