//! Per-function OTP policies and their registry.
//!
//! Every business flow that issues OTPs (`sign_up`, `sign_in`, ...) gets
//! one [`FunctionPolicy`]. Policies are validated when the registry is
//! built, so a bad table fails loudly at startup instead of at the first
//! verification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::OtpError;

const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(30 * 60);
const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_PASSWORD_LENGTH: u32 = 6;
const DEFAULT_FAILURE_RATE_LIMIT: i64 = 10;
const DEFAULT_FAILURE_RATE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Issuance and verification policy for one function name.
///
/// `expires_seconds` and `max_attempts` are snapshotted onto each record
/// at creation, so editing a policy never retroactively changes records
/// already in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPolicy {
    function_name: String,
    expires_in: Duration,
    max_attempts: i32,
    password_length: u32,
    failure_rate_limit: i64,
    failure_rate_window: Duration,
}

impl FunctionPolicy {
    #[must_use]
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            expires_in: DEFAULT_EXPIRES_IN,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            password_length: DEFAULT_PASSWORD_LENGTH,
            failure_rate_limit: DEFAULT_FAILURE_RATE_LIMIT,
            failure_rate_window: DEFAULT_FAILURE_RATE_WINDOW,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_password_length(mut self, password_length: u32) -> Self {
        self.password_length = password_length;
        self
    }

    #[must_use]
    pub fn with_failure_rate_limit(mut self, failure_rate_limit: i64) -> Self {
        self.failure_rate_limit = failure_rate_limit;
        self
    }

    #[must_use]
    pub fn with_failure_rate_window(mut self, failure_rate_window: Duration) -> Self {
        self.failure_rate_window = failure_rate_window;
        self
    }

    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    #[must_use]
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    #[must_use]
    pub fn password_length(&self) -> u32 {
        self.password_length
    }

    #[must_use]
    pub fn failure_rate_limit(&self) -> i64 {
        self.failure_rate_limit
    }

    #[must_use]
    pub fn failure_rate_window(&self) -> Duration {
        self.failure_rate_window
    }

    /// Check every field against its shape contract.
    ///
    /// # Errors
    /// Returns [`OtpError::PolicyInvalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), OtpError> {
        if self.function_name.trim().is_empty() {
            return Err(self.invalid("function name is empty"));
        }
        if self.expires_in.is_zero() {
            return Err(self.invalid("expires_in must be a positive duration"));
        }
        if self.max_attempts <= 0 {
            return Err(self.invalid("max_attempts must be positive"));
        }
        if self.password_length == 0 {
            return Err(self.invalid("password_length must be positive"));
        }
        if self.failure_rate_limit < 0 {
            return Err(self.invalid("failure_rate_limit must not be negative"));
        }
        if self.failure_rate_window.is_zero() {
            return Err(self.invalid("failure_rate_window must be a positive duration"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> OtpError {
        OtpError::PolicyInvalid {
            function_name: self.function_name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Immutable lookup table of [`FunctionPolicy`] values keyed by function
/// name. Validation runs once here, which covers the per-lookup contract:
/// nothing can reach `resolve` unvalidated.
#[derive(Clone, Debug)]
pub struct PolicyRegistry {
    policies: HashMap<String, FunctionPolicy>,
}

impl PolicyRegistry {
    /// Build a registry from a policy table.
    ///
    /// # Errors
    /// Returns [`OtpError::PolicyInvalid`] for the first malformed or
    /// duplicated policy.
    pub fn new(policies: impl IntoIterator<Item = FunctionPolicy>) -> Result<Self, OtpError> {
        let mut table = HashMap::new();
        for policy in policies {
            policy.validate()?;
            if table.contains_key(policy.function_name()) {
                return Err(OtpError::PolicyInvalid {
                    function_name: policy.function_name().to_string(),
                    reason: "duplicate function name".to_string(),
                });
            }
            table.insert(policy.function_name().to_string(), policy);
        }
        Ok(Self { policies: table })
    }

    /// Look up the policy for a function name.
    ///
    /// # Errors
    /// Returns [`OtpError::PolicyNotFound`] if no policy is registered
    /// under `function_name`.
    pub fn resolve(&self, function_name: &str) -> Result<&FunctionPolicy, OtpError> {
        self.policies
            .get(function_name)
            .ok_or_else(|| OtpError::PolicyNotFound(function_name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, function_name: &str) -> bool {
        self.policies.contains_key(function_name)
    }
}
