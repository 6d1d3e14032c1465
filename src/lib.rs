//! # Sesamo (One-Time Password Engine)
//!
//! `sesamo` issues and verifies short-lived one-time passwords for
//! sensitive flows such as sign-in, sign-up, or account recovery. Each
//! flow registers a [`FunctionPolicy`] under a function name; the
//! [`OtpService`] engine then drives the full lifecycle:
//!
//! - **Issuance** generates a random numeric password, stores only its
//!   `Argon2id` hash together with a snapshot of the policy's expiry and
//!   attempt budget, and enforces a per-user rate limit over recent
//!   failed attempts before anything is written.
//! - **Client-token handshake** binds a multi-step flow to one client: a
//!   single-use random token is rotated on every successful presentation
//!   and destroyed on the first wrong one.
//! - **Password verification** checks liveness (not yet authenticated,
//!   inside the expiry window, attempts remaining) before comparing
//!   hashes, counts only genuine mismatches against the attempt budget,
//!   and marks authentication exactly once.
//!
//! Records live behind the [`RecordStore`] trait with a `PostgreSQL`
//! implementation ([`PgRecordStore`]) and an in-memory one
//! ([`MemoryRecordStore`]) for tests and embedding. Time is injected via
//! [`Clock`], so expiry and rate-window behavior is testable to the
//! millisecond with [`ManualClock`].
//!
//! Plaintext passwords exist only inside the [`IssuedOtp`] returned at
//! issuance; delivery to the user is the caller's concern and happens
//! out-of-band.

pub mod clock;
pub mod error;
pub mod hasher;
pub mod models;
pub mod policy;
pub mod secret;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{HasherError, OtpError, StoreError};
pub use hasher::{Argon2PasswordHasher, PasswordHasher};
pub use models::{NewOtpRecord, OtpHandle, OtpRecord};
pub use policy::{FunctionPolicy, PolicyRegistry};
pub use service::{
    DenialReason, IssueOutcome, IssuedOtp, OtpService, PasswordOutcome, TokenOutcome,
};
pub use store::{MemoryRecordStore, PgRecordStore, RecordStore};
