//! Repository seams for accounts and verification artifacts.
//!
//! Account state is never ambient: callers hold explicit repository handles
//! and every status change goes through `transition`. Two backends exist,
//! Postgres for the server and an in-memory one for tests and local dev.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::account::Account;
use super::artifact::{ArtifactPeek, ArtifactRecord, Purpose};
use super::status::StatusEvent;

/// Outcome when inserting a new account.
#[derive(Debug)]
pub enum CreateOutcome {
    Created,
    /// Another request created the account first; callers re-read.
    Conflict,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Case-insensitive lookup by email.
    async fn get(&self, email: &str) -> Result<Option<Account>>;

    /// Insert a new account; unique-violation maps to `Conflict`.
    async fn create(&self, account: &Account) -> Result<CreateOutcome>;

    /// Atomically apply a lifecycle event and return the updated account.
    ///
    /// Implementations delegate the edge rules to [`super::status::transition`]
    /// and must keep `email_validated` monotone.
    async fn transition(&self, email: &str, event: &StatusEvent) -> Result<Account>;
}

/// Result of validating a submitted secret against the live artifact.
#[derive(Debug)]
pub enum ConsumeLookup {
    /// Secret matched; the artifact is now consumed.
    Matched(ArtifactRecord),
    /// Wrong passcode; the attempt was counted. Zero remaining means the
    /// artifact is exhausted.
    Mismatch { attempts_remaining: i32 },
    /// A live artifact existed but its TTL had passed.
    TtlExpired,
    /// No live artifact for this email and purpose.
    Missing,
}

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Store a new artifact. Any live artifact for the same
    /// `(email, purpose)` is superseded: issuance is last-writer-wins, not
    /// additive.
    async fn put(&self, record: ArtifactRecord) -> Result<Uuid>;

    /// Validate `secret_hash` against the live artifact and account for the
    /// attempt atomically, so concurrent submissions cannot stretch the
    /// attempt budget.
    ///
    /// A mismatched link token is indistinguishable from a missing one and
    /// reports `Missing`; only passcodes carry an attempt counter.
    async fn consume(
        &self,
        email: &str,
        purpose: Purpose,
        secret_hash: &[u8],
    ) -> Result<ConsumeLookup>;

    /// Read-only snapshot of the most recent artifact, consumed or live.
    /// Never alters `attempts_remaining` or `consumed`.
    async fn peek(&self, email: &str, purpose: Purpose) -> Result<Option<ArtifactPeek>>;
}
