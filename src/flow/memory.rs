//! In-memory repository backends.
//!
//! Artifacts are short-lived, so a mutexed map with `Instant`-based expiry
//! is enough for tests and local development; the mutex also gives the
//! atomic attempt accounting the protocol requires. Emails are expected to
//! be normalized by the caller.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::account::Account;
use super::artifact::{ArtifactPeek, ArtifactRecord, Purpose, SecretKind};
use super::repo::{AccountRepository, ArtifactRepository, ConsumeLookup, CreateOutcome};
use super::status::{StatusEvent, transition};

#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryAccountRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing the lifecycle rules. Test setup
    /// and local fixtures only.
    pub async fn seed(&self, account: Account) {
        let mut accounts = self.accounts.lock().await;
        accounts.insert(account.email.to_lowercase(), account);
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn get(&self, email: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.get(email).cloned())
    }

    async fn create(&self, account: &Account) -> Result<CreateOutcome> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.email.to_lowercase()) {
            return Ok(CreateOutcome::Conflict);
        }
        accounts.insert(account.email.to_lowercase(), account.clone());
        Ok(CreateOutcome::Created)
    }

    async fn transition(&self, email: &str, event: &StatusEvent) -> Result<Account> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| anyhow!("no account for {email}"))?;

        let next = transition(account.status, account.has_password, event)
            .with_context(|| format!("refused transition for {email}"))?;

        account.status = next.status;
        account.has_password = next.has_password;
        // Monotone: never cleared once set.
        account.email_validated = account.email_validated || next.email_validated;
        if let Some(registration) = next.registration {
            // Registration attributes are write-once.
            if account.registration_platform.is_none() {
                account.registration_platform = registration.platform;
            }
            if account.registration_location.is_none() {
                account.registration_location = registration.location;
            }
            if account.registration_location_state.is_none() {
                account.registration_location_state = registration.location_state;
            }
        }
        Ok(account.clone())
    }
}

struct StoredArtifact {
    record: ArtifactRecord,
    issued_at: Instant,
    consumed: bool,
}

#[derive(Default)]
pub struct MemoryArtifactRepository {
    artifacts: Mutex<HashMap<(String, Purpose), StoredArtifact>>,
}

impl MemoryArtifactRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepository for MemoryArtifactRepository {
    async fn put(&self, record: ArtifactRecord) -> Result<Uuid> {
        let id = record.id;
        let key = (record.email.clone(), record.purpose);
        let mut artifacts = self.artifacts.lock().await;
        // Insert supersedes: the previous artifact for this key stops
        // validating the moment the new one exists.
        artifacts.insert(
            key,
            StoredArtifact {
                record,
                issued_at: Instant::now(),
                consumed: false,
            },
        );
        Ok(id)
    }

    async fn consume(
        &self,
        email: &str,
        purpose: Purpose,
        secret_hash: &[u8],
    ) -> Result<ConsumeLookup> {
        let mut artifacts = self.artifacts.lock().await;
        let key = (email.to_string(), purpose);
        let Some(stored) = artifacts.get_mut(&key) else {
            return Ok(ConsumeLookup::Missing);
        };

        if stored.consumed {
            // Replay of a consumed artifact is a peek, not a consume.
            return Ok(ConsumeLookup::Missing);
        }
        if stored.record.kind == SecretKind::Passcode && stored.record.attempts_remaining <= 0 {
            return Ok(ConsumeLookup::Missing);
        }
        if stored.issued_at.elapsed() > stored.record.ttl {
            return Ok(ConsumeLookup::TtlExpired);
        }

        if stored.record.secret_hash != secret_hash {
            return match stored.record.kind {
                // Wrong link tokens look exactly like missing ones.
                SecretKind::Token => Ok(ConsumeLookup::Missing),
                SecretKind::Passcode => {
                    stored.record.attempts_remaining -= 1;
                    Ok(ConsumeLookup::Mismatch {
                        attempts_remaining: stored.record.attempts_remaining,
                    })
                }
            };
        }

        stored.consumed = true;
        Ok(ConsumeLookup::Matched(stored.record.clone()))
    }

    async fn peek(&self, email: &str, purpose: Purpose) -> Result<Option<ArtifactPeek>> {
        let artifacts = self.artifacts.lock().await;
        let Some(stored) = artifacts.get(&(email.to_string(), purpose)) else {
            return Ok(None);
        };
        if !stored.consumed && stored.issued_at.elapsed() > stored.record.ttl {
            return Ok(None);
        }
        Ok(Some(ArtifactPeek {
            purpose: stored.record.purpose,
            kind: stored.record.kind,
            consumed: stored.consumed,
            redirect: stored.record.redirect.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::artifact::hash_secret;
    use crate::flow::redirect::RedirectContext;
    use crate::flow::status::{AccountStatus, RegistrationContext, RegistrationPlatform};
    use std::time::Duration;

    fn passcode_record(email: &str, secret: &str) -> ArtifactRecord {
        ArtifactRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            purpose: Purpose::Register,
            kind: SecretKind::Passcode,
            secret_hash: hash_secret(secret),
            attempts_remaining: 5,
            platform: RegistrationPlatform::Profile,
            location: None,
            location_state: None,
            redirect: RedirectContext::default(),
            ttl: Duration::from_secs(30 * 60),
        }
    }

    #[tokio::test]
    async fn supersession_invalidates_previous_secret() -> Result<()> {
        let repo = MemoryArtifactRepository::new();
        repo.put(passcode_record("a@example.com", "111111")).await?;
        repo.put(passcode_record("a@example.com", "222222")).await?;

        // Old secret mismatches against the superseding artifact.
        let lookup = repo
            .consume("a@example.com", Purpose::Register, &hash_secret("111111"))
            .await?;
        assert!(matches!(lookup, ConsumeLookup::Mismatch { .. }));

        let lookup = repo
            .consume("a@example.com", Purpose::Register, &hash_secret("222222"))
            .await?;
        assert!(matches!(lookup, ConsumeLookup::Matched(_)));
        Ok(())
    }

    #[tokio::test]
    async fn consumed_artifact_reports_missing() -> Result<()> {
        let repo = MemoryArtifactRepository::new();
        repo.put(passcode_record("a@example.com", "111111")).await?;
        let hash = hash_secret("111111");
        assert!(matches!(
            repo.consume("a@example.com", Purpose::Register, &hash).await?,
            ConsumeLookup::Matched(_)
        ));
        assert!(matches!(
            repo.consume("a@example.com", Purpose::Register, &hash).await?,
            ConsumeLookup::Missing
        ));
        Ok(())
    }

    #[tokio::test]
    async fn ttl_expiry_is_reported() -> Result<()> {
        let repo = MemoryArtifactRepository::new();
        let mut record = passcode_record("a@example.com", "111111");
        record.ttl = Duration::from_millis(0);
        repo.put(record).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(
            repo.consume("a@example.com", Purpose::Register, &hash_secret("111111"))
                .await?,
            ConsumeLookup::TtlExpired
        ));
        Ok(())
    }

    #[tokio::test]
    async fn peek_never_consumes() -> Result<()> {
        let repo = MemoryArtifactRepository::new();
        repo.put(passcode_record("a@example.com", "111111")).await?;

        let peek = repo.peek("a@example.com", Purpose::Register).await?;
        assert!(matches!(peek, Some(ArtifactPeek { consumed: false, .. })));

        let lookup = repo
            .consume("a@example.com", Purpose::Register, &hash_secret("111111"))
            .await?;
        assert!(matches!(lookup, ConsumeLookup::Matched(_)));

        let peek = repo.peek("a@example.com", Purpose::Register).await?;
        assert!(matches!(peek, Some(ArtifactPeek { consumed: true, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn transition_records_registration_once() -> Result<()> {
        let repo = MemoryAccountRepository::new();
        repo.seed(Account::staged("a@example.com")).await;

        let event = StatusEvent::EmailVerified(RegistrationContext {
            platform: Some(RegistrationPlatform::AndroidLiveApp),
            location: Some("GB".to_string()),
            location_state: None,
        });
        let account = repo.transition("a@example.com", &event).await?;
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(
            account.registration_platform,
            Some(RegistrationPlatform::AndroidLiveApp)
        );

        // A later password reset must not rewrite registration attributes.
        let event = StatusEvent::PasswordSet(RegistrationContext {
            platform: Some(RegistrationPlatform::Profile),
            location: Some("US".to_string()),
            location_state: Some("CA".to_string()),
        });
        let account = repo.transition("a@example.com", &event).await?;
        assert_eq!(
            account.registration_platform,
            Some(RegistrationPlatform::AndroidLiveApp)
        );
        assert_eq!(account.registration_location.as_deref(), Some("GB"));
        Ok(())
    }
}
