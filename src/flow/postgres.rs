//! Postgres-backed repositories.
//!
//! Queries follow the storage discipline of the rest of the service:
//! instrumented with `db.query` spans, unique violations mapped to
//! conflicts, and every secret column holding a hash rather than the raw
//! value. Attempt accounting happens inside a row-locked transaction so
//! racing submissions cannot stretch the budget.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::account::Account;
use super::artifact::{ArtifactPeek, ArtifactRecord, Purpose, SecretKind};
use super::repo::{AccountRepository, ArtifactRepository, ConsumeLookup, CreateOutcome};
use super::status::{AccountStatus, RegistrationPlatform, StatusEvent, transition};

pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account> {
    let status: String = row.get("status");
    let status = AccountStatus::parse(&status)
        .ok_or_else(|| anyhow!("unknown account status in store: {status}"))?;
    let platform: Option<String> = row.get("registration_platform");
    let platform = match platform {
        Some(value) => Some(
            RegistrationPlatform::parse(&value)
                .ok_or_else(|| anyhow!("unknown registration platform in store: {value}"))?,
        ),
        None => None,
    };
    Ok(Account {
        id: row.get("id"),
        email: row.get("email"),
        status,
        has_password: row.get("has_password"),
        email_validated: row.get("email_validated"),
        registration_platform: platform,
        registration_location: row.get("registration_location"),
        registration_location_state: row.get("registration_location_state"),
    })
}

const ACCOUNT_COLUMNS: &str = "id, email, status, has_password, email_validated, \
     registration_platform, registration_location, registration_location_state";

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn get(&self, email: &str) -> Result<Option<Account>> {
        let query = "SELECT id, email, status, has_password, email_validated, \
             registration_platform, registration_location, registration_location_state \
             FROM accounts WHERE lower(email) = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;
        row.map(|row| account_from_row(&row)).transpose()
    }

    async fn create(&self, account: &Account) -> Result<CreateOutcome> {
        let query = r"
            INSERT INTO accounts
                (id, email, status, has_password, email_validated)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(account.status.as_str())
            .bind(account.has_password)
            .bind(account.email_validated)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert account"),
        }
    }

    async fn transition(&self, email: &str, event: &StatusEvent) -> Result<Account> {
        // Row lock keeps the read-modify-write atomic under concurrent
        // consumptions for the same account.
        let mut tx = self.pool.begin().await.context("begin transition")?;

        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = $1 FOR UPDATE"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock account for transition")?
            .ok_or_else(|| anyhow!("no account for {email}"))?;
        let account = account_from_row(&row)?;

        let next = transition(account.status, account.has_password, event)
            .with_context(|| format!("refused transition for {email}"))?;

        let registration = next.registration.unwrap_or_default();
        let query = r"
            UPDATE accounts
            SET status = $2,
                has_password = $3,
                email_validated = email_validated OR $4,
                registration_platform = COALESCE(registration_platform, $5),
                registration_location = COALESCE(registration_location, $6),
                registration_location_state = COALESCE(registration_location_state, $7),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(next.status.as_str())
            .bind(next.has_password)
            .bind(next.email_validated)
            .bind(registration.platform.map(RegistrationPlatform::as_str))
            .bind(&registration.location)
            .bind(&registration.location_state)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to update account status")?;

        tx.commit().await.context("commit transition")?;

        Ok(Account {
            status: next.status,
            has_password: next.has_password,
            email_validated: account.email_validated || next.email_validated,
            registration_platform: account.registration_platform.or(registration.platform),
            registration_location: account
                .registration_location
                .clone()
                .or(registration.location),
            registration_location_state: account
                .registration_location_state
                .clone()
                .or(registration.location_state),
            ..account
        })
    }
}

pub struct PgArtifactRepository {
    pool: PgPool,
}

impl PgArtifactRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactRepository for PgArtifactRepository {
    async fn put(&self, record: ArtifactRecord) -> Result<Uuid> {
        // Supersede-then-insert in one transaction so there is never more
        // than one live artifact per (email, purpose).
        let mut tx = self.pool.begin().await.context("begin artifact put")?;

        let query = r"
            UPDATE flow_artifacts
            SET superseded_at = NOW()
            WHERE email = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND superseded_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&record.email)
            .bind(record.purpose.as_str())
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to supersede previous artifact")?;

        let redirect_json =
            serde_json::to_string(&record.redirect).context("failed to serialize redirect")?;
        let ttl_seconds = i64::try_from(record.ttl.as_secs()).unwrap_or(i64::MAX);

        let query = r"
            INSERT INTO flow_artifacts
                (id, email, purpose, kind, secret_hash, attempts_remaining,
                 platform, location, location_state, redirect_json, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10::jsonb,
                    NOW() + ($11 * INTERVAL '1 second'))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.id)
            .bind(&record.email)
            .bind(record.purpose.as_str())
            .bind(record.kind.as_str())
            .bind(&record.secret_hash)
            .bind(record.attempts_remaining)
            .bind(record.platform.as_str())
            .bind(&record.location)
            .bind(&record.location_state)
            .bind(redirect_json)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert artifact")?;

        tx.commit().await.context("commit artifact put")?;
        Ok(record.id)
    }

    async fn consume(
        &self,
        email: &str,
        purpose: Purpose,
        secret_hash: &[u8],
    ) -> Result<ConsumeLookup> {
        let mut tx = self.pool.begin().await.context("begin artifact consume")?;

        let query = r"
            SELECT id, kind, secret_hash, attempts_remaining, platform,
                   location, location_state, redirect_json::text AS redirect_json,
                   (expires_at <= NOW()) AS expired,
                   EXTRACT(EPOCH FROM (expires_at - created_at))::bigint AS ttl_seconds
            FROM flow_artifacts
            WHERE email = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND superseded_at IS NULL
            FOR UPDATE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(purpose.as_str())
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to lock artifact")?;

        let Some(row) = row else {
            tx.commit().await.context("commit consume noop")?;
            return Ok(ConsumeLookup::Missing);
        };

        let id: Uuid = row.get("id");
        let kind: String = row.get("kind");
        let kind =
            SecretKind::parse(&kind).ok_or_else(|| anyhow!("unknown artifact kind: {kind}"))?;
        let attempts_remaining: i32 = row.get("attempts_remaining");
        let expired: bool = row.get("expired");

        if kind == SecretKind::Passcode && attempts_remaining <= 0 {
            tx.commit().await.context("commit consume noop")?;
            return Ok(ConsumeLookup::Missing);
        }
        if expired {
            tx.commit().await.context("commit consume noop")?;
            return Ok(ConsumeLookup::TtlExpired);
        }

        let stored_hash: Vec<u8> = row.get("secret_hash");
        if stored_hash != secret_hash {
            if kind == SecretKind::Token {
                // Wrong tokens are indistinguishable from missing ones.
                tx.commit().await.context("commit consume noop")?;
                return Ok(ConsumeLookup::Missing);
            }
            let query = r"
                UPDATE flow_artifacts
                SET attempts_remaining = attempts_remaining - 1
                WHERE id = $1
                RETURNING attempts_remaining
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(id)
                .fetch_one(&mut *tx)
                .instrument(span)
                .await
                .context("failed to decrement attempts")?;
            let attempts_remaining: i32 = row.get("attempts_remaining");
            tx.commit().await.context("commit attempt decrement")?;
            return Ok(ConsumeLookup::Mismatch { attempts_remaining });
        }

        let query = r"
            UPDATE flow_artifacts
            SET consumed_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to mark artifact consumed")?;
        tx.commit().await.context("commit consume")?;

        let platform: String = row.get("platform");
        let platform = RegistrationPlatform::parse(&platform)
            .ok_or_else(|| anyhow!("unknown platform in store: {platform}"))?;
        let redirect_json: String = row.get("redirect_json");
        let redirect =
            serde_json::from_str(&redirect_json).context("failed to parse redirect context")?;
        let ttl_seconds: i64 = row.get("ttl_seconds");

        Ok(ConsumeLookup::Matched(ArtifactRecord {
            id,
            email: email.to_string(),
            purpose,
            kind,
            secret_hash: stored_hash,
            attempts_remaining,
            platform,
            location: row.get("location"),
            location_state: row.get("location_state"),
            redirect,
            ttl: Duration::from_secs(u64::try_from(ttl_seconds).unwrap_or(0)),
        }))
    }

    async fn peek(&self, email: &str, purpose: Purpose) -> Result<Option<ArtifactPeek>> {
        // Latest non-superseded artifact, consumed or still live. Plain
        // SELECT: peeking must not alter attempts or consumption state.
        let query = r"
            SELECT purpose, kind, (consumed_at IS NOT NULL) AS consumed,
                   redirect_json::text AS redirect_json
            FROM flow_artifacts
            WHERE email = $1
              AND purpose = $2
              AND superseded_at IS NULL
              AND (consumed_at IS NOT NULL OR expires_at > NOW())
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to peek artifact")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: String = row.get("kind");
        let kind =
            SecretKind::parse(&kind).ok_or_else(|| anyhow!("unknown artifact kind: {kind}"))?;
        let redirect_json: String = row.get("redirect_json");
        let redirect =
            serde_json::from_str(&redirect_json).context("failed to parse redirect context")?;

        Ok(Some(ArtifactPeek {
            purpose,
            kind,
            consumed: row.get("consumed"),
            redirect,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::is_unique_violation;

    #[test]
    fn unique_violation_ignores_other_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
