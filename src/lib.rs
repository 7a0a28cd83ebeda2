//! # Vestibule (Account Verification Flow Gateway)
//!
//! `vestibule` sits between a profile frontend and the account store. It drives
//! email-verified account flows: registration, password creation and reset, and
//! passcode sign-in.
//!
//! ## Flow Model
//!
//! Each flow starts by issuing a single-use verification artifact for an email
//! address and purpose, delivered out of band through a transactional email
//! outbox. Consuming the artifact proves control of the mailbox and advances
//! the account through its status machine.
//!
//! - **Statuses:** `STAGED`, `PROVISIONED`, `ACTIVE`, `RECOVERY`,
//!   `PASSWORD_EXPIRED`, `SUSPENDED`. Transitions are monotonic; `SUSPENDED`
//!   is terminal.
//! - **Artifacts:** six-digit passcodes with a fixed attempt budget, or opaque
//!   link tokens. Only SHA-256 digests are stored. Issuing a new artifact for
//!   the same email and purpose supersedes the previous one.
//! - **Enumeration resistance:** issuance for an unknown account returns a
//!   decoy response indistinguishable from a real one.
//!
//! ## Redirect Contract
//!
//! Flow requests carry a redirect context. Persistable parameters (`returnUrl`,
//! `ref`, `refViewId`, `clientId`) survive the email round trip inside the
//! stored artifact; native app parameters (`appClientId`, `fromURI`) are only
//! honored when presented explicitly at consumption time.

pub mod api;
pub mod cli;
pub mod flow;

pub const GIT_COMMIT_HASH: &str = match option_env!("GIT_COMMIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
