//! Operation outcomes and the next-location contract.
//!
//! Outcomes are plain enums, not error types: a wrong passcode is a normal
//! protocol answer, and only infrastructure failures travel as errors.

use serde_json::Value;
use uuid::Uuid;

use super::account::Account;
use super::artifact::Purpose;
use super::redirect::RedirectContext;

pub const TEMPLATE_VERIFICATION_CODE: &str = "verification_code";
pub const TEMPLATE_CREATE_PASSWORD: &str = "create_password";
pub const TEMPLATE_SET_PASSWORD: &str = "set_password";
pub const TEMPLATE_RESET_PASSWORD: &str = "reset_password";
pub const TEMPLATE_ACCOUNT_EXISTS: &str = "account_exists";

/// Mail the caller must dispatch for a successful issuance. The payload
/// carries the raw secret (code or link); it exists only in flight and is
/// never stored.
#[derive(Clone, Debug)]
pub struct EmailRequest {
    pub to_email: String,
    pub template: &'static str,
    pub payload: Value,
}

#[derive(Debug)]
pub enum IssueOutcome {
    /// Artifact stored and an email handed back for dispatch.
    Dispatched {
        artifact_id: Uuid,
        email: EmailRequest,
    },
    /// Unknown account on a code path: the caller shows the generic
    /// enter-code page, nothing is sent, and the decoy id keeps the
    /// response shape indistinguishable from a real issuance.
    CodeEntryOnly { decoy_id: Uuid },
    /// Suspended accounts get a deliberately vague error and no artifact.
    Suspended,
}

#[derive(Debug)]
pub enum ConsumeOutcome {
    Success {
        account: Account,
        next_location: String,
        redirect: RedirectContext,
    },
    IncorrectCode {
        attempts_remaining: i32,
    },
    Expired,
    NotFound,
    AccountSuspended,
}

#[derive(Debug)]
pub enum PeekOutcome {
    /// The artifact was already consumed; safe to re-render the verified
    /// banner without a state change.
    Verified { redirect: RedirectContext },
    /// A live artifact is waiting for its secret.
    Pending,
    Nothing,
}

/// Page the consumer is redirected to after a successful consumption.
///
/// `prior` is the account as it stood before the transition; the routing
/// depends on what the user still has to do, not on the post-transition
/// state.
#[must_use]
pub fn next_location(
    purpose: Purpose,
    prior: &Account,
    redirect: &RedirectContext,
    fallback: &str,
) -> String {
    match purpose {
        Purpose::Register => {
            if prior.email_validated && prior.has_password {
                // Existing validated account: sign-in-style completion, or
                // straight back to the native app when its context is
                // present.
                if redirect.is_native() {
                    redirect.final_redirect(fallback)
                } else {
                    "/welcome/existing".to_string()
                }
            } else if prior.has_password {
                "/welcome/review".to_string()
            } else {
                "/welcome/password".to_string()
            }
        }
        Purpose::ResetPassword | Purpose::SetPassword => {
            if prior.has_password {
                "/reset-password/password".to_string()
            } else {
                "/set-password".to_string()
            }
        }
        Purpose::SignIn => redirect.final_redirect(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::status::AccountStatus;

    fn account(status: AccountStatus, has_password: bool, validated: bool) -> Account {
        let mut account = Account::staged("a@example.com");
        account.status = status;
        account.has_password = has_password;
        account.email_validated = validated;
        account
    }

    #[test]
    fn register_routes_by_password_state() {
        let ctx = RedirectContext::default();
        assert_eq!(
            next_location(
                Purpose::Register,
                &account(AccountStatus::Staged, false, false),
                &ctx,
                "/"
            ),
            "/welcome/password"
        );
        assert_eq!(
            next_location(
                Purpose::Register,
                &account(AccountStatus::Staged, true, false),
                &ctx,
                "/"
            ),
            "/welcome/review"
        );
    }

    #[test]
    fn register_existing_validated_account() {
        let prior = account(AccountStatus::Active, true, true);
        assert_eq!(
            next_location(Purpose::Register, &prior, &RedirectContext::default(), "/"),
            "/welcome/existing"
        );

        let native = RedirectContext {
            from_uri: Some("app://callback".to_string()),
            ..RedirectContext::default()
        };
        assert_eq!(
            next_location(Purpose::Register, &prior, &native, "/"),
            "app://callback"
        );
    }

    #[test]
    fn reset_routes_by_password_presence() {
        let ctx = RedirectContext::default();
        assert_eq!(
            next_location(
                Purpose::ResetPassword,
                &account(AccountStatus::Recovery, true, true),
                &ctx,
                "/"
            ),
            "/reset-password/password"
        );
        assert_eq!(
            next_location(
                Purpose::ResetPassword,
                &account(AccountStatus::Active, false, true),
                &ctx,
                "/"
            ),
            "/set-password"
        );
    }

    #[test]
    fn sign_in_lands_on_final_redirect() {
        let prior = account(AccountStatus::Active, true, true);
        let ctx = RedirectContext {
            return_url: Some("https://www.example.com/politics".to_string()),
            ..RedirectContext::default()
        };
        assert_eq!(
            next_location(Purpose::SignIn, &prior, &ctx, "/"),
            "https://www.example.com/politics"
        );
        assert_eq!(
            next_location(Purpose::SignIn, &prior, &RedirectContext::default(), "/"),
            "/"
        );
    }
}
