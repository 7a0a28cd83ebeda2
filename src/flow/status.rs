//! Account lifecycle states and the transition rules between them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity-provider account lifecycle state.
///
/// `Active` is further qualified by `has_password` / `email_validated` on the
/// account record itself, not by extra states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Staged,
    Provisioned,
    Active,
    Recovery,
    PasswordExpired,
    Suspended,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Staged => "staged",
            Self::Provisioned => "provisioned",
            Self::Active => "active",
            Self::Recovery => "recovery",
            Self::PasswordExpired => "password_expired",
            Self::Suspended => "suspended",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "staged" => Some(Self::Staged),
            "provisioned" => Some(Self::Provisioned),
            "active" => Some(Self::Active),
            "recovery" => Some(Self::Recovery),
            "password_expired" => Some(Self::PasswordExpired),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the account was registered from, recorded once on the edge into
/// `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPlatform {
    Profile,
    AndroidLiveApp,
    IosLiveApp,
}

impl RegistrationPlatform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::AndroidLiveApp => "android_live_app",
            Self::IosLiveApp => "ios_live_app",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "profile" => Some(Self::Profile),
            "android_live_app" => Some(Self::AndroidLiveApp),
            "ios_live_app" => Some(Self::IosLiveApp),
            _ => None,
        }
    }
}

/// Registration profile attributes captured when an artifact is consumed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationContext {
    pub platform: Option<RegistrationPlatform>,
    pub location: Option<String>,
    pub location_state: Option<String>,
}

/// Events that move an account along the lifecycle graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    /// Email ownership proven; activates staged/provisioned accounts.
    EmailVerified(RegistrationContext),
    /// A password was set or reset as part of artifact consumption.
    PasswordSet(RegistrationContext),
}

/// Why a transition was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionError {
    /// Suspended accounts accept no status-changing operation.
    Suspended,
    /// The edge is not in the lifecycle graph.
    InvalidEdge {
        from: AccountStatus,
        event: &'static str,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspended => write!(f, "account is suspended"),
            Self::InvalidEdge { from, event } => {
                write!(f, "no {event} transition from {from}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Effects a successful transition applies to the account record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub status: AccountStatus,
    pub email_validated: bool,
    pub has_password: bool,
    pub registration: Option<RegistrationContext>,
}

/// Apply `event` to an account in `status`.
///
/// Encodes the lifecycle table once; repositories call this rather than
/// re-deriving edges. `email_validated` is monotone: a transition may set it
/// but the caller must never clear it.
///
/// # Errors
/// Returns `TransitionError::Suspended` for any event on a suspended account
/// and `TransitionError::InvalidEdge` for edges outside the graph.
pub fn transition(
    status: AccountStatus,
    has_password: bool,
    event: &StatusEvent,
) -> Result<Transition, TransitionError> {
    if status == AccountStatus::Suspended {
        return Err(TransitionError::Suspended);
    }

    match event {
        StatusEvent::EmailVerified(registration) => match status {
            AccountStatus::Staged | AccountStatus::Provisioned | AccountStatus::Active => {
                Ok(Transition {
                    status: AccountStatus::Active,
                    email_validated: true,
                    has_password,
                    registration: Some(registration.clone()),
                })
            }
            AccountStatus::Recovery | AccountStatus::PasswordExpired => {
                Err(TransitionError::InvalidEdge {
                    from: status,
                    event: "email-verified",
                })
            }
            AccountStatus::Suspended => Err(TransitionError::Suspended),
        },
        StatusEvent::PasswordSet(registration) => match status {
            AccountStatus::Recovery
            | AccountStatus::PasswordExpired
            | AccountStatus::Active
            | AccountStatus::Staged
            | AccountStatus::Provisioned => Ok(Transition {
                status: AccountStatus::Active,
                email_validated: true,
                has_password: true,
                registration: Some(registration.clone()),
            }),
            AccountStatus::Suspended => Err(TransitionError::Suspended),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> RegistrationContext {
        RegistrationContext {
            platform: Some(RegistrationPlatform::Profile),
            location: Some("GB".to_string()),
            location_state: None,
        }
    }

    #[test]
    fn staged_activates_on_email_verified() {
        let next = transition(
            AccountStatus::Staged,
            false,
            &StatusEvent::EmailVerified(registration()),
        );
        let next = next.expect("staged -> active");
        assert_eq!(next.status, AccountStatus::Active);
        assert!(next.email_validated);
        assert!(!next.has_password);
    }

    #[test]
    fn provisioned_activates_on_email_verified() {
        let next = transition(
            AccountStatus::Provisioned,
            false,
            &StatusEvent::EmailVerified(registration()),
        );
        assert_eq!(next.expect("provisioned -> active").status, AccountStatus::Active);
    }

    #[test]
    fn recovery_requires_password_set() {
        let err = transition(
            AccountStatus::Recovery,
            true,
            &StatusEvent::EmailVerified(registration()),
        );
        assert!(matches!(err, Err(TransitionError::InvalidEdge { .. })));

        let next = transition(
            AccountStatus::Recovery,
            true,
            &StatusEvent::PasswordSet(registration()),
        );
        let next = next.expect("recovery -> active");
        assert_eq!(next.status, AccountStatus::Active);
        assert!(next.has_password);
    }

    #[test]
    fn password_expired_returns_to_active() {
        let next = transition(
            AccountStatus::PasswordExpired,
            true,
            &StatusEvent::PasswordSet(registration()),
        );
        assert_eq!(next.expect("expired -> active").status, AccountStatus::Active);
    }

    #[test]
    fn suspended_refuses_everything() {
        for event in [
            StatusEvent::EmailVerified(registration()),
            StatusEvent::PasswordSet(registration()),
        ] {
            assert_eq!(
                transition(AccountStatus::Suspended, false, &event),
                Err(TransitionError::Suspended)
            );
        }
    }

    #[test]
    fn password_set_marks_email_validated() {
        // Consuming a reset artifact proves control of the inbox too.
        let next = transition(
            AccountStatus::Staged,
            false,
            &StatusEvent::PasswordSet(registration()),
        );
        assert!(next.expect("staged -> active").email_validated);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AccountStatus::Staged,
            AccountStatus::Provisioned,
            AccountStatus::Active,
            AccountStatus::Recovery,
            AccountStatus::PasswordExpired,
            AccountStatus::Suspended,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::parse("deactivated"), None);
    }
}
