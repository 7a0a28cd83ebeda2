//! Account model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{AccountStatus, RegistrationPlatform};

/// One identity-provider account.
///
/// `email` is stored as supplied; lookups normalize to lowercase. The
/// `email_validated` flag is monotone and never cleared once set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub status: AccountStatus,
    pub has_password: bool,
    pub email_validated: bool,
    pub registration_platform: Option<RegistrationPlatform>,
    pub registration_location: Option<String>,
    pub registration_location_state: Option<String>,
}

impl Account {
    /// Fresh staged account, the state every passwordless registration
    /// starts from.
    #[must_use]
    pub fn staged(email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            status: AccountStatus::Staged,
            has_password: false,
            email_validated: false,
            registration_platform: None,
            registration_location: None,
            registration_location_state: None,
        }
    }

    /// Active account that was created passwordlessly and has not set a
    /// password yet; registration attempts route it to a set-password
    /// artifact.
    #[must_use]
    pub fn needs_password(&self) -> bool {
        self.status == AccountStatus::Active && !self.has_password
    }
}
