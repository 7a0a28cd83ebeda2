//! Flow engine configuration.

use std::time::Duration;

use super::artifact::PASSCODE_ATTEMPTS;
use super::status::RegistrationPlatform;

const DEFAULT_ARTIFACT_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_COMPLETION_FALLBACK: &str = "/";

#[derive(Clone, Debug)]
pub struct FlowConfig {
    frontend_base_url: String,
    artifact_ttl: Duration,
    passcode_attempts: i32,
    completion_fallback: String,
    native_clients: Vec<(String, RegistrationPlatform)>,
}

impl FlowConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            artifact_ttl: Duration::from_secs(DEFAULT_ARTIFACT_TTL_SECONDS),
            passcode_attempts: PASSCODE_ATTEMPTS,
            completion_fallback: DEFAULT_COMPLETION_FALLBACK.to_string(),
            native_clients: vec![
                (
                    "android_live_app".to_string(),
                    RegistrationPlatform::AndroidLiveApp,
                ),
                ("ios_live_app".to_string(), RegistrationPlatform::IosLiveApp),
            ],
        }
    }

    #[must_use]
    pub fn with_artifact_ttl_seconds(mut self, seconds: u64) -> Self {
        self.artifact_ttl = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_passcode_attempts(mut self, attempts: i32) -> Self {
        self.passcode_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_completion_fallback(mut self, fallback: String) -> Self {
        self.completion_fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_native_client(mut self, client_id: String, platform: RegistrationPlatform) -> Self {
        self.native_clients.push((client_id, platform));
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn artifact_ttl(&self) -> Duration {
        self.artifact_ttl
    }

    #[must_use]
    pub fn passcode_attempts(&self) -> i32 {
        self.passcode_attempts
    }

    #[must_use]
    pub fn completion_fallback(&self) -> &str {
        &self.completion_fallback
    }

    /// Platform for a known native app client id; browser profile otherwise.
    #[must_use]
    pub fn native_platform(&self, app_client_id: Option<&str>) -> RegistrationPlatform {
        let Some(app_client_id) = app_client_id else {
            return RegistrationPlatform::Profile;
        };
        self.native_clients
            .iter()
            .find(|(client, _)| client == app_client_id)
            .map_or(RegistrationPlatform::Profile, |(_, platform)| *platform)
    }
}
