//! Verification artifacts: one-time passcodes and single-use link tokens.
//!
//! Raw secrets are only ever handed to the email layer; storage keeps a
//! SHA-256 hash. Native-app tokens carry a short prefix so the consuming
//! side can recover the originating platform from the link alone.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{Rng, RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use super::redirect::RedirectContext;
use super::status::RegistrationPlatform;

/// Default attempt budget for a passcode artifact.
pub const PASSCODE_ATTEMPTS: i32 = 5;

/// What the artifact proves control of the email address for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    Register,
    SetPassword,
    ResetPassword,
    SignIn,
}

impl Purpose {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::SetPassword => "set-password",
            Self::ResetPassword => "reset-password",
            Self::SignIn => "sign-in",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "register" => Some(Self::Register),
            "set-password" => Some(Self::SetPassword),
            "reset-password" => Some(Self::ResetPassword),
            "sign-in" => Some(Self::SignIn),
            _ => None,
        }
    }
}

/// Secret shape: a 6-digit code typed into a form, or an opaque token
/// embedded in an emailed link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Passcode,
    Token,
}

impl SecretKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passcode => "passcode",
            Self::Token => "token",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passcode" => Some(Self::Passcode),
            "token" => Some(Self::Token),
            _ => None,
        }
    }
}

/// Stored issuance record. The raw secret never appears here.
#[derive(Clone, Debug)]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub email: String,
    pub purpose: Purpose,
    pub kind: SecretKind,
    pub secret_hash: Vec<u8>,
    pub attempts_remaining: i32,
    pub platform: RegistrationPlatform,
    pub location: Option<String>,
    pub location_state: Option<String>,
    pub redirect: RedirectContext,
    pub ttl: Duration,
}

/// Snapshot returned by read-only peeks; mutating nothing is the point.
#[derive(Clone, Debug)]
pub struct ArtifactPeek {
    pub purpose: Purpose,
    pub kind: SecretKind,
    pub consumed: bool,
    pub redirect: RedirectContext,
}

/// Generate a 6-digit numeric passcode.
#[must_use]
pub fn generate_passcode() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{value:06}")
}

/// Generate an opaque single-use token, prefixed for native-app origins so
/// the consuming page can tell where the link came from.
///
/// # Errors
/// Returns an error if the OS entropy source fails.
pub fn generate_token(platform: RegistrationPlatform) -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate artifact token")?;
    let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    Ok(match platform {
        RegistrationPlatform::Profile => token,
        RegistrationPlatform::AndroidLiveApp => format!("al_{token}"),
        RegistrationPlatform::IosLiveApp => format!("il_{token}"),
    })
}

/// Recover the originating platform from a token's prefix.
#[must_use]
pub fn platform_from_token(token: &str) -> RegistrationPlatform {
    if token.starts_with("al_") {
        RegistrationPlatform::AndroidLiveApp
    } else if token.starts_with("il_") {
        RegistrationPlatform::IosLiveApp
    } else {
        RegistrationPlatform::Profile
    }
}

/// Hash a secret for storage and lookup.
#[must_use]
pub fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}
