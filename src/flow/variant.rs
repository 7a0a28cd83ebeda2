//! Flow variant resolution.
//!
//! Entry pages carry `useOkta` / `useOktaClassic` / `usePasscodeSignIn`
//! query flags. They are resolved into a `FlowVariant` exactly once at the
//! boundary; everything downstream matches on the enum instead of checking
//! raw flag strings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVariant {
    /// Hosted passcode-first flow (the default).
    #[default]
    Okta,
    /// Link-token flow kept for clients that cannot handle passcodes.
    OktaClassic,
    /// Passcode-based sign-in entry.
    PasscodeSignIn,
}

/// Raw query flags as they arrive on the wire.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct VariantFlags {
    #[serde(rename = "useOkta", default)]
    pub use_okta: bool,
    #[serde(rename = "useOktaClassic", default)]
    pub use_okta_classic: bool,
    #[serde(rename = "usePasscodeSignIn", default)]
    pub use_passcode_sign_in: bool,
}

impl FlowVariant {
    /// Resolve flags with fixed precedence: passcode sign-in wins over
    /// classic, classic wins over the default.
    #[must_use]
    pub fn resolve(flags: VariantFlags) -> Self {
        if flags.use_passcode_sign_in {
            Self::PasscodeSignIn
        } else if flags.use_okta_classic {
            Self::OktaClassic
        } else {
            Self::Okta
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Okta => "okta",
            Self::OktaClassic => "okta_classic",
            Self::PasscodeSignIn => "passcode_sign_in",
        }
    }
}
