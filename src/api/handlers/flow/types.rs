//! Request/response types for the flow endpoints.
//!
//! Query-parameter casing (`returnUrl`, `refViewId`, `fromURI`) follows the
//! contract the frontend already speaks; everything else stays snake_case.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::flow::redirect::RedirectContext;
use crate::flow::variant::{FlowVariant, VariantFlags};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowIssueRequest {
    pub email: String,
    /// One of `register`, `set-password`, `reset-password`, `sign-in`.
    pub purpose: String,
    #[serde(rename = "useOkta", default)]
    pub use_okta: bool,
    #[serde(rename = "useOktaClassic", default)]
    pub use_okta_classic: bool,
    #[serde(rename = "usePasscodeSignIn", default)]
    pub use_passcode_sign_in: bool,
    #[serde(rename = "returnUrl", default)]
    pub return_url: Option<String>,
    #[serde(rename = "ref", default)]
    pub ref_code: Option<String>,
    #[serde(rename = "refViewId", default)]
    pub ref_view_id: Option<String>,
    #[serde(rename = "clientId", default)]
    pub client_id: Option<String>,
    #[serde(rename = "appClientId", default)]
    pub app_client_id: Option<String>,
    #[serde(rename = "fromURI", default)]
    pub from_uri: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(rename = "locationState", default)]
    pub location_state: Option<String>,
}

impl FlowIssueRequest {
    pub(super) fn variant(&self) -> FlowVariant {
        FlowVariant::resolve(VariantFlags {
            use_okta: self.use_okta,
            use_okta_classic: self.use_okta_classic,
            use_passcode_sign_in: self.use_passcode_sign_in,
        })
    }

    pub(super) fn entry_context(&self) -> RedirectContext {
        RedirectContext {
            return_url: self.return_url.clone(),
            ref_code: self.ref_code.clone(),
            ref_view_id: self.ref_view_id.clone(),
            client_id: self.client_id.clone(),
            app_client_id: None,
            from_uri: None,
        }
    }
}

/// Issuance always answers with an artifact id; decoys are shaped the same
/// so callers cannot probe for account existence.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowIssueResponse {
    pub id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowConsumeRequest {
    pub email: String,
    pub purpose: String,
    /// The submitted passcode or link token.
    pub secret: String,
    #[serde(rename = "returnUrl", default)]
    pub return_url: Option<String>,
    #[serde(rename = "appClientId", default)]
    pub app_client_id: Option<String>,
    #[serde(rename = "fromURI", default)]
    pub from_uri: Option<String>,
}

impl FlowConsumeRequest {
    pub(super) fn link_context(&self) -> RedirectContext {
        RedirectContext {
            return_url: self.return_url.clone(),
            ref_code: None,
            ref_view_id: None,
            client_id: None,
            app_client_id: self.app_client_id.clone(),
            from_uri: self.from_uri.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowConsumeResponse {
    #[serde(rename = "accountStatus")]
    pub account_status: String,
    #[serde(rename = "nextLocation")]
    pub next_location: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowErrorResponse {
    pub error: String,
    #[serde(rename = "attemptsRemaining", skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
}

impl FlowErrorResponse {
    pub(super) fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            attempts_remaining: None,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct FlowPeekParams {
    pub email: String,
    pub purpose: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FlowPeekResponse {
    /// `verified`, `pending`, or `none`.
    pub status: String,
    #[serde(rename = "returnUrl", skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_request_resolves_variant_and_context() {
        let json = r#"{
            "email": "a@example.com",
            "purpose": "register",
            "useOktaClassic": true,
            "returnUrl": "https://www.example.com/politics",
            "refViewId": "view-1",
            "appClientId": "android_live_app"
        }"#;
        let request: FlowIssueRequest = serde_json::from_str(json).expect("request");
        assert_eq!(request.variant(), FlowVariant::OktaClassic);

        // Carried native params never enter the stored entry context.
        let entry = request.entry_context();
        assert_eq!(entry.ref_view_id.as_deref(), Some("view-1"));
        assert_eq!(entry.app_client_id, None);
        assert_eq!(request.app_client_id.as_deref(), Some("android_live_app"));
    }

    #[test]
    fn error_response_hides_absent_attempts() {
        let error = FlowErrorResponse::new("Incorrect code");
        let value = serde_json::to_value(&error).expect("serialize");
        assert!(value.get("attemptsRemaining").is_none());
    }

    #[test]
    fn consume_request_link_context_carries_native_params() {
        let json = r#"{
            "email": "a@example.com",
            "purpose": "register",
            "secret": "123456",
            "fromURI": "app://callback"
        }"#;
        let request: FlowConsumeRequest = serde_json::from_str(json).expect("request");
        let link = request.link_context();
        assert_eq!(link.from_uri.as_deref(), Some("app://callback"));
        assert!(link.is_native());
    }
}
