//! Redirect context carried through a verification flow.
//!
//! Two classes of query parameter exist. Persistable parameters
//! (`returnUrl`, `ref`, `refViewId`, `clientId`) are captured at flow entry,
//! stored with the pending artifact, and reproduced unchanged in every
//! downstream location. Native-app parameters (`appClientId`, `fromURI`) are
//! deliberately NOT persisted across the issuance/consumption boundary: they
//! only count when re-supplied on the consumption link itself, so SDK
//! parameters cannot leak into unrelated email or browser contexts.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectContext {
    #[serde(rename = "returnUrl", skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_code: Option<String>,
    #[serde(rename = "refViewId", skip_serializing_if = "Option::is_none")]
    pub ref_view_id: Option<String>,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "appClientId", skip_serializing_if = "Option::is_none")]
    pub app_client_id: Option<String>,
    #[serde(rename = "fromURI", skip_serializing_if = "Option::is_none")]
    pub from_uri: Option<String>,
}

impl RedirectContext {
    /// Context safe to store with an artifact at issuance.
    ///
    /// Persistable parameters survive; native-app parameters survive only
    /// when `explicit_native` is true, meaning they were supplied to the
    /// issuance call itself rather than carried over from an upstream page.
    #[must_use]
    pub fn for_issuance(&self, explicit_native: bool) -> Self {
        let mut stored = Self {
            return_url: self.return_url.clone(),
            ref_code: self.ref_code.clone(),
            ref_view_id: self.ref_view_id.clone(),
            client_id: self.client_id.clone(),
            app_client_id: None,
            from_uri: None,
        };
        if explicit_native {
            stored.app_client_id = self.app_client_id.clone();
            stored.from_uri = self.from_uri.clone();
        }
        stored
    }

    /// Merge parameters supplied on the consumption link over the stored
    /// context.
    ///
    /// A `returnUrl` on the link wins over the one captured at entry.
    /// Native-app parameters come from the link alone; whatever the stored
    /// context holds for them is discarded.
    #[must_use]
    pub fn merge_link(&self, link: &Self) -> Self {
        Self {
            return_url: link.return_url.clone().or_else(|| self.return_url.clone()),
            ref_code: self.ref_code.clone(),
            ref_view_id: self.ref_view_id.clone(),
            client_id: self.client_id.clone(),
            app_client_id: link.app_client_id.clone(),
            from_uri: link.from_uri.clone(),
        }
    }

    /// True when a native-app client is part of this context.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.app_client_id.is_some() || self.from_uri.is_some()
    }

    /// Query string reproducing the context, persistable parameters first.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let pairs = [
            ("returnUrl", &self.return_url),
            ("ref", &self.ref_code),
            ("refViewId", &self.ref_view_id),
            ("clientId", &self.client_id),
            ("appClientId", &self.app_client_id),
            ("fromURI", &self.from_uri),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                serializer.append_pair(name, value);
            }
        }
        serializer.finish()
    }

    /// Where the flow ultimately lands: the native `fromURI` when present,
    /// otherwise the persisted `returnUrl`, otherwise `fallback`. Never
    /// both.
    #[must_use]
    pub fn final_redirect(&self, fallback: &str) -> String {
        if let Some(from_uri) = &self.from_uri {
            return from_uri.clone();
        }
        self.return_url
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RedirectContext {
        RedirectContext {
            return_url: Some("https://www.example.com/politics".to_string()),
            ref_code: Some("newsletter".to_string()),
            ref_view_id: Some("view-123".to_string()),
            client_id: Some("comments".to_string()),
            app_client_id: Some("android_live_app".to_string()),
            from_uri: Some("app://callback".to_string()),
        }
    }

    #[test]
    fn issuance_drops_carried_native_params() {
        let stored = entry().for_issuance(false);
        assert_eq!(stored.app_client_id, None);
        assert_eq!(stored.from_uri, None);
        assert_eq!(stored.client_id.as_deref(), Some("comments"));
        assert_eq!(
            stored.return_url.as_deref(),
            Some("https://www.example.com/politics")
        );
    }

    #[test]
    fn issuance_keeps_explicitly_supplied_native_params() {
        let stored = entry().for_issuance(true);
        assert_eq!(stored.app_client_id.as_deref(), Some("android_live_app"));
        assert_eq!(stored.from_uri.as_deref(), Some("app://callback"));
    }

    #[test]
    fn link_return_url_wins() {
        let stored = entry().for_issuance(false);
        let link = RedirectContext {
            return_url: Some("https://www.example.com/sport".to_string()),
            ..RedirectContext::default()
        };
        let merged = stored.merge_link(&link);
        assert_eq!(
            merged.return_url.as_deref(),
            Some("https://www.example.com/sport")
        );
        // Other persistables still come from entry.
        assert_eq!(merged.ref_code.as_deref(), Some("newsletter"));
        assert_eq!(merged.ref_view_id.as_deref(), Some("view-123"));
    }

    #[test]
    fn native_params_require_resupply_on_link() {
        let stored = entry().for_issuance(true);
        let merged = stored.merge_link(&RedirectContext::default());
        assert!(!merged.is_native());

        let link = RedirectContext {
            from_uri: Some("app://resupplied".to_string()),
            ..RedirectContext::default()
        };
        let merged = stored.merge_link(&link);
        assert_eq!(merged.from_uri.as_deref(), Some("app://resupplied"));
    }

    #[test]
    fn final_redirect_is_one_target_only() {
        let ctx = RedirectContext {
            return_url: Some("https://www.example.com/politics".to_string()),
            from_uri: Some("app://callback".to_string()),
            ..RedirectContext::default()
        };
        assert_eq!(ctx.final_redirect("/"), "app://callback");

        let ctx = RedirectContext {
            return_url: Some("https://www.example.com/politics".to_string()),
            ..RedirectContext::default()
        };
        assert_eq!(ctx.final_redirect("/"), "https://www.example.com/politics");

        assert_eq!(RedirectContext::default().final_redirect("/"), "/");
    }

    #[test]
    fn query_encodes_all_present_params() {
        let query = entry().for_issuance(false).to_query();
        assert!(query.contains("returnUrl=https%3A%2F%2Fwww.example.com%2Fpolitics"));
        assert!(query.contains("ref=newsletter"));
        assert!(query.contains("refViewId=view-123"));
        assert!(query.contains("clientId=comments"));
        assert!(!query.contains("appClientId"));
        assert!(!query.contains("fromURI"));
    }

    #[test]
    fn wire_names_round_trip() {
        let ctx = entry();
        let value = serde_json::to_value(&ctx).expect("serialize");
        assert!(value.get("returnUrl").is_some());
        assert!(value.get("refViewId").is_some());
        assert!(value.get("fromURI").is_some());
        let decoded: RedirectContext = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded, ctx);
    }
}
