//! Artifact consumption endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use crate::flow::artifact::Purpose;
use crate::flow::engine::{ConsumeRequest, normalize_email};
use crate::flow::outcome::ConsumeOutcome;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::FlowState;
use super::types::{FlowConsumeRequest, FlowConsumeResponse, FlowErrorResponse};
use super::utils::{extract_client_ip, valid_email};

const SUSPENDED_MESSAGE: &str = "There was a problem registering, please try again";

/// Consume a submitted passcode or link token.
///
/// On success the account transition has been applied and the response
/// carries the next location of the flow contract.
#[utoipa::path(
    post,
    path = "/v1/flow/consume",
    request_body = FlowConsumeRequest,
    responses(
        (status = 200, description = "Artifact consumed", body = FlowConsumeResponse),
        (status = 400, description = "Invalid, expired, or exhausted secret", body = FlowErrorResponse),
        (status = 429, description = "Rate limited", body = FlowErrorResponse)
    ),
    tag = "flow"
)]
pub async fn consume(
    headers: HeaderMap,
    state: Extension<Arc<FlowState>>,
    payload: Option<Json<FlowConsumeRequest>>,
) -> impl IntoResponse {
    let request: FlowConsumeRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(FlowErrorResponse::new("Missing payload")),
            )
                .into_response();
        }
    };

    let Some(purpose) = Purpose::parse(&request.purpose) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Unknown purpose")),
        )
            .into_response();
    };

    if request.secret.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Missing code")),
        )
            .into_response();
    }

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Invalid email")),
        )
            .into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Consume)
        == RateLimitDecision::Limited
        || state
            .rate_limiter()
            .check_email(&email_normalized, RateLimitAction::Consume)
            == RateLimitDecision::Limited
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(FlowErrorResponse::new("Rate limited")),
        )
            .into_response();
    }

    let consume_request = ConsumeRequest {
        email: request.email.clone(),
        purpose,
        secret: request.secret.clone(),
        link: request.link_context(),
    };

    match state.engine().consume(consume_request).await {
        Ok(ConsumeOutcome::Success {
            account,
            next_location,
            ..
        }) => (
            StatusCode::OK,
            Json(FlowConsumeResponse {
                account_status: account.status.as_str().to_string(),
                next_location,
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::IncorrectCode { attempts_remaining }) => (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse {
                error: "Incorrect code".to_string(),
                attempts_remaining: Some(attempts_remaining),
            }),
        )
            .into_response(),
        Ok(ConsumeOutcome::Expired) => (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Your code has expired")),
        )
            .into_response(),
        Ok(ConsumeOutcome::NotFound) => (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Invalid code")),
        )
            .into_response(),
        Ok(ConsumeOutcome::AccountSuspended) => (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new(SUSPENDED_MESSAGE)),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to consume verification artifact: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FlowErrorResponse::new("Verification failed")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::flow_state;
    use super::*;
    use anyhow::Result;
    use axum::response::IntoResponse;

    fn request(secret: &str) -> FlowConsumeRequest {
        FlowConsumeRequest {
            email: "a@example.com".to_string(),
            purpose: "register".to_string(),
            secret: secret.to_string(),
            return_url: None,
            app_client_id: None,
            from_uri: None,
        }
    }

    #[tokio::test]
    async fn consume_missing_payload() -> Result<()> {
        let response = consume(HeaderMap::new(), Extension(flow_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn consume_empty_secret() -> Result<()> {
        let response = consume(
            HeaderMap::new(),
            Extension(flow_state()),
            Some(Json(request(" "))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn consume_unknown_artifact_is_invalid_code() -> Result<()> {
        // Memory-backed state with no issued artifact.
        let response = consume(
            HeaderMap::new(),
            Extension(flow_state()),
            Some(Json(request("123456"))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
