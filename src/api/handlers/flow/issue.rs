//! Artifact issuance endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email;
use crate::flow::artifact::Purpose;
use crate::flow::engine::{IssueRequest, normalize_email};
use crate::flow::outcome::IssueOutcome;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::FlowState;
use super::types::{FlowErrorResponse, FlowIssueRequest, FlowIssueResponse};
use super::utils::{extract_client_ip, valid_email};

const SUSPENDED_MESSAGE: &str = "There was a problem registering, please try again";

/// Issue a verification passcode or link for `(email, purpose)`.
///
/// Re-requests supersede the previous artifact. Unknown accounts on
/// non-register purposes get a decoy response with the same shape as a real
/// issuance.
#[utoipa::path(
    post,
    path = "/v1/flow/issue",
    request_body = FlowIssueRequest,
    responses(
        (status = 200, description = "Artifact issued (or decoy)", body = FlowIssueResponse),
        (status = 400, description = "Invalid request", body = FlowErrorResponse),
        (status = 429, description = "Rate limited", body = FlowErrorResponse)
    ),
    tag = "flow"
)]
pub async fn issue(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<FlowState>>,
    payload: Option<Json<FlowIssueRequest>>,
) -> impl IntoResponse {
    let request: FlowIssueRequest = match payload {
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

    let email_normalized = normalize_email(&request.email);
    if !valid_email(&email_normalized) {
        return (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Invalid email")),
        )
            .into_response();
    }

    // Limits run before any storage work to avoid amplification.
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Issue)
        == RateLimitDecision::Limited
        || state
            .rate_limiter()
            .check_email(&email_normalized, RateLimitAction::Issue)
            == RateLimitDecision::Limited
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(FlowErrorResponse::new("Rate limited")),
        )
            .into_response();
    }

    let issue_request = IssueRequest {
        email: request.email.clone(),
        purpose,
        variant: request.variant(),
        entry: request.entry_context(),
        app_client_id: request.app_client_id.clone(),
        from_uri: request.from_uri.clone(),
        location: request.location.clone(),
        location_state: request.location_state.clone(),
    };

    match state.engine().issue(issue_request).await {
        Ok(IssueOutcome::Dispatched {
            artifact_id,
            email: email_request,
        }) => {
            if let Err(err) = email::enqueue(&pool, &email_request).await {
                error!("Failed to enqueue flow email: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(FlowErrorResponse::new("Issuance failed")),
                )
                    .into_response();
            }
            (
                StatusCode::OK,
                Json(FlowIssueResponse {
                    id: artifact_id.to_string(),
                }),
            )
                .into_response()
        }
        Ok(IssueOutcome::CodeEntryOnly { decoy_id }) => (
            StatusCode::OK,
            Json(FlowIssueResponse {
                id: decoy_id.to_string(),
            }),
        )
            .into_response(),
        Ok(IssueOutcome::Suspended) => (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new(SUSPENDED_MESSAGE)),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to issue verification artifact: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FlowErrorResponse::new("Issuance failed")),
            )
                .into_response()
        }
    }
}
