//! Read-only artifact peek endpoint.
//!
//! Back navigation to a consumption page re-renders state without spending
//! attempts or consuming anything; this endpoint answers that question.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use crate::flow::artifact::Purpose;
use crate::flow::engine::normalize_email;
use crate::flow::outcome::PeekOutcome;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::FlowState;
use super::types::{FlowErrorResponse, FlowPeekParams, FlowPeekResponse};
use super::utils::{extract_client_ip, valid_email};

#[utoipa::path(
    get,
    path = "/v1/flow/peek",
    params(
        ("email" = String, Query, description = "Account email"),
        ("purpose" = String, Query, description = "Flow purpose")
    ),
    responses(
        (status = 200, description = "Artifact state", body = FlowPeekResponse),
        (status = 400, description = "Invalid request", body = FlowErrorResponse),
        (status = 429, description = "Rate limited", body = FlowErrorResponse)
    ),
    tag = "flow"
)]
pub async fn peek(
    headers: HeaderMap,
    state: Extension<Arc<FlowState>>,
    params: Query<FlowPeekParams>,
) -> impl IntoResponse {
    let Some(purpose) = Purpose::parse(&params.purpose) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(FlowErrorResponse::new("Unknown purpose")),
        )
            .into_response();
    };

    let email_normalized = normalize_email(&params.email);
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
        .check_ip(client_ip.as_deref(), RateLimitAction::Peek)
        == RateLimitDecision::Limited
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(FlowErrorResponse::new("Rate limited")),
        )
            .into_response();
    }

    match state.engine().peek(&params.email, purpose).await {
        Ok(PeekOutcome::Verified { redirect }) => (
            StatusCode::OK,
            Json(FlowPeekResponse {
                status: "verified".to_string(),
                return_url: redirect.return_url,
            }),
        )
            .into_response(),
        Ok(PeekOutcome::Pending) => (
            StatusCode::OK,
            Json(FlowPeekResponse {
                status: "pending".to_string(),
                return_url: None,
            }),
        )
            .into_response(),
        Ok(PeekOutcome::Nothing) => (
            StatusCode::OK,
            Json(FlowPeekResponse {
                status: "none".to_string(),
                return_url: None,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to peek verification artifact: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FlowErrorResponse::new("Lookup failed")),
            )
                .into_response()
        }
    }
}
