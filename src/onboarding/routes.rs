//! REST endpoints for onboarding turns and the stored profile.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::error;

use super::manager::{OnboardingManager, TurnRequest};
use crate::error::{Error, OnboardingError};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

/// POST /api/onboarding
///
/// Runs one onboarding turn and returns the updated transcript, step and
/// profile. Any LLM or storage failure is a 500; the caller may resubmit.
async fn post_turn(
    State(state): State<OnboardingRouteState>,
    Json(request): Json<TurnRequest>,
) -> Response {
    match state.manager.handle_turn(request).await {
        Ok(response) => Json(response).into_response(),
        Err(Error::Onboarding(OnboardingError::MissingIdentity)) => unauthorized(),
        Err(e) => {
            error!("Onboarding turn failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileQuery {
    email: Option<String>,
}

/// GET /api/onboarding/profile?email=…
///
/// Returns the stored profile, or 404 if onboarding hasn't completed.
async fn get_profile(
    State(state): State<OnboardingRouteState>,
    Query(query): Query<ProfileQuery>,
) -> Response {
    let Some(email) = query.email.filter(|e| !e.trim().is_empty()) else {
        return unauthorized();
    };

    match state.manager.get_profile(email.trim()).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "Profile not found. Complete onboarding first.",
        ),
        Err(e) => {
            error!("Profile lookup failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "fit-coach"
    }))
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding", post(post_turn))
        .route("/api/onboarding/profile", get(get_profile))
        .with_state(state)
}
