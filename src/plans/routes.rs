//! REST endpoints for workout and diet plans.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::planner::PlanManager;
use crate::error::{Error, PlanError};

/// Shared state for plan routes.
#[derive(Clone)]
pub struct PlanRouteState {
    pub manager: Arc<PlanManager>,
}

/// Body of a generation request.
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanQuery {
    email: Option<String>,
}

fn identity(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

fn generated<P: Serialize>(result: Result<P, Error>, kind: &str) -> Response {
    match result {
        Ok(plan) => Json(serde_json::json!({"success": true, "plan": plan})).into_response(),
        Err(Error::Plan(e @ PlanError::ProfileNotFound)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!("{kind} plan generation failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn latest<P: Serialize>(result: Result<Option<P>, Error>, kind: &str) -> Response {
    match result {
        Ok(plan) => Json(serde_json::json!({"plan": plan})).into_response(),
        Err(e) => {
            error!("{kind} plan lookup failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /api/plans/workout
async fn generate_workout(
    State(state): State<PlanRouteState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let Some(email) = identity(request.email) else {
        return unauthorized();
    };
    generated(state.manager.generate_workout(&email).await, "Workout")
}

/// GET /api/plans/workout?email=…
///
/// `{"plan": null}` when nothing has been generated yet.
async fn latest_workout(
    State(state): State<PlanRouteState>,
    Query(query): Query<PlanQuery>,
) -> Response {
    let Some(email) = identity(query.email) else {
        return unauthorized();
    };
    latest(state.manager.latest_workout(&email).await, "Workout")
}

/// POST /api/plans/diet
async fn generate_diet(
    State(state): State<PlanRouteState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let Some(email) = identity(request.email) else {
        return unauthorized();
    };
    generated(state.manager.generate_diet(&email).await, "Diet")
}

/// GET /api/plans/diet?email=…
async fn latest_diet(
    State(state): State<PlanRouteState>,
    Query(query): Query<PlanQuery>,
) -> Response {
    let Some(email) = identity(query.email) else {
        return unauthorized();
    };
    latest(state.manager.latest_diet(&email).await, "Diet")
}

/// Build the plan REST routes.
pub fn plan_routes(state: PlanRouteState) -> Router {
    Router::new()
        .route("/api/plans/workout", post(generate_workout).get(latest_workout))
        .route("/api/plans/diet", post(generate_diet).get(latest_diet))
        .with_state(state)
}
