//! HTTP route definitions

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::game::{GameError, MatchStateUpdate, MatchStatus};
use crate::util::time::uptime_secs;
use crate::ws::handler::connect_match_handler;
use crate::ws::sync::attach_match_observers;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/matches", post(create_match_handler))
        .route("/v1/matches/:id/ws", get(connect_match_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS configuration - `*` allows any origin, otherwise a comma-separated list
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    cors.allow_origin(allowed_origins).allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    total_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.matches.active_matches(),
        total_players: state.matches.total_players(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateMatchQuery {
    pub account_id: Option<String>,
}

#[derive(Serialize)]
struct CreateMatchResponse {
    success: bool,
    result: CreatedMatch,
}

#[derive(Serialize)]
struct CreatedMatch {
    match_id: String,
}

async fn create_match_handler(
    State(state): State<AppState>,
    Query(query): Query<CreateMatchQuery>,
) -> Result<Json<CreateMatchResponse>, AppError> {
    let account_id = query
        .account_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("account_id is required".to_string()))?;

    // An account owns at most one match; creating a new one replaces it
    if let Ok(previous) = state.matches.get_match_by_owner_id(&account_id) {
        info!(match_id = %previous.id(), account_id = %account_id, "Replacing owned match");
        state.matches.delete_by_id(previous.id());
    }

    let game = state.matches.add(state.config.players_limit)?;
    game.state().update_state(MatchStateUpdate {
        status: Some(MatchStatus::OnHold),
        arena: Some(state.config.arena),
        foods_limit: Some(state.config.foods_limit),
    });
    attach_match_observers(&game);

    Ok(Json(CreateMatchResponse {
        success: true,
        result: CreatedMatch {
            match_id: game.id().to_string(),
        },
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Game(#[from] GameError),
}

impl AppError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Game(GameError::MatchNotFound(_)) => (StatusCode::NOT_FOUND, "MATCH_NOT_FOUND"),
            AppError::Game(GameError::OwnerNotFound(_)) => (StatusCode::NOT_FOUND, "OWNER_NOT_FOUND"),
            AppError::Game(GameError::MatchFull { .. }) => (StatusCode::CONFLICT, "MATCH_FULL"),
            AppError::Game(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, kind) = self.status_and_type();

        let body = serde_json::json!({
            "success": false,
            "type": kind,
            "message": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
