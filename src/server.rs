//! HTTP surface: JSON endpoints for starting a game and submitting moves.

use crate::oracle::MoveOracle;
use crate::service::{GameError, GameErrorKind, SessionService, SubmitMove};
use crate::store::PositionStore;
use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, instrument, warn};

/// Body of `POST /api/game/move`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Session identifier from `/api/game/new`.
    pub game_id: Option<String>,
    /// Human move notation.
    #[serde(rename = "move")]
    pub human_move: Option<String>,
    /// Position after the human move.
    pub fen: Option<String>,
}

/// Response of `POST /api/game/new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGameResponse {
    /// Session identifier.
    pub game_id: String,
    /// Starting position.
    pub fen: String,
}

/// Response of `POST /api/game/move`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    /// Reply move in SAN, `null` when the game ended on the human move.
    #[serde(rename = "move")]
    pub ai_move: Option<String>,
    /// Position after the turn.
    pub fen: String,
    /// True when the game has ended.
    pub game_over: bool,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub error: String,
    /// Request field at fault, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Maps service errors onto HTTP statuses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field: Option<String>,
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let status = match err.kind() {
            GameErrorKind::InvalidRequest | GameErrorKind::IllegalMove => StatusCode::BAD_REQUEST,
            GameErrorKind::EngineFailure => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.message().clone(),
            field: err.field().clone(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
            field: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            warn!(status = %self.status, error = %self.message, field = ?self.field, "Request rejected");
        }
        let body = ErrorResponse {
            error: self.message,
            field: self.field,
        };
        (self.status, Json(body)).into_response()
    }
}

type SharedService<S, O> = Arc<SessionService<S, O>>;

/// Builds the API router around a shared service.
pub fn router<S, O>(service: SharedService<S, O>) -> Router
where
    S: PositionStore + 'static,
    O: MoveOracle + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/game/new", post(new_game::<S, O>))
        .route("/api/game/move", post(submit_move::<S, O>))
        .with_state(service)
        .layer(ServiceBuilder::new().map_request(log_request).layer(cors))
}

/// Router plus an optional static directory served for every other path.
pub fn app<S, O>(service: SharedService<S, O>, static_dir: Option<PathBuf>) -> Router
where
    S: PositionStore + 'static,
    O: MoveOracle + 'static,
{
    let api = router(service);
    match static_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Serving static files");
            api.fallback_service(ServeDir::new(dir))
        }
        None => api,
    }
}

fn log_request(req: Request<Body>) -> Request<Body> {
    info!(method = %req.method(), uri = %req.uri(), "Incoming HTTP request");
    req
}

#[instrument(skip(service))]
async fn new_game<S, O>(State(service): State<SharedService<S, O>>) -> Result<Json<NewGameResponse>, ApiError>
where
    S: PositionStore + 'static,
    O: MoveOracle + 'static,
{
    let game = service.start_game().await?;
    Ok(Json(NewGameResponse {
        game_id: game.session_id().to_string(),
        fen: game.position().fen().to_string(),
    }))
}

#[instrument(skip(service, payload))]
async fn submit_move<S, O>(
    State(service): State<SharedService<S, O>>,
    payload: Result<Json<MoveRequest>, JsonRejection>,
) -> Result<Json<MoveResponse>, ApiError>
where
    S: PositionStore + 'static,
    O: MoveOracle + 'static,
{
    let Json(body) = payload?;
    let outcome = service
        .submit_move(SubmitMove {
            game_id: body.game_id,
            human_move: body.human_move,
            fen: body.fen,
        })
        .await?;

    Ok(Json(MoveResponse {
        ai_move: outcome.ai_move().clone(),
        fen: outcome.position().fen().to_string(),
        game_over: *outcome.game_over(),
    }))
}
