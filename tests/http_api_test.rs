//! HTTP endpoint tests driven through the router without a socket.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use oracle_chess::{
    BoardState, ErrorResponse, InMemoryPositionStore, LegalMove, MoveOracle, MoveResponse, NewGameResponse,
    OfflineOracle, OracleUnavailable, RulesEngine, SessionService, router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

struct AlwaysE5;

#[async_trait]
impl MoveOracle for AlwaysE5 {
    async fn suggest(&self, _position: &BoardState, _legal: &[LegalMove]) -> Result<String, OracleUnavailable> {
        Ok("e5".to_string())
    }
}

fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_new_game_returns_id_and_start_position() {
    let app = router(Arc::new(SessionService::new(InMemoryPositionStore::new(), OfflineOracle)));

    let response = app.oneshot(post_json("/api/game/new", Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(raw.get("gameId").and_then(|v| v.as_str()).is_some_and(|id| !id.is_empty()));

    let body: NewGameResponse = serde_json::from_value(raw).unwrap();
    assert_eq!(body.fen, START_FEN);
}

#[tokio::test]
async fn test_move_round_trip() {
    let service = Arc::new(SessionService::new(InMemoryPositionStore::new(), AlwaysE5));

    let response = router(service.clone())
        .oneshot(post_json("/api/game/new", Body::empty()))
        .await
        .unwrap();
    let game: NewGameResponse = read_json(response).await;

    let request = serde_json::json!({ "gameId": game.game_id, "move": "e4", "fen": AFTER_E4 });
    let response = router(service)
        .oneshot(post_json("/api/game/move", request.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(raw["move"], "e5");
    assert_eq!(raw["gameOver"], false);

    let body: MoveResponse = serde_json::from_value(raw).unwrap();
    let position = BoardState::from_fen(&body.fen).unwrap();
    assert_eq!(position.fullmoves(), 2);
    assert_eq!(RulesEngine::new().legal_moves(&position).len(), 29);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let app = router(Arc::new(SessionService::new(InMemoryPositionStore::new(), OfflineOracle)));

    let request = serde_json::json!({ "gameId": "abc", "move": "e4" });
    let response = app.oneshot(post_json("/api/game/move", request.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = read_json(response).await;
    assert_eq!(body.error, "Missing required fields");
    assert_eq!(body.field.as_deref(), Some("fen"));
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = router(Arc::new(SessionService::new(InMemoryPositionStore::new(), OfflineOracle)));

    let response = app.oneshot(post_json("/api/game/move", "{ not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = read_json(response).await;
    assert!(!body.error.is_empty());
    assert!(body.field.is_none());
}

#[tokio::test]
async fn test_illegal_move_is_rejected() {
    let service = Arc::new(SessionService::new(InMemoryPositionStore::new(), AlwaysE5));
    let response = router(service.clone())
        .oneshot(post_json("/api/game/new", Body::empty()))
        .await
        .unwrap();
    let game: NewGameResponse = read_json(response).await;

    let request = serde_json::json!({ "gameId": game.game_id, "move": "Qh5", "fen": AFTER_E4 });
    let response = router(service)
        .oneshot(post_json("/api/game/move", request.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = read_json(response).await;
    assert!(body.error.contains("Qh5"), "unexpected error: {}", body.error);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let app = router(Arc::new(SessionService::new(InMemoryPositionStore::new(), OfflineOracle)));

    let request = Request::builder()
        .method("POST")
        .uri("/api/game/new")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}
