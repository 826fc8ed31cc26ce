//! Request Dispatcher
//!
//! HTTP/JSON front for the session coordinator. Routes by operation name,
//! decodes camelCase bodies, and maps coordinator errors to status codes.
//! Malformed bodies are answered here and never reach the coordinator.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{CoordinatorError, ErrorKind};
use crate::session::{SessionCoordinator, SessionPhase};

type AppState = Arc<SessionCoordinator>;
type ApiResult = Result<Json<Value>, CoordinatorError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    session_id: String,
    member_id: String,
    name: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinSessionRequest {
    session_id: String,
    member_id: String,
    display_name: String,
}

/// Session plus acting member
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    session_id: String,
    member_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveMemberRequest {
    session_id: String,
    member_id: String,
    target_member_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionQuery {
    session_id: String,
}

impl CoordinatorError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the dispatcher router
///
/// Routes (all POST):
/// - /createSession, /joinSession, /deleteSession, /removeMember
/// - /startSession, /endSession, /listMembers, /leaveSession
/// - /sessionState, /isOwner
pub fn router(coordinator: Arc<SessionCoordinator>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/createSession", post(create_session))
        .route("/joinSession", post(join_session))
        .route("/deleteSession", post(delete_session))
        .route("/removeMember", post(remove_member))
        .route("/startSession", post(start_session))
        .route("/endSession", post(end_session))
        .route("/listMembers", post(list_members))
        .route("/leaveSession", post(leave_session))
        .route("/sessionState", post(session_state))
        .route("/isOwner", post(is_owner))
        .fallback(route_not_found)
        .layer(cors)
        .with_state(coordinator)
}

async fn route_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route not found")
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, CoordinatorError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!("Rejected request body: {}", e);
        CoordinatorError::InvalidInput(e.to_string())
    })
}

fn require(field: &str, value: &str) -> Result<(), CoordinatorError> {
    if value.trim().is_empty() {
        return Err(CoordinatorError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn message(text: String) -> Json<Value> {
    Json(json!({ "message": text }))
}

async fn create_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: CreateSessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;
    require("name", &req.name)?;

    coordinator
        .create_session_and_owner(&req.session_id, &req.name, &req.member_id, &req.display_name)
        .await?;
    Ok(message(format!("{} has been made by {}", req.name, req.display_name)))
}

async fn join_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: JoinSessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    coordinator
        .join(&req.session_id, &req.member_id, &req.display_name)
        .await?;
    Ok(message(format!(
        "Member {} joined session {}",
        req.display_name, req.session_id
    )))
}

async fn delete_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    let report = coordinator
        .delete_session(&req.session_id, &req.member_id)
        .await?;
    Ok(Json(json!({
        "message": format!("Session {} and its members deleted", req.session_id),
        "membersDeleted": report.value,
        "skipped": report.skipped,
    })))
}

async fn remove_member(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: RemoveMemberRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;
    require("targetMemberId", &req.target_member_id)?;

    coordinator
        .remove_member(&req.session_id, &req.member_id, &req.target_member_id)
        .await?;
    Ok(message(format!(
        "Member {} removed from session {}",
        req.target_member_id, req.session_id
    )))
}

async fn start_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    coordinator
        .start_session(&req.session_id, &req.member_id)
        .await?;
    Ok(message(format!("Session {} started", req.session_id)))
}

async fn end_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    coordinator
        .end_session(&req.session_id, &req.member_id)
        .await?;
    Ok(message(format!("Session {} ended", req.session_id)))
}

async fn list_members(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    let outcome = coordinator
        .list_members(&req.session_id, &req.member_id)
        .await?;
    Ok(Json(json!({
        "members": outcome.value,
        "skipped": outcome.skipped.len(),
    })))
}

async fn leave_session(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    coordinator
        .leave_session(&req.session_id, &req.member_id)
        .await?;
    Ok(message(format!("Member {} left", req.member_id)))
}

async fn session_state(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionQuery = decode(&body)?;
    require("sessionId", &req.session_id)?;

    let started = coordinator.session_started(&req.session_id).await?;
    Ok(Json(json!({
        "started": started,
        "phase": SessionPhase::from(started),
    })))
}

async fn is_owner(State(coordinator): State<AppState>, body: Bytes) -> ApiResult {
    let req: SessionRequest = decode(&body)?;
    require("sessionId", &req.session_id)?;
    require("memberId", &req.member_id)?;

    let owner = coordinator
        .is_owner(&req.session_id, &req.member_id)
        .await?;
    Ok(Json(json!({ "isOwner": owner })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LobbyConfig;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let coordinator = SessionCoordinator::new(store, LobbyConfig::new("sessions", "members"));
        router(Arc::new(coordinator))
    }

    async fn call(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        call_raw(app, path, body.to_string()).await
    }

    async fn call_raw(app: &Router, path: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    async fn create_settlers(app: &Router) {
        let (status, body) = call(
            app,
            "/createSession",
            json!({ "sessionId": "S1", "memberId": "P1", "name": "Settlers", "displayName": "Alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Settlers has been made by Alice");
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            CoordinatorError::NotFound("s1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoordinatorError::InvalidInput("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoordinatorError::Unauthorized {
                session_id: "s1".into(),
                requester_id: "p2".into(),
                action: "start this session",
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CoordinatorError::from_store(
                "create session s1",
                crate::store::StoreError::conflict("sessions", "s1")
            )
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoordinatorError::from_store(
                "get session s1",
                crate::store::StoreError::Unavailable("down".into())
            )
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_session_flow_over_http() {
        let app = app();
        create_settlers(&app).await;

        let (status, _) = call(
            &app,
            "/joinSession",
            json!({ "sessionId": "S1", "memberId": "P2", "displayName": "Bob" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "/isOwner", json!({ "sessionId": "S1", "memberId": "P2" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isOwner"], false);

        let (status, body) = call(&app, "/listMembers", json!({ "sessionId": "S1", "memberId": "P1" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["members"].as_array().unwrap().len(), 2);
        assert_eq!(body["skipped"], 0);

        let (status, _) = call(&app, "/startSession", json!({ "sessionId": "S1", "memberId": "P1" })).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "/sessionState", json!({ "sessionId": "S1" })).await;
        assert_eq!(body["started"], true);
        assert_eq!(body["phase"], "started");

        let (status, body) = call(&app, "/deleteSession", json!({ "sessionId": "S1", "memberId": "P1" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["membersDeleted"], json!(["P1", "P2"]));

        let (status, _) = call(&app, "/sessionState", json!({ "sessionId": "S1" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let app = app();
        create_settlers(&app).await;

        // Duplicate create
        let (status, _) = call(
            &app,
            "/createSession",
            json!({ "sessionId": "S1", "memberId": "P9", "name": "Again", "displayName": "Zed" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Non-owner removal
        let (status, body) = call(
            &app,
            "/removeMember",
            json!({ "sessionId": "S1", "memberId": "P2", "targetMemberId": "P1" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("Unauthorized"));

        // Join of a missing session
        let (status, _) = call(
            &app,
            "/joinSession",
            json!({ "sessionId": "nope", "memberId": "P2", "displayName": "Bob" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_requests_never_reach_coordinator() {
        let app = app();

        let (status, _) = call_raw(&app, "/createSession", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "/startSession", json!({ "sessionId": "S1" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "/createSession",
            json!({ "sessionId": "", "memberId": "P1", "name": "Settlers", "displayName": "Alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sessionId"));
    }

    #[tokio::test]
    async fn test_empty_ids_are_rejected_on_every_route() {
        let app = app();
        create_settlers(&app).await;

        for route in ["/deleteSession", "/startSession", "/endSession", "/listMembers", "/isOwner"] {
            let (status, body) = call(&app, route, json!({ "sessionId": "S1", "memberId": "" })).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", route);
            assert!(body["error"].as_str().unwrap().contains("memberId"), "{}", route);
        }

        let (status, body) = call(
            &app,
            "/removeMember",
            json!({ "sessionId": "S1", "memberId": "", "targetMemberId": "P1" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("memberId"));

        let (status, body) = call(&app, "/leaveSession", json!({ "sessionId": "", "memberId": "P1" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sessionId"));

        // Nothing above touched the session
        let (_, body) = call(&app, "/listMembers", json!({ "sessionId": "S1", "memberId": "P1" })).await;
        assert_eq!(body["members"].as_array().unwrap().len(), 1);
        let (_, body) = call(&app, "/sessionState", json!({ "sessionId": "S1" })).await;
        assert_eq!(body["started"], json!(false));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = app();
        let (status, body) = call(&app, "/launchMissiles", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, Value::String("Route not found".to_string()));
    }
}
