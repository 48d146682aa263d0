//! HTTP session server.
//!
//! Exposes question-answering sessions over a JSON HTTP API. Each session
//! holds its own document index and chat history; sessions share nothing
//! but the configured embedding and generation backends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/sessions` | Create a session, returns `{ "id": ... }` |
//! | `GET`    | `/sessions/{id}` | Status, chunk count, history length |
//! | `DELETE` | `/sessions/{id}` | Drop a session |
//! | `POST`   | `/sessions/{id}/ingest` | `{ "text": ... }` → ingest report |
//! | `POST`   | `/sessions/{id}/answer` | `{ "question": ... }` → answer and sources |
//! | `GET`    | `/sessions/{id}/history` | Chat turns, oldest first |
//! | `POST`   | `/sessions/{id}/reset` | Discard the document and history |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "no document has been ingested in this session" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `not_ready` (409),
//! `upstream_error` (502), `upstream_timeout` (504), `internal` (500).
//!
//! # Session Lifetime
//!
//! Sessions stay in memory until deleted or until they go unused for
//! `[server].session_idle_secs` (default one hour). A session that was
//! evicted answers `404` like one that never existed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front ends can
//! talk to the server directly.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use doc_qa_core::{Error, SearchHit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::generation::create_generator;
use crate::session::{ChatTurn, IngestReport, Session, SessionConfig, SessionRegistry, SessionStatus};

/// Upper bound on how often idle sessions are swept.
const EVICTION_PERIOD: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct AppState {
    registry: Arc<SessionRegistry>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder = create_provider(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let registry = SessionRegistry::new(SessionConfig::from_config(config), embedder, generator)?;

    let registry = Arc::new(registry);
    if let Some(max_idle) = config.server.session_idle() {
        tokio::spawn(evict_idle_sessions(registry.clone(), max_idle));
    }

    let app = router(registry);
    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("docqa server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn evict_idle_sessions(registry: Arc<SessionRegistry>, max_idle: Duration) {
    let mut ticker = tokio::time::interval(max_idle.min(EVICTION_PERIOD));
    loop {
        ticker.tick().await;
        let evicted = registry.evict_idle(max_idle);
        if evicted > 0 {
            tracing::info!(evicted, remaining = registry.len(), "evicted idle sessions");
        }
    }
}

/// Build the application router over `registry`.
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create))
        .route(
            "/sessions/{id}",
            get(handle_status).delete(handle_delete),
        )
        .route("/sessions/{id}/ingest", post(handle_ingest))
        .route("/sessions/{id}/answer", post(handle_answer))
        .route("/sessions/{id}/history", get(handle_history))
        .route("/sessions/{id}/reset", post(handle_reset))
        .layer(cors)
        .with_state(AppState { registry })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        if err.is_caller_error() {
            return bad_request(message);
        }
        let (status, code) = match err {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::NotReady => (StatusCode::CONFLICT, "not_ready"),
            Error::UpstreamTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            Error::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::warn!(code, error = %message, "request failed");
        }
        AppError {
            status,
            code,
            message,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn lookup(state: &AppState, id: &str) -> Result<Arc<Session>, AppError> {
    let uuid = Uuid::parse_str(id).map_err(|_| bad_request(format!("invalid session id: {}", id)))?;
    state
        .registry
        .get(&uuid)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct CreateResponse {
    id: Uuid,
}

async fn handle_create(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateResponse>), AppError> {
    let (id, _) = state.registry.create()?;
    Ok((StatusCode::CREATED, Json(CreateResponse { id })))
}

#[derive(Serialize)]
struct StatusResponse {
    id: String,
    status: SessionStatus,
    chunks: usize,
    history: usize,
}

async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let session = lookup(&state, &id)?;
    Ok(Json(StatusResponse {
        id,
        status: session.status(),
        chunks: session.index().map(|i| i.len()).unwrap_or(0),
        history: session.history().len(),
    }))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let uuid = Uuid::parse_str(&id).map_err(|_| bad_request(format!("invalid session id: {}", id)))?;
    if state.registry.remove(&uuid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no session with id: {}", id)))
    }
}

// ============ POST /sessions/{id}/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    text: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestReport>, AppError> {
    let session = lookup(&state, &id)?;
    let Json(req) = payload?;
    Ok(Json(session.ingest(&req.text).await?))
}

// ============ POST /sessions/{id}/answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    question: String,
}

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
    sources: Vec<SearchHit>,
}

async fn handle_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let session = lookup(&state, &id)?;
    let Json(req) = payload?;
    let answer = session.answer(&req.question).await?;
    Ok(Json(AnswerResponse {
        answer: answer.text,
        sources: answer.citations,
    }))
}

// ============ History / reset ============

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChatTurn>>, AppError> {
    let session = lookup(&state, &id)?;
    Ok(Json(session.history()))
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let session = lookup(&state, &id)?;
    session.reset();
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::generation::ExtractiveGenerator;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let registry = SessionRegistry::new(
            SessionConfig::default(),
            Arc::new(HashEmbedder::new(64).unwrap()),
            Arc::new(ExtractiveGenerator),
        )
        .unwrap();
        router(Arc::new(registry))
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create(app: &Router) -> String {
        let (status, json) = call(app, "POST", "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_evicted_session_is_not_found() {
        let registry = Arc::new(
            SessionRegistry::new(
                SessionConfig::default(),
                Arc::new(HashEmbedder::new(64).unwrap()),
                Arc::new(ExtractiveGenerator),
            )
            .unwrap(),
        );
        let app = router(registry.clone());
        let id = create(&app).await;
        assert_eq!(call(&app, "GET", &format!("/sessions/{}", id), None).await.0, StatusCode::OK);

        assert_eq!(registry.evict_idle(Duration::ZERO), 1);
        let (status, json) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_answer_before_ingest_is_not_ready() {
        let app = app();
        let id = create(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/sessions/{}/answer", id),
            Some(serde_json::json!({ "question": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "not_ready");
    }

    #[tokio::test]
    async fn test_ingest_answer_reset_flow() {
        let app = app();
        let id = create(&app).await;

        let (status, json) = call(
            &app,
            "POST",
            &format!("/sessions/{}/ingest", id),
            Some(serde_json::json!({ "text": "The library opens at nine. It closes at five." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["chunks"], 1);

        let (status, json) = call(
            &app,
            "POST",
            &format!("/sessions/{}/answer", id),
            Some(serde_json::json!({ "question": "When does the library open?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "The library opens at nine.");
        assert_eq!(json["sources"].as_array().unwrap().len(), 1);

        let (_, json) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(json["status"], "ready");
        assert_eq!(json["history"], 1);

        let (status, _) = call(&app, "POST", &format!("/sessions/{}/reset", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, json) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
        assert_eq!(json["status"], "empty");
        assert_eq!(json["chunks"], 0);
    }

    #[tokio::test]
    async fn test_empty_document_is_bad_request() {
        let app = app();
        let id = create(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/sessions/{}/ingest", id),
            Some(serde_json::json!({ "text": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = app();
        let id = create(&app).await;
        let (status, json) = call(
            &app,
            "POST",
            &format!("/sessions/{}/ingest", id),
            Some(serde_json::json!({ "wrong": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_unknown_and_deleted_sessions() {
        let app = app();
        let (status, json) = call(&app, "GET", &format!("/sessions/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");

        let (status, _) = call(&app, "GET", "/sessions/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = create(&app).await;
        let (status, _) = call(&app, "DELETE", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, "DELETE", &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (Error::NotReady, StatusCode::CONFLICT, "not_ready"),
            (Error::EmptyDocument, StatusCode::BAD_REQUEST, "bad_request"),
            (
                Error::Upstream {
                    operation: doc_qa_core::Upstream::Generation,
                    message: "boom".into(),
                },
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                Error::UpstreamTimeout {
                    operation: doc_qa_core::Upstream::Embedding,
                    timeout: std::time::Duration::from_secs(1),
                },
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
            ),
            (Error::CorruptIndex("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }
}
