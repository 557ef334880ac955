//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for chat sessions, one-shot questions, and
//! index search.

use crate::chat::{ChatOrchestrator, ChatSession, Excerpt, SessionDefaults, Turn};
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{GroundingMethod, ProviderSpecialty, Settings};
use crate::error::{AnamneseError, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    orchestrator: ChatOrchestrator,
    settings: Settings,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<ChatSession>>>>,
}

/// Run the HTTP API server.
pub async fn run_serve(settings: &Settings, host: &str, port: u16) -> Result<()> {
    preflight::check(Operation::Chat, settings)?;

    let orchestrator = ChatOrchestrator::from_settings(settings)?;

    let state = Arc::new(AppState {
        orchestrator,
        settings: settings.clone(),
        sessions: RwLock::new(HashMap::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}/turns", post(post_turn))
        .route("/sessions/{id}/transcript", get(get_transcript))
        .route("/sessions/{id}/reset", post(reset_session))
        .route("/sessions/{id}", delete(delete_session))
        .route("/ask", post(ask))
        .route("/search", post(search))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Anamnese API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET    /health");
    Output::kv("Create session", "POST   /sessions");
    Output::kv("Send turn", "POST   /sessions/{id}/turns");
    Output::kv("Transcript", "GET    /sessions/{id}/transcript");
    Output::kv("Reset session", "POST   /sessions/{id}/reset");
    Output::kv("Delete session", "DELETE /sessions/{id}");
    Output::kv("Ask (one-shot)", "POST   /ask");
    Output::kv("Search", "POST   /search");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize, Default)]
struct CreateSessionRequest {
    #[serde(default)]
    grounding: Option<GroundingMethod>,
    #[serde(default)]
    specialty: Option<ProviderSpecialty>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
    mode: String,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct TurnRequest {
    message: String,
}

#[derive(Serialize)]
struct TurnResponse {
    reply: String,
}

#[derive(Serialize)]
struct TranscriptResponse {
    mode: Option<String>,
    turns: Vec<Turn>,
}

#[derive(Deserialize, Default)]
struct ResetRequest {
    #[serde(default)]
    grounding: Option<GroundingMethod>,
    #[serde(default)]
    specialty: Option<ProviderSpecialty>,
}

#[derive(Serialize)]
struct ResetResponse {
    status: String,
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    specialty: Option<ProviderSpecialty>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<Excerpt>,
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    min_score: Option<f32>,
}

fn default_limit() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<Excerpt>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Map an error to an HTTP status with a JSON body.
fn error_response(e: &AnamneseError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        AnamneseError::Config(_) | AnamneseError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnamneseError::RecordUnavailable(_)
        | AnamneseError::OpenAI(_)
        | AnamneseError::Chat(_)
        | AnamneseError::Embedding(_)
        | AnamneseError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn session_not_found(id: Uuid) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("No session {}", id),
        }),
    )
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = SessionDefaults {
        grounding: req.grounding.or(state.settings.chat.grounding),
        specialty: req.specialty.unwrap_or(state.settings.chat.specialty),
    };

    let mut session = ChatSession::new(defaults);
    let summary = match state.orchestrator.start(&mut session).await {
        Ok(summary) => summary,
        Err(e) => return error_response(&e).into_response(),
    };
    let mode = session
        .transcript()
        .map(|t| t.mode().to_string())
        .unwrap_or_default();

    let session_id = Uuid::new_v4();
    state
        .sessions
        .write()
        .await
        .insert(session_id, Arc::new(Mutex::new(session)));

    Json(CreateSessionResponse {
        session_id,
        mode,
        summary,
    })
    .into_response()
}

async fn post_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> impl IntoResponse {
    let session = match state.sessions.read().await.get(&id).cloned() {
        Some(session) => session,
        None => return session_not_found(id).into_response(),
    };

    if req.message.trim().is_empty() {
        let e = AnamneseError::InvalidInput("Empty message".to_string());
        return error_response(&e).into_response();
    }

    let mut session = session.lock().await;
    match state.orchestrator.handle_turn(&mut session, &req.message).await {
        Ok(reply) => Json(TurnResponse { reply }).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let session = match state.sessions.read().await.get(&id).cloned() {
        Some(session) => session,
        None => return session_not_found(id).into_response(),
    };

    let session = session.lock().await;
    Json(TranscriptResponse {
        mode: session.transcript().map(|t| t.mode().to_string()),
        turns: session.visible_turns().to_vec(),
    })
    .into_response()
}

async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<ResetRequest>>,
) -> impl IntoResponse {
    let session = match state.sessions.read().await.get(&id).cloned() {
        Some(session) => session,
        None => return session_not_found(id).into_response(),
    };

    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mut session = session.lock().await;
    let defaults = SessionDefaults {
        grounding: req.grounding.or(session.defaults().grounding),
        specialty: req.specialty.unwrap_or(session.defaults().specialty),
    };
    session.reset(defaults);

    Json(ResetResponse {
        status: "reset".to_string(),
    })
    .into_response()
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.sessions.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => session_not_found(id).into_response(),
    }
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> impl IntoResponse {
    let specialty = req.specialty.unwrap_or(state.settings.chat.specialty);

    match state.orchestrator.answer_once(&req.question, specialty).await {
        Ok(answer) => Json(AskResponse {
            answer: answer.text,
            sources: answer.sources,
        })
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    match state
        .orchestrator
        .search(&req.query, req.limit, req.min_score)
        .await
    {
        Ok(results) => Json(SearchResponse { results }).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}
