//! Axum handlers for the REST API.
//!
//! Session management, analytics and materials read-outs, the voice preview,
//! and the OpenAI-compatible think endpoint the upstream agent calls for its
//! generation step.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{
        AnalyticsQuery, CreateSessionPayload, ErrorResponse, MaterialsQuery,
        SessionProgressResponse, SessionResponse, ThinkRequest, ThinkResponse,
        VoicePreviewPayload, VoicePreviewResponse,
    },
    state::AppState,
    tts,
};
use parlo_core::ledger::LedgerError;
use parlo_core::llm::{assistant_message, system_message, user_message};
use parlo_core::prompts;
use parlo_core::session::ProficiencyLevel;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Service health probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = Object))
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = if state.config.database_url.is_some() { "postgres" } else { "memory" };
    let llm = if state.chat.is_some() { "ready" } else { "not_configured" };
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "services": {
            "store": store,
            "llm": llm,
        }
    }))
}

/// Create a new practice session.
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let voice_id = payload
        .voice_id
        .clone()
        .unwrap_or_else(|| state.config.default_voice.clone());

    let session_id = state
        .ledger
        .start_session(payload.user_id.clone(), payload.level, payload.topic, &voice_id)
        .await?;

    let session = state
        .ledger
        .store()
        .fetch_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{session_id}' not found")))?;

    info!(%session_id, "session created via REST");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            user_id: session.user_id,
            level: session.level,
            topic: session.topic,
            voice_id: session.voice_id,
            created_at: session.created_at,
            status: "active".to_string(),
        }),
    ))
}

/// Read the live progress of a session.
#[utoipa::path(
    get,
    path = "/api/sessions/{id}/progress",
    responses(
        (status = 200, description = "Session progress", body = SessionProgressResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_session_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionProgressResponse>, ApiError> {
    let session = state
        .ledger
        .store()
        .fetch_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{id}' not found")))?;

    let status = match session.status {
        parlo_core::session::SessionStatus::Active => "active",
        parlo_core::session::SessionStatus::Completed => "completed",
    };
    Ok(Json(SessionProgressResponse {
        session_id: id,
        status: status.to_string(),
        level: session.level,
        topic: session.topic,
        metrics: session.metrics,
        turns_count: session.turns.len(),
    }))
}

/// End a practice session and return its summary.
///
/// Ending an unknown or already-completed session is a 404 with a benign
/// body: duplicate end signals race with connection teardown by design.
#[utoipa::path(
    post,
    path = "/api/sessions/{id}/end",
    responses(
        (status = 200, description = "Session summary", body = Object),
        (status = 404, description = "Session not found or already completed", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<parlo_core::session::Summary>, ApiError> {
    match state.ledger.end_session(id).await {
        Ok(summary) => Ok(Json(summary)),
        Err(LedgerError::NotFound(_)) => Err(ApiError::NotFound(format!(
            "Session with id '{id}' not found"
        ))),
        Err(e) => Err(ApiError::InternalServerError(e.into())),
    }
}

/// Aggregated analytics over a learner's recent sessions.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/analytics",
    responses((status = 200, description = "User analytics", body = Object)),
    params(
        ("user_id" = String, Path, description = "Learner ID"),
        AnalyticsQuery
    )
)]
pub async fn get_user_analytics(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<parlo_core::analytics::UserAnalytics>, ApiError> {
    let limit = query.limit.unwrap_or(100);
    let analytics = state.ledger.user_analytics(&user_id, limit).await?;
    Ok(Json(analytics))
}

fn levels_filter(level: &Option<String>) -> Vec<ProficiencyLevel> {
    match level {
        Some(raw) => vec![ProficiencyLevel::parse_or_default(raw)],
        None => vec![
            ProficiencyLevel::Beginner,
            ProficiencyLevel::Intermediate,
            ProficiencyLevel::Advanced,
        ],
    }
}

/// Grammar rules, optionally filtered by level.
#[utoipa::path(
    get,
    path = "/api/materials/grammar",
    responses((status = 200, description = "Grammar rules", body = Object)),
    params(MaterialsQuery)
)]
pub async fn get_grammar_materials(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MaterialsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    let mut rules = Vec::new();
    for level in levels_filter(&query.level) {
        rules.extend(state.materials.grammar_for_level(level, limit).await?);
    }
    Ok(Json(serde_json::json!({ "grammar_rules": rules })))
}

/// Vocabulary items, optionally filtered by level.
#[utoipa::path(
    get,
    path = "/api/materials/vocabulary",
    responses((status = 200, description = "Vocabulary items", body = Object)),
    params(MaterialsQuery)
)]
pub async fn get_vocabulary_materials(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MaterialsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(20);
    let mut items = Vec::new();
    for level in levels_filter(&query.level) {
        items.extend(state.materials.vocabulary_for_level(level, limit).await?);
    }
    Ok(Json(serde_json::json!({ "vocabulary": items })))
}

/// Synthesize a short audio preview for a voice.
#[utoipa::path(
    post,
    path = "/api/voice/preview",
    request_body = VoicePreviewPayload,
    responses(
        (status = 200, description = "Audio preview", body = VoicePreviewResponse),
        (status = 500, description = "Synthesis failed", body = ErrorResponse)
    )
)]
pub async fn voice_preview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VoicePreviewPayload>,
) -> Result<Json<VoicePreviewResponse>, ApiError> {
    let voice_id = payload
        .voice_id
        .unwrap_or_else(|| state.config.default_voice.clone());
    let text = payload.text.unwrap_or_else(|| {
        "Hello! I am your English practice partner. Let's talk!".to_string()
    });

    let audio = tts::speak(&state.http, &state.config.deepgram_api_key, &voice_id, &text).await?;
    Ok(Json(VoicePreviewResponse {
        audio: base64::engine::general_purpose::STANDARD.encode(&audio),
        format: "linear16".to_string(),
        sample_rate: tts::OUTPUT_SAMPLE_RATE,
    }))
}

/// OpenAI-compatible endpoint the upstream voice agent calls for its think
/// step. Recovers session parameters from the forwarded system prompt,
/// retrieves supporting materials for the utterance, and completes with the
/// configured chat model.
#[utoipa::path(
    post,
    path = "/api/llm/think",
    request_body = ThinkRequest,
    responses(
        (status = 200, description = "Chat completion", body = ThinkResponse),
        (status = 503, description = "No chat provider configured", body = ErrorResponse)
    )
)]
pub async fn llm_think(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ThinkRequest>,
) -> Result<Json<ThinkResponse>, ApiError> {
    let Some(chat) = state.chat.clone() else {
        return Err(ApiError::Unavailable(
            "no chat provider configured".to_string(),
        ));
    };

    let mut level = ProficiencyLevel::Intermediate;
    let mut topic = parlo_core::session::ConversationTopic::FreeTalk;
    let mut history = Vec::new();
    let mut user_input = String::new();

    for msg in &request.messages {
        match msg.role.as_str() {
            "system" => {
                (level, topic) = prompts::extract_markers(&msg.content);
            }
            "user" => {
                user_input = msg.content.clone();
                history.push(user_message(&msg.content)?);
            }
            "assistant" => {
                history.push(assistant_message(&msg.content)?);
            }
            _ => {}
        }
    }
    if user_input.is_empty() {
        return Err(ApiError::BadRequest(
            "request carried no user message".to_string(),
        ));
    }

    // Retrieval is fully contained: worst case it contributes nothing.
    let context = state.retrieval.retrieve(&user_input, level, 3).await;
    let system = prompts::practice_prompt(level, topic, &context);

    let mut messages = vec![system_message(&system)?];
    messages.extend(history);

    let reply = chat.complete(messages).await?;
    Ok(Json(ThinkResponse::assistant_reply(
        &state.config.chat_model,
        reply,
        Utc::now(),
    )))
}
