//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CreateSessionPayload, ErrorResponse, SessionProgressResponse, SessionResponse,
        ThinkChoice, ThinkMessage, ThinkRequest, ThinkResponse, ThinkUsage, VoicePreviewPayload,
        VoicePreviewResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_session,
        handlers::get_session_progress,
        handlers::end_session,
        handlers::get_user_analytics,
        handlers::get_grammar_materials,
        handlers::get_vocabulary_materials,
        handlers::voice_preview,
        handlers::llm_think,
    ),
    components(
        schemas(
            CreateSessionPayload,
            SessionResponse,
            SessionProgressResponse,
            VoicePreviewPayload,
            VoicePreviewResponse,
            ThinkRequest,
            ThinkResponse,
            ThinkMessage,
            ThinkChoice,
            ThinkUsage,
            ErrorResponse
        )
    ),
    tags(
        (name = "Parlo API", description = "Real-time English speaking practice with AI feedback")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{id}/progress",
            get(handlers::get_session_progress),
        )
        .route("/api/sessions/{id}/end", post(handlers::end_session))
        .route(
            "/api/users/{user_id}/analytics",
            get(handlers::get_user_analytics),
        )
        .route(
            "/api/materials/grammar",
            get(handlers::get_grammar_materials),
        )
        .route(
            "/api/materials/vocabulary",
            get(handlers::get_vocabulary_materials),
        )
        .route("/api/voice/preview", post(handlers::voice_preview))
        .route("/api/llm/think", post(handlers::llm_think))
        .route("/ws/voice", get(ws_handler))
        .with_state(app_state);

    // Merge the stateful routes with the stateless Swagger UI.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
