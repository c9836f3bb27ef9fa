//! API request/response models.
//!
//! These are the REST-facing shapes only; the domain model lives in
//! `parlo-core` and the WebSocket vocabulary in `ws::protocol`. Core types
//! that appear in responses are exposed to OpenAPI as plain objects.

use chrono::{DateTime, Utc};
use parlo_core::session::{ConversationTopic, Metrics, ProficiencyLevel};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

fn default_level() -> ProficiencyLevel {
    ProficiencyLevel::Intermediate
}

fn default_topic() -> ConversationTopic {
    ConversationTopic::FreeTalk
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionPayload {
    pub user_id: Option<String>,
    #[serde(default = "default_level")]
    #[schema(value_type = String, example = "intermediate")]
    pub level: ProficiencyLevel,
    #[serde(default = "default_topic")]
    #[schema(value_type = String, example = "free_talk")]
    pub topic: ConversationTopic,
    pub voice_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub user_id: Option<String>,
    #[schema(value_type = String, example = "intermediate")]
    pub level: ProficiencyLevel,
    #[schema(value_type = String, example = "free_talk")]
    pub topic: ConversationTopic,
    pub voice_id: String,
    pub created_at: DateTime<Utc>,
    #[schema(example = "active")]
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionProgressResponse {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    #[schema(example = "active")]
    pub status: String,
    #[schema(value_type = String)]
    pub level: ProficiencyLevel,
    #[schema(value_type = String)]
    pub topic: ConversationTopic,
    #[schema(value_type = Object)]
    pub metrics: Metrics,
    pub turns_count: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AnalyticsQuery {
    /// How many recent session summaries to aggregate over.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MaterialsQuery {
    /// Proficiency level filter; all levels when omitted.
    pub level: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VoicePreviewPayload {
    pub voice_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoicePreviewResponse {
    /// Base64-encoded 16-bit linear PCM.
    pub audio: String,
    #[schema(example = "linear16")]
    pub format: String,
    #[schema(example = 24000)]
    pub sample_rate: u32,
}

/// One message in an OpenAI-style chat payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ThinkMessage {
    #[schema(example = "user")]
    pub role: String,
    pub content: String,
}

/// The request body the upstream agent posts for its generation step.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ThinkRequest {
    pub messages: Vec<ThinkMessage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThinkChoice {
    pub index: u32,
    pub message: ThinkMessage,
    #[schema(example = "stop")]
    pub finish_reason: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThinkUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// OpenAI-compatible chat.completion reply for the think endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ThinkResponse {
    pub id: String,
    #[schema(example = "chat.completion")]
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ThinkChoice>,
    pub usage: ThinkUsage,
}

impl ThinkResponse {
    pub fn assistant_reply(model: &str, content: String, created: DateTime<Utc>) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: created.timestamp(),
            model: model.to_string(),
            choices: vec![ThinkChoice {
                index: 0,
                message: ThinkMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: ThinkUsage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_payload_applies_defaults() {
        let payload: CreateSessionPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.user_id.is_none());
        assert_eq!(payload.level, ProficiencyLevel::Intermediate);
        assert_eq!(payload.topic, ConversationTopic::FreeTalk);
        assert!(payload.voice_id.is_none());
    }

    #[test]
    fn create_session_payload_accepts_full_body() {
        let json = r#"{
            "user_id": "learner-9",
            "level": "beginner",
            "topic": "travel",
            "voice_id": "aura-asteria-en"
        }"#;
        let payload: CreateSessionPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.user_id.as_deref(), Some("learner-9"));
        assert_eq!(payload.level, ProficiencyLevel::Beginner);
        assert_eq!(payload.topic, ConversationTopic::Travel);
        assert_eq!(payload.voice_id.as_deref(), Some("aura-asteria-en"));
    }

    #[test]
    fn create_session_payload_rejects_unknown_level() {
        let result: Result<CreateSessionPayload, _> =
            serde_json::from_str(r#"{"level": "native"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn think_request_parses_openai_shape() {
        let json = r#"{
            "messages": [
                {"role": "system", "content": "LEARNER LEVEL: BEGINNER"},
                {"role": "user", "content": "I have went to school"}
            ],
            "model": "ignored-extra-field"
        }"#;
        let request: ThinkRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].role, "user");
    }

    #[test]
    fn think_response_has_single_assistant_choice() {
        let response =
            ThinkResponse::assistant_reply("llama-3.3-70b-versatile", "Nice try!".into(), Utc::now());
        assert!(response.id.starts_with("chatcmpl-"));
        assert_eq!(response.object, "chat.completion");
        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.role, "assistant");
        assert_eq!(response.choices[0].finish_reason, "stop");

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"content\":\"Nice try!\""));
    }
}
