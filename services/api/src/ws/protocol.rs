//! Defines the WebSocket message protocol between the browser client and the
//! API server. This vocabulary is deliberately disjoint from the upstream
//! agent's: translation between the two lives in `ws::upstream`.

use parlo_core::ledger::GrammarCorrection;
use parlo_core::session::{ConversationTopic, ProficiencyLevel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a voice session. This must be the first message.
    Init {
        level: Option<String>,
        topic: Option<String>,
        voice_id: Option<String>,
        user_id: Option<String>,
    },
    /// A chunk of input audio, base64-encoded inside a control envelope.
    /// Clients may equally send raw binary frames.
    Audio { audio: String },
    /// Ends the session from the client side.
    Stop,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session exists and the bridge is connecting upstream.
    SessionStarted {
        session_id: Uuid,
        level: ProficiencyLevel,
        topic: ConversationTopic,
    },
    /// A finalized transcription of the user's speech.
    FinalTranscript {
        text: String,
        confidence: f64,
        is_final: bool,
    },
    /// The partner's reply, with any structured feedback attached.
    Feedback {
        text: String,
        grammar_corrections: Vec<GrammarCorrection>,
        vocabulary_suggestions: Vec<String>,
        pronunciation_tips: Vec<String>,
        follow_up_question: Option<String>,
    },
    /// A chunk of synthesized speech (base64 16-bit linear PCM).
    Audio {
        audio: String,
        format: String,
        sample_rate: u32,
    },
    /// Reports an error to the client.
    Error { message: String },
}

impl ServerMessage {
    /// Plain feedback carrying only the partner's text, the common case for
    /// live conversation where no structured analysis ran.
    pub fn plain_feedback(text: String) -> Self {
        ServerMessage::Feedback {
            text,
            grammar_corrections: Vec::new(),
            vocabulary_suggestions: Vec::new(),
            pronunciation_tips: Vec::new(),
            follow_up_question: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_message_parses_with_partial_fields() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "init", "level": "beginner"}"#).unwrap();
        match msg {
            ClientMessage::Init {
                level,
                topic,
                voice_id,
                user_id,
            } => {
                assert_eq!(level.as_deref(), Some("beginner"));
                assert!(topic.is_none());
                assert!(voice_id.is_none());
                assert!(user_id.is_none());
            }
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn audio_and_stop_messages_parse() {
        let audio: ClientMessage =
            serde_json::from_str(r#"{"type": "audio", "audio": "AAAA"}"#).unwrap();
        assert!(matches!(audio, ClientMessage::Audio { .. }));

        let stop: ClientMessage = serde_json::from_str(r#"{"type": "stop"}"#).unwrap();
        assert!(matches!(stop, ClientMessage::Stop));
    }

    #[test]
    fn unknown_client_message_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type": "teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn server_messages_use_snake_case_tags() {
        let started = ServerMessage::SessionStarted {
            session_id: Uuid::nil(),
            level: ProficiencyLevel::Beginner,
            topic: ConversationTopic::DailyLife,
        };
        let json = serde_json::to_string(&started).unwrap();
        assert!(json.contains("\"type\":\"session_started\""));
        assert!(json.contains("\"level\":\"beginner\""));
        assert!(json.contains("\"topic\":\"daily_life\""));

        let transcript = ServerMessage::FinalTranscript {
            text: "I went to school".to_string(),
            confidence: 1.0,
            is_final: true,
        };
        let json = serde_json::to_string(&transcript).unwrap();
        assert!(json.contains("\"type\":\"final_transcript\""));
        assert!(json.contains("\"is_final\":true"));
    }

    #[test]
    fn plain_feedback_has_empty_structure() {
        let json =
            serde_json::to_string(&ServerMessage::plain_feedback("Well said!".into())).unwrap();
        assert!(json.contains("\"type\":\"feedback\""));
        assert!(json.contains("\"grammar_corrections\":[]"));
        assert!(json.contains("\"follow_up_question\":null"));
    }

    #[test]
    fn audio_message_carries_format_metadata() {
        let msg = ServerMessage::Audio {
            audio: "UklGRg==".to_string(),
            format: "linear16".to_string(),
            sample_rate: 24000,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"sample_rate\":24000"));
        assert!(json.contains("\"format\":\"linear16\""));
    }
}
