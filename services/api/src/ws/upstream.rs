//! The upstream voice-agent transport.
//!
//! One persistent duplex WebSocket per client session, speaking the Deepgram
//! Voice Agent `converse` protocol: a one-time `Settings` control message on
//! connect, then interleaved JSON events and raw binary audio frames in both
//! directions. The inbound vocabulary is a closed enum; translation into the
//! downstream protocol is a pure function so both directions stay testable
//! without a socket.

use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::Config;
use futures_util::SinkExt;
use parlo_core::prompts;
use parlo_core::session::{ConversationTopic, ProficiencyLevel};

pub type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Input is 16 kHz linear PCM from the client; output comes back at 24 kHz.
/// Both sides are forwarded verbatim, no resampling.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Fatal for the session: the upstream socket could not be opened or
    /// configured.
    #[error("upstream connection failed: {0}")]
    UpstreamConnection(String),
    /// The downstream peer violated the protocol (e.g. a non-init first
    /// message).
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Events the upstream agent emits, by `type` discriminator. Unknown event
/// kinds decode to [`AgentEvent::Unknown`] rather than failing the frame.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AgentEvent {
    Welcome,
    SettingsApplied,
    ConversationText {
        role: String,
        content: String,
    },
    UserStartedSpeaking,
    AgentThinking,
    AgentStartedSpeaking,
    AgentAudioDone,
    Interrupt,
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// What the bridge should do with one upstream event.
#[derive(Debug, PartialEq)]
pub enum Translation {
    /// Final user transcript: record the turn and notify downstream.
    UserTranscript { text: String },
    /// Partner reply text: notify downstream as feedback.
    AgentText { text: String },
    /// Speech boundary: reset the diagnostic scratch buffer.
    ResetBuffer,
    /// The agent finished speaking; the scratch buffer now holds the full
    /// utterance size.
    AudioDone,
    /// Upstream reported an error; surface it downstream, keep going.
    UpstreamError { message: String },
    /// Housekeeping event with no downstream counterpart.
    Ignore,
}

/// Pure upstream→downstream event mapping.
pub fn translate(event: AgentEvent) -> Translation {
    match event {
        AgentEvent::ConversationText { role, content } => match role.as_str() {
            "user" => Translation::UserTranscript { text: content },
            "assistant" => Translation::AgentText { text: content },
            other => {
                debug!(role = other, "conversation text with unhandled role");
                Translation::Ignore
            }
        },
        AgentEvent::UserStartedSpeaking | AgentEvent::AgentStartedSpeaking => {
            Translation::ResetBuffer
        }
        AgentEvent::AgentAudioDone => Translation::AudioDone,
        AgentEvent::Error { message } => Translation::UpstreamError { message },
        AgentEvent::Welcome
        | AgentEvent::SettingsApplied
        | AgentEvent::AgentThinking
        | AgentEvent::Interrupt
        | AgentEvent::Unknown => Translation::Ignore,
    }
}

/// Builds the one-time `Settings` control message for a session.
pub fn settings_message(
    config: &Config,
    level: ProficiencyLevel,
    topic: ConversationTopic,
    voice_id: &str,
) -> serde_json::Value {
    json!({
        "type": "Settings",
        "audio": {
            "input": {
                "encoding": "linear16",
                "sample_rate": INPUT_SAMPLE_RATE,
            },
            "output": {
                "encoding": "linear16",
                "sample_rate": OUTPUT_SAMPLE_RATE,
                "container": "none",
            }
        },
        "agent": {
            "language": "en",
            "listen": {
                "provider": {
                    "type": "deepgram",
                    "model": config.listen_model,
                }
            },
            "think": {
                "provider": {
                    "type": "groq",
                    "model": config.chat_model,
                    "temperature": 0.7,
                },
                "endpoint": {
                    "url": config.think_endpoint(),
                    "headers": { "Content-Type": "application/json" }
                },
                "prompt": prompts::agent_system_prompt(level, topic),
            },
            "speak": {
                "provider": {
                    "type": "deepgram",
                    "model": voice_id,
                }
            },
            "greeting": prompts::greeting(level),
        }
    })
}

/// Opens the upstream socket and sends the session configuration. Any
/// failure here is fatal for the session.
pub async fn connect(
    config: &Config,
    level: ProficiencyLevel,
    topic: ConversationTopic,
    voice_id: &str,
) -> Result<AgentSocket, BridgeError> {
    let mut request = config
        .agent_url
        .as_str()
        .into_client_request()
        .map_err(|e| BridgeError::UpstreamConnection(e.to_string()))?;
    let auth = HeaderValue::from_str(&format!("Token {}", config.deepgram_api_key))
        .map_err(|e| BridgeError::UpstreamConnection(e.to_string()))?;
    request.headers_mut().insert("Authorization", auth);

    let (mut socket, _) = connect_async(request)
        .await
        .map_err(|e| BridgeError::UpstreamConnection(e.to_string()))?;
    info!(url = %config.agent_url, "connected to voice agent");

    let settings = settings_message(config, level, topic, voice_id);
    socket
        .send(WsMessage::Text(settings.to_string().into()))
        .await
        .map_err(|e| BridgeError::UpstreamConnection(e.to_string()))?;
    debug!(%level, %topic, voice_id, "sent voice agent settings");

    Ok(socket)
}
