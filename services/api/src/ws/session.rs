//! Per-connection bridge between the client WebSocket and the upstream
//! voice agent.
//!
//! Each connection walks `AwaitingInit → Connecting → Active → Closing →
//! Closed`. While active, two cooperating tasks share one
//! [`ConnectionContext`]: the inbound relay forwards client audio upstream,
//! and the consumer task translates upstream events into downstream
//! notifications and ledger records. Either side disconnecting drives the
//! connection into Closing, where the consumer is cancelled and awaited
//! before the upstream socket is released.

use super::protocol::{ClientMessage, ServerMessage};
use super::upstream::{self, AgentSocket, BridgeError, Translation};
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use base64::Engine;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parlo_core::ledger::{LedgerError, TurnFeedback};
use parlo_core::session::{ConversationTopic, ProficiencyLevel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

type ClientSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BridgeState {
    AwaitingInit,
    Connecting,
    Active,
    Closing,
    Closed,
}

fn transition(state: &mut BridgeState, next: BridgeState) {
    debug!(from = ?state, to = ?next, "bridge state transition");
    *state = next;
}

/// Session parameters carried by the mandatory first client message.
#[derive(Debug)]
struct InitParams {
    level: ProficiencyLevel,
    topic: ConversationTopic,
    voice_id: Option<String>,
    user_id: Option<String>,
}

fn parse_init(text: &str) -> Result<InitParams, BridgeError> {
    let msg: ClientMessage = serde_json::from_str(text)
        .map_err(|e| BridgeError::Protocol(format!("first message must be init: {e}")))?;
    match msg {
        ClientMessage::Init {
            level,
            topic,
            voice_id,
            user_id,
        } => Ok(InitParams {
            level: ProficiencyLevel::parse_or_default(level.as_deref().unwrap_or("")),
            topic: ConversationTopic::parse_or_default(topic.as_deref().unwrap_or("")),
            voice_id,
            user_id,
        }),
        _ => Err(BridgeError::Protocol(
            "first message must be init".to_string(),
        )),
    }
}

/// State shared by the two connection duties. All cross-task communication
/// goes through this context; no closures over mutable outer variables.
struct ConnectionContext {
    session_id: Uuid,
    state: Arc<AppState>,
    client_tx: ClientSink,
    /// Agent audio bytes since the last speech boundary. Diagnostics only;
    /// forwarding never waits on it.
    scratch_bytes: AtomicUsize,
}

impl ConnectionContext {
    async fn send(&self, msg: ServerMessage) -> anyhow::Result<()> {
        send_msg(&mut *self.client_tx.lock().await, msg).await
    }

    /// Forwards synthesized audio downstream the moment it arrives.
    async fn forward_agent_audio(&self, data: &[u8]) -> anyhow::Result<()> {
        self.scratch_bytes.fetch_add(data.len(), Ordering::Relaxed);
        let audio = base64::engine::general_purpose::STANDARD.encode(data);
        self.send(ServerMessage::Audio {
            audio,
            format: "linear16".to_string(),
            sample_rate: upstream::OUTPUT_SAMPLE_RATE,
        })
        .await
    }

    /// Translates one upstream JSON frame. A malformed frame is dropped and
    /// the session continues; an error here means the downstream peer is
    /// unreachable.
    async fn handle_agent_event(&self, text: &str) -> anyhow::Result<()> {
        let event = match serde_json::from_str::<upstream::AgentEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "unparseable voice agent event, dropping");
                return Ok(());
            }
        };

        match upstream::translate(event) {
            Translation::UserTranscript { text } => {
                info!(transcript = %text, "user transcript");
                self.send(ServerMessage::FinalTranscript {
                    text: text.clone(),
                    confidence: 1.0,
                    is_final: true,
                })
                .await?;
                // Agent transcripts carry no word-level scores; the turn
                // records at neutral confidence.
                if let Err(e) = self
                    .state
                    .ledger
                    .record_turn(self.session_id, &text, &[], &TurnFeedback::default())
                    .await
                {
                    warn!(error = %e, "failed to record turn");
                }
            }
            Translation::AgentText { text } => {
                self.send(ServerMessage::plain_feedback(text)).await?;
            }
            Translation::ResetBuffer => {
                self.scratch_bytes.store(0, Ordering::Relaxed);
            }
            Translation::AudioDone => {
                info!(
                    bytes = self.scratch_bytes.load(Ordering::Relaxed),
                    "agent finished speaking"
                );
            }
            Translation::UpstreamError { message } => {
                error!(upstream_error = %message, "voice agent reported an error");
                self.send(ServerMessage::Error { message }).await?;
            }
            Translation::Ignore => {}
        }
        Ok(())
    }
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual voice connection.
#[instrument(name = "voice_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut bridge_state = BridgeState::AwaitingInit;
    let conn_tag: u32 = rand::random();
    tracing::Span::current().record("session_id", format!("pending-{conn_tag}").as_str());
    info!("new voice connection, awaiting init");

    let (client_tx, mut client_rx) = socket.split();
    let client_tx: ClientSink = Arc::new(Mutex::new(client_tx));

    // AwaitingInit: the first inbound frame must be an init control message.
    let parsed = match client_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_init(&text),
        Some(Ok(_)) => Err(BridgeError::Protocol(
            "first message was not a text init frame".to_string(),
        )),
        Some(Err(e)) => {
            warn!(error = %e, "client socket error before init");
            return;
        }
        None => {
            info!("client disconnected before init");
            return;
        }
    };
    let init = match parsed {
        Ok(init) => init,
        Err(e) => {
            error!(error = %e, "fatal protocol error during init");
            let _ = send_msg(
                &mut *client_tx.lock().await,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    transition(&mut bridge_state, BridgeState::Connecting);
    let voice_id = init
        .voice_id
        .clone()
        .unwrap_or_else(|| state.config.default_voice.clone());

    // Session creation is the only failure allowed to abort the attempt
    // outright: no client-visible session exists yet.
    let session_id = match state
        .ledger
        .start_session(init.user_id.clone(), init.level, init.topic, &voice_id)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "failed to start session");
            let _ = send_msg(
                &mut *client_tx.lock().await,
                ServerMessage::Error {
                    message: "failed to start session".to_string(),
                },
            )
            .await;
            return;
        }
    };
    tracing::Span::current().record("session_id", session_id.to_string().as_str());
    info!(level = %init.level, topic = %init.topic, "session started");

    if send_msg(
        &mut *client_tx.lock().await,
        ServerMessage::SessionStarted {
            session_id,
            level: init.level,
            topic: init.topic,
        },
    )
    .await
    .is_err()
    {
        warn!("client vanished before session_started was delivered");
        finalize_session(&state, session_id).await;
        return;
    }

    let agent_socket =
        match upstream::connect(&state.config, init.level, init.topic, &voice_id).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, "upstream connection failed");
                let _ = send_msg(
                    &mut *client_tx.lock().await,
                    ServerMessage::Error {
                        message: "failed to connect to voice agent".to_string(),
                    },
                )
                .await;
                finalize_session(&state, session_id).await;
                return;
            }
        };

    transition(&mut bridge_state, BridgeState::Active);
    let (mut agent_tx, agent_rx) = agent_socket.split();
    let ctx = Arc::new(ConnectionContext {
        session_id,
        state: state.clone(),
        client_tx: client_tx.clone(),
        scratch_bytes: AtomicUsize::new(0),
    });

    // The consumer signals completion over a oneshot so the relay can react
    // to an upstream disconnect without polling the JoinHandle twice.
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let consumer_ctx = ctx.clone();
    let consumer = tokio::spawn(async move {
        consume_agent_events(agent_rx, consumer_ctx).await;
        let _ = done_tx.send(());
    });

    relay_client_audio(&mut client_rx, &mut agent_tx, &mut done_rx, &ctx).await;

    // Closing: cancel the consumer and await it before releasing the
    // upstream socket, so no dangling read keeps the agent connection alive.
    transition(&mut bridge_state, BridgeState::Closing);
    consumer.abort();
    let _ = consumer.await;
    let _ = agent_tx.close().await;
    finalize_session(&state, session_id).await;

    transition(&mut bridge_state, BridgeState::Closed);
    info!("voice session closed");
}

/// Inbound relay duty: forwards every client audio frame verbatim to the
/// upstream socket until stop, disconnect, or the upstream consumer ends.
async fn relay_client_audio(
    client_rx: &mut SplitStream<WebSocket>,
    agent_tx: &mut SplitSink<AgentSocket, WsMessage>,
    upstream_done: &mut oneshot::Receiver<()>,
    ctx: &ConnectionContext,
) {
    loop {
        tokio::select! {
            _ = &mut *upstream_done => {
                info!("upstream consumer finished, closing");
                return;
            }
            maybe = client_rx.next() => {
                let Some(result) = maybe else {
                    info!("client disconnected");
                    return;
                };
                let msg = match result {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(error = %e, "client socket error");
                        return;
                    }
                };
                match msg {
                    Message::Binary(data) => {
                        if let Err(e) = agent_tx.send(WsMessage::Binary(data)).await {
                            error!(error = %e, "failed to forward audio upstream");
                            let _ = ctx
                                .send(ServerMessage::Error {
                                    message: "voice connection lost".to_string(),
                                })
                                .await;
                            return;
                        }
                    }
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Audio { audio }) => {
                            match base64::engine::general_purpose::STANDARD.decode(audio.as_bytes()) {
                                Ok(bytes) => {
                                    if let Err(e) =
                                        agent_tx.send(WsMessage::Binary(bytes.into())).await
                                    {
                                        error!(error = %e, "failed to forward audio upstream");
                                        let _ = ctx
                                            .send(ServerMessage::Error {
                                                message: "voice connection lost".to_string(),
                                            })
                                            .await;
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!(error = %e, "undecodable audio envelope, dropping frame");
                                }
                            }
                        }
                        Ok(ClientMessage::Stop) => {
                            info!("client requested stop");
                            return;
                        }
                        Ok(ClientMessage::Init { .. }) => {
                            warn!("duplicate init ignored");
                        }
                        Err(e) => {
                            debug!(error = %e, "ignoring unrecognized control frame");
                        }
                    },
                    Message::Close(_) => {
                        info!("client sent close frame");
                        return;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }
}

/// Outbound duty: consumes upstream frames for the life of the connection,
/// translating events and forwarding audio unbuffered.
async fn consume_agent_events(mut agent_rx: SplitStream<AgentSocket>, ctx: Arc<ConnectionContext>) {
    while let Some(result) = agent_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "voice agent socket error");
                let _ = ctx
                    .send(ServerMessage::Error {
                        message: format!("voice agent connection error: {e}"),
                    })
                    .await;
                return;
            }
        };
        match msg {
            WsMessage::Binary(data) => {
                if ctx.forward_agent_audio(&data).await.is_err() {
                    // Downstream peer gone; nothing left to forward to.
                    return;
                }
            }
            WsMessage::Text(text) => {
                if ctx.handle_agent_event(&text).await.is_err() {
                    return;
                }
            }
            WsMessage::Close(frame) => {
                info!(?frame, "voice agent closed the connection");
                return;
            }
            _ => {}
        }
    }
    info!("voice agent stream ended");
}

/// Best-effort finalization: a missing session or a store failure must not
/// keep connection teardown from completing.
async fn finalize_session(state: &Arc<AppState>, session_id: Uuid) {
    match state.ledger.end_session(session_id).await {
        Ok(summary) => info!(
            turns = summary.turns_count,
            avg_confidence = summary.avg_confidence,
            duration = %summary.duration_formatted,
            "session summary archived"
        ),
        Err(LedgerError::NotFound(_)) => debug!("session already finalized"),
        Err(e) => warn!(error = %e, "failed to finalize session"),
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> anyhow::Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_fills_defaults() {
        let init = parse_init(r#"{"type": "init"}"#).unwrap();
        assert_eq!(init.level, ProficiencyLevel::Intermediate);
        assert_eq!(init.topic, ConversationTopic::FreeTalk);
        assert!(init.voice_id.is_none());
        assert!(init.user_id.is_none());
    }

    #[test]
    fn parse_init_reads_all_fields() {
        let init = parse_init(
            r#"{"type": "init", "level": "advanced", "topic": "business",
                "voice_id": "aura-asteria-en", "user_id": "learner-3"}"#,
        )
        .unwrap();
        assert_eq!(init.level, ProficiencyLevel::Advanced);
        assert_eq!(init.topic, ConversationTopic::Business);
        assert_eq!(init.voice_id.as_deref(), Some("aura-asteria-en"));
        assert_eq!(init.user_id.as_deref(), Some("learner-3"));
    }

    #[test]
    fn parse_init_rejects_non_init_first_message() {
        let err = parse_init(r#"{"type": "stop"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));

        let err = parse_init("not json at all").unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn unknown_level_in_init_falls_back_to_default() {
        let init = parse_init(r#"{"type": "init", "level": "expert", "topic": "cooking"}"#).unwrap();
        assert_eq!(init.level, ProficiencyLevel::Intermediate);
        assert_eq!(init.topic, ConversationTopic::FreeTalk);
    }
}
