//! The session ledger: every practice session and turn flows through here.
//!
//! Operations are store-backed so independent connection contexts share
//! nothing but the store itself. Duplicate end signals and late turn
//! recordings are benign by design rather than guarded by locks.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analytics::{self, UserAnalytics};
use crate::session::{
    ConversationTopic, Metrics, ProficiencyLevel, Session, Summary, Turn, WordConfidence,
};
use crate::store::{AppendOutcome, ProgressRecord, SessionStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Session or record absent. Benign: callers map this to an empty or
    /// neutral result, never a crash.
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// One grammar correction attached to a turn's feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarCorrection {
    pub original: String,
    pub corrected: String,
    pub explanation: String,
}

/// Feedback delivered for a turn, as recorded on the ledger.
#[derive(Debug, Clone, Default)]
pub struct TurnFeedback {
    pub text: String,
    pub grammar_corrections: Vec<GrammarCorrection>,
}

pub struct Ledger {
    store: Arc<dyn SessionStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Creates a session in `active` status with an empty turn list and
    /// zeroed metrics. Store failures surface: a session that was never
    /// persisted must not look started.
    pub async fn start_session(
        &self,
        user_id: Option<String>,
        level: ProficiencyLevel,
        topic: ConversationTopic,
        voice_id: &str,
    ) -> Result<Uuid, LedgerError> {
        let session = Session::new(user_id, level, topic, voice_id, Utc::now());
        self.store.insert_session(&session).await?;
        debug!(session_id = %session.id, %level, %topic, "session started");
        Ok(session.id)
    }

    /// Appends a turn and refreshes the session metrics as the full mean
    /// over all turns so far. Recording against a completed or unknown
    /// session is a logged no-op: end-of-session signals race with
    /// in-flight transcripts and must not corrupt state.
    pub async fn record_turn(
        &self,
        session_id: Uuid,
        user_text: &str,
        words: &[WordConfidence],
        feedback: &TurnFeedback,
    ) -> Result<(), LedgerError> {
        let Some(session) = self.store.fetch_session(session_id).await? else {
            warn!(%session_id, "record_turn on unknown session, dropping");
            return Ok(());
        };

        let turn = Turn::new(
            user_text,
            words,
            feedback.grammar_corrections.len(),
            &feedback.text,
            Utc::now(),
        );

        // Full recomputation over the would-be turn sequence; the stored
        // metrics are a cache of exactly this mean.
        let mut turns = session.turns;
        turns.push(turn.clone());
        let metrics = Metrics::recompute(&turns);

        match self.store.append_turn(session_id, turn, metrics).await? {
            AppendOutcome::Appended => {
                debug!(%session_id, turns = turns.len(), "turn recorded");
            }
            AppendOutcome::SessionCompleted => {
                warn!(%session_id, "record_turn after session completed, dropping");
            }
            AppendOutcome::NotFound => {
                warn!(%session_id, "session vanished during record_turn, dropping");
            }
        }
        Ok(())
    }

    /// Completes the session, archives its summary and returns it.
    ///
    /// `NotFound` covers both unknown ids and sessions already completed by
    /// a racing end signal; callers treat it as a benign empty result.
    pub async fn end_session(&self, session_id: Uuid) -> Result<Summary, LedgerError> {
        let ended_at = Utc::now();
        let Some(session) = self.store.complete_session(session_id, ended_at).await? else {
            return Err(LedgerError::NotFound(session_id));
        };

        let summary = Summary::compute(&session, ended_at);
        self.store
            .insert_progress(&ProgressRecord {
                session_id,
                user_id: session.user_id.clone(),
                summary: summary.clone(),
                recorded_at: ended_at,
            })
            .await?;

        debug!(%session_id, turns = summary.turns_count, "session completed");
        Ok(summary)
    }

    /// Aggregated analytics over the learner's most recent summaries.
    /// A learner with no history gets a defined empty result.
    pub async fn user_analytics(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<UserAnalytics, LedgerError> {
        let records = self.store.progress_for_user(user_id, limit).await?;
        Ok(analytics::compute(user_id, &records))
    }
}
