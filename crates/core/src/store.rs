//! Session persistence seam.
//!
//! The ledger talks to storage through [`SessionStore`], so the same
//! operations run against Postgres in production and [`MemoryStore`] in
//! tests or database-less deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::session::{Metrics, Session, SessionStatus, Summary, Turn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Outcome of an atomic turn append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The session exists but has already completed; nothing was written.
    SessionCompleted,
    NotFound,
}

/// One archived summary per completed session. Outlives its session: the
/// analytics queries read these records only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub summary: Summary,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn fetch_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Appends a turn and replaces the cached metrics in one atomic step.
    /// Never writes to a completed session.
    async fn append_turn(
        &self,
        id: Uuid,
        turn: Turn,
        metrics: Metrics,
    ) -> Result<AppendOutcome, StoreError>;

    /// Marks an active session completed and stamps its end time, returning
    /// the final state. `None` when the session is unknown or was already
    /// completed (duplicate end signals race benignly).
    async fn complete_session(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    async fn insert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError>;

    /// Archived summaries for a learner, newest first.
    async fn progress_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError>;
}

/// In-memory store: unit-test substrate and the fallback when no database is
/// configured.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    progress: RwLock<Vec<ProgressRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn append_turn(
        &self,
        id: Uuid,
        turn: Turn,
        metrics: Metrics,
    ) -> Result<AppendOutcome, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            None => Ok(AppendOutcome::NotFound),
            Some(session) if session.status == SessionStatus::Completed => {
                Ok(AppendOutcome::SessionCompleted)
            }
            Some(session) => {
                session.turns.push(turn);
                session.metrics = metrics;
                Ok(AppendOutcome::Appended)
            }
        }
    }

    async fn complete_session(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            Some(session) if session.status == SessionStatus::Active => {
                session.status = SessionStatus::Completed;
                session.ended_at = Some(ended_at);
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        self.progress.write().await.push(record.clone());
        Ok(())
    }

    async fn progress_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        let progress = self.progress.read().await;
        let mut records: Vec<ProgressRecord> = progress
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConversationTopic, ProficiencyLevel, WordConfidence};
    use chrono::Duration;

    fn new_session() -> Session {
        Session::new(
            Some("learner-1".to_string()),
            ProficiencyLevel::Beginner,
            ConversationTopic::Travel,
            "aura-2-thalia-en",
            Utc::now(),
        )
    }

    fn new_turn(text: &str) -> Turn {
        Turn::new(text, &[WordConfidence::new("hi", 0.9)], 0, "", Utc::now())
    }

    #[tokio::test]
    async fn append_turn_updates_session() {
        let store = MemoryStore::new();
        let session = new_session();
        store.insert_session(&session).await.unwrap();

        let turn = new_turn("hello there");
        let metrics = Metrics::recompute(std::slice::from_ref(&turn));
        let outcome = store
            .append_turn(session.id, turn, metrics.clone())
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);

        let stored = store.fetch_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.turns.len(), 1);
        assert_eq!(stored.metrics, metrics);
    }

    #[tokio::test]
    async fn append_turn_refuses_completed_session() {
        let store = MemoryStore::new();
        let session = new_session();
        store.insert_session(&session).await.unwrap();
        store
            .complete_session(session.id, Utc::now())
            .await
            .unwrap()
            .unwrap();

        let outcome = store
            .append_turn(session.id, new_turn("late"), Metrics::default())
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::SessionCompleted);

        let stored = store.fetch_session(session.id).await.unwrap().unwrap();
        assert!(stored.turns.is_empty());
    }

    #[tokio::test]
    async fn append_turn_unknown_session() {
        let store = MemoryStore::new();
        let outcome = store
            .append_turn(Uuid::new_v4(), new_turn("hi"), Metrics::default())
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::NotFound);
    }

    #[tokio::test]
    async fn complete_session_is_single_shot() {
        let store = MemoryStore::new();
        let session = new_session();
        store.insert_session(&session).await.unwrap();

        let first = store.complete_session(session.id, Utc::now()).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().status, SessionStatus::Completed);

        // The duplicate end signal loses the race and gets nothing.
        let second = store.complete_session(session.id, Utc::now()).await.unwrap();
        assert!(second.is_none());

        let unknown = store.complete_session(Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn progress_is_newest_first_and_bounded() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..4 {
            let session = new_session();
            let summary = Summary::compute(&session, base);
            store
                .insert_progress(&ProgressRecord {
                    session_id: session.id,
                    user_id: Some("learner-1".to_string()),
                    summary,
                    recorded_at: base + Duration::seconds(i),
                })
                .await
                .unwrap();
        }

        let records = store.progress_for_user("learner-1", 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].recorded_at > records[1].recorded_at);
        assert!(records[1].recorded_at > records[2].recorded_at);

        let none = store.progress_for_user("someone-else", 10).await.unwrap();
        assert!(none.is_empty());
    }
}
