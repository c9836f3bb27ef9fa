//! Postgres-backed stores.
//!
//! Sessions keep their turn sequence and cached metrics as JSONB documents,
//! so a turn append is one conditional UPDATE and readers always see either
//! the old or the new turn list, never a partial one. Summaries land in
//! `progress` and outlive their sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use parlo_core::materials::{GrammarRule, MaterialStore, PronunciationGuide, VocabularyItem};
use parlo_core::session::{
    ConversationTopic, Metrics, ProficiencyLevel, Session, SessionStatus, Summary, Turn,
};
use parlo_core::store::{AppendOutcome, ProgressRecord, SessionStore, StoreError};

const SESSION_COLUMNS: &str =
    "id, user_id, level, topic, voice_id, status, turns, metrics, created_at, started_at, ended_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs all pending migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(StoreError::backend)
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Option<String>,
    level: String,
    topic: String,
    voice_id: String,
    status: String,
    turns: Json<Vec<Turn>>,
    metrics: Json<Metrics>,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            level: ProficiencyLevel::parse_or_default(&row.level),
            topic: ConversationTopic::parse_or_default(&row.topic),
            voice_id: row.voice_id,
            status: if row.status == "completed" {
                SessionStatus::Completed
            } else {
                SessionStatus::Active
            },
            turns: row.turns.0,
            metrics: row.metrics.0,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        }
    }
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, level, topic, voice_id, status, turns, metrics, \
             created_at, started_at, ended_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(session.id)
        .bind(&session.user_id)
        .bind(session.level.as_str())
        .bind(session.topic.as_str())
        .bind(&session.voice_id)
        .bind(status_str(session.status))
        .bind(Json(&session.turns))
        .bind(Json(&session.metrics))
        .bind(session.created_at)
        .bind(session.started_at)
        .bind(session.ended_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Session::from))
    }

    async fn append_turn(
        &self,
        id: Uuid,
        turn: Turn,
        metrics: Metrics,
    ) -> Result<AppendOutcome, StoreError> {
        // jsonb || appends the single turn to the array; the status guard
        // makes the whole append conditional on the session still running.
        let result = sqlx::query(
            "UPDATE sessions SET turns = turns || $2, metrics = $3 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(Json(&turn))
        .bind(Json(&metrics))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() > 0 {
            return Ok(AppendOutcome::Appended);
        }

        let exists = sqlx::query("SELECT 1 AS one FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(if exists.is_some() {
            AppendOutcome::SessionCompleted
        } else {
            AppendOutcome::NotFound
        })
    }

    async fn complete_session(
        &self,
        id: Uuid,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "UPDATE sessions SET status = 'completed', ended_at = $2 \
             WHERE id = $1 AND status = 'active' \
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(ended_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Session::from))
    }

    async fn insert_progress(&self, record: &ProgressRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO progress (session_id, user_id, summary, recorded_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(record.session_id)
        .bind(&record.user_id)
        .bind(Json(&record.summary))
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn progress_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ProgressRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT session_id, user_id, summary, recorded_at FROM progress \
             WHERE user_id = $1 ORDER BY recorded_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|row| {
                let summary: Json<Summary> = row.try_get("summary").map_err(StoreError::backend)?;
                Ok(ProgressRecord {
                    session_id: row.try_get("session_id").map_err(StoreError::backend)?,
                    user_id: row.try_get("user_id").map_err(StoreError::backend)?,
                    summary: summary.0,
                    recorded_at: row.try_get("recorded_at").map_err(StoreError::backend)?,
                })
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct GrammarRow {
    topic: String,
    level: String,
    content: String,
    examples: Json<Vec<String>>,
    common_mistakes: Json<Vec<String>>,
}

impl From<GrammarRow> for GrammarRule {
    fn from(row: GrammarRow) -> Self {
        GrammarRule {
            topic: row.topic,
            level: ProficiencyLevel::parse_or_default(&row.level),
            content: row.content,
            examples: row.examples.0,
            common_mistakes: row.common_mistakes.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VocabularyRow {
    word: String,
    definition: String,
    level: String,
    usage_example: String,
    pronunciation: String,
    topic: String,
}

impl From<VocabularyRow> for VocabularyItem {
    fn from(row: VocabularyRow) -> Self {
        VocabularyItem {
            word: row.word,
            definition: row.definition,
            level: ProficiencyLevel::parse_or_default(&row.level),
            usage: row.usage_example,
            pronunciation: row.pronunciation,
            topic: row.topic,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PronunciationRow {
    word: String,
    phonetic: String,
    common_mistakes: String,
    tips: String,
}

impl From<PronunciationRow> for PronunciationGuide {
    fn from(row: PronunciationRow) -> Self {
        PronunciationGuide {
            word: row.word,
            phonetic: row.phonetic,
            common_mistakes: row.common_mistakes,
            tips: row.tips,
        }
    }
}

#[async_trait]
impl MaterialStore for PgStore {
    async fn grammar_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError> {
        let rows = sqlx::query_as::<_, GrammarRow>(
            "SELECT topic, level, content, examples, common_mistakes FROM grammar_rules \
             WHERE level = $1 AND topic = ANY($2) LIMIT $3",
        )
        .bind(level.as_str())
        .bind(topics)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(GrammarRule::from).collect())
    }

    async fn grammar_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError> {
        let rows = sqlx::query_as::<_, GrammarRow>(
            "SELECT topic, level, content, examples, common_mistakes FROM grammar_rules \
             WHERE level = $1 ORDER BY id LIMIT $2",
        )
        .bind(level.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(GrammarRule::from).collect())
    }

    async fn vocabulary_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        let rows = sqlx::query_as::<_, VocabularyRow>(
            "SELECT word, definition, level, usage_example, pronunciation, topic FROM vocabulary \
             WHERE level = $1 AND topic = ANY($2) LIMIT $3",
        )
        .bind(level.as_str())
        .bind(topics)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(VocabularyItem::from).collect())
    }

    async fn vocabulary_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        let rows = sqlx::query_as::<_, VocabularyRow>(
            "SELECT word, definition, level, usage_example, pronunciation, topic FROM vocabulary \
             WHERE level = $1 ORDER BY id LIMIT $2",
        )
        .bind(level.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(VocabularyItem::from).collect())
    }

    async fn pronunciation_for_words(
        &self,
        words: &[String],
        limit: usize,
    ) -> Result<Vec<PronunciationGuide>, StoreError> {
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let rows = sqlx::query_as::<_, PronunciationRow>(
            "SELECT word, phonetic, common_mistakes, tips FROM pronunciation \
             WHERE lower(word) = ANY($1) LIMIT $2",
        )
        .bind(&lowered)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(PronunciationGuide::from).collect())
    }
}
