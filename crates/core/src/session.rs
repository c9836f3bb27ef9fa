//! Session, turn and summary data model.
//!
//! A [`Session`] is one continuous practice conversation. Each user
//! utterance/feedback exchange is recorded as an immutable [`Turn`], and the
//! session carries running [`Metrics`] over its turns. Ending a session
//! produces a [`Summary`], which is archived independently for analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Word scores below this fraction are flagged as low-confidence.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Beginner => "beginner",
            ProficiencyLevel::Intermediate => "intermediate",
            ProficiencyLevel::Advanced => "advanced",
        }
    }

    /// Parses a level name, defaulting to `Intermediate` for anything
    /// unrecognized (the convention the wire protocol uses for omitted or
    /// malformed values).
    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "beginner" => ProficiencyLevel::Beginner,
            "advanced" => ProficiencyLevel::Advanced,
            _ => ProficiencyLevel::Intermediate,
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationTopic {
    DailyLife,
    Business,
    Travel,
    Academic,
    FreeTalk,
}

impl ConversationTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationTopic::DailyLife => "daily_life",
            ConversationTopic::Business => "business",
            ConversationTopic::Travel => "travel",
            ConversationTopic::Academic => "academic",
            ConversationTopic::FreeTalk => "free_talk",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "daily_life" => ConversationTopic::DailyLife,
            "business" => ConversationTopic::Business,
            "travel" => ConversationTopic::Travel,
            "academic" => ConversationTopic::Academic,
            _ => ConversationTopic::FreeTalk,
        }
    }
}

impl fmt::Display for ConversationTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. Transitions are forward-only: `Active` → `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// A word-level confidence score from transcription. A missing score counts
/// as full confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordConfidence {
    pub word: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl WordConfidence {
    pub fn new(word: impl Into<String>, confidence: f64) -> Self {
        Self {
            word: word.into(),
            confidence: Some(confidence),
        }
    }

    pub fn score(&self) -> f64 {
        self.confidence.unwrap_or(1.0)
    }
}

/// Mean confidence over a set of word scores, as a 0.0–1.0 fraction.
///
/// An empty list yields exactly 1.0: transcripts that arrive without
/// word-level detail are treated as fully confident rather than dragging the
/// session average down.
pub fn turn_confidence(words: &[WordConfidence]) -> f64 {
    if words.is_empty() {
        return 1.0;
    }
    words.iter().map(WordConfidence::score).sum::<f64>() / words.len() as f64
}

/// One user-utterance/feedback exchange. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub word_count: usize,
    /// 0.0–1.0 fraction; percentage scaling happens only at summary time.
    pub avg_confidence: f64,
    pub low_confidence_words: Vec<WordConfidence>,
    pub grammar_corrections: usize,
    pub feedback_given: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        user_text: &str,
        words: &[WordConfidence],
        grammar_corrections: usize,
        feedback_given: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_text: user_text.to_string(),
            word_count: user_text.split_whitespace().count(),
            avg_confidence: turn_confidence(words),
            low_confidence_words: words
                .iter()
                .filter(|w| w.score() < LOW_CONFIDENCE_THRESHOLD)
                .cloned()
                .collect(),
            grammar_corrections,
            feedback_given: feedback_given.to_string(),
            timestamp,
        }
    }
}

/// Running aggregates over a session's turns.
///
/// Any incrementally-maintained copy is a cache of [`Metrics::recompute`]:
/// the average confidence must always equal the arithmetic mean over the
/// turn sequence's per-turn averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_words: u64,
    pub grammar_mistakes: u64,
    pub avg_confidence: f64,
}

impl Metrics {
    /// Full recomputation from the turn sequence. Zeroed for an empty one.
    pub fn recompute(turns: &[Turn]) -> Self {
        if turns.is_empty() {
            return Metrics::default();
        }
        let sum: f64 = turns.iter().map(|t| t.avg_confidence).sum();
        Metrics {
            total_words: turns.iter().map(|t| t.word_count as u64).sum(),
            grammar_mistakes: turns.iter().map(|t| t.grammar_corrections as u64).sum(),
            avg_confidence: sum / turns.len() as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub level: ProficiencyLevel,
    pub topic: ConversationTopic,
    pub voice_id: String,
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        user_id: Option<String>,
        level: ProficiencyLevel,
        topic: ConversationTopic,
        voice_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            level,
            topic,
            voice_id: voice_id.to_string(),
            status: SessionStatus::Active,
            turns: Vec::new(),
            metrics: Metrics::default(),
            created_at: now,
            started_at: now,
            ended_at: None,
        }
    }
}

/// Tags pointing at what a learner should work on next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementArea {
    Pronunciation,
    Grammar,
    SentenceLength,
}

impl fmt::Display for ImprovementArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImprovementArea::Pronunciation => f.write_str("pronunciation"),
            ImprovementArea::Grammar => f.write_str("grammar"),
            ImprovementArea::SentenceLength => f.write_str("sentence_length"),
        }
    }
}

/// Post-hoc statistical digest of one completed session. Archived
/// independently of the session so historical analytics survive session
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: Uuid,
    pub duration_seconds: i64,
    pub duration_formatted: String,
    pub turns_count: usize,
    pub total_words_spoken: u64,
    /// Percentage scale (0–100), rounded to one decimal.
    pub avg_confidence: f64,
    pub grammar_mistakes: u64,
    pub improvement_areas: Vec<ImprovementArea>,
}

impl Summary {
    /// Builds the summary for a session ended at `ended_at`.
    pub fn compute(session: &Session, ended_at: DateTime<Utc>) -> Self {
        let duration = (ended_at - session.started_at).num_seconds().max(0);
        let turns = &session.turns;

        // Mean of per-turn fractions, scaled to percentage. No turns means
        // nothing to penalize, so the neutral 100.0.
        let avg_confidence = if turns.is_empty() {
            100.0
        } else {
            let sum: f64 = turns.iter().map(|t| t.avg_confidence).sum();
            round1(sum / turns.len() as f64 * 100.0)
        };

        Self {
            session_id: session.id,
            duration_seconds: duration,
            duration_formatted: format_duration(duration),
            turns_count: turns.len(),
            total_words_spoken: turns.iter().map(|t| t.word_count as u64).sum(),
            avg_confidence,
            grammar_mistakes: turns.iter().map(|t| t.grammar_corrections as u64).sum(),
            improvement_areas: improvement_areas(turns),
        }
    }
}

/// Derives improvement-area tags from a session's turns.
pub fn improvement_areas(turns: &[Turn]) -> Vec<ImprovementArea> {
    let mut areas = Vec::new();

    if turns.iter().any(|t| !t.low_confidence_words.is_empty()) {
        areas.push(ImprovementArea::Pronunciation);
    }

    let total_grammar: usize = turns.iter().map(|t| t.grammar_corrections).sum();
    if total_grammar > 2 {
        areas.push(ImprovementArea::Grammar);
    }

    let avg_words = turns.iter().map(|t| t.word_count).sum::<usize>() as f64
        / turns.len().max(1) as f64;
    if !turns.is_empty() && avg_words < 5.0 {
        areas.push(ImprovementArea::SentenceLength);
    }

    areas
}

/// Human-readable duration: "45 seconds", "3m 20s", "1h 5m".
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

pub(crate) fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
