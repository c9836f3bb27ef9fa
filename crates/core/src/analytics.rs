//! Learner analytics derived from archived session summaries.
//!
//! Works purely over [`ProgressRecord`]s ordered newest-first, so it never
//! needs the live sessions they came from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::session::{format_duration, round1, ImprovementArea};
use crate::store::ProgressRecord;

/// Direction of the learner's confidence scores over recent sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub user_id: String,
    pub total_sessions: usize,
    pub total_practice_seconds: i64,
    pub total_practice_time: String,
    pub total_words_spoken: u64,
    /// Mean summary confidence, percentage scale.
    pub avg_confidence: f64,
    pub confidence_trend: Trend,
    /// Up to ten most recent summary confidences, newest first.
    pub recent_scores: Vec<f64>,
    pub common_improvement_areas: Vec<ImprovementArea>,
    /// 0–100, centered on 50 for flat or insufficient history.
    pub improvement_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Builds analytics from a learner's archived summaries, newest first.
pub fn compute(user_id: &str, records: &[ProgressRecord]) -> UserAnalytics {
    if records.is_empty() {
        return UserAnalytics {
            user_id: user_id.to_string(),
            total_sessions: 0,
            total_practice_seconds: 0,
            total_practice_time: format_duration(0),
            total_words_spoken: 0,
            avg_confidence: 0.0,
            confidence_trend: Trend::Stable,
            recent_scores: Vec::new(),
            common_improvement_areas: Vec::new(),
            improvement_score: 50.0,
            message: Some("No practice sessions found. Start practicing!".to_string()),
        };
    }

    let scores: Vec<f64> = records.iter().map(|r| r.summary.avg_confidence).collect();
    let total_seconds: i64 = records.iter().map(|r| r.summary.duration_seconds).sum();

    UserAnalytics {
        user_id: user_id.to_string(),
        total_sessions: records.len(),
        total_practice_seconds: total_seconds,
        total_practice_time: format_duration(total_seconds),
        total_words_spoken: records.iter().map(|r| r.summary.total_words_spoken).sum(),
        avg_confidence: round1(mean(&scores)),
        confidence_trend: trend(&scores),
        recent_scores: scores.iter().take(10).copied().collect(),
        common_improvement_areas: common_areas(records),
        improvement_score: improvement_score(&scores),
        message: None,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compares the five most recent scores against the next five (or the older
/// half when fewer than ten exist). More than five points either way flips
/// the trend off stable.
fn trend(scores: &[f64]) -> Trend {
    if scores.len() < 2 {
        return Trend::Stable;
    }

    let recent = &scores[..scores.len().min(5)];
    let older: &[f64] = if scores.len() > 5 {
        &scores[5..scores.len().min(10)]
    } else {
        &scores[scores.len() / 2..]
    };
    if older.is_empty() {
        return Trend::Stable;
    }

    let diff = mean(recent) - mean(older);
    if diff > 5.0 {
        Trend::Improving
    } else if diff < -5.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// 50 plus the gap between the five most recent and five least recent
/// summary confidences, clamped to 0–100. Fewer than two summaries is not
/// enough history to judge, so a neutral 50.
fn improvement_score(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 50.0;
    }
    let recent = mean(&scores[..scores.len().min(5)]);
    let oldest = mean(&scores[scores.len().saturating_sub(5)..]);
    round1((50.0 + (recent - oldest)).clamp(0.0, 100.0))
}

/// The most frequent improvement-area tags across all summaries, up to five.
fn common_areas(records: &[ProgressRecord]) -> Vec<ImprovementArea> {
    let mut counts: HashMap<ImprovementArea, usize> = HashMap::new();
    for record in records {
        for &area in &record.summary.improvement_areas {
            *counts.entry(area).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(ImprovementArea, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
    ranked.into_iter().take(5).map(|(area, _)| area).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Summary;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(avg_confidence: f64, areas: Vec<ImprovementArea>, age: i64) -> ProgressRecord {
        ProgressRecord {
            session_id: Uuid::new_v4(),
            user_id: Some("learner-1".to_string()),
            summary: Summary {
                session_id: Uuid::new_v4(),
                duration_seconds: 120,
                duration_formatted: "2m 0s".to_string(),
                turns_count: 4,
                total_words_spoken: 30,
                avg_confidence,
                grammar_mistakes: 1,
                improvement_areas: areas,
            },
            recorded_at: Utc::now() - Duration::seconds(age),
        }
    }

    fn records(scores: &[f64]) -> Vec<ProgressRecord> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| record(s, Vec::new(), i as i64))
            .collect()
    }

    #[test]
    fn no_history_is_defined_not_an_error() {
        let analytics = compute("learner-1", &[]);
        assert_eq!(analytics.total_sessions, 0);
        assert_eq!(analytics.confidence_trend, Trend::Stable);
        assert_abs_diff_eq!(analytics.improvement_score, 50.0);
        assert!(analytics.message.is_some());
    }

    #[test]
    fn two_summaries_score_neutral_regardless_of_confidence() {
        let analytics = compute("learner-1", &records(&[95.0, 20.0]));
        assert_abs_diff_eq!(analytics.improvement_score, 50.0);

        let analytics = compute("learner-1", &records(&[10.0, 90.0]));
        assert_abs_diff_eq!(analytics.improvement_score, 50.0);
    }

    #[test]
    fn improvement_score_reflects_recent_versus_oldest() {
        // Newest-first: five sessions at 90 followed by five older at 70.
        let scores = [90.0, 90.0, 90.0, 90.0, 90.0, 70.0, 70.0, 70.0, 70.0, 70.0];
        let analytics = compute("learner-1", &records(&scores));
        assert_abs_diff_eq!(analytics.improvement_score, 70.0);
        assert_eq!(analytics.confidence_trend, Trend::Improving);
    }

    #[test]
    fn improvement_score_clamps_to_bounds() {
        let scores = [100.0, 100.0, 100.0, 100.0, 100.0, 10.0, 10.0, 10.0, 10.0, 10.0];
        let analytics = compute("learner-1", &records(&scores));
        assert_abs_diff_eq!(analytics.improvement_score, 100.0);

        let scores = [10.0, 10.0, 10.0, 10.0, 10.0, 100.0, 100.0, 100.0, 100.0, 100.0];
        let analytics = compute("learner-1", &records(&scores));
        assert_abs_diff_eq!(analytics.improvement_score, 0.0);
    }

    #[test]
    fn trend_detects_decline_and_stability() {
        let declining = [60.0, 60.0, 60.0, 60.0, 60.0, 80.0, 80.0, 80.0, 80.0, 80.0];
        assert_eq!(
            compute("u", &records(&declining)).confidence_trend,
            Trend::Declining
        );

        let stable = [80.0, 81.0, 79.0, 80.0, 82.0, 80.0, 78.0, 81.0];
        assert_eq!(
            compute("u", &records(&stable)).confidence_trend,
            Trend::Stable
        );
    }

    #[test]
    fn trend_with_short_history_compares_older_half() {
        // Four scores: recent = all four (mean 78), older half = the last
        // two (mean 76); a two-point gap stays stable.
        let scores = [80.0, 80.0, 76.0, 76.0];
        assert_eq!(
            compute("u", &records(&scores)).confidence_trend,
            Trend::Stable
        );

        // recent mean 82.5 vs older-half mean 70 -> improving.
        let scores = [95.0, 95.0, 70.0, 70.0];
        assert_eq!(
            compute("u", &records(&scores)).confidence_trend,
            Trend::Improving
        );
    }

    #[test]
    fn common_areas_ranked_by_frequency() {
        let recs = vec![
            record(80.0, vec![ImprovementArea::Grammar, ImprovementArea::Pronunciation], 0),
            record(82.0, vec![ImprovementArea::Grammar], 1),
            record(78.0, vec![ImprovementArea::Grammar, ImprovementArea::SentenceLength], 2),
        ];
        let analytics = compute("learner-1", &recs);
        assert_eq!(analytics.common_improvement_areas[0], ImprovementArea::Grammar);
        assert_eq!(analytics.common_improvement_areas.len(), 3);
    }

    #[test]
    fn totals_accumulate() {
        let analytics = compute("learner-1", &records(&[80.0, 90.0]));
        assert_eq!(analytics.total_sessions, 2);
        assert_eq!(analytics.total_practice_seconds, 240);
        assert_eq!(analytics.total_practice_time, "4m 0s");
        assert_eq!(analytics.total_words_spoken, 60);
        assert_abs_diff_eq!(analytics.avg_confidence, 85.0);
        assert_eq!(analytics.recent_scores, vec![80.0, 90.0]);
    }
}
