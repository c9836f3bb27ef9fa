//! Learning materials: grammar rules, vocabulary and pronunciation guides.
//!
//! The retrieval engine reads materials through [`MaterialStore`];
//! [`StaticMaterials`] serves the built-in corpus for tests and
//! database-less deployments, and doubles as the seed source for real
//! stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::session::ProficiencyLevel;
use crate::store::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarRule {
    pub topic: String,
    pub level: ProficiencyLevel,
    pub content: String,
    pub examples: Vec<String>,
    pub common_mistakes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub word: String,
    pub definition: String,
    pub level: ProficiencyLevel,
    pub usage: String,
    pub pronunciation: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PronunciationGuide {
    pub word: String,
    pub phonetic: String,
    pub common_mistakes: String,
    pub tips: String,
}

/// Read-only material lookups, bounded and filterable by level.
#[async_trait]
pub trait MaterialStore: Send + Sync {
    async fn grammar_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError>;

    async fn grammar_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError>;

    async fn vocabulary_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError>;

    async fn vocabulary_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError>;

    async fn pronunciation_for_words(
        &self,
        words: &[String],
        limit: usize,
    ) -> Result<Vec<PronunciationGuide>, StoreError>;
}

fn rule(
    topic: &str,
    level: ProficiencyLevel,
    content: &str,
    examples: &[&str],
    mistakes: &[&str],
) -> GrammarRule {
    GrammarRule {
        topic: topic.to_string(),
        level,
        content: content.to_string(),
        examples: examples.iter().map(|s| s.to_string()).collect(),
        common_mistakes: mistakes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Built-in grammar corpus. Topics match the retrieval keyword groups so a
/// keyword hit always lands on a real rule.
pub fn default_grammar_rules() -> Vec<GrammarRule> {
    use ProficiencyLevel::*;
    vec![
        rule(
            "tense",
            Beginner,
            "Use present simple for habits and routines, and past simple for finished actions. Do not mix 'have' with past simple forms.",
            &[
                "I work every day.",
                "I went to school yesterday.",
                "She watched a movie last night.",
            ],
            &[
                "I have went there (should be 'I went')",
                "He work every day (missing -s)",
            ],
        ),
        rule(
            "articles",
            Beginner,
            "Use 'a' before consonant sounds, 'an' before vowel sounds. Use 'the' for specific or known things.",
            &["I have a car.", "She ate an apple.", "The book on the table is mine."],
            &[
                "I have car (missing article)",
                "I saw a elephant (should be 'an')",
            ],
        ),
        rule(
            "prepositions",
            Beginner,
            "Use 'in' for enclosed spaces and months, 'on' for surfaces and days, 'at' for points and times.",
            &["The meeting is at 3pm.", "I live in London.", "See you on Monday."],
            &["See you in Monday (should be 'on')", "I arrived to home (should be 'at')"],
        ),
        rule(
            "tense",
            Intermediate,
            "Use present perfect for actions starting in the past and continuing to now, or for past actions with present relevance. Form: have/has + past participle.",
            &[
                "I have lived here for 5 years.",
                "She has already finished her work.",
                "Have you ever been to Japan?",
            ],
            &[
                "I am living here since 2020 (should be 'have lived')",
                "I have went there (should be 'have gone')",
            ],
        ),
        rule(
            "conditionals",
            Intermediate,
            "First conditional for real or possible future situations. Structure: If + present simple, will + base verb.",
            &[
                "If it rains tomorrow, I will stay home.",
                "If you study hard, you will pass the exam.",
            ],
            &["If it will rain tomorrow... (use present simple after 'if')"],
        ),
        rule(
            "comparatives",
            Intermediate,
            "Add -er to short adjectives, use 'more' with long ones, and always compare with 'than'.",
            &["This cafe is cheaper than that one.", "The train is more convenient than the bus."],
            &["more cheaper (double comparative)", "better then (should be 'than')"],
        ),
        rule(
            "conditionals",
            Advanced,
            "Third conditional for unreal past situations. Structure: If + past perfect, would have + past participle.",
            &[
                "If I had known, I would have helped.",
                "She would have passed if she had studied more.",
            ],
            &["If I would have known... (should be 'If I had known')"],
        ),
        rule(
            "subjunctive",
            Advanced,
            "Use the subjunctive after verbs like suggest, recommend and insist, and expressions like 'it's important that'. Use the base verb form.",
            &["I suggest that he be more careful.", "It's essential that she arrive on time."],
            &["I suggest that he is more careful (use base form)"],
        ),
        rule(
            "inversion",
            Advanced,
            "Use inversion for emphasis with negative adverbs (never, rarely, seldom) and in formal conditionals.",
            &["Never have I seen such beauty.", "Had I known, I would have helped."],
            &["Never I have seen... (auxiliary before subject)"],
        ),
    ]
}

fn vocab(
    word: &str,
    definition: &str,
    level: ProficiencyLevel,
    usage: &str,
    pronunciation: &str,
    topic: &str,
) -> VocabularyItem {
    VocabularyItem {
        word: word.to_string(),
        definition: definition.to_string(),
        level,
        usage: usage.to_string(),
        pronunciation: pronunciation.to_string(),
        topic: topic.to_string(),
    }
}

pub fn default_vocabulary() -> Vec<VocabularyItem> {
    use ProficiencyLevel::*;
    vec![
        vocab("appreciate", "To be thankful for something", Beginner, "I really appreciate your help.", "/əˈpriːʃieɪt/", "daily"),
        vocab("convenient", "Easy to use or suitable for your needs", Beginner, "This location is very convenient for shopping.", "/kənˈviːniənt/", "daily"),
        vocab("experience", "Knowledge or skill from doing something", Beginner, "I have five years of experience in teaching.", "/ɪkˈspɪəriəns/", "academic"),
        vocab("accomplish", "To succeed in doing something", Intermediate, "She accomplished all her goals this year.", "/əˈkʌmplɪʃ/", "academic"),
        vocab("collaborate", "To work together with others", Intermediate, "We need to collaborate on this project.", "/kəˈlæbəreɪt/", "business"),
        vocab("implement", "To put a plan or system into action", Intermediate, "The company will implement new policies next month.", "/ˈɪmplɪment/", "business"),
        vocab("perspective", "A particular way of thinking about something", Intermediate, "From my perspective, this is the best solution.", "/pəˈspektɪv/", "academic"),
        vocab("itinerary", "A planned route or journey", Intermediate, "Our itinerary includes three cities in five days.", "/aɪˈtɪnərəri/", "travel"),
        vocab("serendipity", "Finding something good by chance", Advanced, "Meeting her was pure serendipity.", "/ˌserənˈdɪpɪti/", "daily"),
        vocab("ephemeral", "Lasting for a very short time", Advanced, "Fame can be ephemeral in the digital age.", "/ɪˈfemərəl/", "academic"),
        vocab("ubiquitous", "Present everywhere", Advanced, "Smartphones have become ubiquitous in modern society.", "/juːˈbɪkwɪtəs/", "daily"),
        vocab("meticulous", "Very careful and precise", Advanced, "She is meticulous about her research.", "/məˈtɪkjʊləs/", "academic"),
    ]
}

fn guide(word: &str, phonetic: &str, mistakes: &str, tips: &str) -> PronunciationGuide {
    PronunciationGuide {
        word: word.to_string(),
        phonetic: phonetic.to_string(),
        common_mistakes: mistakes.to_string(),
        tips: tips.to_string(),
    }
}

pub fn default_pronunciation() -> Vec<PronunciationGuide> {
    vec![
        guide("thought", "/θɔːt/", "Often pronounced as 'tought' or 'fought'", "Place tongue between teeth for 'th'. The 'ough' is silent."),
        guide("through", "/θruː/", "Often confused with 'threw'", "Same 'th' as 'thought'. The 'ough' makes an 'oo' sound."),
        guide("clothes", "/kloʊðz/", "Often pronounced as 'close' or with a hard 'th'", "The 'th' is soft (voiced). Don't emphasize the 'e'."),
        guide("comfortable", "/ˈkʌmftəbəl/", "Pronouncing all syllables: com-for-ta-ble", "Native speakers say: KUMF-ter-bull (3 syllables)"),
        guide("vegetable", "/ˈvedʒtəbəl/", "Pronouncing as veg-e-ta-ble (4 syllables)", "Native speakers say: VEJ-tuh-bull (3 syllables)"),
        guide("Wednesday", "/ˈwenzdeɪ/", "Pronouncing the 'd' sound", "Say: WENZ-day. The first 'd' is silent."),
        guide("decision", "/dɪˈsɪʒən/", "Hard 's' in the middle", "The 'si' makes a 'zh' sound: di-SI-zhun."),
        guide("brightness", "/ˈbraɪtnəs/", "Over-pronouncing the 'gh'", "The 'igh' is a long 'i'; the 'gh' is silent."),
    ]
}

/// Serves the built-in corpus from memory.
pub struct StaticMaterials {
    grammar: Vec<GrammarRule>,
    vocabulary: Vec<VocabularyItem>,
    pronunciation: Vec<PronunciationGuide>,
}

impl StaticMaterials {
    pub fn new() -> Self {
        Self {
            grammar: default_grammar_rules(),
            vocabulary: default_vocabulary(),
            pronunciation: default_pronunciation(),
        }
    }
}

impl Default for StaticMaterials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MaterialStore for StaticMaterials {
    async fn grammar_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError> {
        Ok(self
            .grammar
            .iter()
            .filter(|r| r.level == level && topics.contains(&r.topic))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn grammar_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<GrammarRule>, StoreError> {
        Ok(self
            .grammar
            .iter()
            .filter(|r| r.level == level)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn vocabulary_by_topics(
        &self,
        level: ProficiencyLevel,
        topics: &[String],
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        Ok(self
            .vocabulary
            .iter()
            .filter(|v| v.level == level && topics.contains(&v.topic))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn vocabulary_for_level(
        &self,
        level: ProficiencyLevel,
        limit: usize,
    ) -> Result<Vec<VocabularyItem>, StoreError> {
        Ok(self
            .vocabulary
            .iter()
            .filter(|v| v.level == level)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn pronunciation_for_words(
        &self,
        words: &[String],
        limit: usize,
    ) -> Result<Vec<PronunciationGuide>, StoreError> {
        Ok(self
            .pronunciation
            .iter()
            .filter(|g| words.iter().any(|w| w.eq_ignore_ascii_case(&g.word)))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_topics_align_with_keyword_groups() {
        // Every seeded topic must be reachable either through a keyword
        // group or as a level-generic fallback; the keyword groups
        // themselves must all have at least one rule.
        let rules = default_grammar_rules();
        for group in ["tense", "articles", "prepositions", "conditionals", "comparatives"] {
            assert!(
                rules.iter().any(|r| r.topic == group),
                "no rule for keyword group {group}"
            );
        }
    }

    #[tokio::test]
    async fn beginner_tense_rule_covers_past_simple() {
        let store = StaticMaterials::new();
        let rules = store
            .grammar_by_topics(ProficiencyLevel::Beginner, &["tense".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules[0].content.contains("past simple"));
        assert!(rules[0].content.contains("present simple"));
    }

    #[tokio::test]
    async fn lookups_respect_level_and_limit() {
        let store = StaticMaterials::new();

        let vocab = store
            .vocabulary_for_level(ProficiencyLevel::Advanced, 2)
            .await
            .unwrap();
        assert_eq!(vocab.len(), 2);
        assert!(vocab.iter().all(|v| v.level == ProficiencyLevel::Advanced));

        let none = store
            .vocabulary_by_topics(ProficiencyLevel::Beginner, &["business".to_string()], 3)
            .await
            .unwrap();
        assert!(none.is_empty(), "no beginner business vocabulary seeded");
    }

    #[tokio::test]
    async fn pronunciation_matches_case_insensitively() {
        let store = StaticMaterials::new();
        let guides = store
            .pronunciation_for_words(&["wednesday".to_string(), "thought".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(guides.len(), 2);
    }
}
