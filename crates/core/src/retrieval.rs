//! Context retrieval engine.
//!
//! Assembles a supporting-material text blob (grammar, vocabulary,
//! pronunciation) for a user utterance. The three lookups run concurrently
//! and fail independently; a configured semantic ranker is advisory only and
//! falls back to keyword ordering on any timeout or malformed reply. Nothing
//! in here raises past the `retrieve` boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::materials::MaterialStore;
use crate::session::ProficiencyLevel;

/// Grammar keyword groups. Group names double as rule topics, so a hit maps
/// straight onto stored rules. Single words match whole tokens; phrases
/// match the raw utterance.
const GRAMMAR_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "tense",
        &["was", "were", "have", "had", "will", "going to", "did", "does", "went"],
    ),
    ("articles", &["a", "an", "the"]),
    ("prepositions", &["in", "on", "at", "to", "for", "with", "by"]),
    ("conditionals", &["if", "would", "could", "might"]),
    ("comparatives", &["more", "less", "better", "worse", "than"]),
];

/// Vocabulary topic keywords, matched against whole tokens only.
const VOCAB_KEYWORDS: &[(&str, &[&str])] = &[
    ("business", &["work", "job", "office", "meeting", "boss", "company"]),
    ("travel", &["trip", "travel", "fly", "hotel", "vacation", "visit"]),
    ("daily", &["eat", "sleep", "home", "family", "friend", "morning"]),
    ("academic", &["study", "learn", "book", "read", "write", "exam"]),
];

/// Substrings that commonly trip up non-native speakers.
const DIFFICULT_PATTERNS: &[&str] = &["th", "ough", "tion", "sion", "ight", "ble", "ness"];

/// Generic pool sizes when padding a thin keyword match. Wider than any
/// sensible `limit` so the ranker has real candidates to narrow.
const GENERIC_GRAMMAR_POOL: usize = 15;
const GENERIC_VOCAB_POOL: usize = 20;

const GRAMMAR_HEADER: &str = "GRAMMAR TIPS:";
const VOCAB_HEADER: &str = "VOCABULARY:";
const PRONUNCIATION_HEADER: &str = "PRONUNCIATION:";

/// Advisory re-ranking collaborator. Sent one instruction carrying the
/// utterance and a serialized candidate list; expected to reply with a
/// comma-separated identifier list.
#[async_trait]
pub trait SemanticRanker: Send + Sync {
    async fn rank(&self, instruction: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub cache_capacity: usize,
    /// Hard deadline for the ranker call. Non-negotiable: on expiry the
    /// keyword ordering is used instead.
    pub ranker_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            ranker_timeout: Duration::from_millis(1500),
        }
    }
}

type CacheKey = (String, ProficiencyLevel);

/// Bounded context cache with pure FIFO eviction: the oldest-inserted entry
/// goes first, regardless of how recently it was read.
struct ContextCache {
    capacity: usize,
    entries: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
}

impl ContextCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, value: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            // Refreshed value keeps its original insertion slot.
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

pub struct RetrievalEngine {
    materials: Arc<dyn MaterialStore>,
    ranker: Option<Arc<dyn SemanticRanker>>,
    cache: Mutex<ContextCache>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        materials: Arc<dyn MaterialStore>,
        ranker: Option<Arc<dyn SemanticRanker>>,
        config: RetrievalConfig,
    ) -> Self {
        let cache = Mutex::new(ContextCache::new(config.cache_capacity));
        Self {
            materials,
            ranker,
            cache,
            config,
        }
    }

    /// Assembles the context blob for one utterance. Infallible: an
    /// utterance with no matches anywhere yields an empty string, meaning
    /// "no supplementary context".
    pub async fn retrieve(
        &self,
        utterance: &str,
        level: ProficiencyLevel,
        limit: usize,
    ) -> String {
        let key = (utterance.trim().to_lowercase(), level);
        if let Some(hit) = self.cache.lock().expect("cache lock").get(&key) {
            debug!(level = %level, "retrieval cache hit");
            return hit;
        }

        let normalized = &key.0;
        let (grammar, vocabulary, pronunciation) = tokio::join!(
            self.grammar_section(normalized, level, limit),
            self.vocabulary_section(normalized, level, limit),
            self.pronunciation_section(normalized),
        );

        let blob = [grammar, vocabulary, pronunciation]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.cache.lock().expect("cache lock").insert(key, blob.clone());
        blob
    }

    async fn grammar_section(
        &self,
        utterance: &str,
        level: ProficiencyLevel,
        limit: usize,
    ) -> String {
        let tokens = tokenize(utterance);
        let topics: Vec<String> = GRAMMAR_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keyword_hit(utterance, &tokens, keywords))
            .map(|(topic, _)| topic.to_string())
            .collect();

        let mut pool = if topics.is_empty() {
            Vec::new()
        } else {
            self.materials
                .grammar_by_topics(level, &topics, limit)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "grammar lookup failed");
                    Vec::new()
                })
        };

        // Thin pool: pad with level-generic rules.
        if pool.len() < limit {
            let generic = self
                .materials
                .grammar_for_level(level, GENERIC_GRAMMAR_POOL)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "generic grammar lookup failed");
                    Vec::new()
                });
            for rule in generic {
                if !pool.iter().any(|r| r.topic == rule.topic) {
                    pool.push(rule);
                }
            }
        }
        if pool.is_empty() {
            return String::new();
        }

        let candidates: Vec<(String, String)> = pool
            .iter()
            .map(|r| (r.topic.clone(), r.content.clone()))
            .collect();
        let picked = self
            .pick(utterance, "grammar rules", "topics", &candidates, limit)
            .await;
        let rules: Vec<_> = picked
            .iter()
            .filter_map(|id| pool.iter().find(|r| r.topic.eq_ignore_ascii_case(id)))
            .collect();
        if rules.is_empty() {
            return String::new();
        }

        let mut section = GRAMMAR_HEADER.to_string();
        for rule in rules {
            section.push_str(&format!("\n- {}: {}", rule.topic, rule.content));
        }
        section
    }

    async fn vocabulary_section(
        &self,
        utterance: &str,
        level: ProficiencyLevel,
        limit: usize,
    ) -> String {
        let tokens = tokenize(utterance);
        let topics: Vec<String> = VOCAB_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| tokens.iter().any(|t| t == kw)))
            .map(|(topic, _)| topic.to_string())
            .collect();

        let mut pool = if topics.is_empty() {
            Vec::new()
        } else {
            self.materials
                .vocabulary_by_topics(level, &topics, limit)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "vocabulary lookup failed");
                    Vec::new()
                })
        };

        if pool.len() < limit {
            let generic = self
                .materials
                .vocabulary_for_level(level, GENERIC_VOCAB_POOL)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "generic vocabulary lookup failed");
                    Vec::new()
                });
            for item in generic {
                if !pool.iter().any(|v| v.word == item.word) {
                    pool.push(item);
                }
            }
        }
        if pool.is_empty() {
            return String::new();
        }

        let candidates: Vec<(String, String)> = pool
            .iter()
            .map(|v| (v.word.clone(), v.definition.clone()))
            .collect();
        let picked = self
            .pick(utterance, "vocabulary words", "words", &candidates, limit)
            .await;
        let items: Vec<_> = picked
            .iter()
            .filter_map(|id| pool.iter().find(|v| v.word.eq_ignore_ascii_case(id)))
            .collect();
        if items.is_empty() {
            return String::new();
        }

        let mut section = VOCAB_HEADER.to_string();
        for item in items {
            section.push_str(&format!(
                "\n- {}: {} (Example: {})",
                item.word, item.definition, item.usage
            ));
        }
        section
    }

    async fn pronunciation_section(&self, utterance: &str) -> String {
        let hard_words: Vec<String> = tokenize(utterance)
            .into_iter()
            .filter(|word| DIFFICULT_PATTERNS.iter().any(|p| word.contains(p)))
            .collect();
        if hard_words.is_empty() {
            return String::new();
        }

        let guides = self
            .materials
            .pronunciation_for_words(&hard_words, 2)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "pronunciation lookup failed");
                Vec::new()
            });
        if guides.is_empty() {
            return String::new();
        }

        let mut section = PRONUNCIATION_HEADER.to_string();
        for g in guides {
            section.push_str(&format!("\n- {}: {} - {}", g.word, g.phonetic, g.tips));
        }
        section
    }

    /// Returns the identifiers to keep, in order. Asks the ranker only when
    /// configured and the pool actually exceeds the limit; on timeout,
    /// error, or a reply naming nothing from the pool it falls back to the
    /// keyword ordering truncated to `limit`.
    async fn pick(
        &self,
        utterance: &str,
        label: &str,
        id_kind: &str,
        candidates: &[(String, String)],
        limit: usize,
    ) -> Vec<String> {
        let keyword_order = || -> Vec<String> {
            candidates.iter().take(limit).map(|(id, _)| id.clone()).collect()
        };

        let Some(ranker) = &self.ranker else {
            return keyword_order();
        };
        if candidates.len() <= limit {
            return keyword_order();
        }

        let listing = candidates
            .iter()
            .map(|(id, text)| format!("- {}: {}", id, text))
            .collect::<Vec<_>>()
            .join("\n");
        let instruction = format!(
            "Given the user input: \"{utterance}\"\n\
             Select the top {limit} most relevant {label} from this list:\n\
             {listing}\n\
             Return ONLY the {id_kind} of the selected entries, separated by commas."
        );

        let reply =
            match tokio::time::timeout(self.config.ranker_timeout, ranker.rank(&instruction)).await
            {
                Err(_) => {
                    warn!(label, "semantic ranker timed out, using keyword order");
                    return keyword_order();
                }
                Ok(Err(e)) => {
                    warn!(label, error = %e, "semantic ranker failed, using keyword order");
                    return keyword_order();
                }
                Ok(Ok(reply)) => reply,
            };

        let mut picked: Vec<String> = Vec::new();
        for id in reply.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((known, _)) = candidates.iter().find(|(c, _)| c.eq_ignore_ascii_case(id)) {
                if !picked.contains(known) {
                    picked.push(known.clone());
                }
            }
        }
        picked.truncate(limit);
        if picked.is_empty() {
            warn!(label, "semantic ranker reply matched nothing, using keyword order");
            return keyword_order();
        }
        picked
    }
}

fn tokenize(utterance: &str) -> Vec<String> {
    utterance
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn keyword_hit(utterance: &str, tokens: &[String], keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        if kw.contains(' ') {
            utterance.contains(kw)
        } else {
            tokens.iter().any(|t| t == kw)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{
        GrammarRule, PronunciationGuide, StaticMaterials, VocabularyItem,
    };
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine_with(
        ranker: Option<Arc<dyn SemanticRanker>>,
        config: RetrievalConfig,
    ) -> RetrievalEngine {
        RetrievalEngine::new(Arc::new(StaticMaterials::new()), ranker, config)
    }

    /// Ranker that never answers in time.
    struct StalledRanker;

    #[async_trait]
    impl SemanticRanker for StalledRanker {
        async fn rank(&self, _instruction: &str) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    /// Ranker with a canned reply.
    struct FixedRanker(&'static str);

    #[async_trait]
    impl SemanticRanker for FixedRanker {
        async fn rank(&self, _instruction: &str) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    /// Material store where grammar lookups always fail.
    struct BrokenGrammarStore(StaticMaterials);

    #[async_trait]
    impl MaterialStore for BrokenGrammarStore {
        async fn grammar_by_topics(
            &self,
            _level: ProficiencyLevel,
            _topics: &[String],
            _limit: usize,
        ) -> Result<Vec<GrammarRule>, StoreError> {
            Err(StoreError::Backend("grammar index offline".into()))
        }
        async fn grammar_for_level(
            &self,
            _level: ProficiencyLevel,
            _limit: usize,
        ) -> Result<Vec<GrammarRule>, StoreError> {
            Err(StoreError::Backend("grammar index offline".into()))
        }
        async fn vocabulary_by_topics(
            &self,
            level: ProficiencyLevel,
            topics: &[String],
            limit: usize,
        ) -> Result<Vec<VocabularyItem>, StoreError> {
            self.0.vocabulary_by_topics(level, topics, limit).await
        }
        async fn vocabulary_for_level(
            &self,
            level: ProficiencyLevel,
            limit: usize,
        ) -> Result<Vec<VocabularyItem>, StoreError> {
            self.0.vocabulary_for_level(level, limit).await
        }
        async fn pronunciation_for_words(
            &self,
            words: &[String],
            limit: usize,
        ) -> Result<Vec<PronunciationGuide>, StoreError> {
            self.0.pronunciation_for_words(words, limit).await
        }
    }

    /// Counts vocabulary lookups so cache hits are observable.
    struct CountingStore {
        inner: StaticMaterials,
        vocab_calls: AtomicUsize,
    }

    #[async_trait]
    impl MaterialStore for CountingStore {
        async fn grammar_by_topics(
            &self,
            level: ProficiencyLevel,
            topics: &[String],
            limit: usize,
        ) -> Result<Vec<GrammarRule>, StoreError> {
            self.inner.grammar_by_topics(level, topics, limit).await
        }
        async fn grammar_for_level(
            &self,
            level: ProficiencyLevel,
            limit: usize,
        ) -> Result<Vec<GrammarRule>, StoreError> {
            self.inner.grammar_for_level(level, limit).await
        }
        async fn vocabulary_by_topics(
            &self,
            level: ProficiencyLevel,
            topics: &[String],
            limit: usize,
        ) -> Result<Vec<VocabularyItem>, StoreError> {
            self.vocab_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.vocabulary_by_topics(level, topics, limit).await
        }
        async fn vocabulary_for_level(
            &self,
            level: ProficiencyLevel,
            limit: usize,
        ) -> Result<Vec<VocabularyItem>, StoreError> {
            self.vocab_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.vocabulary_for_level(level, limit).await
        }
        async fn pronunciation_for_words(
            &self,
            words: &[String],
            limit: usize,
        ) -> Result<Vec<PronunciationGuide>, StoreError> {
            self.inner.pronunciation_for_words(words, limit).await
        }
    }

    #[tokio::test]
    async fn beginner_past_tense_scenario() {
        let engine = engine_with(None, RetrievalConfig::default());
        let blob = engine
            .retrieve("I have went to school yesterday", ProficiencyLevel::Beginner, 3)
            .await;

        assert!(blob.contains(GRAMMAR_HEADER), "blob was: {blob}");
        assert!(blob.contains("tense:"), "tense rule expected: {blob}");
        assert!(blob.contains("past simple"), "past-simple content expected");
        // No vocabulary topic keyword in the utterance: generic beginner
        // vocabulary still shows up.
        assert!(blob.contains(VOCAB_HEADER), "blob was: {blob}");
        assert!(blob.contains("appreciate"));
        // No difficult pronunciation pattern anywhere in the utterance.
        assert!(!blob.contains(PRONUNCIATION_HEADER), "blob was: {blob}");
    }

    #[tokio::test]
    async fn sections_appear_in_fixed_order() {
        let engine = engine_with(None, RetrievalConfig::default());
        let blob = engine
            .retrieve(
                "I thought about work at the office on Monday",
                ProficiencyLevel::Intermediate,
                3,
            )
            .await;

        let g = blob.find(GRAMMAR_HEADER).expect("grammar section");
        let v = blob.find(VOCAB_HEADER).expect("vocabulary section");
        let p = blob.find(PRONUNCIATION_HEADER).expect("pronunciation section");
        assert!(g < v && v < p, "section order wrong: {blob}");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_ranker_falls_back_to_keyword_order() {
        let config = RetrievalConfig {
            cache_capacity: 8,
            ranker_timeout: Duration::from_millis(100),
        };
        let engine = engine_with(Some(Arc::new(StalledRanker)), config);

        let started = tokio::time::Instant::now();
        let blob = engine
            .retrieve("we should visit a hotel", ProficiencyLevel::Advanced, 2)
            .await;
        // With the clock paused, elapsed virtual time shows exactly how long
        // the engine was willing to wait.
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "ranker timeout must not stall retrieval"
        );
        assert!(blob.contains(VOCAB_HEADER), "generic materials expected: {blob}");
    }

    #[tokio::test]
    async fn ranker_reply_reorders_candidates() {
        let config = RetrievalConfig::default();
        let engine = engine_with(Some(Arc::new(FixedRanker("ubiquitous, serendipity"))), config);

        // Advanced level has four vocabulary items; limit 2 forces a rank.
        let blob = engine
            .retrieve("tell me something interesting", ProficiencyLevel::Advanced, 2)
            .await;
        let ubiq = blob.find("ubiquitous").expect("ranked pick missing");
        let seren = blob.find("serendipity").expect("ranked pick missing");
        assert!(ubiq < seren, "ranker order not respected: {blob}");
        assert!(!blob.contains("ephemeral"), "unranked candidate leaked in");
    }

    #[tokio::test]
    async fn garbage_ranker_reply_falls_back() {
        let engine = engine_with(
            Some(Arc::new(FixedRanker("no such word, another miss"))),
            RetrievalConfig::default(),
        );
        let blob = engine
            .retrieve("tell me something interesting", ProficiencyLevel::Advanced, 2)
            .await;
        // Keyword order: first two advanced items.
        assert!(blob.contains("serendipity") && blob.contains("ephemeral"), "{blob}");
    }

    #[tokio::test]
    async fn one_failing_lookup_does_not_block_the_others() {
        let engine = RetrievalEngine::new(
            Arc::new(BrokenGrammarStore(StaticMaterials::new())),
            None,
            RetrievalConfig::default(),
        );
        let blob = engine
            .retrieve("I thought about my job", ProficiencyLevel::Intermediate, 3)
            .await;
        assert!(!blob.contains(GRAMMAR_HEADER));
        assert!(blob.contains(VOCAB_HEADER), "vocabulary must survive: {blob}");
        assert!(blob.contains(PRONUNCIATION_HEADER), "pronunciation must survive: {blob}");
    }

    #[tokio::test]
    async fn cache_hit_skips_the_stores() {
        let store = Arc::new(CountingStore {
            inner: StaticMaterials::new(),
            vocab_calls: AtomicUsize::new(0),
        });
        let engine = RetrievalEngine::new(store.clone(), None, RetrievalConfig::default());

        engine.retrieve("Hello there", ProficiencyLevel::Beginner, 3).await;
        let after_first = store.vocab_calls.load(Ordering::SeqCst);
        assert!(after_first > 0);

        // Same utterance modulo case and whitespace: served from cache.
        engine.retrieve("  hello THERE ", ProficiencyLevel::Beginner, 3).await;
        assert_eq!(store.vocab_calls.load(Ordering::SeqCst), after_first);

        // Different level is a different key.
        engine.retrieve("Hello there", ProficiencyLevel::Advanced, 3).await;
        assert!(store.vocab_calls.load(Ordering::SeqCst) > after_first);
    }

    #[test]
    fn cache_evicts_oldest_inserted_first() {
        let mut cache = ContextCache::new(3);
        for (i, key) in ["first", "second", "third"].iter().enumerate() {
            cache.insert(
                (key.to_string(), ProficiencyLevel::Beginner),
                format!("blob-{i}"),
            );
        }
        // Reading the oldest entry must not protect it: eviction is pure
        // FIFO, not recency-based.
        assert!(cache
            .get(&("first".to_string(), ProficiencyLevel::Beginner))
            .is_some());

        cache.insert(
            ("fourth".to_string(), ProficiencyLevel::Beginner),
            "blob-3".to_string(),
        );

        assert!(cache
            .get(&("first".to_string(), ProficiencyLevel::Beginner))
            .is_none());
        for key in ["second", "third", "fourth"] {
            assert!(
                cache
                    .get(&(key.to_string(), ProficiencyLevel::Beginner))
                    .is_some(),
                "{key} should survive"
            );
        }
    }

    #[tokio::test]
    async fn no_matches_anywhere_is_empty_not_an_error() {
        // A store with nothing for this level yields an empty blob.
        struct EmptyStore;

        #[async_trait]
        impl MaterialStore for EmptyStore {
            async fn grammar_by_topics(
                &self,
                _: ProficiencyLevel,
                _: &[String],
                _: usize,
            ) -> Result<Vec<GrammarRule>, StoreError> {
                Ok(Vec::new())
            }
            async fn grammar_for_level(
                &self,
                _: ProficiencyLevel,
                _: usize,
            ) -> Result<Vec<GrammarRule>, StoreError> {
                Ok(Vec::new())
            }
            async fn vocabulary_by_topics(
                &self,
                _: ProficiencyLevel,
                _: &[String],
                _: usize,
            ) -> Result<Vec<VocabularyItem>, StoreError> {
                Ok(Vec::new())
            }
            async fn vocabulary_for_level(
                &self,
                _: ProficiencyLevel,
                _: usize,
            ) -> Result<Vec<VocabularyItem>, StoreError> {
                Ok(Vec::new())
            }
            async fn pronunciation_for_words(
                &self,
                _: &[String],
                _: usize,
            ) -> Result<Vec<PronunciationGuide>, StoreError> {
                Ok(Vec::new())
            }
        }

        let engine =
            RetrievalEngine::new(Arc::new(EmptyStore), None, RetrievalConfig::default());
        let blob = engine.retrieve("xyzzy", ProficiencyLevel::Beginner, 3).await;
        assert_eq!(blob, "");
    }
}
