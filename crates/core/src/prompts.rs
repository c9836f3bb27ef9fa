//! Prompt and greeting construction for the conversation partner.
//!
//! The agent prompt embeds machine-readable `LEARNER LEVEL:` / `TOPIC:`
//! markers so the think endpoint can recover the session parameters from
//! the forwarded system prompt without any side channel.

use crate::session::{ConversationTopic, ProficiencyLevel};

fn level_instruction(level: ProficiencyLevel) -> &'static str {
    match level {
        ProficiencyLevel::Beginner => {
            "Speak slowly and use simple vocabulary. Keep sentences short."
        }
        ProficiencyLevel::Intermediate => {
            "Use natural conversation speed with moderate vocabulary."
        }
        ProficiencyLevel::Advanced => {
            "Use complex vocabulary, idioms, and natural speech patterns."
        }
    }
}

fn topic_instruction(topic: ConversationTopic) -> &'static str {
    match topic {
        ConversationTopic::FreeTalk => {
            "Have an open conversation about any topic the user wants."
        }
        ConversationTopic::DailyLife => {
            "Focus on everyday situations like shopping, cooking, or daily routines."
        }
        ConversationTopic::Business => {
            "Discuss professional topics like meetings, presentations, or workplace scenarios."
        }
        ConversationTopic::Travel => {
            "Talk about travel experiences, destinations, and travel-related situations."
        }
        ConversationTopic::Academic => {
            "Discuss educational topics, study habits, or academic subjects."
        }
    }
}

/// System prompt sent to the upstream agent at session start.
pub fn agent_system_prompt(level: ProficiencyLevel, topic: ConversationTopic) -> String {
    format!(
        "You are Parlo, an AI English speaking practice partner.\n\
         LEARNER LEVEL: {level_marker}\n\
         TOPIC: {topic_marker}\n\n\
         Your role is to:\n\
         1. Have natural conversations to help the user practice English\n\
         2. {level_instruction}\n\
         3. {topic_instruction}\n\
         4. Gently correct grammar mistakes when appropriate\n\
         5. Encourage the user and keep the conversation flowing\n\
         6. Ask follow-up questions to keep them talking\n\
         7. Keep responses concise (1-3 sentences)\n\n\
         Be warm, patient, and supportive. Focus on helping them improve their \
         English speaking skills.",
        level_marker = level.as_str().to_uppercase(),
        topic_marker = topic.as_str(),
        level_instruction = level_instruction(level),
        topic_instruction = topic_instruction(topic),
    )
}

/// Opening line the agent speaks when the session connects.
pub fn greeting(level: ProficiencyLevel) -> &'static str {
    match level {
        ProficiencyLevel::Beginner => {
            "Hello! I am here to help you practice English. Say hello to start!"
        }
        ProficiencyLevel::Intermediate => {
            "Hi there! I'm excited to practice English with you today. What would you like to talk about?"
        }
        ProficiencyLevel::Advanced => {
            "Welcome! I'm looking forward to having an engaging conversation with you. What's on your mind?"
        }
    }
}

/// Prompt for the think step: the agent prompt plus retrieved learning
/// materials for the current utterance. An empty context adds nothing.
pub fn practice_prompt(
    level: ProficiencyLevel,
    topic: ConversationTopic,
    context: &str,
) -> String {
    let mut prompt = agent_system_prompt(level, topic);
    if !context.is_empty() {
        prompt.push_str("\n\nRELEVANT LEARNING MATERIALS:\n");
        prompt.push_str(context);
        prompt.push_str(
            "\nWeave these materials into your reply naturally where they fit; never lecture.",
        );
    }
    prompt
}

/// Recovers (level, topic) from a forwarded system prompt via the embedded
/// markers. Unknown or absent markers fall back to the protocol defaults.
pub fn extract_markers(system_text: &str) -> (ProficiencyLevel, ConversationTopic) {
    let level = if system_text.contains("LEARNER LEVEL: BEGINNER") {
        ProficiencyLevel::Beginner
    } else if system_text.contains("LEARNER LEVEL: ADVANCED") {
        ProficiencyLevel::Advanced
    } else {
        ProficiencyLevel::Intermediate
    };

    let topic = [
        ConversationTopic::DailyLife,
        ConversationTopic::Business,
        ConversationTopic::Travel,
        ConversationTopic::Academic,
    ]
    .into_iter()
    .find(|t| system_text.contains(&format!("TOPIC: {}", t.as_str())))
    .unwrap_or(ConversationTopic::FreeTalk);

    (level, topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_round_trip_through_the_prompt() {
        for level in [
            ProficiencyLevel::Beginner,
            ProficiencyLevel::Intermediate,
            ProficiencyLevel::Advanced,
        ] {
            for topic in [
                ConversationTopic::DailyLife,
                ConversationTopic::Business,
                ConversationTopic::Travel,
                ConversationTopic::Academic,
                ConversationTopic::FreeTalk,
            ] {
                let prompt = agent_system_prompt(level, topic);
                assert_eq!(extract_markers(&prompt), (level, topic));
            }
        }
    }

    #[test]
    fn unmarked_text_falls_back_to_defaults() {
        assert_eq!(
            extract_markers("You are a generic assistant."),
            (ProficiencyLevel::Intermediate, ConversationTopic::FreeTalk)
        );
    }

    #[test]
    fn greetings_differ_by_level() {
        let greetings = [
            greeting(ProficiencyLevel::Beginner),
            greeting(ProficiencyLevel::Intermediate),
            greeting(ProficiencyLevel::Advanced),
        ];
        assert_ne!(greetings[0], greetings[1]);
        assert_ne!(greetings[1], greetings[2]);
    }

    #[test]
    fn practice_prompt_includes_context_only_when_present() {
        let bare = practice_prompt(
            ProficiencyLevel::Beginner,
            ConversationTopic::Travel,
            "",
        );
        assert!(!bare.contains("RELEVANT LEARNING MATERIALS"));

        let with_context = practice_prompt(
            ProficiencyLevel::Beginner,
            ConversationTopic::Travel,
            "GRAMMAR TIPS:\n- tense: ...",
        );
        assert!(with_context.contains("RELEVANT LEARNING MATERIALS"));
        assert!(with_context.contains("GRAMMAR TIPS"));
    }
}
