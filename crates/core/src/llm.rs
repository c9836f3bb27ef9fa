//! Chat-completion client seam.
//!
//! One trait for every text-generation call the service makes: feedback
//! generation on the think path and the semantic ranker both go through
//! [`ChatClient`], so tests can swap in canned clients and production can
//! point at any OpenAI-compatible endpoint (Groq in the default config).

use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;

use crate::retrieval::SemanticRanker;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One non-streaming completion over the given messages.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String>;
}

pub fn system_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(text.to_string())
        .build()?
        .into())
}

pub fn user_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(text.to_string())
        .build()?
        .into())
}

pub fn assistant_message(text: &str) -> Result<ChatCompletionRequestMessage> {
    Ok(ChatCompletionRequestAssistantMessageArgs::default()
        .content(text.to_string())
        .build()?
        .into())
}

/// [`ChatClient`] for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAICompatibleClient {
    pub fn new(config: OpenAIConfig, model: String, temperature: f32) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature,
        }
    }
}

#[async_trait]
impl ChatClient for OpenAICompatibleClient {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let choice = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("completion returned no choices"))?;
        choice
            .message
            .content
            .clone()
            .ok_or_else(|| anyhow!("completion choice had no text content"))
    }
}

/// Semantic ranker backed by a chat completion: the instruction goes out as
/// a single user message and the raw reply comes back for the retrieval
/// engine to parse. Advisory by contract, so errors just bubble to the
/// engine's fallback.
pub struct LlmRanker {
    chat: Arc<dyn ChatClient>,
}

impl LlmRanker {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl SemanticRanker for LlmRanker {
    async fn rank(&self, instruction: &str) -> Result<String> {
        self.chat.complete(vec![user_message(instruction)?]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_helpers_build_the_right_variants() {
        assert!(matches!(
            system_message("be helpful").unwrap(),
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            user_message("hello").unwrap(),
            ChatCompletionRequestMessage::User(_)
        ));
        assert!(matches!(
            assistant_message("hi there").unwrap(),
            ChatCompletionRequestMessage::Assistant(_)
        ));
    }

    #[tokio::test]
    async fn ranker_passes_reply_through_unparsed() {
        struct Canned;

        #[async_trait]
        impl ChatClient for Canned {
            async fn complete(
                &self,
                messages: Vec<ChatCompletionRequestMessage>,
            ) -> Result<String> {
                assert_eq!(messages.len(), 1);
                Ok("tense, articles".to_string())
            }
        }

        let ranker = LlmRanker::new(Arc::new(Canned));
        let reply = ranker.rank("pick two").await.unwrap();
        assert_eq!(reply, "tense, articles");
    }
}
