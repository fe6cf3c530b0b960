//! LLM capability: text generation over an OpenAI-compatible chat API.
//!
//! The bot core only depends on the [`Llm`] trait; [`OpenAiChat`] is the
//! production implementation. The service registry maps an `ai_service`
//! name to an endpoint base URL. Generation failures never stall control
//! flow — callers substitute the deterministic fallback strings below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;

/// Token budget for conversational replies.
pub const REPLY_MAX_TOKENS: u32 = 150;
/// Token budget for topics, kick reasons, and entrance lines.
pub const ACTION_MAX_TOKENS: u32 = 50;
/// Sampling temperature for conversational replies.
pub const REPLY_TEMPERATURE: f32 = 0.8;
/// Sampling temperature for topics, kick reasons, and entrance lines.
pub const ACTION_TEMPERATURE: f32 = 0.9;

/// Fallback when reply generation fails.
pub const FALLBACK_REPLY: &str = "Uh... I'm speechless (error).";
/// Fallback when topic generation fails.
pub const FALLBACK_TOPIC: &str = "Just another boring day in IRC...";
/// Fallback when kick-reason generation fails.
pub const FALLBACK_KICK: &str = "Because I said so!";
/// Fallback when entrance generation fails.
pub const FALLBACK_ENTRANCE: &str = "Has arrived!";

/// Endpoint base URL for a configured `ai_service` name.
///
/// Unknown names fall back to the OpenAI endpoint with a warning.
pub fn service_base_url(service: &str) -> &'static str {
    match service {
        "openai" => "https://api.openai.com/v1",
        "perplexity" => "https://api.perplexity.ai/v1",
        "grok" => "https://api.grok.com/v1",
        other => {
            warn!(service = other, "unknown ai service, falling back to openai");
            "https://api.openai.com/v1"
        }
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub service: String,
    pub model: String,
    pub api_key: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    /// A conversational reply request (0.8 / 150 tokens).
    pub fn chat(service: String, model: String, api_key: String, prompt: String) -> Self {
        LlmRequest {
            service,
            model,
            api_key,
            prompt,
            max_tokens: REPLY_MAX_TOKENS,
            temperature: REPLY_TEMPERATURE,
        }
    }

    /// A short action request — topic, kick reason, entrance (0.9 / 50).
    pub fn action(service: String, model: String, api_key: String, prompt: String) -> Self {
        LlmRequest {
            service,
            model,
            api_key,
            prompt,
            max_tokens: ACTION_MAX_TOKENS,
            temperature: ACTION_TEMPERATURE,
        }
    }
}

/// Narrow capability the bot core calls for all generated text.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Production implementation against an OpenAI-compatible
/// `/chat/completions` endpoint.
#[derive(Debug, Default, Clone)]
pub struct OpenAiChat {
    http: reqwest::Client,
}

impl OpenAiChat {
    pub fn new() -> Self {
        OpenAiChat {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Llm for OpenAiChat {
    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", service_base_url(&req.service));
        debug!(
            target: "api",
            service = %req.service,
            model = %req.model,
            max_tokens = req.max_tokens,
            "chat completion request"
        );

        let body = ChatBody {
            model: &req.model,
            messages: [ChatTurn {
                role: "user",
                content: &req.prompt,
            }],
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };

        let response: ChatResponse = self
            .http
            .post(&url)
            .bearer_auth(&req.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Shape("response contained no choices".into()))?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_services() {
        assert_eq!(service_base_url("openai"), "https://api.openai.com/v1");
        assert_eq!(service_base_url("perplexity"), "https://api.perplexity.ai/v1");
        assert_eq!(service_base_url("grok"), "https://api.grok.com/v1");
    }

    #[test]
    fn test_unknown_service_falls_back() {
        assert_eq!(service_base_url("mystery"), "https://api.openai.com/v1");
    }

    #[test]
    fn test_request_kinds() {
        let chat = LlmRequest::chat("openai".into(), "m".into(), "k".into(), "p".into());
        assert_eq!(chat.max_tokens, REPLY_MAX_TOKENS);
        assert_eq!(chat.temperature, REPLY_TEMPERATURE);

        let action = LlmRequest::action("openai".into(), "m".into(), "k".into(), "p".into());
        assert_eq!(action.max_tokens, ACTION_MAX_TOKENS);
        assert_eq!(action.temperature, ACTION_TEMPERATURE);
    }
}
