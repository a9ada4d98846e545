use async_trait::async_trait;
use serde_json::{json, Value};

use super::{LlmEngine, LlmRequest};
use crate::{CastnotesError, Result};

fn user_message(request: &LlmRequest<'_>) -> String {
    format!("{}\n\nTranscript:\n\n{}", request.prompt, request.transcript)
}

/// OpenAI chat-completions engine
pub struct ChatGptEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ChatGptEngine {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmEngine for ChatGptEngine {
    async fn generate(&self, request: LlmRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": user_message(&request)}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CastnotesError::Llm(format!(
                "OpenAI returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| CastnotesError::Llm("OpenAI response missing content".into()))
    }

    fn name(&self) -> &'static str {
        "chatgpt"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Anthropic messages engine
pub struct ClaudeEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeEngine {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmEngine for ClaudeEngine {
    async fn generate(&self, request: LlmRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": 4096,
                "messages": [{"role": "user", "content": user_message(&request)}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CastnotesError::Llm(format!(
                "Anthropic returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body["content"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| CastnotesError::Llm("Anthropic response missing content".into()))
    }

    fn name(&self) -> &'static str {
        "claude"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Google Gemini engine
pub struct GeminiEngine {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEngine {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LlmEngine for GeminiEngine {
    async fn generate(&self, request: LlmRequest<'_>) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [{"parts": [{"text": user_message(&request)}]}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CastnotesError::Llm(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| CastnotesError::Llm("Gemini response missing content".into()))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
