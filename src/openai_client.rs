// src/openai_client.rs
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Fixed persona text prepended to every generation request. Never stored as
/// a conversation message.
const SYSTEM_INSTRUCTION: &str = "你是一位運動健康日記助理。使用者會記錄每天的運動內容與身體狀況，\
你負責給予簡短、具體、友善的回饋與建議。回覆一律使用繁體中文，內容保持精簡，不要使用 Markdown 標記。\
若使用者要求整理報告，請以條列方式完整彙整近期的紀錄重點。";

const EMPTY_REPLY_FALLBACK: &str = "沒有產生回應，請再傳送一次。";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("chat completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat completion API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected chat completion payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A single role/content turn sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model,
        }
    }

    /// Generates the assistant reply for an ordered conversation history.
    ///
    /// Called exactly once per event; any transport or API error is a hard
    /// failure for that single event and is never retried here.
    pub async fn generate_reply(&self, history: &[ChatMessage]) -> Result<String, OpenAiError> {
        let messages = with_system_instruction(history);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
        };

        tracing::debug!("chat completion request: {} messages", messages.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OpenAiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;
        Ok(extract_reply(parsed))
    }
}

fn with_system_instruction(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: SYSTEM_INSTRUCTION.to_string(),
    });
    messages.extend_from_slice(history);
    messages
}

fn extract_reply(response: ChatCompletionResponse) -> String {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        EMPTY_REPLY_FALLBACK.to_string()
    } else {
        text.to_string()
    }
}
