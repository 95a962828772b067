// src/line_client.rs
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

// LINE caps a single text message at 5000 characters.
const MAX_TEXT_LEN: usize = 5000;

#[derive(Debug, Clone)]
pub struct LineClient {
    client: Client,
    access_token: String,
    base_url: String,
}

#[derive(Debug, Error)]
pub enum LineError {
    #[error("reply request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LINE reply API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    text: &'a str,
}

impl LineClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: "https://api.line.me/v2/bot".to_string(),
        }
    }

    /// Sends one text reply for a reply token. Tokens are single-use, so a
    /// failed call is not retried.
    pub async fn reply(&self, reply_token: &str, text: &str) -> Result<(), LineError> {
        let request = ReplyRequest {
            reply_token,
            messages: vec![TextMessage {
                message_type: "text",
                text: clamp_text(text),
            }],
        };

        let response = self
            .client
            .post(format!("{}/message/reply", self.base_url))
            .bearer_auth(&self.access_token)
            .timeout(Duration::from_secs(30))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

fn clamp_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(clamp_text("補充水分，明天繼續"), "補充水分，明天繼續");
    }

    #[test]
    fn long_text_clamps_on_a_char_boundary() {
        let text = "好".repeat(MAX_TEXT_LEN + 500);
        let clamped = clamp_text(&text);
        assert_eq!(clamped.chars().count(), MAX_TEXT_LEN);
    }

    #[test]
    fn reply_request_serializes_line_shape() {
        let request = ReplyRequest {
            reply_token: "tok",
            messages: vec![TextMessage {
                message_type: "text",
                text: "hello",
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["replyToken"], "tok");
        assert_eq!(value["messages"][0]["type"], "text");
        assert_eq!(value["messages"][0]["text"], "hello");
    }
}
