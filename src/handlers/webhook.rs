// src/handlers/webhook.rs
use crate::config::Capability;
use crate::conversation;
use crate::document;
use crate::openai_client::ChatMessage;
use crate::signature;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-line-signature";

/// Substring triggers that switch a reply into document form.
const DOCUMENT_TRIGGERS: &[&str] = &[
    "word",
    "report",
    "報告",
    "整理成檔",
    "compile to file",
    "完整分析",
    "full analysis",
    "週報",
    "weekly summary",
    "月報",
    "monthly summary",
];

const GENERATION_FAILED_NOTICE: &str = "系統暫時無法回應，請稍後再試。";

type PipelineError = Box<dyn std::error::Error + Send + Sync>;

pub fn webhook_routes() -> Router {
    Router::new().route("/webhook", get(verify_webhook).post(receive_webhook))
}

// LINE's endpoint verification only needs a 200.
async fn verify_webhook() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(rename = "replyToken")]
    reply_token: Option<String>,
    source: Option<EventSource>,
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
struct EventSource {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    message_type: String,
    text: Option<String>,
}

async fn receive_webhook(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    match &state.channel_secret {
        Some(secret) => {
            let header = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !signature::verify(secret, &body, header) {
                tracing::warn!("rejected webhook request: invalid LINE signature");
                return StatusCode::UNAUTHORIZED;
            }
        }
        None => tracing::warn!(
            "LINE_CHANNEL_SECRET not configured; accepting webhook without signature verification"
        ),
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Endpoint-verification pings can carry bodies we don't model.
            tracing::debug!("ignoring unparseable webhook body: {}", e);
            return StatusCode::OK;
        }
    };

    if parsed.events.is_empty() {
        tracing::debug!("webhook carried no events (verification ping)");
        return StatusCode::OK;
    }

    // Events are independent: reply tokens are per event and delivery is
    // idempotent, so the batch is processed concurrently and one event's
    // failure never holds up or fails its siblings.
    join_all(
        parsed
            .events
            .into_iter()
            .map(|event| handle_event(state.clone(), event)),
    )
    .await;

    StatusCode::OK
}

async fn handle_event(state: Arc<AppState>, event: WebhookEvent) {
    if event.event_type != "message" {
        tracing::debug!(event_type = %event.event_type, "skipping non-message event");
        return;
    }

    let Some(message) = event.message else {
        return;
    };
    if message.message_type != "text" {
        tracing::debug!(message_type = %message.message_type, "skipping non-text message");
        return;
    }
    let Some(text) = message.text else {
        return;
    };
    let Some(user_id) = event.source.and_then(|s| s.user_id) else {
        tracing::debug!("text message without a user id; skipping");
        return;
    };

    match process_message(&state, &user_id, &text).await {
        Ok(reply) => send_reply(&state, event.reply_token.as_deref(), &reply).await,
        Err(e) => {
            tracing::error!(user_id = %user_id, "failed to process message: {}", e);
            send_reply(&state, event.reply_token.as_deref(), GENERATION_FAILED_NOTICE).await;
        }
    }
}

/// Runs the relay pipeline for one inbound text message and returns the text
/// that was sent to the user (and recorded as the assistant message).
async fn process_message(
    state: &AppState,
    user_id: &str,
    text: &str,
) -> Result<String, PipelineError> {
    if let Capability::Ready(pool) = &state.db {
        if let Err(e) = conversation::append_message(pool, user_id, "user", text).await {
            tracing::warn!("failed to persist user message: {}", e);
        }
    }

    let history = load_history(state, user_id, text).await;

    let reply = match &state.llm {
        Capability::Ready(client) => client.generate_reply(&history).await?,
        Capability::Missing { reason } => (*reason).to_string(),
    };

    let outgoing = if wants_document(text) {
        attach_document(state, user_id, reply).await
    } else {
        reply
    };

    if let Capability::Ready(pool) = &state.db {
        if let Err(e) = conversation::append_message(pool, user_id, "assistant", &outgoing).await {
            tracing::warn!("failed to persist assistant message: {}", e);
        }
    }

    Ok(outgoing)
}

/// Bounded chronological history for the model. Degrades to just the current
/// message when the store is missing or unreachable.
async fn load_history(state: &AppState, user_id: &str, current_text: &str) -> Vec<ChatMessage> {
    let mut history = Vec::new();

    if let Capability::Ready(pool) = &state.db {
        match conversation::recent_history(pool, user_id).await {
            Ok(rows) => {
                history = rows
                    .into_iter()
                    .map(|m| ChatMessage {
                        role: normalize_role(&m.role).to_string(),
                        content: m.content,
                    })
                    .collect();
            }
            Err(e) => {
                tracing::warn!("history read failed; continuing with current message only: {}", e);
            }
        }
    }

    ensure_current_message(history, current_text)
}

/// Generation input must always end with the just-received message. A failed
/// user-turn append leaves the log one row short, and the read can otherwise
/// come back with only stale rows.
fn ensure_current_message(mut history: Vec<ChatMessage>, current_text: &str) -> Vec<ChatMessage> {
    let ends_with_current = history
        .last()
        .map_or(false, |m| m.role == "user" && m.content == current_text);

    if !ends_with_current {
        history.push(ChatMessage {
            role: "user".to_string(),
            content: current_text.to_string(),
        });
    }

    history
}

fn normalize_role(role: &str) -> &'static str {
    match role {
        "assistant" => "assistant",
        _ => "user",
    }
}

/// Renders the reply into a document, stores it, and appends the download
/// line. Falls back to the plain reply when rendering or storage fails; a
/// document request must never kill the whole event.
async fn attach_document(state: &AppState, user_id: &str, reply: String) -> String {
    let pool = match &state.db {
        Capability::Ready(pool) => pool,
        Capability::Missing { reason } => {
            tracing::warn!("document requested but {}; sending plain text", reason);
            return reply;
        }
    };

    let rendered = match document::render_report(&reply) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::error!("document rendering failed: {}", e);
            return reply;
        }
    };

    match conversation::store_file(
        pool,
        user_id,
        &rendered.filename,
        rendered.mime_type,
        &rendered.data,
    )
    .await
    {
        Ok(file_id) => {
            tracing::info!(user_id = %user_id, file_id = %file_id, "stored rendered report");
            format!(
                "{}\n\n{}",
                reply,
                download_line(state.public_base_url.as_deref(), file_id)
            )
        }
        Err(e) => {
            tracing::error!("failed to store rendered document: {}", e);
            reply
        }
    }
}

/// The line appended below a reply when a document was produced. Without a
/// configured public base URL there is nothing to link to, so an operator
/// reminder plus the raw file id is sent (and stored) instead.
fn download_line(base_url: Option<&str>, file_id: Uuid) -> String {
    match base_url {
        Some(base) => format!(
            "📄 下載報告：{}/files/{}",
            base.trim_end_matches('/'),
            file_id
        ),
        None => format!(
            "報告已產生，但尚未設定 PUBLIC_BASE_URL，無法提供下載連結。檔案編號：{}",
            file_id
        ),
    }
}

fn wants_document(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DOCUMENT_TRIGGERS.iter().any(|t| lowered.contains(t))
}

async fn send_reply(state: &AppState, reply_token: Option<&str>, text: &str) {
    let Some(token) = reply_token else {
        tracing::warn!("no reply token available; dropping reply");
        return;
    };

    match &state.line {
        Capability::Ready(client) => {
            if let Err(e) = client.reply(token, text).await {
                tracing::error!("failed to send LINE reply: {}", e);
            }
        }
        Capability::Missing { reason } => tracing::warn!("cannot reply: {}", reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_triggers_match_case_insensitively() {
        assert!(wants_document("幫我做成Word報告"));
        assert!(wants_document("請幫我整理成檔"));
        assert!(wants_document("WEEKLY SUMMARY please"));
        assert!(wants_document("給我完整分析"));
        assert!(wants_document("這週的週報"));
    }

    #[test]
    fn plain_diary_text_does_not_trigger() {
        assert!(!wants_document("今天跑了10k"));
        assert!(!wants_document("今天跑步5公里，膝蓋有點痛"));
    }

    #[test]
    fn webhook_body_parses_line_payload() {
        let raw = r#"{
            "destination": "U0000",
            "events": [{
                "type": "message",
                "replyToken": "abc123",
                "source": {"type": "user", "userId": "U1234"},
                "timestamp": 1700000000000,
                "message": {"id": "m1", "type": "text", "text": "hello"}
            }]
        }"#;

        let body: WebhookBody = serde_json::from_str(raw).unwrap();
        assert_eq!(body.events.len(), 1);

        let event = &body.events[0];
        assert_eq!(event.event_type, "message");
        assert_eq!(event.reply_token.as_deref(), Some("abc123"));
        assert_eq!(
            event.source.as_ref().unwrap().user_id.as_deref(),
            Some("U1234")
        );
        assert_eq!(
            event.message.as_ref().unwrap().text.as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn missing_events_field_means_no_events() {
        let body: WebhookBody = serde_json::from_str("{}").unwrap();
        assert!(body.events.is_empty());
    }

    #[test]
    fn non_text_events_parse_without_text() {
        let raw = r#"{"events": [{"type": "message", "message": {"id": "m2", "type": "sticker"}}]}"#;
        let body: WebhookBody = serde_json::from_str(raw).unwrap();
        let message = body.events[0].message.as_ref().unwrap();
        assert_eq!(message.message_type, "sticker");
        assert!(message.text.is_none());
    }

    #[test]
    fn download_line_links_when_base_url_is_set() {
        let id = Uuid::nil();
        let line = download_line(Some("https://bot.example.com/"), id);
        assert_eq!(
            line,
            format!("📄 下載報告：https://bot.example.com/files/{}", id)
        );
    }

    #[test]
    fn download_line_reminds_operator_without_base_url() {
        let id = Uuid::new_v4();
        let line = download_line(None, id);
        assert!(line.contains("PUBLIC_BASE_URL"));
        assert!(line.contains(&id.to_string()));
    }

    #[test]
    fn history_always_ends_with_the_current_message() {
        let stale = vec![
            ChatMessage {
                role: "user".to_string(),
                content: "昨天健走一小時".to_string(),
            },
            ChatMessage {
                role: "assistant".to_string(),
                content: "很棒的恢復日".to_string(),
            },
        ];

        let history = ensure_current_message(stale, "今天跑步5公里");
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().role, "user");
        assert_eq!(history.last().unwrap().content, "今天跑步5公里");
    }

    #[test]
    fn persisted_current_message_is_not_duplicated() {
        let rows = vec![
            ChatMessage {
                role: "assistant".to_string(),
                content: "記得補水".to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: "今天跑步5公里".to_string(),
            },
        ];

        let history = ensure_current_message(rows, "今天跑步5公里");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn empty_history_degrades_to_current_message_only() {
        let history = ensure_current_message(Vec::new(), "今天跑步5公里");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[0].content, "今天跑步5公里");
    }

    #[test]
    fn stored_roles_normalize_for_the_model() {
        assert_eq!(normalize_role("assistant"), "assistant");
        assert_eq!(normalize_role("user"), "user");
        assert_eq!(normalize_role("function"), "user");
    }
}
