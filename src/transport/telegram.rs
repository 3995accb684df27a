//! Telegram transport — long-polls the Bot API for updates.
//!
//! Maps messages, attachments, and inline-keyboard callbacks into the
//! core's inbound events, and renders step prompts as inline keyboards,
//! editing the tracked prompt message in place.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::dialog::event::{InboundEvent, Prompt, PromptHandle};
use crate::dialog::session::ConversationId;
use crate::error::TransportError;
use crate::media::MediaCategory;
use crate::transport::{EventStream, Transport};

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: &SecretString) -> Self {
        Self {
            bot_token: bot_token.expose_secret().to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn send_failed(&self, e: impl std::fmt::Display) -> TransportError {
        TransportError::SendFailed {
            name: "telegram".into(),
            reason: e.to_string(),
        }
    }

    /// Download an attachment's bytes via getFile + the file endpoint.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let fetch_failed = |reason: String| TransportError::FetchFailed {
            name: "telegram".into(),
            reason,
        };

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({"file_id": file_id}))
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        let file_path = body
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| fetch_failed("getFile returned no file_path".into()))?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(fetch_failed(format!(
                "file download returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Acknowledge a callback query so the client stops its spinner.
    async fn ack_callback(&self, update: &serde_json::Value) {
        let Some(id) = update
            .get("callback_query")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_str)
        else {
            return;
        };
        let _ = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({"callback_query_id": id}))
            .send()
            .await;
    }

    /// Map one Telegram update into an inbound event, downloading
    /// attachment bytes when needed.
    async fn map_update(&self, update: &serde_json::Value) -> Option<InboundEvent> {
        if let Some(callback) = update.get("callback_query") {
            let token = callback.get("data")?.as_str()?.to_string();
            let conversation = callback
                .get("message")
                .and_then(|m| m.get("chat"))
                .and_then(|c| c.get("id"))
                .and_then(serde_json::Value::as_i64)?;
            let operator = callback
                .get("from")
                .and_then(|f| f.get("id"))
                .and_then(serde_json::Value::as_i64)?
                .to_string();
            return Some(InboundEvent::Button {
                conversation: ConversationId(conversation),
                operator,
                token,
            });
        }

        let message = update.get("message")?;
        let conversation = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(serde_json::Value::as_i64)?;
        let conversation = ConversationId(conversation);
        let operator = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)?
            .to_string();

        if let Some(text) = message.get("text").and_then(serde_json::Value::as_str) {
            return Some(InboundEvent::Text {
                conversation,
                operator,
                content: text.to_string(),
            });
        }

        // Attachments: the largest photo size, a video, or a document.
        let (file_id, filename, category) = if let Some(sizes) =
            message.get("photo").and_then(serde_json::Value::as_array)
        {
            let file_id = sizes.last()?.get("file_id")?.as_str()?.to_string();
            (file_id, "media.jpg".to_string(), MediaCategory::Image)
        } else if let Some(video) = message.get("video") {
            let file_id = video.get("file_id")?.as_str()?.to_string();
            let filename = video
                .get("file_name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("video.mp4")
                .to_string();
            (file_id, filename, MediaCategory::Video)
        } else if let Some(document) = message.get("document") {
            let file_id = document.get("file_id")?.as_str()?.to_string();
            let filename = document
                .get("file_name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("file")
                .to_string();
            let category = document
                .get("mime_type")
                .and_then(serde_json::Value::as_str)
                .map(MediaCategory::from_mime)
                .unwrap_or_else(|| MediaCategory::from_filename(&filename));
            (file_id, filename, category)
        } else {
            return None;
        };

        match self.download_file(&file_id).await {
            Ok(bytes) => Some(InboundEvent::Attachment {
                conversation,
                operator,
                bytes,
                filename,
                category,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to download attachment");
                None
            }
        }
    }
}

/// Inline keyboard JSON for a prompt's button rows.
fn reply_markup(prompt: &Prompt) -> serde_json::Value {
    let rows: Vec<Vec<serde_json::Value>> = prompt
        .buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| serde_json::json!({"text": b.label, "callback_data": b.action}))
                .collect()
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = TelegramTransport {
            bot_token: self.bot_token.clone(),
            client: self.client.clone(),
        };

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                });

                let resp = match transport
                    .client
                    .post(transport.api_url("getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        transport.ack_callback(update).await;
                        let Some(event) = transport.map_update(update).await else {
                            continue;
                        };
                        if tx.send(event).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn show_prompt(
        &self,
        conversation: ConversationId,
        existing: Option<PromptHandle>,
        prompt: &Prompt,
    ) -> Result<PromptHandle, TransportError> {
        let markup = reply_markup(prompt);

        // Edit the tracked prompt in place when possible; fall back to a
        // fresh message when the edit is rejected (deleted, too old, or
        // identical content).
        if let Some(handle) = existing {
            let body = serde_json::json!({
                "chat_id": conversation.0,
                "message_id": handle.0,
                "text": prompt.text,
                "reply_markup": markup.clone(),
            });
            let resp = self
                .client
                .post(self.api_url("editMessageText"))
                .json(&body)
                .send()
                .await
                .map_err(|e| self.send_failed(e))?;
            if resp.status().is_success() {
                return Ok(handle);
            }
            tracing::debug!(
                status = %resp.status(),
                "editMessageText rejected; sending a fresh prompt"
            );
        }

        let body = serde_json::json!({
            "chat_id": conversation.0,
            "text": prompt.text,
            "reply_markup": markup,
        });
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_failed(e))?;
        let status = resp.status();
        let data: serde_json::Value = resp.json().await.map_err(|e| self.send_failed(e))?;
        if !status.is_success() {
            return Err(self.send_failed(format!("sendMessage returned {status}")));
        }
        let message_id = data
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| self.send_failed("sendMessage returned no message_id"))?;
        Ok(PromptHandle(message_id))
    }

    async fn send_status(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "chat_id": conversation.0,
            "text": text,
        });
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_failed(e))?;
        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(self.send_failed(format!("sendMessage failed: {err}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::event::Button;

    fn transport() -> TelegramTransport {
        TelegramTransport::new(&SecretString::from("123:ABC"))
    }

    #[test]
    fn api_url_builds() {
        assert_eq!(
            transport().api_url("getUpdates"),
            "https://api.telegram.org/bot123:ABC/getUpdates"
        );
    }

    #[test]
    fn reply_markup_preserves_rows() {
        let prompt = Prompt::new("pick")
            .row(vec![Button::new("A", "a"), Button::new("B", "b")])
            .row(vec![Button::new("C", "c")]);
        let markup = reply_markup(&prompt);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1]["callback_data"], "b");
        assert_eq!(rows[1][0]["text"], "C");
    }

    #[tokio::test]
    async fn map_update_text_message() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "chat": {"id": 99},
                "from": {"id": 42, "username": "alice"},
                "text": "hello",
            }
        });
        let event = transport().map_update(&update).await.unwrap();
        match event {
            InboundEvent::Text {
                conversation,
                operator,
                content,
            } => {
                assert_eq!(conversation, ConversationId(99));
                assert_eq!(operator, "42");
                assert_eq!(content, "hello");
            }
            other => panic!("expected text event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn map_update_callback_query() {
        let update = serde_json::json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb1",
                "data": "network:vk",
                "from": {"id": 42},
                "message": {"chat": {"id": 99}},
            }
        });
        let event = transport().map_update(&update).await.unwrap();
        match event {
            InboundEvent::Button {
                conversation,
                operator,
                token,
            } => {
                assert_eq!(conversation, ConversationId(99));
                assert_eq!(operator, "42");
                assert_eq!(token, "network:vk");
            }
            other => panic!("expected button event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn map_update_ignores_unknown_payloads() {
        let update = serde_json::json!({
            "update_id": 3,
            "message": {
                "chat": {"id": 99},
                "from": {"id": 42},
                "sticker": {"file_id": "s1"},
            }
        });
        assert!(transport().map_update(&update).await.is_none());
    }
}
