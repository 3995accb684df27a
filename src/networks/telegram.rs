//! Telegram publisher — posts to a channel via the Bot API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::PublishError;
use crate::media::MediaCategory;
use crate::publish::payload::PostPayload;
use crate::publish::{Network, PostRef, Publisher};

/// Credential bundle: the destination channel.
#[derive(Debug, Deserialize)]
struct TelegramCreds {
    chat_id: String,
}

/// Publishes to a Telegram channel with the shared bot token.
pub struct TelegramPublisher {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramPublisher {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
    ) -> Result<serde_json::Value, PublishError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                network: self.network(),
                reason: e.to_string(),
            })?;
        check_api_response(self.network(), resp).await
    }

    /// Send the staged images/videos as one media group with the post text
    /// as the caption of the first item.
    async fn send_media_group(
        &self,
        chat_id: &str,
        text: &str,
        payload: &PostPayload,
    ) -> Result<serde_json::Value, PublishError> {
        let mut descriptors = Vec::new();
        let mut form = Form::new().text("chat_id", chat_id.to_string());

        for (i, item) in payload.media.iter().enumerate() {
            let kind = match item.category {
                MediaCategory::Image => "photo",
                MediaCategory::Video => "video",
                MediaCategory::Other => continue,
            };
            let attach_name = format!("file{i}");
            let mut descriptor = serde_json::json!({
                "type": kind,
                "media": format!("attach://{attach_name}"),
            });
            if descriptors.is_empty() && !text.is_empty() {
                descriptor["caption"] = serde_json::Value::String(text.to_string());
            }
            descriptors.push(descriptor);

            let bytes =
                tokio::fs::read(&item.path)
                    .await
                    .map_err(|e| PublishError::UploadFailed {
                        network: self.network(),
                        reason: e.to_string(),
                    })?;
            let file_name = item
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("media")
                .to_string();
            form = form.part(attach_name, Part::bytes(bytes).file_name(file_name));
        }

        if descriptors.is_empty() {
            return self.send_text(chat_id, text).await;
        }

        let media_json =
            serde_json::to_string(&descriptors).map_err(|e| PublishError::RequestFailed {
                network: self.network(),
                reason: e.to_string(),
            })?;
        form = form.text("media", media_json);

        let resp = self
            .client
            .post(self.api_url("sendMediaGroup"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                network: self.network(),
                reason: e.to_string(),
            })?;
        check_api_response(self.network(), resp).await
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    fn network(&self) -> Network {
        Network::Telegram
    }

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError> {
        let creds: TelegramCreds = serde_json::from_value(payload.credentials.clone())
            .map_err(|e| PublishError::BadCredentials {
                network: self.network(),
                reason: e.to_string(),
            })?;

        let result = if payload.media.is_empty() {
            self.send_text(&creds.chat_id, &payload.text).await?
        } else {
            self.send_media_group(&creds.chat_id, &payload.text, payload)
                .await?
        };

        let message_id = first_message_id(&result).ok_or_else(|| PublishError::InvalidResponse {
            network: self.network(),
            reason: "no message_id in response".into(),
        })?;
        let url = post_url(&creds.chat_id, message_id);
        tracing::info!(chat_id = %creds.chat_id, message_id, "Telegram post created");
        Ok(PostRef::new(url))
    }
}

/// `result` is a single message for sendMessage and an array for
/// sendMediaGroup; either way the first message id identifies the post.
fn first_message_id(result: &serde_json::Value) -> Option<i64> {
    match result {
        serde_json::Value::Array(messages) => messages.first()?.get("message_id")?.as_i64(),
        other => other.get("message_id")?.as_i64(),
    }
}

/// Public channels get a t.me link; private chat ids get an opaque ref.
fn post_url(chat_id: &str, message_id: i64) -> String {
    match chat_id.strip_prefix('@') {
        Some(name) => format!("https://t.me/{name}/{message_id}"),
        None => format!("message {message_id} in chat {chat_id}"),
    }
}

async fn check_api_response(
    network: Network,
    resp: reqwest::Response,
) -> Result<serde_json::Value, PublishError> {
    let status = resp.status();
    let body: serde_json::Value =
        resp.json().await.map_err(|e| PublishError::InvalidResponse {
            network,
            reason: e.to_string(),
        })?;
    if !status.is_success() || body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let description = body
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        return Err(PublishError::RequestFailed {
            network,
            reason: format!("{status}: {description}"),
        });
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| PublishError::InvalidResponse {
            network,
            reason: "missing result".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_builds() {
        let publisher = TelegramPublisher::new("123:ABC".into());
        assert_eq!(
            publisher.api_url("sendMediaGroup"),
            "https://api.telegram.org/bot123:ABC/sendMediaGroup"
        );
    }

    #[test]
    fn first_message_id_from_single_and_group() {
        let single = serde_json::json!({"message_id": 5});
        assert_eq!(first_message_id(&single), Some(5));

        let group = serde_json::json!([{"message_id": 9}, {"message_id": 10}]);
        assert_eq!(first_message_id(&group), Some(9));

        let empty = serde_json::json!([]);
        assert_eq!(first_message_id(&empty), None);
    }

    #[test]
    fn post_url_for_public_and_private_chats() {
        assert_eq!(post_url("@artchan", 7), "https://t.me/artchan/7");
        assert_eq!(post_url("-1001234", 7), "message 7 in chat -1001234");
    }

    #[tokio::test]
    async fn bad_credentials_rejected_before_any_request() {
        let publisher = TelegramPublisher::new("t".into());
        let payload = PostPayload {
            network: Network::Telegram,
            credentials: serde_json::json!({"wrong_key": 1}),
            text: "hi".into(),
            tags: vec![],
            tag_line: None,
            media: vec![],
            reply_to: None,
        };
        let err = publisher.publish(&payload).await.unwrap_err();
        assert!(matches!(err, PublishError::BadCredentials { .. }));
    }
}
