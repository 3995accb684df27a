//! Twitter publisher — v2 media upload and tweet creation.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::PublishError;
use crate::publish::payload::PostPayload;
use crate::publish::{Network, PostRef, Publisher};

const TWEETS_URL: &str = "https://api.x.com/2/tweets";
const MEDIA_UPLOAD_URL: &str = "https://api.x.com/2/media/upload";

/// OAuth2 user-context bearer token.
#[derive(Debug, Deserialize)]
struct TwitterCreds {
    access_token: String,
}

pub struct TwitterPublisher {
    client: reqwest::Client,
}

impl Default for TwitterPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TwitterPublisher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn upload_media(
        &self,
        token: &str,
        path: &std::path::Path,
    ) -> Result<String, PublishError> {
        let network = self.network();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();
        let form = Form::new().part("media", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .client
            .post(MEDIA_UPLOAD_URL)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body: serde_json::Value =
            resp.json().await.map_err(|e| PublishError::InvalidResponse {
                network,
                reason: e.to_string(),
            })?;
        if !status.is_success() {
            return Err(PublishError::UploadFailed {
                network,
                reason: format!("{status}: {body}"),
            });
        }
        body.get("data")
            .and_then(|d| d.get("id"))
            .and_then(serde_json::Value::as_str)
            .map(String::from)
            .ok_or_else(|| PublishError::InvalidResponse {
                network,
                reason: "missing media id".into(),
            })
    }
}

#[async_trait]
impl Publisher for TwitterPublisher {
    fn network(&self) -> Network {
        Network::Twitter
    }

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError> {
        let creds: TwitterCreds =
            serde_json::from_value(payload.credentials.clone()).map_err(|e| {
                PublishError::BadCredentials {
                    network: self.network(),
                    reason: e.to_string(),
                }
            })?;

        let reply_id = payload
            .reply_to
            .as_deref()
            .map(|link| resolve_reply_id(self.network(), link))
            .transpose()?;

        let mut media_ids = Vec::new();
        for item in &payload.media {
            media_ids.push(self.upload_media(&creds.access_token, &item.path).await?);
        }

        let mut body = serde_json::json!({ "text": payload.text });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }
        if let Some(id) = reply_id {
            body["reply"] = serde_json::json!({ "in_reply_to_tweet_id": id });
        }

        let resp = self
            .client
            .post(TWEETS_URL)
            .bearer_auth(&creds.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                network: self.network(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let response: serde_json::Value =
            resp.json().await.map_err(|e| PublishError::InvalidResponse {
                network: self.network(),
                reason: e.to_string(),
            })?;
        if !status.is_success() {
            return Err(PublishError::RequestFailed {
                network: self.network(),
                reason: format!("{status}: {response}"),
            });
        }

        let tweet_id = response
            .get("data")
            .and_then(|d| d.get("id"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| PublishError::InvalidResponse {
                network: self.network(),
                reason: "missing tweet id".into(),
            })?;

        tracing::info!(tweet_id, "Twitter post created");
        Ok(PostRef::new(format!("https://x.com/i/web/status/{tweet_id}")))
    }
}

/// A reply reference arrives as a post link; the tweet id is its trailing
/// path segment.
fn resolve_reply_id(network: Network, link: &str) -> Result<String, PublishError> {
    let id = link.rsplit('/').next().unwrap_or("").trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(PublishError::ReplyResolution {
            network,
            reason: format!("no tweet id in {link:?}"),
        });
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_id_from_status_link() {
        let id = resolve_reply_id(
            Network::Twitter,
            "https://x.com/someone/status/1234567890",
        )
        .unwrap();
        assert_eq!(id, "1234567890");
    }

    #[test]
    fn reply_id_rejects_non_numeric_tail() {
        assert!(resolve_reply_id(Network::Twitter, "https://x.com/someone/").is_err());
        assert!(resolve_reply_id(Network::Twitter, "not a link").is_err());
    }

    #[tokio::test]
    async fn bad_reply_link_aborts_before_any_upload() {
        let publisher = TwitterPublisher::new();
        let payload = PostPayload {
            network: Network::Twitter,
            credentials: serde_json::json!({"access_token": "t"}),
            text: "hi".into(),
            tags: vec![],
            tag_line: None,
            media: vec![],
            reply_to: Some("no-id-here".into()),
        };
        let err = publisher.publish(&payload).await.unwrap_err();
        assert!(matches!(err, PublishError::ReplyResolution { .. }));
    }

    #[tokio::test]
    async fn missing_token_is_bad_credentials() {
        let publisher = TwitterPublisher::new();
        let payload = PostPayload {
            network: Network::Twitter,
            credentials: serde_json::json!({}),
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
