//! VK publisher — wall posts on a group page, photos uploaded first.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::PublishError;
use crate::media::MediaCategory;
use crate::publish::payload::PostPayload;
use crate::publish::{Network, PostRef, Publisher};

const API_VERSION: &str = "5.131";

#[derive(Debug, Deserialize)]
struct VkCreds {
    token: String,
    group_id: i64,
}

#[derive(Debug, Deserialize)]
struct UploadServer {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadedPhoto {
    photo: String,
    server: i64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct SavedPhoto {
    owner_id: i64,
    id: i64,
}

pub struct VkPublisher {
    client: reqwest::Client,
}

impl Default for VkPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl VkPublisher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Call a VK API method and unwrap the `response` envelope. VK signals
    /// errors inside a 200 body, so the envelope is checked, not the status.
    async fn api_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<T, PublishError> {
        let network = self.network();
        let url = format!("https://api.vk.com/method/{method}");
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("access_token", token.to_string()));
        query.push(("v", API_VERSION.to_string()));

        let body: serde_json::Value = self
            .client
            .post(&url)
            .form(&query)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                network,
                reason: format!("{method}: {e}"),
            })?
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse {
                network,
                reason: format!("{method}: {e}"),
            })?;

        if let Some(error) = body.get("error") {
            let msg = error
                .get("error_msg")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error");
            return Err(PublishError::RequestFailed {
                network,
                reason: format!("{method}: {msg}"),
            });
        }

        let response = body
            .get("response")
            .cloned()
            .ok_or_else(|| PublishError::InvalidResponse {
                network,
                reason: format!("{method}: missing response"),
            })?;
        serde_json::from_value(response).map_err(|e| PublishError::InvalidResponse {
            network,
            reason: format!("{method}: {e}"),
        })
    }

    /// Upload one photo to the group wall and return its attachment id.
    async fn upload_photo(
        &self,
        creds: &VkCreds,
        path: &std::path::Path,
        caption: Option<&str>,
    ) -> Result<String, PublishError> {
        let network = self.network();
        let server: UploadServer = self
            .api_call(
                "photos.getWallUploadServer",
                &[("group_id", creds.group_id.to_string())],
                &creds.token,
            )
            .await?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.jpg")
            .to_string();
        let form = Form::new().part("photo", Part::bytes(bytes).file_name(file_name));

        let uploaded: UploadedPhoto = self
            .client
            .post(&server.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse {
                network,
                reason: format!("photo upload: {e}"),
            })?;

        let mut params = vec![
            ("photo", uploaded.photo),
            ("server", uploaded.server.to_string()),
            ("hash", uploaded.hash),
            ("group_id", creds.group_id.to_string()),
        ];
        if let Some(caption) = caption {
            params.push(("caption", caption.to_string()));
        }
        let saved: Vec<SavedPhoto> = self
            .api_call("photos.saveWallPhoto", &params, &creds.token)
            .await?;
        let photo = saved.first().ok_or_else(|| PublishError::InvalidResponse {
            network,
            reason: "saveWallPhoto returned no photos".into(),
        })?;
        Ok(format!("photo{}_{}", photo.owner_id, photo.id))
    }
}

#[async_trait]
impl Publisher for VkPublisher {
    fn network(&self) -> Network {
        Network::Vk
    }

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError> {
        let creds: VkCreds = serde_json::from_value(payload.credentials.clone()).map_err(|e| {
            PublishError::BadCredentials {
                network: self.network(),
                reason: e.to_string(),
            }
        })?;

        let mut attachments = Vec::new();
        for item in &payload.media {
            if item.category != MediaCategory::Image {
                continue;
            }
            let attachment = self
                .upload_photo(&creds, &item.path, payload.tag_line.as_deref())
                .await?;
            attachments.push(attachment);
        }

        let post: serde_json::Value = self
            .api_call(
                "wall.post",
                &[
                    ("owner_id", (-creds.group_id).to_string()),
                    ("message", payload.text.clone()),
                    ("attachments", attachments.join(",")),
                    ("from_group", "1".to_string()),
                ],
                &creds.token,
            )
            .await?;

        let post_id = post
            .get("post_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| PublishError::InvalidResponse {
                network: self.network(),
                reason: "missing post_id".into(),
            })?;

        let url = format!("https://vk.com/wall-{}_{post_id}", creds.group_id);
        tracing::info!(group_id = creds.group_id, post_id, "VK post created");
        Ok(PostRef::new(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creds_parse_from_bundle() {
        let bundle = serde_json::json!({"token": "vk1", "group_id": 987});
        let creds: VkCreds = serde_json::from_value(bundle).unwrap();
        assert_eq!(creds.token, "vk1");
        assert_eq!(creds.group_id, 987);
    }

    #[tokio::test]
    async fn missing_group_id_is_bad_credentials() {
        let publisher = VkPublisher::new();
        let payload = PostPayload {
            network: Network::Vk,
            credentials: serde_json::json!({"token": "vk1"}),
            text: "text".into(),
            tags: vec![],
            tag_line: None,
            media: vec![],
            reply_to: None,
        };
        let err = publisher.publish(&payload).await.unwrap_err();
        assert!(matches!(err, PublishError::BadCredentials { .. }));
    }

    #[test]
    fn wall_url_shape() {
        assert_eq!(
            format!("https://vk.com/wall-{}_{}", 987, 12),
            "https://vk.com/wall-987_12"
        );
    }
}
