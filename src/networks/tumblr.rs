//! Tumblr publisher — photo/video/text posts on a blog.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::PublishError;
use crate::media::MediaCategory;
use crate::publish::payload::PostPayload;
use crate::publish::{Network, PostRef, Publisher};

#[derive(Debug, Deserialize)]
struct TumblrCreds {
    access_token: String,
    blog_identifier: String,
}

pub struct TumblrPublisher {
    client: reqwest::Client,
}

impl Default for TumblrPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TumblrPublisher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn post_url(blog: &str) -> String {
        format!("https://api.tumblr.com/v2/blog/{blog}/post")
    }

    async fn submit(
        &self,
        creds: &TumblrCreds,
        form: Form,
    ) -> Result<i64, PublishError> {
        let network = self.network();
        let resp = self
            .client
            .post(Self::post_url(&creds.blog_identifier))
            .bearer_auth(&creds.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
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
            let msg = body
                .get("meta")
                .and_then(|m| m.get("msg"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error");
            return Err(PublishError::RequestFailed {
                network,
                reason: format!("{status}: {msg}"),
            });
        }
        body.get("response")
            .and_then(|r| r.get("id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| PublishError::InvalidResponse {
                network,
                reason: "missing post id".into(),
            })
    }

    async fn media_parts(&self, payload: &PostPayload, mut form: Form) -> Result<Form, PublishError> {
        for (i, item) in payload.media.iter().enumerate() {
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
            form = form.part(format!("data[{i}]"), Part::bytes(bytes).file_name(file_name));
        }
        Ok(form)
    }
}

#[async_trait]
impl Publisher for TumblrPublisher {
    fn network(&self) -> Network {
        Network::Tumblr
    }

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError> {
        let creds: TumblrCreds =
            serde_json::from_value(payload.credentials.clone()).map_err(|e| {
                PublishError::BadCredentials {
                    network: self.network(),
                    reason: e.to_string(),
                }
            })?;

        let body = markdown_links(&payload.text);
        let tags = payload.tags.join(",");

        // Post kind follows the last staged item's category; no media at
        // all makes a text post.
        let form = match payload.last_media_category() {
            Some(MediaCategory::Video) => {
                let form = Form::new()
                    .text("type", "video")
                    .text("format", "markdown")
                    .text("caption", body)
                    .text("tags", tags);
                self.media_parts(payload, form).await?
            }
            Some(_) => {
                let form = Form::new()
                    .text("type", "photo")
                    .text("format", "markdown")
                    .text("caption", body)
                    .text("tags", tags);
                self.media_parts(payload, form).await?
            }
            None => Form::new()
                .text("type", "text")
                .text("format", "markdown")
                .text("body", body)
                .text("tags", tags),
        };

        let post_id = self.submit(&creds, form).await?;
        let url = format!("https://tumblr.com/{}/{post_id}", creds.blog_identifier);
        tracing::info!(blog = %creds.blog_identifier, post_id, "Tumblr post created");
        Ok(PostRef::new(url))
    }
}

/// Wrap every bare URL as a markdown link, the way the blog renders best.
fn markdown_links(text: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"https?://[^\s\]\)]+").unwrap());
    re.replace_all(text, "[$0]($0)").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_links_wraps_urls() {
        assert_eq!(
            markdown_links("see https://a.io now"),
            "see [https://a.io](https://a.io) now"
        );
    }

    #[test]
    fn markdown_links_leaves_plain_text() {
        assert_eq!(markdown_links("no links"), "no links");
    }

    #[test]
    fn markdown_links_stops_at_brackets() {
        assert_eq!(
            markdown_links("(https://a.io) done"),
            "([https://a.io](https://a.io)) done"
        );
    }

    #[test]
    fn post_url_shape() {
        assert_eq!(
            TumblrPublisher::post_url("myblog"),
            "https://api.tumblr.com/v2/blog/myblog/post"
        );
    }

    #[tokio::test]
    async fn missing_blog_is_bad_credentials() {
        let publisher = TumblrPublisher::new();
        let payload = PostPayload {
            network: Network::Tumblr,
            credentials: serde_json::json!({"access_token": "t"}),
            text: "hi".into(),
            tags: vec!["cat".into()],
            tag_line: None,
            media: vec![],
            reply_to: None,
        };
        let err = publisher.publish(&payload).await.unwrap_err();
        assert!(matches!(err, PublishError::BadCredentials { .. }));
    }
}
