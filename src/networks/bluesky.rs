//! Bluesky publisher — atproto xrpc: session login, blob uploads,
//! rich-text link facets addressed by byte offset, reply resolution.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PublishError;
use crate::media::MediaCategory;
use crate::publish::payload::PostPayload;
use crate::publish::{Network, PostRef, Publisher};
use crate::tags::url_byte_spans;

#[derive(Debug, Deserialize)]
struct BlueskyCreds {
    handle: String,
    password: String,
    #[serde(default = "default_service")]
    service: String,
}

fn default_service() -> String {
    "https://bsky.social".to_string()
}

#[derive(Debug, Deserialize)]
struct XrpcSession {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

pub struct BlueskyPublisher {
    client: reqwest::Client,
}

impl Default for BlueskyPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlueskyPublisher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn create_session(&self, creds: &BlueskyCreds) -> Result<XrpcSession, PublishError> {
        let network = self.network();
        let resp = self
            .client
            .post(format!(
                "{}/xrpc/com.atproto.server.createSession",
                creds.service
            ))
            .json(&serde_json::json!({
                "identifier": creds.handle,
                "password": creds.password,
            }))
            .send()
            .await
            .map_err(|e| PublishError::AuthFailed {
                network,
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(PublishError::AuthFailed {
                network,
                reason: format!("createSession returned {}", resp.status()),
            });
        }
        resp.json().await.map_err(|e| PublishError::InvalidResponse {
            network,
            reason: e.to_string(),
        })
    }

    async fn upload_blob(
        &self,
        service: &str,
        session: &XrpcSession,
        path: &std::path::Path,
    ) -> Result<serde_json::Value, PublishError> {
        let network = self.network();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?;
        let resp = self
            .client
            .post(format!("{service}/xrpc/com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header("Content-Type", mime_for(path))
            .body(bytes)
            .send()
            .await
            .map_err(|e| PublishError::UploadFailed {
                network,
                reason: e.to_string(),
            })?;

        let body = check_xrpc(network, resp).await?;
        body.get("blob")
            .cloned()
            .ok_or_else(|| PublishError::InvalidResponse {
                network,
                reason: "uploadBlob returned no blob".into(),
            })
    }

    /// Resolve a bsky.app post link to a strong reply reference. A failure
    /// here aborts only the Bluesky attempt.
    async fn resolve_reply(
        &self,
        service: &str,
        session: &XrpcSession,
        link: &str,
    ) -> Result<serde_json::Value, PublishError> {
        let network = self.network();
        let (handle, rkey) = parse_post_link(network, link)?;

        let did = if handle.starts_with("did:") {
            handle
        } else {
            let resp = self
                .client
                .get(format!(
                    "{service}/xrpc/com.atproto.identity.resolveHandle"
                ))
                .query(&[("handle", handle.as_str())])
                .send()
                .await
                .map_err(|e| PublishError::ReplyResolution {
                    network,
                    reason: e.to_string(),
                })?;
            if !resp.status().is_success() {
                return Err(PublishError::ReplyResolution {
                    network,
                    reason: format!("could not resolve DID for handle {handle:?}"),
                });
            }
            let body: serde_json::Value =
                resp.json().await.map_err(|e| PublishError::InvalidResponse {
                    network,
                    reason: e.to_string(),
                })?;
            body.get("did")
                .and_then(serde_json::Value::as_str)
                .map(String::from)
                .ok_or_else(|| PublishError::ReplyResolution {
                    network,
                    reason: format!("could not resolve DID for handle {handle:?}"),
                })?
        };

        let resp = self
            .client
            .get(format!("{service}/xrpc/com.atproto.repo.getRecord"))
            .bearer_auth(&session.access_jwt)
            .query(&[
                ("repo", did.as_str()),
                ("collection", "app.bsky.feed.post"),
                ("rkey", rkey.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PublishError::ReplyResolution {
                network,
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(PublishError::ReplyResolution {
                network,
                reason: format!("parent post not found: {}", resp.status()),
            });
        }
        let record: serde_json::Value =
            resp.json().await.map_err(|e| PublishError::InvalidResponse {
                network,
                reason: e.to_string(),
            })?;
        let strong_ref = serde_json::json!({
            "uri": record.get("uri"),
            "cid": record.get("cid"),
        });
        Ok(serde_json::json!({ "root": strong_ref, "parent": strong_ref }))
    }

    /// Video embed when the last staged item is a video, image embed for
    /// any staged images, none otherwise.
    async fn build_embed(
        &self,
        service: &str,
        session: &XrpcSession,
        payload: &PostPayload,
    ) -> Result<Option<serde_json::Value>, PublishError> {
        match payload.last_media_category() {
            Some(MediaCategory::Video) => {
                let Some(item) = payload
                    .media
                    .iter()
                    .rev()
                    .find(|m| m.category == MediaCategory::Video)
                else {
                    return Ok(None);
                };
                let blob = self.upload_blob(service, session, &item.path).await?;
                Ok(Some(serde_json::json!({
                    "$type": "app.bsky.embed.video",
                    "video": blob,
                    "alt": "",
                    "aspectRatio": {"width": 1, "height": 1},
                })))
            }
            Some(_) => {
                let mut images = Vec::new();
                for item in &payload.media {
                    if item.category != MediaCategory::Image {
                        continue;
                    }
                    let blob = self.upload_blob(service, session, &item.path).await?;
                    images.push(serde_json::json!({
                        "image": blob,
                        "alt": "",
                        "aspectRatio": {"width": 1, "height": 1},
                    }));
                }
                if images.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(serde_json::json!({
                        "$type": "app.bsky.embed.images",
                        "images": images,
                    })))
                }
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Publisher for BlueskyPublisher {
    fn network(&self) -> Network {
        Network::Bluesky
    }

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError> {
        let creds: BlueskyCreds =
            serde_json::from_value(payload.credentials.clone()).map_err(|e| {
                PublishError::BadCredentials {
                    network: self.network(),
                    reason: e.to_string(),
                }
            })?;

        let session = self.create_session(&creds).await?;

        let reply = match payload.reply_to.as_deref() {
            Some(link) => Some(self.resolve_reply(&creds.service, &session, link).await?),
            None => None,
        };
        let embed = self.build_embed(&creds.service, &session, payload).await?;

        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": payload.text,
            "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "langs": ["en-US"],
        });
        let facets = link_facets(&payload.text);
        if !facets.is_empty() {
            record["facets"] = serde_json::Value::Array(facets);
        }
        // Hidden tags ride as record metadata only; nothing is appended
        // to the text and no zero-width facets are emitted.
        if !payload.tags.is_empty() {
            record["tags"] = serde_json::json!(payload.tags);
        }
        if let Some(reply) = reply {
            record["reply"] = reply;
        }
        if let Some(embed) = embed {
            record["embed"] = embed;
        }

        let resp = self
            .client
            .post(format!(
                "{}/xrpc/com.atproto.repo.createRecord",
                creds.service
            ))
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| PublishError::RequestFailed {
                network: self.network(),
                reason: e.to_string(),
            })?;

        let body = check_xrpc(self.network(), resp).await?;
        let at_uri = body
            .get("uri")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| PublishError::InvalidResponse {
                network: self.network(),
                reason: "createRecord returned no uri".into(),
            })?;

        let url = at_uri_to_url(at_uri).unwrap_or_else(|| at_uri.to_string());
        tracing::info!(uri = at_uri, "Bluesky post created");
        Ok(PostRef::new(url))
    }
}

/// Link facets for every URL in the text, addressed by byte offsets into
/// the UTF-8 encoding.
fn link_facets(text: &str) -> Vec<serde_json::Value> {
    url_byte_spans(text)
        .into_iter()
        .map(|span| {
            serde_json::json!({
                "index": {"byteStart": span.start, "byteEnd": span.end},
                "features": [{"$type": "app.bsky.richtext.facet#link", "uri": span.url}],
            })
        })
        .collect()
}

/// `https://bsky.app/profile/<handle>/post/<rkey>` → (handle, rkey).
fn parse_post_link(network: Network, link: &str) -> Result<(String, String), PublishError> {
    let parts: Vec<&str> = link.split('/').collect();
    if parts.len() >= 7 && parts[3] == "profile" && parts[5] == "post" {
        Ok((parts[4].to_string(), parts[6].to_string()))
    } else {
        Err(PublishError::ReplyResolution {
            network,
            reason: format!("not a post link: {link:?}"),
        })
    }
}

/// `at://<did>/app.bsky.feed.post/<rkey>` → public bsky.app URL.
fn at_uri_to_url(at_uri: &str) -> Option<String> {
    let rest = at_uri.strip_prefix("at://")?;
    let mut parts = rest.split('/');
    let did = parts.next()?;
    let collection = parts.next()?;
    let rkey = parts.next()?;
    if collection != "app.bsky.feed.post" {
        return None;
    }
    Some(format!("https://bsky.app/profile/{did}/post/{rkey}"))
}

fn mime_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

async fn check_xrpc(
    network: Network,
    resp: reqwest::Response,
) -> Result<serde_json::Value, PublishError> {
    let status = resp.status();
    let body: serde_json::Value =
        resp.json().await.map_err(|e| PublishError::InvalidResponse {
            network,
            reason: e.to_string(),
        })?;
    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        return Err(PublishError::RequestFailed {
            network,
            reason: format!("{status}: {message}"),
        });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creds_default_service() {
        let bundle = serde_json::json!({"handle": "me.bsky.social", "password": "p"});
        let creds: BlueskyCreds = serde_json::from_value(bundle).unwrap();
        assert_eq!(creds.service, "https://bsky.social");
    }

    #[test]
    fn post_link_parses() {
        let (handle, rkey) = parse_post_link(
            Network::Bluesky,
            "https://bsky.app/profile/alice.bsky.social/post/3k44",
        )
        .unwrap();
        assert_eq!(handle, "alice.bsky.social");
        assert_eq!(rkey, "3k44");
    }

    #[test]
    fn post_link_rejects_other_urls() {
        assert!(parse_post_link(Network::Bluesky, "https://bsky.app/profile/alice").is_err());
        assert!(parse_post_link(Network::Bluesky, "nonsense").is_err());
    }

    #[test]
    fn at_uri_converts_to_public_url() {
        assert_eq!(
            at_uri_to_url("at://did:plc:abc/app.bsky.feed.post/3k44").as_deref(),
            Some("https://bsky.app/profile/did:plc:abc/post/3k44")
        );
        assert_eq!(at_uri_to_url("at://did:plc:abc/other.collection/3k44"), None);
        assert_eq!(at_uri_to_url("not-an-at-uri"), None);
    }

    #[test]
    fn link_facets_use_byte_offsets() {
        let text = "Привет https://a.io";
        let facets = link_facets(text);
        assert_eq!(facets.len(), 1);
        let start = facets[0]["index"]["byteStart"].as_u64().unwrap() as usize;
        let end = facets[0]["index"]["byteEnd"].as_u64().unwrap() as usize;
        assert_eq!(start, "Привет ".len());
        assert_eq!(&text.as_bytes()[start..end], b"https://a.io");
    }

    #[test]
    fn link_facets_empty_without_urls() {
        assert!(link_facets("plain text").is_empty());
    }

    #[test]
    fn mime_for_extensions() {
        assert_eq!(mime_for(std::path::Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for(std::path::Path::new("a.mp4")), "video/mp4");
        assert_eq!(
            mime_for(std::path::Path::new("a.bin")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn bad_bundle_is_bad_credentials() {
        let publisher = BlueskyPublisher::new();
        let payload = PostPayload {
            network: Network::Bluesky,
            credentials: serde_json::json!({"handle": "only-handle"}),
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
