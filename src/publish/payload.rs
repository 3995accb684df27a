//! Per-network payload builders.
//!
//! A network consumes only the session fields relevant to it: one language
//! variant, one tag rendering, its own reply reference. Builders are pure
//! so the dispatcher's fan-out loop stays generic over the enumeration.

use crate::dialog::session::Session;
use crate::media::{MediaCategory, StagedMedia};
use crate::publish::Network;

/// A finished post, viewed the way one network wants it.
#[derive(Debug, Clone)]
pub struct PostPayload {
    pub network: Network,
    /// Opaque credential bundle from the selected profile.
    pub credentials: serde_json::Value,
    /// Body text, with hashtags already embedded where the network wants
    /// them inline.
    pub text: String,
    /// Structured tag list, for networks with a first-class tag field.
    pub tags: Vec<String>,
    /// Rendered hashtag line, for networks that caption media with it.
    pub tag_line: Option<String>,
    /// Staged media in arrival order.
    pub media: Vec<StagedMedia>,
    /// Operator-supplied reply reference, unresolved; the publisher maps
    /// it to the network's addressing scheme.
    pub reply_to: Option<String>,
}

impl PostPayload {
    /// Category of the last staged item — decides video vs image posts.
    pub fn last_media_category(&self) -> Option<MediaCategory> {
        self.media.last().map(|m| m.category)
    }
}

/// Build the payload one network consumes from the generic session fields.
pub fn build_payload(
    network: Network,
    session: &Session,
    media: &[StagedMedia],
    credentials: serde_json::Value,
) -> PostPayload {
    let base = PostPayload {
        network,
        credentials,
        text: String::new(),
        tags: Vec::new(),
        tag_line: None,
        media: media.to_vec(),
        reply_to: None,
    };

    match network {
        Network::Telegram => PostPayload {
            text: session.primary_text.clone(),
            ..base
        },
        Network::Vk => PostPayload {
            text: session.primary_text.clone(),
            tag_line: (!session.tags.is_empty()).then(|| session.tags.hashtag_line()),
            ..base
        },
        Network::Twitter => PostPayload {
            text: with_inline_tags(&session.secondary_text, session),
            reply_to: session.twitter_reply.clone(),
            ..base
        },
        Network::Tumblr => PostPayload {
            text: session.secondary_text.clone(),
            tags: session.tags.tokens().to_vec(),
            ..base
        },
        Network::Bluesky => PostPayload {
            text: session.secondary_text.clone(),
            tags: session.hidden_tags.tokens().to_vec(),
            reply_to: session.bluesky_reply.clone(),
            ..base
        },
    }
}

/// Append the visible hashtag line after a blank line, when any tags exist.
fn with_inline_tags(text: &str, session: &Session) -> String {
    if session.tags.is_empty() {
        text.to_string()
    } else {
        format!("{text}\n\n{}", session.tags.hashtag_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagSet;

    fn finished_session() -> Session {
        let mut session = Session::default();
        session.networks = Network::ALL.to_vec();
        session.primary_text = "Привет".into();
        session.secondary_text = "Hello".into();
        session.tags = TagSet::parse("#cat #dog");
        session.hidden_tags = TagSet::parse("#secret");
        session.twitter_reply = Some("https://x.com/u/status/99".into());
        session.bluesky_reply = Some("https://bsky.app/profile/h.bsky.social/post/rk".into());
        session
    }

    fn creds() -> serde_json::Value {
        serde_json::json!({"token": "t"})
    }

    #[test]
    fn telegram_takes_primary_text_only() {
        let payload = build_payload(Network::Telegram, &finished_session(), &[], creds());
        assert_eq!(payload.text, "Привет");
        assert!(payload.tags.is_empty());
        assert!(payload.tag_line.is_none());
        assert!(payload.reply_to.is_none());
    }

    #[test]
    fn vk_takes_primary_text_and_tag_line() {
        let payload = build_payload(Network::Vk, &finished_session(), &[], creds());
        assert_eq!(payload.text, "Привет");
        assert_eq!(payload.tag_line.as_deref(), Some("#cat, #dog"));
    }

    #[test]
    fn vk_omits_empty_tag_line() {
        let mut session = finished_session();
        session.tags = TagSet::default();
        let payload = build_payload(Network::Vk, &session, &[], creds());
        assert!(payload.tag_line.is_none());
    }

    #[test]
    fn twitter_embeds_tags_after_blank_line() {
        let payload = build_payload(Network::Twitter, &finished_session(), &[], creds());
        assert_eq!(payload.text, "Hello\n\n#cat, #dog");
        assert_eq!(payload.reply_to.as_deref(), Some("https://x.com/u/status/99"));
    }

    #[test]
    fn twitter_without_tags_keeps_text_untouched() {
        let mut session = finished_session();
        session.tags = TagSet::default();
        let payload = build_payload(Network::Twitter, &session, &[], creds());
        assert_eq!(payload.text, "Hello");
    }

    #[test]
    fn tumblr_takes_structured_visible_tags() {
        let payload = build_payload(Network::Tumblr, &finished_session(), &[], creds());
        assert_eq!(payload.text, "Hello");
        assert_eq!(payload.tags, vec!["cat", "dog"]);
        assert!(payload.reply_to.is_none());
    }

    #[test]
    fn bluesky_takes_hidden_tags_not_visible_ones() {
        let payload = build_payload(Network::Bluesky, &finished_session(), &[], creds());
        assert_eq!(payload.text, "Hello");
        assert_eq!(payload.tags, vec!["secret"]);
        assert!(payload.reply_to.is_some());
    }

    #[test]
    fn last_media_category_drives_post_kind() {
        use crate::media::MediaCategory;
        let media = vec![
            StagedMedia {
                index: 1,
                category: MediaCategory::Image,
                path: "/tmp/a.jpg".into(),
            },
            StagedMedia {
                index: 2,
                category: MediaCategory::Video,
                path: "/tmp/b.mp4".into(),
            },
        ];
        let payload = build_payload(Network::Tumblr, &finished_session(), &media, creds());
        assert_eq!(payload.last_media_category(), Some(MediaCategory::Video));

        let empty = build_payload(Network::Tumblr, &finished_session(), &[], creds());
        assert_eq!(empty.last_media_category(), None);
    }
}
