//! Publish fan-out: the closed network set, the publisher seam, and the
//! dispatcher that fans a finished post out to every selected network.

pub mod payload;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::dialog::session::Session;
use crate::error::PublishError;
use crate::media::StagedMedia;
use crate::publish::payload::{PostPayload, build_payload};

/// The supported publishing networks — a closed, known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Telegram,
    Vk,
    Twitter,
    Tumblr,
    Bluesky,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Telegram,
        Network::Vk,
        Network::Twitter,
        Network::Tumblr,
        Network::Bluesky,
    ];

    /// Wire name used in action tokens and config keys.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Vk => "vk",
            Self::Twitter => "twitter",
            Self::Tumblr => "tumblr",
            Self::Bluesky => "bluesky",
        }
    }

    /// Human-readable label for keyboards and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Telegram => "Telegram",
            Self::Vk => "VK",
            Self::Twitter => "Twitter",
            Self::Tumblr => "Tumblr",
            Self::Bluesky => "Bluesky",
        }
    }

    /// The one network with no attachment-count limit.
    pub fn unlimited_media(&self) -> bool {
        matches!(self, Self::Telegram)
    }

    /// Networks that support reply threading.
    pub fn supports_reply(&self) -> bool {
        matches!(self, Self::Twitter | Self::Bluesky)
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Network::ALL
            .into_iter()
            .find(|n| n.wire_name() == s)
            .ok_or_else(|| format!("unknown network: {s}"))
    }
}

/// Opaque reference to a created post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub url: String,
}

impl PostRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Per-network result of one fan-out attempt.
#[derive(Debug)]
pub struct PublishOutcome {
    pub network: Network,
    pub result: Result<PostRef, PublishError>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The operator-facing summary line for this outcome.
    pub fn report_line(&self) -> String {
        match &self.result {
            Ok(post) => format!("✅ Created {} post: {}", self.network, post.url),
            Err(e) => format!("❌ Failed to create {} post\n{e}", self.network),
        }
    }
}

/// One external publishing destination. Implementations build the remote
/// call from the payload; they must return an error value rather than
/// panic so the dispatcher can aggregate outcomes.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn network(&self) -> Network;

    async fn publish(&self, payload: &PostPayload) -> Result<PostRef, PublishError>;
}

/// Fans a finished post out to each selected network independently.
#[derive(Default)]
pub struct Dispatcher {
    publishers: HashMap<Network, Arc<dyn Publisher>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, publisher: Arc<dyn Publisher>) {
        self.publishers.insert(publisher.network(), publisher);
    }

    /// Publish to every selected network. Each attempt has its own failure
    /// boundary — one network's error never aborts the others. Attempts
    /// run concurrently; outcomes are returned in selection order.
    pub async fn dispatch(
        &self,
        session: &Session,
        media: &[StagedMedia],
        credentials: &HashMap<Network, serde_json::Value>,
    ) -> Vec<PublishOutcome> {
        let attempts = session.networks.iter().map(|&network| async move {
            let result = self.attempt(network, session, media, credentials).await;
            match &result {
                Ok(post) => {
                    tracing::info!(network = network.wire_name(), url = %post.url, "Published")
                }
                Err(e) => {
                    tracing::warn!(network = network.wire_name(), error = %e, "Publish failed")
                }
            }
            PublishOutcome { network, result }
        });

        join_all(attempts).await
    }

    async fn attempt(
        &self,
        network: Network,
        session: &Session,
        media: &[StagedMedia],
        credentials: &HashMap<Network, serde_json::Value>,
    ) -> Result<PostRef, PublishError> {
        let publisher = self
            .publishers
            .get(&network)
            .ok_or_else(|| PublishError::RequestFailed {
                network,
                reason: "no publisher registered".into(),
            })?;
        let bundle = credentials
            .get(&network)
            .cloned()
            .ok_or(PublishError::MissingCredentials { network })?;
        let payload = build_payload(network, session, media, bundle);
        publisher.publish(&payload).await
    }
}
