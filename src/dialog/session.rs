//! Per-conversation session state and the in-memory store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::dialog::event::PromptHandle;
use crate::dialog::step::Step;
use crate::publish::Network;
use crate::tags::TagSet;

/// Identifies one conversation at the transport (a chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accumulated answers and position for one active conversation.
///
/// All fields are scalars or flat ordered collections, so store updates
/// never need deep-copy semantics.
#[derive(Debug, Clone)]
pub struct Session {
    pub step: Step,
    /// Selected profile key, set at the root step.
    pub profile: Option<String>,
    /// Selected networks in insertion order; toggling is idempotent.
    pub networks: Vec<Network>,
    pub primary_text: String,
    pub secondary_text: String,
    /// Visible tags — rendered inline where a network embeds hashtags.
    pub tags: TagSet,
    /// Bluesky-only hidden tags; never merged with the visible set.
    pub hidden_tags: TagSet,
    pub twitter_reply: Option<String>,
    pub bluesky_reply: Option<String>,
    /// Handle of the interactive prompt currently shown, for in-place edits.
    pub prompt: Option<PromptHandle>,
    /// Previously visited steps; used only for "back" navigation.
    pub history: Vec<Step>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            step: Step::default(),
            profile: None,
            networks: Vec::new(),
            primary_text: String::new(),
            secondary_text: String::new(),
            tags: TagSet::default(),
            hidden_tags: TagSet::default(),
            twitter_reply: None,
            bluesky_reply: None,
            prompt: None,
            history: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Session {
    /// Restore all answer fields to defaults and clear history. The prompt
    /// handle survives so the root prompt can be edited in place.
    pub fn reset(&mut self) {
        let prompt = self.prompt;
        *self = Self::default();
        self.prompt = prompt;
    }

    /// Toggle a network's membership. Adding preserves insertion order;
    /// both directions are idempotent.
    pub fn toggle_network(&mut self, network: Network) {
        if let Some(pos) = self.networks.iter().position(|n| *n == network) {
            self.networks.remove(pos);
        } else {
            self.networks.push(network);
        }
    }

    /// Whether the selection is exactly the one network with no
    /// attachment-count limit.
    pub fn unlimited_media(&self) -> bool {
        self.networks.len() == 1 && self.networks[0].unlimited_media()
    }
}

/// In-memory session store, one entry per active conversation.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<ConversationId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session, creating a fresh default if absent.
    pub async fn get(&self, conversation: ConversationId) -> Session {
        let mut sessions = self.inner.write().await;
        sessions.entry(conversation).or_default().clone()
    }

    /// Apply a mutation under the write lock. No other handler observes an
    /// intermediate state.
    pub async fn update<F, T>(&self, conversation: ConversationId, f: F) -> T
    where
        F: FnOnce(&mut Session) -> T,
    {
        let mut sessions = self.inner.write().await;
        let session = sessions.entry(conversation).or_default();
        let out = f(session);
        session.updated_at = Utc::now();
        out
    }

    /// Restore the session to defaults, clearing history and answers.
    pub async fn reset(&self, conversation: ConversationId) {
        self.update(conversation, |s| s.reset()).await;
    }
}
