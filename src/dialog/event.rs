//! Inbound events, button action tokens, and prompt descriptions.
//!
//! The transport produces `InboundEvent`s and renders `Prompt`s; it never
//! decides what a button does. Action tokens are the wire-level contract
//! between the two.

use serde::{Deserialize, Serialize};

use crate::dialog::session::ConversationId;
use crate::dialog::step::Step;
use crate::media::MediaCategory;
use crate::publish::Network;

/// Opaque handle to the interactive prompt message currently shown in a
/// conversation, used for in-place editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptHandle(pub i64);

/// One inline button: a label and the action token it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// A prompt to show (or edit in place) for the current step: text plus
/// rows of buttons. Rendering markup is the transport's job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    pub fn row(mut self, row: Vec<Button>) -> Self {
        self.buttons.push(row);
        self
    }
}

/// An inbound conversation event, produced by the transport.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Text {
        conversation: ConversationId,
        operator: String,
        content: String,
    },
    Attachment {
        conversation: ConversationId,
        operator: String,
        bytes: Vec<u8>,
        filename: String,
        category: MediaCategory,
    },
    Button {
        conversation: ConversationId,
        operator: String,
        token: String,
    },
}

impl InboundEvent {
    pub fn conversation(&self) -> ConversationId {
        match self {
            Self::Text { conversation, .. }
            | Self::Attachment { conversation, .. }
            | Self::Button { conversation, .. } => *conversation,
        }
    }

    pub fn operator(&self) -> &str {
        match self {
            Self::Text { operator, .. }
            | Self::Attachment { operator, .. }
            | Self::Button { operator, .. } => operator,
        }
    }
}

/// A parsed button action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `profile:<name>` — select a content profile.
    Profile(String),
    /// `network:<name>` — toggle a network's membership.
    Network(Network),
    ChooseAll,
    ChooseNothing,
    /// Leave network selection (admitted only when the set is non-empty).
    Finish,
    /// `skip_<step>` — operator declined to supply this step's data.
    Skip(Step),
    /// Done staging media; move on.
    FinishSending,
    Back,
    Cancel,
}

impl Action {
    /// Parse a wire token. Unknown tokens yield `None` and are ignored.
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(name) = token.strip_prefix("profile:") {
            return Some(Self::Profile(name.to_string()));
        }
        if let Some(name) = token.strip_prefix("network:") {
            return name.parse::<Network>().ok().map(Self::Network);
        }
        if let Some(rest) = token.strip_prefix("skip_") {
            return Step::from_skip_name(rest).map(Self::Skip);
        }
        match token {
            "choose_all" => Some(Self::ChooseAll),
            "choose_nothing" => Some(Self::ChooseNothing),
            "finish" => Some(Self::Finish),
            "finish_sending" => Some(Self::FinishSending),
            "back" => Some(Self::Back),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}
