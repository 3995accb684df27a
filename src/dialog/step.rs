//! The step graph: a closed set of dialog steps with an explicit
//! transition table and pure guard predicates.
//!
//! Designed linear order, with conditional bypasses:
//!
//! `Start → NetworkSelect → PrimaryText → SecondaryText → Tags →
//! [BlueskyHiddenTags if Bluesky selected] → Media →
//! [TwitterReply if Twitter selected] → [BlueskyReply if Bluesky selected]
//! → Send → Start`
//!
//! The universal "back" edge is resolved through the session's history
//! stack, never wired here.

use serde::{Deserialize, Serialize};

use crate::dialog::session::Session;
use crate::publish::Network;

/// A node in the conversation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Start,
    NetworkSelect,
    PrimaryText,
    SecondaryText,
    Tags,
    BlueskyHiddenTags,
    Media,
    TwitterReply,
    BlueskyReply,
    Send,
}

impl Default for Step {
    fn default() -> Self {
        Self::Start
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::NetworkSelect => "network_select",
            Self::PrimaryText => "primary_text",
            Self::SecondaryText => "secondary_text",
            Self::Tags => "tags",
            Self::BlueskyHiddenTags => "bluesky_hidden_tags",
            Self::Media => "media",
            Self::TwitterReply => "twitter_reply",
            Self::BlueskyReply => "bluesky_reply",
            Self::Send => "send",
        };
        write!(f, "{s}")
    }
}

impl Step {
    /// The `skip_<name>` token suffix for steps the operator may decline,
    /// or `None` for steps that cannot be skipped.
    pub fn skip_name(&self) -> Option<&'static str> {
        match self {
            Self::PrimaryText => Some("primary_text"),
            Self::SecondaryText => Some("secondary_text"),
            Self::Tags => Some("tags"),
            Self::BlueskyHiddenTags => Some("hidden_tags"),
            Self::Media => Some("media"),
            Self::TwitterReply => Some("twitter_reply"),
            Self::BlueskyReply => Some("bluesky_reply"),
            Self::Start | Self::NetworkSelect | Self::Send => None,
        }
    }

    /// Reverse of [`Step::skip_name`].
    pub fn from_skip_name(name: &str) -> Option<Self> {
        match name {
            "primary_text" => Some(Self::PrimaryText),
            "secondary_text" => Some(Self::SecondaryText),
            "tags" => Some(Self::Tags),
            "hidden_tags" => Some(Self::BlueskyHiddenTags),
            "media" => Some(Self::Media),
            "twitter_reply" => Some(Self::TwitterReply),
            "bluesky_reply" => Some(Self::BlueskyReply),
            _ => None,
        }
    }

    /// Whether entering this step discards previously staged media.
    /// True for the root and the steps immediately preceding media
    /// collection, so re-entering them starts a fresh attachment set.
    pub fn clears_media_on_entry(&self) -> bool {
        matches!(self, Self::Start | Self::Tags | Self::BlueskyHiddenTags)
    }
}

/// A pure predicate over the session, guarding a conditional edge.
pub type Guard = fn(&Session) -> bool;

/// One edge of the step graph.
pub struct Transition {
    pub from: Step,
    pub to: Step,
    pub guard: Option<Guard>,
}

const fn edge(from: Step, to: Step, guard: Option<Guard>) -> Transition {
    Transition { from, to, guard }
}

fn bluesky_selected(session: &Session) -> bool {
    session.networks.contains(&Network::Bluesky)
}

fn twitter_selected(session: &Session) -> bool {
    session.networks.contains(&Network::Twitter)
}

fn networks_selected(session: &Session) -> bool {
    !session.networks.is_empty()
}

/// The full forward edge set. For a given `from` step, the first entry
/// whose guard passes wins; a trailing unguarded entry is the fallback.
pub const TRANSITIONS: &[Transition] = &[
    edge(Step::Start, Step::NetworkSelect, None),
    edge(Step::NetworkSelect, Step::PrimaryText, Some(networks_selected)),
    edge(Step::PrimaryText, Step::SecondaryText, None),
    edge(Step::SecondaryText, Step::Tags, None),
    edge(Step::Tags, Step::BlueskyHiddenTags, Some(bluesky_selected)),
    edge(Step::Tags, Step::Media, None),
    edge(Step::BlueskyHiddenTags, Step::Media, None),
    edge(Step::Media, Step::TwitterReply, Some(twitter_selected)),
    edge(Step::Media, Step::BlueskyReply, Some(bluesky_selected)),
    edge(Step::Media, Step::Send, None),
    edge(Step::TwitterReply, Step::BlueskyReply, Some(bluesky_selected)),
    edge(Step::TwitterReply, Step::Send, None),
    edge(Step::BlueskyReply, Step::Send, None),
    edge(Step::Send, Step::Start, None),
];

/// Resolve the next step from `from` given the session's current answers.
/// Returns `None` when no edge is admissible (e.g. leaving `NetworkSelect`
/// with an empty selection).
pub fn next_step(from: Step, session: &Session) -> Option<Step> {
    TRANSITIONS
        .iter()
        .filter(|t| t.from == from)
        .find(|t| t.guard.map(|g| g(session)).unwrap_or(true))
        .map(|t| t.to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(networks: &[Network]) -> Session {
        let mut session = Session::default();
        session.networks = networks.to_vec();
        session
    }

    #[test]
    fn linear_walk_without_conditional_networks() {
        let session = session_with(&[Network::Telegram, Network::Vk]);
        let mut step = Step::Start;
        let mut visited = vec![step];
        while step != Step::Send {
            step = next_step(step, &session).unwrap();
            visited.push(step);
        }
        assert_eq!(
            visited,
            vec![
                Step::Start,
                Step::NetworkSelect,
                Step::PrimaryText,
                Step::SecondaryText,
                Step::Tags,
                Step::Media,
                Step::Send,
            ]
        );
    }

    #[test]
    fn bluesky_inserts_hidden_tags_and_reply() {
        let session = session_with(&[Network::Bluesky]);
        assert_eq!(next_step(Step::Tags, &session), Some(Step::BlueskyHiddenTags));
        assert_eq!(next_step(Step::BlueskyHiddenTags, &session), Some(Step::Media));
        assert_eq!(next_step(Step::Media, &session), Some(Step::BlueskyReply));
        assert_eq!(next_step(Step::BlueskyReply, &session), Some(Step::Send));
    }

    #[test]
    fn without_bluesky_tags_go_straight_to_media() {
        let session = session_with(&[Network::Twitter]);
        assert_eq!(next_step(Step::Tags, &session), Some(Step::Media));
    }

    #[test]
    fn twitter_then_bluesky_reply_chain() {
        let session = session_with(&[Network::Twitter, Network::Bluesky]);
        assert_eq!(next_step(Step::Media, &session), Some(Step::TwitterReply));
        assert_eq!(
            next_step(Step::TwitterReply, &session),
            Some(Step::BlueskyReply)
        );
    }

    #[test]
    fn twitter_only_skips_bluesky_reply() {
        let session = session_with(&[Network::Twitter]);
        assert_eq!(next_step(Step::Media, &session), Some(Step::TwitterReply));
        assert_eq!(next_step(Step::TwitterReply, &session), Some(Step::Send));
    }

    #[test]
    fn no_reply_networks_goes_straight_to_send() {
        let session = session_with(&[Network::Tumblr]);
        assert_eq!(next_step(Step::Media, &session), Some(Step::Send));
    }

    #[test]
    fn empty_selection_cannot_leave_network_select() {
        let session = session_with(&[]);
        assert_eq!(next_step(Step::NetworkSelect, &session), None);
    }

    #[test]
    fn send_cycles_back_to_start() {
        let session = session_with(&[Network::Telegram]);
        assert_eq!(next_step(Step::Send, &session), Some(Step::Start));
    }

    #[test]
    fn skip_names_round_trip() {
        for step in [
            Step::PrimaryText,
            Step::SecondaryText,
            Step::Tags,
            Step::BlueskyHiddenTags,
            Step::Media,
            Step::TwitterReply,
            Step::BlueskyReply,
        ] {
            let name = step.skip_name().unwrap();
            assert_eq!(Step::from_skip_name(name), Some(step));
        }
        assert!(Step::Start.skip_name().is_none());
        assert!(Step::Send.skip_name().is_none());
    }
}
