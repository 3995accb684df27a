//! The conversation engine.
//!
//! Routes each inbound event to the handler for the conversation's current
//! step, runs entry actions on transitions, maintains the back-history,
//! and hands the finished session to the publish dispatcher at the
//! terminal step. Handler faults are caught here, at the step boundary:
//! the operator gets a non-fatal notice and the conversation stays put.

use std::sync::Arc;

use crate::config::{AdminList, Config};
use crate::dialog::event::{Action, Button, InboundEvent, Prompt};
use crate::dialog::session::{ConversationId, Session, SessionStore};
use crate::dialog::step::{Step, next_step};
use crate::error::{DialogError, StagingError};
use crate::media::{MediaCategory, MediaStaging};
use crate::publish::{Dispatcher, Network};
use crate::tags::TagSet;
use crate::transport::Transport;

const BUTTON_BACK: (&str, &str) = ("🔙 Back", "back");
const BUTTON_CANCEL: (&str, &str) = ("✖️ Cancel", "cancel");

pub struct Navigator {
    config: Arc<Config>,
    admins: AdminList,
    sessions: SessionStore,
    staging: Arc<MediaStaging>,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
}

impl Navigator {
    pub fn new(
        config: Arc<Config>,
        staging: Arc<MediaStaging>,
        dispatcher: Dispatcher,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let admins = config.admin_list();
        Self {
            config,
            admins,
            sessions: SessionStore::new(),
            staging,
            dispatcher,
            transport,
        }
    }

    /// Read-only session snapshot, for tests and diagnostics.
    pub async fn session(&self, conversation: ConversationId) -> Session {
        self.sessions.get(conversation).await
    }

    /// Entry point for every inbound event.
    ///
    /// Unauthorized events are dropped before any state mutation. Handler
    /// errors are reported as non-fatal; no step advance happens on error.
    pub async fn handle_event(&self, event: InboundEvent) {
        if !self.admins.is_allowed(event.operator()) {
            tracing::warn!(
                operator = event.operator(),
                "Ignoring event from unauthorized operator"
            );
            return;
        }

        let conversation = event.conversation();
        if let Err(e) = self.process(event).await {
            tracing::error!(conversation = %conversation, error = %e, "Step handler failed");
            let _ = self
                .transport
                .send_status(
                    conversation,
                    "⚠️ Something went wrong. You are still on the current step — try again.",
                )
                .await;
        }
    }

    async fn process(&self, event: InboundEvent) -> Result<(), DialogError> {
        let conversation = event.conversation();
        match event {
            InboundEvent::Text { content, .. } if content.trim() == "/start" => {
                // A fresh /start abandons the tracked prompt so a new one
                // is sent instead of edited.
                self.sessions
                    .update(conversation, |s| s.prompt = None)
                    .await;
                self.transition_to(conversation, Step::Start).await
            }
            InboundEvent::Text { content, .. } => self.handle_text(conversation, &content).await,
            InboundEvent::Attachment {
                bytes,
                filename,
                category,
                ..
            } => {
                self.handle_attachment(conversation, &bytes, &filename, category)
                    .await
            }
            InboundEvent::Button { token, .. } => match Action::parse(&token) {
                Some(action) => self.handle_action(conversation, action).await,
                None => {
                    tracing::debug!(token, "Ignoring unknown action token");
                    Ok(())
                }
            },
        }
    }

    // ── Button actions ──────────────────────────────────────────────

    async fn handle_action(
        &self,
        conversation: ConversationId,
        action: Action,
    ) -> Result<(), DialogError> {
        match action {
            Action::Cancel => return self.transition_to(conversation, Step::Start).await,
            Action::Back => return self.go_back(conversation).await,
            _ => {}
        }

        let session = self.sessions.get(conversation).await;
        match (session.step, action) {
            (Step::Start, Action::Profile(name)) => {
                if self.config.profile(&name).is_none() {
                    self.transport
                        .send_status(conversation, &format!("Unknown profile: {name}"))
                        .await?;
                    return Ok(());
                }
                self.sessions
                    .update(conversation, |s| s.profile = Some(name))
                    .await;
                self.advance(conversation).await
            }
            (Step::NetworkSelect, Action::Network(network)) => {
                self.sessions
                    .update(conversation, |s| s.toggle_network(network))
                    .await;
                self.render_prompt(conversation, Step::NetworkSelect).await
            }
            (Step::NetworkSelect, Action::ChooseAll) => {
                self.sessions
                    .update(conversation, |s| {
                        for network in Network::ALL {
                            if !s.networks.contains(&network) {
                                s.networks.push(network);
                            }
                        }
                    })
                    .await;
                self.render_prompt(conversation, Step::NetworkSelect).await
            }
            (Step::NetworkSelect, Action::ChooseNothing) => {
                self.sessions
                    .update(conversation, |s| s.networks.clear())
                    .await;
                self.render_prompt(conversation, Step::NetworkSelect).await
            }
            (Step::NetworkSelect, Action::Finish) => self.advance(conversation).await,
            (Step::Media, Action::FinishSending) => self.advance(conversation).await,
            (step, Action::Skip(skipped)) if step == skipped => {
                // Skipping the media step also discards anything staged so
                // far; declining the step means "post without attachments".
                if step == Step::Media {
                    self.staging.clear(conversation).await?;
                }
                self.advance(conversation).await
            }
            (step, action) => {
                tracing::debug!(step = %step, ?action, "Action not applicable to current step");
                Ok(())
            }
        }
    }

    // ── Free-text input ─────────────────────────────────────────────

    async fn handle_text(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Result<(), DialogError> {
        let session = self.sessions.get(conversation).await;
        match session.step {
            Step::Start => {
                // First contact without /start still bootstraps the dialog.
                self.transition_to(conversation, Step::Start).await
            }
            Step::PrimaryText => {
                self.sessions
                    .update(conversation, |s| s.primary_text = content.to_string())
                    .await;
                self.advance(conversation).await
            }
            Step::SecondaryText => {
                self.sessions
                    .update(conversation, |s| s.secondary_text = content.to_string())
                    .await;
                self.advance(conversation).await
            }
            Step::Tags => {
                let tags = TagSet::parse(content);
                self.report_tags(conversation, &tags, "tags").await?;
                self.sessions
                    .update(conversation, |s| s.tags = tags)
                    .await;
                self.advance(conversation).await
            }
            Step::BlueskyHiddenTags => {
                let tags = TagSet::parse(content);
                self.report_tags(conversation, &tags, "Bluesky tags").await?;
                self.sessions
                    .update(conversation, |s| s.hidden_tags = tags)
                    .await;
                self.advance(conversation).await
            }
            Step::TwitterReply => {
                self.sessions
                    .update(conversation, |s| {
                        s.twitter_reply = Some(content.to_string())
                    })
                    .await;
                self.advance(conversation).await
            }
            Step::BlueskyReply => {
                self.sessions
                    .update(conversation, |s| {
                        s.bluesky_reply = Some(content.to_string())
                    })
                    .await;
                self.advance(conversation).await
            }
            Step::NetworkSelect | Step::Media | Step::Send => {
                tracing::debug!(step = %session.step, "Ignoring free text at this step");
                Ok(())
            }
        }
    }

    async fn report_tags(
        &self,
        conversation: ConversationId,
        tags: &TagSet,
        what: &str,
    ) -> Result<(), DialogError> {
        self.transport
            .send_status(conversation, &format!("Added {} {what}", tags.len()))
            .await?;
        if !tags.is_empty() {
            self.transport
                .send_status(conversation, &format!("Hashtags: {}", tags.hashtag_line()))
                .await?;
        }
        Ok(())
    }

    // ── Attachments ─────────────────────────────────────────────────

    async fn handle_attachment(
        &self,
        conversation: ConversationId,
        bytes: &[u8],
        filename: &str,
        category: MediaCategory,
    ) -> Result<(), DialogError> {
        let session = self.sessions.get(conversation).await;
        if session.step != Step::Media {
            tracing::debug!(step = %session.step, "Ignoring attachment outside the media step");
            return Ok(());
        }

        let unlimited = session.unlimited_media();
        match self
            .staging
            .accept(conversation, bytes, filename, category, unlimited)
            .await
        {
            Ok(item) => {
                self.transport
                    .send_status(conversation, &format!("Added media #{}", item.index))
                    .await?;
            }
            Err(StagingError::LimitExceeded { max }) => {
                self.transport
                    .send_status(
                        conversation,
                        &format!("Can't add more media. Maximum is {max}."),
                    )
                    .await?;
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation, error = %e, "Attachment not staged");
                self.transport
                    .send_status(conversation, &format!("Failed to store attachment: {e}"))
                    .await?;
            }
        }
        Ok(())
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Move forward along the first admissible edge from the current step.
    /// Staying put (with a notice) when no edge admits is the validation
    /// path, e.g. finishing network selection with nothing selected.
    async fn advance(&self, conversation: ConversationId) -> Result<(), DialogError> {
        let session = self.sessions.get(conversation).await;
        match next_step(session.step, &session) {
            Some(next) => self.transition_to(conversation, next).await,
            None => {
                if session.step == Step::NetworkSelect {
                    self.transport
                        .send_status(conversation, "Choose at least one network first.")
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Forward transition: push the entered step onto history (its top
    /// always mirrors the current step), then run the entry action.
    async fn transition_to(
        &self,
        conversation: ConversationId,
        step: Step,
    ) -> Result<(), DialogError> {
        self.sessions
            .update(conversation, |s| {
                s.step = step;
                s.history.push(step);
            })
            .await;
        self.enter_step(conversation, step).await
    }

    /// Resolve the universal "back" edge through the history stack.
    async fn go_back(&self, conversation: ConversationId) -> Result<(), DialogError> {
        let target = self
            .sessions
            .update(conversation, |s| {
                if s.history.len() < 2 {
                    return None;
                }
                s.history.pop();
                let target = *s.history.last().unwrap_or(&Step::Start);
                s.step = target;
                Some(target)
            })
            .await;
        match target {
            Some(step) => self.enter_step(conversation, step).await,
            None => Ok(()),
        }
    }

    /// Run a step's entry action. Entering the root resets the session;
    /// entering the terminal step runs the publish fan-out.
    async fn enter_step(
        &self,
        conversation: ConversationId,
        step: Step,
    ) -> Result<(), DialogError> {
        if step.clears_media_on_entry() {
            self.staging.clear(conversation).await?;
        }

        match step {
            Step::Start => {
                self.sessions
                    .update(conversation, |s| {
                        s.reset();
                        s.history.push(Step::Start);
                    })
                    .await;
                self.render_prompt(conversation, Step::Start).await
            }
            Step::Send => self.run_send(conversation).await,
            _ => self.render_prompt(conversation, step).await,
        }
    }

    // ── Terminal step ───────────────────────────────────────────────

    /// The `Send` sink: fan out, report per-network outcomes, clear
    /// everything, return to the root. Runs exactly once per pass.
    async fn run_send(&self, conversation: ConversationId) -> Result<(), DialogError> {
        let session = self.sessions.get(conversation).await;
        let media = self.staging.list_ordered(conversation).await;
        let empty = crate::config::ProfileConfig::default();
        let profile = session
            .profile
            .as_deref()
            .and_then(|name| self.config.profile(name))
            .unwrap_or(&empty);

        tracing::info!(
            conversation = %conversation,
            networks = session.networks.len(),
            media = media.len(),
            "Running publish fan-out"
        );

        let outcomes = self
            .dispatcher
            .dispatch(&session, &media, &profile.networks)
            .await;

        for outcome in &outcomes {
            self.transport
                .send_status(conversation, &outcome.report_line())
                .await?;
        }

        // Staged media is destroyed after every attempt, success or not.
        self.staging.clear(conversation).await?;

        // Back to the root with a full reset, ready for the next post.
        // Inlined rather than routed through enter_step so the async call
        // graph stays non-recursive.
        self.sessions
            .update(conversation, |s| {
                s.reset();
                s.history.push(Step::Start);
            })
            .await;
        self.render_prompt(conversation, Step::Start).await
    }

    // ── Prompt rendering ────────────────────────────────────────────

    async fn render_prompt(
        &self,
        conversation: ConversationId,
        step: Step,
    ) -> Result<(), DialogError> {
        let session = self.sessions.get(conversation).await;
        let prompt = self.build_prompt(step, &session);
        let handle = self
            .transport
            .show_prompt(conversation, session.prompt, &prompt)
            .await?;
        self.sessions
            .update(conversation, |s| s.prompt = Some(handle))
            .await;
        Ok(())
    }

    fn build_prompt(&self, step: Step, session: &Session) -> Prompt {
        let back_cancel = vec![
            Button::new(BUTTON_BACK.0, BUTTON_BACK.1),
            Button::new(BUTTON_CANCEL.0, BUTTON_CANCEL.1),
        ];
        let skip_row = |step: Step| {
            step.skip_name()
                .map(|name| vec![Button::new("Skip", format!("skip_{name}"))])
        };

        match step {
            Step::Start => {
                let mut prompt = Prompt::new("Choose profile");
                for name in self.config.profile_names() {
                    prompt = prompt.row(vec![Button::new(name.clone(), format!("profile:{name}"))]);
                }
                prompt
            }
            Step::NetworkSelect => {
                let profile = session.profile.as_deref().unwrap_or("?");
                let mut prompt =
                    Prompt::new(format!("Choose social networks for {profile}:"));
                for network in Network::ALL {
                    let state = if session.networks.contains(&network) {
                        "✅"
                    } else {
                        "❌"
                    };
                    prompt = prompt.row(vec![Button::new(
                        format!("{state} {}", network.label()),
                        format!("network:{}", network.wire_name()),
                    )]);
                }
                prompt
                    .row(vec![Button::new("Finish choosing", "finish")])
                    .row(vec![
                        Button::new("Choose All", "choose_all"),
                        Button::new("Choose Nothing", "choose_nothing"),
                    ])
                    .row(back_cancel)
            }
            Step::PrimaryText => {
                let mut prompt = Prompt::new("Type the post (primary language):");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::SecondaryText => {
                let mut prompt = Prompt::new("Type the post (secondary language):");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::Tags => {
                let mut prompt = Prompt::new("Choose tags:");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::BlueskyHiddenTags => {
                let mut prompt = Prompt::new("Choose Bluesky hidden tags:");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::Media => Prompt::new("Send pictures/videos for your post (maximum 4):")
                .row(vec![
                    Button::new("Skip", "skip_media"),
                    Button::new("Finish", "finish_sending"),
                ])
                .row(back_cancel),
            Step::TwitterReply => {
                let mut prompt = Prompt::new("Link the Twitter post you want to reply to:");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::BlueskyReply => {
                let mut prompt = Prompt::new("Link the Bluesky post you want to reply to:");
                if let Some(row) = skip_row(step) {
                    prompt = prompt.row(row);
                }
                prompt.row(back_cancel)
            }
            Step::Send => Prompt::default(),
        }
    }
}
