//! Chat-transport abstraction.
//!
//! The core emits prompt render/update requests and plain status messages;
//! it never constructs transport-specific markup. The transport produces
//! the inbound event stream.

pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::dialog::event::{InboundEvent, Prompt, PromptHandle};
use crate::dialog::session::ConversationId;
use crate::error::TransportError;

/// Stream of inbound conversation events.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// One chat transport (e.g. a bot API connection).
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Begin listening and return the inbound event stream.
    async fn start(&self) -> Result<EventStream, TransportError>;

    /// Show the step prompt: edit the existing message in place when a
    /// handle is given, otherwise send a new one and return its handle.
    async fn show_prompt(
        &self,
        conversation: ConversationId,
        existing: Option<PromptHandle>,
        prompt: &Prompt,
    ) -> Result<PromptHandle, TransportError>;

    /// Send a plain status message (publish reports, validation notices).
    async fn send_status(
        &self,
        conversation: ConversationId,
        text: &str,
    ) -> Result<(), TransportError>;
}

pub use telegram::TelegramTransport;
