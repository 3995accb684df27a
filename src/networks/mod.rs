//! Concrete publishers, one per supported network.
//!
//! Each parses its own slice of the profile's opaque credential bundle and
//! talks to the network's REST API directly. Every failure is returned as
//! a `PublishError` value so the dispatcher can aggregate outcomes.

pub mod bluesky;
pub mod telegram;
pub mod tumblr;
pub mod twitter;
pub mod vk;

pub use bluesky::BlueskyPublisher;
pub use telegram::TelegramPublisher;
pub use tumblr::TumblrPublisher;
pub use twitter::TwitterPublisher;
pub use vk::VkPublisher;

use std::sync::Arc;

use crate::publish::Dispatcher;

/// Dispatcher wired with every supported network's publisher.
pub fn default_dispatcher(bot_token: String) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(TelegramPublisher::new(bot_token)));
    dispatcher.register(Arc::new(VkPublisher::new()));
    dispatcher.register(Arc::new(TwitterPublisher::new()));
    dispatcher.register(Arc::new(TumblrPublisher::new()));
    dispatcher.register(Arc::new(BlueskyPublisher::new()));
    dispatcher
}
