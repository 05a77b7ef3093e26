//! Message dispatcher setup.
//!
//! Builds the dispatcher with all command handlers and event handlers.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::info;

use crate::config::Community;
use crate::events;
use crate::permissions::Permissions;
use crate::plugins::{self, join::JoinState};
use crate::services::{CountdownJobs, InviteTracker, JoinCooldown, TrackedLink};

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Chats, shows and templates from the community file.
    pub community: Arc<Community>,

    /// Membership lookups with a short-lived cache.
    pub permissions: Permissions,

    /// Invite links issued and not yet used or revoked.
    pub invites: InviteTracker,

    /// Time of the last permitted join per chat.
    pub cooldown: JoinCooldown,

    /// Running next-show countdowns.
    pub countdowns: CountdownJobs,

    /// Client for the next-show API.
    pub http: reqwest::Client,

    /// This bot's user ID, to recognise links it created.
    pub bot_id: UserId,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `join_link` is a primary invite link issued before a restart; it is
    /// tracked for the default invite chat so `/newlink` can revoke it.
    pub fn new(
        bot: &ThrottledBot,
        community: Arc<Community>,
        bot_id: UserId,
        join_link: Option<String>,
    ) -> Self {
        // Permissions needs the inner Bot for API calls
        let permissions = Permissions::new(bot.inner().clone());

        let invites = InviteTracker::new();
        if let Some(link) = join_link {
            match community.default_invite_chat() {
                Some(chat) => {
                    info!("Tracking JOIN_LINK for {}", chat.slug);
                    invites.track(TrackedLink::new(link, chat.chat_id()));
                }
                None => info!("JOIN_LINK set but no default_invite_chat configured, ignoring"),
            }
        }

        Self {
            community,
            permissions,
            invites,
            cooldown: JoinCooldown::new(),
            countdowns: CountdownJobs::new(),
            http: reqwest::Client::new(),
            bot_id,
        }
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
) -> Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey> {
    let dialogues = InMemStorage::<JoinState>::new();

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state, dialogues])
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    use teloxide::dispatching::UpdateFilterExt;

    // Message handlers: commands first, then the /join dialogue, then @admin mentions
    let message_handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<JoinState>, JoinState>()
        .branch(plugins::command_handler())
        .branch(plugins::join::rules_handler())
        .branch(events::mention::handler());

    // Join requests made through our invite links
    let join_request_handler = Update::filter_chat_join_request()
        .endpoint(events::join_request::join_request_handler);

    // Topic approval buttons
    let callback_handler = plugins::callback_handler();

    dptree::entry()
        .branch(message_handler)
        .branch(join_request_handler)
        .branch(callback_handler)
}
