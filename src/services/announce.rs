//! Announcement posting for the HTTP API.
//!
//! Two operations: posting (and optionally forwarding and pinning) a message
//! to an announce group, and keeping a show's "now playing" pin current.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bot::dispatcher::ThrottledBot;
use crate::config::{Community, Show};
use crate::utils::{html_escape, no_link_preview};

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("Unknown group")]
    UnknownGroup(String),
    #[error("Unknown show slug")]
    UnknownShow(String),
    #[error("No now-playing chat for show")]
    NoNowPlayingChats(String),
    #[error("Not my pin")]
    NotMyPin(ChatId),
    #[error("Telegram request failed: {0}")]
    Telegram(#[from] RequestError),
}

/// A post to an announce group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinRequest {
    pub group: String,
    pub message: Option<String>,
    /// `None` leaves pins alone, `Some(false)` unpins everywhere.
    pub pin: Option<bool>,
    pub notify: bool,
    pub forward: bool,
}

/// Post to an announce group.
///
/// The message goes to the group's first chat and, when forwarding, is
/// forwarded to the rest. With `notify` the copies outside the first chat are
/// quiet-pinned unless pinning was explicitly turned off.
pub async fn post_pin(
    bot: &ThrottledBot,
    community: &Community,
    request: &PinRequest,
) -> Result<(), AnnounceError> {
    let chats = community
        .announce_group(&request.group)
        .filter(|chats| !chats.is_empty())
        .ok_or_else(|| AnnounceError::UnknownGroup(request.group.clone()))?;
    let first = chats[0];

    if let Some(text) = &request.message {
        info!("Announcing to group {} ({} chats)", request.group, chats.len());
        let root = bot
            .send_message(first, text)
            .disable_notification(!request.notify)
            .await?;

        let mut sent = Vec::new();
        if request.forward {
            for &target in &chats[1..] {
                let copy = bot
                    .forward_message(target, root.chat.id, root.id)
                    .disable_notification(!request.notify)
                    .await?;
                sent.push((target, copy.id));
            }
        }

        if request.notify && request.pin != Some(false) {
            for (chat_id, message_id) in sent {
                if let Err(e) = bot
                    .pin_chat_message(chat_id, message_id)
                    .disable_notification(true)
                    .await
                {
                    warn!("Pin failed in {}: {}", chat_id, e);
                }
            }
        }
    }

    if request.pin == Some(false) {
        for &chat_id in chats {
            if let Err(e) = bot.unpin_chat_message(chat_id).await {
                warn!("Unpin failed in {}: {}", chat_id, e);
            }
        }
    }

    Ok(())
}

/// Text of the now-playing pin.
pub fn now_playing_text(show: &Show, title: &str) -> String {
    let mut text = format!(
        "Now playing: {}\n🎵 {} is live!\n",
        html_escape(title),
        html_escape(&show.name)
    );
    if show.video {
        text.push_str(&format!("📺 <a href='https://{}/video/'>Watch</a> ", show.domain));
    }
    text.push_str(&format!(
        "🎧 <a href='https://{0}/audio/'>Listen</a> 💬 <a href='https://{0}/chat/'>Chat</a>",
        show.domain
    ));
    text
}

/// Create or update the now-playing pin in every chat configured for `show`.
pub async fn post_now_playing(
    bot: &ThrottledBot,
    community: &Community,
    title: &str,
    show: &str,
) -> Result<(), AnnounceError> {
    debug!("Now playing on {:?}: {:?}", show, title);

    let show = community
        .show(show)
        .filter(|s| community.announce_group(&s.slug).is_some())
        .ok_or_else(|| AnnounceError::UnknownShow(show.to_string()))?;
    let slugs = community
        .now_playing_chats(&show.slug)
        .ok_or_else(|| AnnounceError::NoNowPlayingChats(show.slug.clone()))?;

    let text = now_playing_text(show, title);
    for slug in slugs {
        let Some(chat) = community.chat(slug) else {
            continue;
        };
        match update_pin(bot, chat.chat_id(), &text).await {
            Ok(()) => {}
            Err(AnnounceError::NotMyPin(chat_id)) => {
                warn!("Now-playing pin in {} belongs to someone else", chat_id);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Edit the chat's pinned message, or post and pin a new one.
///
/// A pin the bot can't edit is unpinned once and the update retried.
async fn update_pin(bot: &ThrottledBot, chat_id: ChatId, text: &str) -> Result<(), AnnounceError> {
    let mut retried = false;
    loop {
        let chat = bot.get_chat(chat_id).await?;
        let Some(pinned) = chat.pinned_message else {
            let sent = bot
                .send_message(chat_id, text)
                .parse_mode(ParseMode::Html)
                .link_preview_options(no_link_preview())
                .await?;
            if let Err(e) = bot
                .pin_chat_message(chat_id, sent.id)
                .disable_notification(true)
                .await
            {
                warn!("Now-playing pin failed in {}: {}", chat_id, e);
            }
            return Ok(());
        };

        match bot
            .edit_message_text(chat_id, pinned.id, text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .await
        {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => return Ok(()),
            Err(RequestError::Api(ApiError::MessageCantBeEdited)) if !retried => {
                debug!("Pinned message in {} isn't ours, unpinning", chat_id);
                bot.unpin_chat_message(chat_id).message_id(pinned.id).await?;
                retried = true;
            }
            Err(RequestError::Api(ApiError::MessageCantBeEdited)) => {
                return Err(AnnounceError::NotMyPin(chat_id));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
