//! Join requests made through the bot's single-use invite links.
//!
//! The link is revoked as soon as it is used. The request is approved only
//! when the link was issued to the requesting user.

use teloxide::prelude::*;
use teloxide::types::ChatJoinRequest;
use tracing::{debug, error, info, warn};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::services::TrackedLink;
use crate::services::invites::{JoinVerdict, judge_join_request, revoke_link};
use crate::utils::format_username;

pub async fn join_request_handler(
    bot: ThrottledBot,
    request: ChatJoinRequest,
    state: AppState,
) -> anyhow::Result<()> {
    let Some(link) = request.invite_link.as_ref() else {
        debug!("Ignoring join request without an invite link");
        return Ok(());
    };
    if link.creator.id != state.bot_id {
        debug!("Ignoring join request via invite link I didn't create");
        return Ok(());
    }

    let chat_id = request.chat.id;
    let slug = state
        .community
        .chat_by_id(chat_id)
        .map(|c| c.slug.clone())
        .unwrap_or_else(|| chat_id.to_string());

    // Revoke and forget the link
    let tracked = TrackedLink::new(link.invite_link.clone(), chat_id);
    match revoke_link(&bot, &tracked).await {
        Ok(true) => {
            state.invites.forget(&tracked);
        }
        Ok(false) => error!("Revocation of {} was not confirmed", link.invite_link),
        Err(e) => error!("Revocation failed for {}: {}", link.invite_link, e),
    }

    let user = &request.from;
    match judge_join_request(link.name.as_deref(), user.id) {
        JoinVerdict::Approve => {
            info!(
                "Approving join request to {} by {} ({})",
                slug,
                user.id,
                format_username(user)
            );
            bot.approve_chat_join_request(chat_id, user.id).await?;
        }
        JoinVerdict::Decline => {
            warn!(
                "Declining join request to {}: {} ({}) used a link meant for {:?}",
                slug,
                user.id,
                format_username(user),
                link.name
            );
            bot.decline_chat_join_request(chat_id, user.id).await?;
        }
    }
    Ok(())
}
