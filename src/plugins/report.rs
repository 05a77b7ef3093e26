//! Reporting messages to a chat's admins.
//!
//! `/report`, `/admin`, `/admins` and `@admin` mentions all end up here.

use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use tracing::info;

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::utils::{format_username, html_escape, mention_html};

/// Handle /report, /admin and /admins.
pub async fn report_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    report(&bot, &msg, &state).await
}

/// Relay a report to the chat's admin chat.
pub async fn report(bot: &ThrottledBot, msg: &Message, state: &AppState) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;

    if msg.chat.is_private() {
        bot.send_message(
            chat_id,
            "Reporting messages in PMs isn't done yet; for now please PM an admin directly.",
        )
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        return Ok(());
    }

    let Some(admin_chat) = state.community.admin_chat_for(chat_id) else {
        bot.send_message(chat_id, "Sorry, that's not configured for this group.")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    };

    let Some(reported) = msg.reply_to_message() else {
        bot.send_message(chat_id, "Please reply to the message you want to report.")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    };
    let Some(reporter) = msg.from.as_ref() else {
        return Ok(());
    };

    info!(
        "{} reported message {} in {} to {}",
        format_username(reporter),
        reported.id,
        chat_id,
        admin_chat.slug
    );

    bot.forward_message(admin_chat.chat_id(), chat_id, reported.id)
        .await?;

    let summon_link = msg.url().map(|u| u.to_string()).unwrap_or_default();
    let reply_link = reported.url().map(|u| u.to_string()).unwrap_or_default();
    bot.send_message(
        admin_chat.chat_id(),
        format!(
            "{} has <a href=\"{}\">summoned</a> admins in reply to \
             <a href=\"{}\">the above message</a>; they said:\n{}",
            mention_html(reporter),
            summon_link,
            reply_link,
            html_escape(msg.text().unwrap_or_default())
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;

    bot.send_message(chat_id, "Thank you; we’re on it.")
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}
