//! `/chatinfo` and `/version`.

use teloxide::prelude::*;
use teloxide::types::{Chat, ParseMode};

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::utils::{html_escape, no_link_preview};

/// Handle /chatinfo command.
pub async fn chatinfo_command(bot: ThrottledBot, msg: Message) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, chat_info_text(&msg.chat)).await?;
    Ok(())
}

pub fn chat_info_text(chat: &Chat) -> String {
    let kind = if chat.is_private() {
        "private"
    } else if chat.is_group() {
        "group"
    } else if chat.is_supergroup() {
        "supergroup"
    } else {
        "channel"
    };
    format!(
        "Name: {}\nID: {}\nUsername: {}\nType: {}",
        chat.title().unwrap_or("None"),
        chat.id,
        chat.username().unwrap_or("None"),
        kind
    )
}

/// Handle /version command.
pub async fn version_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    bot.send_message(
        msg.chat.id,
        version_text(state.community.settings.version_url.as_deref()),
    )
    .parse_mode(ParseMode::Html)
    .link_preview_options(no_link_preview())
    .await?;
    Ok(())
}

pub fn version_text(url: Option<&str>) -> String {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    match url {
        Some(url) => format!("<a href='{}'>{}</a> {}", html_escape(url), name, version),
        None => format!("{} {}", name, version),
    }
}
