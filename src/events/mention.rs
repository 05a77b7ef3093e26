//! `@admin` / `@admins` mentions in groups are treated as `/report`.

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::MessageEntityKind;

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::plugins::report;

/// Whether a message mentions `@admin` or `@admins`.
pub fn mentions_admins(msg: &Message) -> bool {
    msg.parse_entities()
        .map(|entities| {
            entities.iter().any(|entity| {
                *entity.kind() == MessageEntityKind::Mention
                    && matches!(entity.text(), "@admin" | "@admins")
            })
        })
        .unwrap_or(false)
}

pub fn handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter(|msg: Message| {
        (msg.chat.is_group() || msg.chat.is_supergroup()) && mentions_admins(&msg)
    })
    .endpoint(mention_handler)
}

async fn mention_handler(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    report::report(&bot, &msg, &state).await
}
