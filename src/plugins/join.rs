//! Joining chats through single-use invite links.
//!
//! `/join [chat]` in a private chat shows the chat's rules with a reply
//! keyboard. Agreeing creates an invite link that only works for the asking
//! user; the join request it produces is approved in
//! [`crate::events::join_request`]. `/newlink` lets admins revoke links.

use chrono::{DateTime, Duration, Utc};
use teloxide::dispatching::UpdateHandler;
use teloxide::dispatching::dialogue::{Dialogue, InMemStorage};
use teloxide::dptree::case;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, KeyboardRemove,
    ParseMode, ReplyParameters,
};
use tracing::{debug, error, info};
use url::Url;

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::config::ChatEntry;
use crate::services::TrackedLink;
use crate::services::invites::{link_expiry, link_name, revoke_link};
use crate::utils::{format_username, no_link_preview, render_template};

pub const ACCEPT: &str = "I agree";
pub const REJECT: &str = "Never mind";

const DEFAULT_GREETING: &str = "Please click the button.";
const DEFAULT_CONFIRMATION: &str = "Here's your invite link. Use it before it expires!";

/// Long enough to read the rules.
fn dialogue_timeout() -> Duration {
    Duration::minutes(15)
}

/// Where a private chat is in the join flow.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum JoinState {
    #[default]
    Idle,
    ReadingRules {
        chat: String,
        started: DateTime<Utc>,
    },
}

pub type JoinDialogue = Dialogue<JoinState, InMemStorage<JoinState>>;

/// Replies to the rules keyboard.
pub fn rules_handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter(|msg: Message| msg.chat.is_private())
        .branch(case![JoinState::ReadingRules { chat, started }].endpoint(rules_reply))
}

/// Handle /join (and /start) - show the rules of the requested chat.
pub async fn join_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    dialogue: JoinDialogue,
    args: String,
) -> anyhow::Result<()> {
    let chat = match args.split_whitespace().next() {
        Some(slug) => state.community.chat(slug).filter(|c| c.invite),
        None => state.community.default_invite_chat(),
    };
    let Some(chat) = chat else {
        bot.send_message(
            msg.chat.id,
            "I'm sorry, I don't understand. Try <code>/join chatname</code>.",
        )
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        return Ok(());
    };

    // Invites are only handed out in private.
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let greeting = chat.invite_greeting.as_deref().unwrap_or(DEFAULT_GREETING);
    let keyboard = KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(REJECT)],
        vec![KeyboardButton::new(ACCEPT)],
    ])
    .one_time_keyboard();

    bot.send_message(msg.chat.id, render_template(greeting, &user.first_name, &chat.slug))
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_link_preview())
        .reply_markup(keyboard)
        .await?;

    dialogue
        .update(JoinState::ReadingRules {
            chat: chat.slug.clone(),
            started: Utc::now(),
        })
        .await?;
    Ok(())
}

/// Handle /cancel - leave the join flow.
pub async fn cancel_command(
    bot: ThrottledBot,
    msg: Message,
    dialogue: JoinDialogue,
) -> anyhow::Result<()> {
    if !matches!(dialogue.get().await?, Some(JoinState::ReadingRules { .. })) {
        return Ok(());
    }
    say_goodbye(&bot, &msg, &dialogue).await
}

async fn say_goodbye(bot: &ThrottledBot, msg: &Message, dialogue: &JoinDialogue) -> anyhow::Result<()> {
    debug!("Join cancelled in {}", msg.chat.id);
    bot.send_message(msg.chat.id, "Goodbye!")
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn rules_reply(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    dialogue: JoinDialogue,
    (slug, started): (String, DateTime<Utc>),
) -> anyhow::Result<()> {
    if Utc::now() - started > dialogue_timeout() {
        debug!("Join dialogue timed out in {}", msg.chat.id);
        bot.send_message(msg.chat.id, "Your request timed out, please try again.")
            .reply_markup(KeyboardRemove::new())
            .await?;
        dialogue.exit().await?;
        return Ok(());
    }

    match msg.text() {
        Some(REJECT) => say_goodbye(&bot, &msg, &dialogue).await,
        Some(ACCEPT) => match state.community.chat(&slug) {
            Some(chat) => join_attempt(&bot, &msg, &state, &dialogue, chat).await,
            None => {
                dialogue.exit().await?;
                Ok(())
            }
        },
        _ => Ok(()),
    }
}

/// The user agreed to the rules: check membership and rate limits, then
/// issue a link.
async fn join_attempt(
    bot: &ThrottledBot,
    msg: &Message,
    state: &AppState,
    dialogue: &JoinDialogue,
    chat: &ChatEntry,
) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    // Only users who left may join; this also keeps banned users out.
    let member = state.permissions.fresh_member(chat.chat_id(), user.id).await?;
    if !member.may_be_invited() {
        info!(
            "Denying join by {} ({}) to {}: already a member or banned ({:?})",
            user.id,
            format_username(user),
            chat.slug,
            member.status
        );
        let suggestion = state
            .community
            .settings
            .default_invite_chat
            .as_deref()
            .unwrap_or("chatname");
        bot.send_message(
            msg.chat.id,
            format!(
                "You're already in the {} group!\n\
                 Did you mean to join a different one with e.g. <code>/join {}</code>?",
                chat.slug, suggestion
            ),
        )
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        dialogue.exit().await?;
        return Ok(());
    }

    let now = Utc::now();
    if let Err(cooldown) = state.cooldown.try_admit(chat.chat_id(), chat.join_delay(), now) {
        info!(
            "Denying join by {} ({}) to {} due to rate limit, {}s left",
            user.id,
            format_username(user),
            chat.slug,
            cooldown.remaining.num_seconds()
        );
        let text = render_template(
            &state.community.settings.rate_limit_template,
            &user.first_name,
            &chat.slug,
        );
        bot.send_message(msg.chat.id, text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        // The user may agree again once the cooldown passes.
        return Ok(());
    }
    dialogue.exit().await?;

    let expiry = link_expiry(now, state.community.settings.join_link_valid_minutes);
    info!(
        "Inviting {} ({}) to {}, link expiry {}",
        user.id,
        format_username(user),
        chat.slug,
        expiry
    );

    let created = bot
        .create_chat_invite_link(chat.chat_id())
        .expire_date(expiry)
        .name(link_name(user))
        .creates_join_request(true)
        .await;

    let link = match created {
        Ok(link) => link,
        Err(e) => {
            error!("Could not generate invite link for {}: {}", chat.slug, e);
            bot.send_message(msg.chat.id, "Uh oh, something went wrong. Poke an admin.")
                .reply_markup(KeyboardRemove::new())
                .await?;
            return Ok(());
        }
    };
    state.invites.track(
        TrackedLink::new(link.invite_link.clone(), chat.chat_id())
            .expiring(link.expire_date.unwrap_or(expiry)),
    );

    let confirmation = chat.invite_confirmation.as_deref().unwrap_or(DEFAULT_CONFIRMATION);
    let button = InlineKeyboardButton::url(
        state.community.settings.join_button_text.clone(),
        Url::parse(&link.invite_link)?,
    );
    bot.send_message(
        msg.chat.id,
        render_template(confirmation, &user.first_name, &chat.slug),
    )
    .parse_mode(ParseMode::Html)
    .link_preview_options(no_link_preview())
    .reply_markup(InlineKeyboardMarkup::new([[button]]))
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;

    Ok(())
}

/// Which chat `/newlink` acts on.
///
/// The slug may be left out when the admin chat manages exactly one chat.
pub fn newlink_target<'a>(managed: &'a [String], slug: Option<&str>) -> Option<&'a str> {
    match slug {
        None if managed.len() == 1 => Some(managed[0].as_str()),
        None => None,
        Some(slug) => {
            let slug = slug.to_lowercase();
            managed.iter().find(|m| **m == slug).map(String::as_str)
        }
    }
}

/// Reply text for `/newlink`.
///
/// `rotation` is `None` when specific links were given.
pub fn revocation_summary(
    rotation: Option<Result<(), String>>,
    revoked: usize,
    failed: &[String],
) -> String {
    let mut text = match rotation {
        None => String::new(),
        Some(Ok(())) => "Bot's primary invite link rotated.".to_string(),
        Some(Err(e)) => format!("Rotation of bot's primary invite link failed: {e}"),
    };
    text.push_str(&format!(
        "\n{} per-user invite links revoked, {} failed.",
        revoked,
        failed.len()
    ));
    for link in failed {
        text.push_str(&format!("\nFailed: {link}"));
    }
    text.trim_start().to_string()
}

/// Handle /newlink - revoke invite links for a managed chat.
///
/// Usage: `/newlink [chat] [link...]`. Without links the bot's primary link
/// is rotated and every per-user link it issued for the chat is revoked.
pub async fn newlink_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let managed = state.community.managed_chats(msg.chat.id);
    // Only admin chats may revoke.
    if managed.is_empty() {
        return Ok(());
    }

    let mut words = args.split_whitespace();
    let Some(target) = newlink_target(managed, words.next()) else {
        bot.send_message(
            msg.chat.id,
            format!(
                "Chat slug missing or invalid. You can act on these chats: {}",
                managed.join(", ")
            ),
        )
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        return Ok(());
    };
    let Some(chat) = state.community.chat(target) else {
        return Ok(());
    };
    let chat_id = chat.chat_id();

    let explicit: Vec<String> = words.map(str::to_string).collect();
    info!(
        "{} requested invite link revocation for {}: {}",
        msg.from.as_ref().map(format_username).unwrap_or_default(),
        chat.slug,
        if explicit.is_empty() { "(all)".to_string() } else { explicit.join(", ") }
    );

    let (links, rotation) = if explicit.is_empty() {
        let rotation = match bot.export_chat_invite_link(chat_id).await {
            Ok(link) => {
                info!("New bot primary invite link for {}: {}", chat.slug, link);
                Ok(())
            }
            Err(e) => {
                error!("Invite link rotation failed for {}: {}", chat.slug, e);
                Err(e.to_string())
            }
        };
        (state.invites.take_for_chat(chat_id), Some(rotation))
    } else {
        let links = explicit
            .into_iter()
            .map(|url| TrackedLink::new(url, chat_id))
            .inspect(|link| {
                state.invites.forget(link);
            })
            .collect();
        (links, None)
    };

    let mut revoked = 0;
    let mut failed = Vec::new();
    for link in links {
        info!("Revoking invite link for {}: {}", chat.slug, link.url);
        match revoke_link(&bot, &link).await {
            Ok(true) => revoked += 1,
            Ok(false) => {
                error!("Revocation of {} was not confirmed", link.url);
                failed.push(link.url);
            }
            Err(e) => {
                error!("Revocation failed for {}: {}", link.url, e);
                failed.push(link.url);
            }
        }
    }

    bot.send_message(msg.chat.id, revocation_summary(rotation, revoked, &failed))
        .link_preview_options(no_link_preview())
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slugs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_newlink_target_defaults_to_only_chat() {
        let one = slugs(&["fc"]);
        assert_eq!(newlink_target(&one, None), Some("fc"));

        let two = slugs(&["fc", "lounge"]);
        assert_eq!(newlink_target(&two, None), None);
        assert_eq!(newlink_target(&two, Some("Lounge")), Some("lounge"));
        assert_eq!(newlink_target(&two, Some("other")), None);
    }

    #[test]
    fn test_revocation_summary_with_rotation() {
        let failed = slugs(&["https://t.me/+x"]);
        assert_eq!(
            revocation_summary(Some(Ok(())), 2, &failed),
            "Bot's primary invite link rotated.\n\
             2 per-user invite links revoked, 1 failed.\n\
             Failed: https://t.me/+x"
        );
    }

    #[test]
    fn test_revocation_summary_for_explicit_links() {
        assert_eq!(
            revocation_summary(None, 1, &[]),
            "1 per-user invite links revoked, 0 failed."
        );
        assert!(
            revocation_summary(Some(Err("Bad Request".into())), 0, &[])
                .starts_with("Rotation of bot's primary invite link failed: Bad Request\n")
        );
    }

    #[test]
    fn test_join_state_defaults_to_idle() {
        assert_eq!(JoinState::default(), JoinState::Idle);
    }
}
