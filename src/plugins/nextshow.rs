//! `/next` - when is the next show?

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use tracing::info;

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::config::Show;
use crate::services::countdown::CountdownJob;
use crate::services::showtime::{
    TZ_LIST_URL, fetch_showtime, format_clock_delta, format_show_date, resolve_style,
};
use crate::utils::{format_username, no_link_preview};

/// Handle /next command.
///
/// Usage: `/next [show] [timezone]` or `/next [show] pin`.
/// The show defaults to the chat's configured one.
pub async fn next_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let mut words: Vec<&str> = args.split_whitespace().collect();

    let named = words.first().and_then(|w| state.community.show(w)).cloned();
    let show = match named {
        Some(show) => {
            words.remove(0);
            show
        }
        None => match default_show(&state, chat_id) {
            Some(show) => show,
            None => {
                bot.send_message(chat_id, "Which show? Try e.g. <code>/next showname</code>.")
                    .parse_mode(ParseMode::Html)
                    .reply_parameters(ReplyParameters::new(msg.id))
                    .await?;
                return Ok(());
            }
        },
    };

    let showtime = match fetch_showtime(
        &state.http,
        &state.community.settings.nextshow_url_template,
        &show,
    )
    .await
    {
        Ok(time) => time,
        Err(e) => {
            bot.send_message(chat_id, format!("Error: {e}"))
                .reply_parameters(ReplyParameters::new(msg.id))
                .await?;
            return Err(e);
        }
    };

    if words.iter().any(|w| w.eq_ignore_ascii_case("pin")) {
        return start_countdown(bot, msg, state, show, showtime).await;
    }

    let zone = words
        .first()
        .copied()
        .unwrap_or(state.community.settings.default_timezone.as_str());
    let Some(style) = resolve_style(zone, &state.community) else {
        bot.send_message(
            chat_id,
            format!(
                "Sorry, I don't understand.\nFor timezones, try e.g. \
                 <code>America/Chicago</code> or another from the \
                 <a href='{TZ_LIST_URL}'>tzdata list</a>"
            ),
        )
        .parse_mode(ParseMode::Html)
        .link_preview_options(no_link_preview())
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
        return Ok(());
    };

    let delta = showtime - Utc::now();
    if delta < chrono::Duration::zero() {
        bot.send_message(chat_id, "A show is currently live or just ended!")
            .await?;
        return Ok(());
    }

    bot.send_message(
        chat_id,
        format!(
            "The next {} is {}. That's {} from now.",
            show.name,
            format_show_date(showtime, style),
            format_clock_delta(delta)
        ),
    )
    .await?;
    Ok(())
}

fn default_show(state: &AppState, chat_id: ChatId) -> Option<Show> {
    state
        .community
        .chat_by_id(chat_id)
        .and_then(|chat| chat.next_show_default.as_deref())
        .and_then(|slug| state.community.show(slug))
        .cloned()
}

/// `/next … pin`: start a countdown pinned in this chat.
async fn start_countdown(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    show: Show,
    showtime: chrono::DateTime<Utc>,
) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    if !state
        .permissions
        .can_pin_messages(chat_id, user.id)
        .await
        .unwrap_or(false)
    {
        bot.send_message(chat_id, "You aren't allowed to do that")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    if showtime <= Utc::now() {
        bot.send_message(chat_id, "A show is currently live or just ended!")
            .reply_parameters(ReplyParameters::new(msg.id))
            .await?;
        return Ok(());
    }

    info!(
        "Scheduled next-pin job for {} by {} ({}) in {}",
        show.slug,
        format_username(user),
        user.id,
        chat_id
    );
    let replaced = state.countdowns.start(
        bot,
        CountdownJob {
            chat_id,
            show,
            showtime,
        },
    );
    if replaced {
        info!("Previous next-pin job in {} was replaced", chat_id);
    }
    Ok(())
}
